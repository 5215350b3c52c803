//! C ABI shared between the host and a hot-reloadable plugin.
//!
//! Everything here is `#[repr(C)]` so host and plugin agree on layout even
//! when built separately. The plugin exports one function matching
//! [`UpdateAndRender`] under the name [`ENTRY_SYMBOL`].

use std::ffi::c_void;

use crate::memory::{ArenaState, MemoryArena};

/// Name of the symbol the host resolves in every loaded artifact.
pub const ENTRY_SYMBOL: &str = "update_and_render";

/// Signature of the plugin entry point.
pub type UpdateAndRender =
    unsafe extern "C" fn(*mut Surface, *const Input, *mut Memory, *const IoFunctions);

/// Pixel buffer the plugin draws into.
#[repr(C)]
#[derive(Debug)]
pub struct Surface {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixels, row-major, `width * height` entries.
    pub pixels: *mut u32,
}

impl Surface {
    /// Borrow the pixels.
    ///
    /// # Safety
    /// `pixels` must point to `width * height` initialized `u32`s that
    /// nothing else accesses for the returned lifetime.
    #[must_use]
    pub unsafe fn pixels_mut(&mut self) -> &mut [u32] {
        let len = self.width as usize * self.height as usize;
        if self.pixels.is_null() || len == 0 {
            return &mut [];
        }
        // SAFETY: Caller guarantees pixels points to len valid u32s
        unsafe { std::slice::from_raw_parts_mut(self.pixels, len) }
    }
}

/// A button sampled once per frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigitalButton {
    /// Down this frame.
    pub is_down: bool,
    /// Down last frame.
    pub was_down: bool,
}

impl DigitalButton {
    /// Advance one frame with the new physical state.
    pub fn update(&mut self, down: bool) {
        self.was_down = self.is_down;
        self.is_down = down;
    }

    /// Pressed this frame.
    #[inline]
    #[must_use]
    pub const fn just_pressed(self) -> bool {
        self.is_down && !self.was_down
    }

    /// Released this frame.
    #[inline]
    #[must_use]
    pub const fn just_released(self) -> bool {
        !self.is_down && self.was_down
    }
}

/// Per-frame input state.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Input {
    pub mouse_x: i32,
    pub mouse_y: i32,
    pub mouse_left: DigitalButton,
    pub mouse_right: DigitalButton,
    pub mouse_middle: DigitalButton,
    /// Seconds the plugin should simulate this frame.
    pub update_dt: f32,
}

/// Host memory handed to the plugin.
///
/// The first `state_size` bytes belong to the plugin's persistent state, the
/// rest is a bump arena whose bookkeeping is `arena`.
#[repr(C)]
#[derive(Debug)]
pub struct Memory {
    pub base: *mut u8,
    pub size: u64,
    pub state_size: u64,
    pub arena: ArenaState,
}

impl Memory {
    /// Re-derive the state bytes and the arena from the base pointer.
    ///
    /// # Safety
    /// `base` must point to `size` bytes owned by the host and not otherwise
    /// borrowed for the returned lifetime, with `state_size <= size`.
    pub unsafe fn split(&mut self) -> (&mut [u8], MemoryArena<'_>) {
        let size = self.size as usize;
        let state_size = (self.state_size as usize).min(size);
        // SAFETY: Caller guarantees base points to size host-owned bytes
        let bytes = unsafe { std::slice::from_raw_parts_mut(self.base, size) };
        let (state, arena) = bytes.split_at_mut(state_size);
        (state, MemoryArena::new(arena, &mut self.arena))
    }
}

/// Result of [`IoFunctions::read_entire_file`].
#[repr(C)]
#[derive(Debug)]
pub struct ReadFileResult {
    pub size: u64,
    /// Null when the read failed.
    pub data: *mut u8,
}

impl ReadFileResult {
    /// An empty (failed) result.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            size: 0,
            data: std::ptr::null_mut(),
        }
    }
}

pub type ReadEntireFileFn =
    unsafe extern "C" fn(host: *mut c_void, path: *const u8, path_len: usize) -> ReadFileResult;
pub type FreeFileResultFn = unsafe extern "C" fn(host: *mut c_void, result: *mut ReadFileResult);

pub type RegisterCallSiteFn = unsafe extern "C" fn(
    table: *const c_void,
    file: *const u8,
    file_len: usize,
    function: *const u8,
    function_len: usize,
    line: u32,
) -> i32;
pub type BeginBlockFn = unsafe extern "C" fn(table: *const c_void, site: u16) -> u64;
pub type EndBlockFn = unsafe extern "C" fn(table: *const c_void, site: u16, start: u64, hits: u32);
pub type FrameMarkerFn = unsafe extern "C" fn(table: *const c_void);

/// Host instrumentation callbacks.
///
/// `table` is opaque to the plugin and only passed back to the host.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DebugHooks {
    pub table: *const c_void,
    pub register_call_site: RegisterCallSiteFn,
    pub begin_block: BeginBlockFn,
    pub end_block: EndBlockFn,
    pub frame_marker: FrameMarkerFn,
}

impl DebugHooks {
    /// Register a call site, returning its index.
    ///
    /// Registering the same location twice yields the same index, so the
    /// plugin may call this every frame or after every reload.
    #[must_use]
    pub fn register(&self, file: &str, function: &str, line: u32) -> Option<u16> {
        // SAFETY: The host builds DebugHooks around a live table and keeps it
        // alive for the duration of update_and_render.
        let id = unsafe {
            (self.register_call_site)(
                self.table,
                file.as_ptr(),
                file.len(),
                function.as_ptr(),
                function.len(),
                line,
            )
        };
        u16::try_from(id).ok()
    }

    /// Open a timed block on a registered call site.
    #[must_use]
    pub fn begin(&self, site: u16) -> PluginBlock<'_> {
        // SAFETY: See register()
        let start = unsafe { (self.begin_block)(self.table, site) };
        PluginBlock {
            hooks: self,
            site,
            start,
            hits: 1,
        }
    }

    /// Register and open a block in one step.
    #[must_use]
    pub fn block(&self, file: &str, function: &str, line: u32) -> Option<PluginBlock<'_>> {
        self.register(file, function, line).map(|site| self.begin(site))
    }

    /// Record a frame boundary in the host's event ring.
    pub fn frame_marker(&self) {
        // SAFETY: See register()
        unsafe { (self.frame_marker)(self.table) };
    }
}

/// Plugin-side scope guard; closes the block on drop.
pub struct PluginBlock<'a> {
    hooks: &'a DebugHooks,
    site: u16,
    start: u64,
    hits: u32,
}

impl PluginBlock<'_> {
    /// Count this activation as `hits` hits instead of one.
    pub fn set_hits(&mut self, hits: u32) {
        self.hits = hits;
    }

    /// Close the block now.
    pub fn end(self) {}
}

impl Drop for PluginBlock<'_> {
    fn drop(&mut self) {
        // SAFETY: See DebugHooks::register()
        unsafe { (self.hooks.end_block)(self.hooks.table, self.site, self.start, self.hits) };
    }
}

/// Services the host provides to the plugin.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IoFunctions {
    pub host: *mut c_void,
    pub read_entire_file: ReadEntireFileFn,
    pub free_file_result: FreeFileResultFn,
    pub debug: DebugHooks,
}

impl IoFunctions {
    /// Read a whole file through the host. Returns `None` on failure.
    #[must_use]
    pub fn read_entire_file(&self, path: &str) -> Option<FileContents<'_>> {
        // SAFETY: The host keeps `host` valid while update_and_render runs
        let result = unsafe { (self.read_entire_file)(self.host, path.as_ptr(), path.len()) };
        if result.data.is_null() {
            return None;
        }
        Some(FileContents { io: self, result })
    }
}

/// File contents owned by the host; freed through the host on drop.
pub struct FileContents<'a> {
    io: &'a IoFunctions,
    result: ReadFileResult,
}

impl FileContents<'_> {
    /// The file bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: Non-null data from the host points to size bytes until freed
        unsafe { std::slice::from_raw_parts(self.result.data, self.result.size as usize) }
    }
}

impl Drop for FileContents<'_> {
    fn drop(&mut self) {
        // SAFETY: result came from this host's read_entire_file
        unsafe { (self.io.free_file_result)(self.io.host, &mut self.result) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_transitions() {
        let mut button = DigitalButton::default();
        button.update(true);
        assert!(button.just_pressed());
        button.update(true);
        assert!(!button.just_pressed());
        button.update(false);
        assert!(button.just_released());
    }

    #[test]
    fn null_surface_has_no_pixels() {
        let mut surface = Surface {
            width: 4,
            height: 4,
            pixels: std::ptr::null_mut(),
        };
        // SAFETY: null pixels are handled without dereferencing
        assert!(unsafe { surface.pixels_mut() }.is_empty());
    }

    #[test]
    fn memory_split_matches_layout() {
        let mut backing = vec![0u64; 8];
        let mut memory = Memory {
            base: backing.as_mut_ptr().cast(),
            size: 64,
            state_size: 16,
            arena: ArenaState::default(),
        };
        // SAFETY: backing outlives the borrow and holds 64 bytes
        let (state, arena) = unsafe { memory.split() };
        assert_eq!(state.len(), 16);
        assert_eq!(arena.capacity(), 48);
    }
}
