//! Host-owned memory block and the bump arena carved out of it.
//!
//! The host allocates one block at startup. The first `state_size` bytes
//! hold the plugin's persistent `State`; the remainder backs a
//! [`MemoryArena`]. The arena's bookkeeping ([`ArenaState`]) lives in the
//! ABI [`Memory`] header, not in the plugin, so it survives reloads.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use bytemuck::{Pod, Zeroable};

use crate::abi::Memory;
use crate::error::{Error, Result};

/// Alignment of the block base and of the arena start.
pub const BLOCK_ALIGN: usize = std::mem::align_of::<u64>();

/// Round `value` up to a multiple of `align` (a power of two).
const fn align_up(value: usize, align: usize) -> Option<usize> {
    match value.checked_add(align - 1) {
        Some(bumped) => Some(bumped & !(align - 1)),
        None => None,
    }
}

/// Arena bookkeeping stored in host memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ArenaState {
    /// Bytes handed out since the last reset.
    pub used: u64,
    /// Incremented on every reset; stale handles carry an older value.
    pub generation: u32,
    _pad: u32,
}

/// Offset-based reference to an arena allocation.
///
/// Handles stay valid across plugin reloads because they hold no raw
/// address, only an offset from the arena base.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ArenaHandle {
    offset: u64,
    len: u64,
    generation: u32,
    _pad: u32,
}

impl ArenaHandle {
    /// Length of the allocation in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns true for zero-sized allocations.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset from the arena base.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset as usize
    }
}

/// Snapshot of the arena fill level, restored by
/// [`MemoryArena::end_temporary`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TemporaryMemory {
    used: u64,
    generation: u32,
}

/// Linear bump allocator over a borrowed byte region.
pub struct MemoryArena<'a> {
    bytes: &'a mut [u8],
    state: &'a mut ArenaState,
}

impl<'a> MemoryArena<'a> {
    /// Wrap a byte region and its persistent bookkeeping.
    pub fn new(bytes: &'a mut [u8], state: &'a mut ArenaState) -> Self {
        Self { bytes, state }
    }

    /// Total size of the arena.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes handed out since the last reset.
    #[must_use]
    pub fn used(&self) -> usize {
        self.state.used as usize
    }

    /// Bytes still available (ignoring alignment padding).
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity().saturating_sub(self.used())
    }

    /// Current reset generation.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.state.generation
    }

    /// Reserve `size` bytes aligned to `align` (a power of two).
    pub fn allocate(&mut self, size: usize, align: usize) -> Result<ArenaHandle> {
        if !align.is_power_of_two() {
            return Err(Error::InvalidLayout(format!(
                "alignment {align} is not a power of two"
            )));
        }

        let exhausted = || Error::ArenaExhausted {
            requested: size,
            remaining: self.remaining(),
        };

        let used = self.used();
        let addr = (self.bytes.as_ptr() as usize)
            .checked_add(used)
            .ok_or_else(exhausted)?;
        let padding = align_up(addr, align).ok_or_else(exhausted)? - addr;
        let requested = padding.checked_add(size).ok_or_else(exhausted)?;

        if requested > self.remaining() {
            return Err(Error::ArenaExhausted {
                requested,
                remaining: self.remaining(),
            });
        }

        // requested <= remaining, so neither sum can overflow
        let offset = used + padding;
        self.state.used = (offset + size) as u64;

        Ok(ArenaHandle {
            offset: offset as u64,
            len: size as u64,
            generation: self.state.generation,
            _pad: 0,
        })
    }

    /// Reserve room for `len` values of `T`.
    pub fn push_array<T: Pod>(&mut self, len: usize) -> Result<ArenaHandle> {
        let size = std::mem::size_of::<T>()
            .checked_mul(len)
            .ok_or_else(|| Error::InvalidLayout(format!("array of {len} overflows")))?;
        self.allocate(size, std::mem::align_of::<T>())
    }

    /// Reserve room for one `T`.
    pub fn push_struct<T: Pod>(&mut self) -> Result<ArenaHandle> {
        self.push_array::<T>(1)
    }

    fn check(&self, handle: ArenaHandle) -> Result<std::ops::Range<usize>> {
        if handle.generation != self.state.generation {
            return Err(Error::StaleHandle {
                handle: handle.generation,
                current: self.state.generation,
            });
        }
        let start = handle.offset();
        let Some(end) = start.checked_add(handle.len()) else {
            return Err(Error::OutOfBounds(format!(
                "handle at {start} with length {} overflows",
                handle.len()
            )));
        };
        if end > self.used().min(self.capacity()) {
            return Err(Error::OutOfBounds(format!(
                "handle {start}..{end} beyond used {}",
                self.used()
            )));
        }
        Ok(start..end)
    }

    /// Borrow the bytes of an allocation.
    pub fn get(&self, handle: ArenaHandle) -> Result<&[u8]> {
        let range = self.check(handle)?;
        Ok(&self.bytes[range])
    }

    /// Mutably borrow the bytes of an allocation.
    pub fn get_mut(&mut self, handle: ArenaHandle) -> Result<&mut [u8]> {
        let range = self.check(handle)?;
        Ok(&mut self.bytes[range])
    }

    /// Mutably borrow an allocation as a typed slice.
    pub fn get_slice_mut<T: Pod>(&mut self, handle: ArenaHandle) -> Result<&mut [T]> {
        let bytes = self.get_mut(handle)?;
        bytemuck::try_cast_slice_mut(bytes).map_err(|e| Error::InvalidLayout(e.to_string()))
    }

    /// Release every allocation at once. All outstanding handles become stale.
    pub fn reset(&mut self) {
        self.state.used = 0;
        self.state.generation = self.state.generation.wrapping_add(1);
    }

    /// Remember the current fill level.
    #[must_use]
    pub fn begin_temporary(&self) -> TemporaryMemory {
        TemporaryMemory {
            used: self.state.used,
            generation: self.state.generation,
        }
    }

    /// Roll the fill level back to `mark`.
    ///
    /// Ignored when the arena was reset since the mark was taken.
    pub fn end_temporary(&mut self, mark: TemporaryMemory) {
        if mark.generation == self.state.generation && mark.used <= self.state.used {
            self.state.used = mark.used;
        }
    }
}

/// The single memory block allocated by the host at startup.
///
/// The allocation is owned through one raw pointer, which is also the
/// `base` handed to the plugin, so host-side borrows and plugin writes all
/// derive from the same pointer.
pub struct HostMemory {
    base: NonNull<u8>,
    layout: Layout,
    /// ABI header handed to the plugin.
    header: Memory,
}

impl HostMemory {
    /// Allocate a zeroed block of `size` bytes with `state_size` bytes
    /// reserved for the plugin state.
    pub fn new(size: usize, state_size: usize) -> Result<Self> {
        let too_large = |what: &str, n: usize| Error::InvalidLayout(format!("{what} {n} too large"));
        let size = align_up(size, BLOCK_ALIGN).ok_or_else(|| too_large("block size", size))?;
        let state_size =
            align_up(state_size, BLOCK_ALIGN).ok_or_else(|| too_large("state size", state_size))?;
        if state_size > size {
            return Err(Error::InvalidLayout(format!(
                "state size {state_size} exceeds block size {size}"
            )));
        }

        let layout = Layout::from_size_align(size.max(BLOCK_ALIGN), BLOCK_ALIGN)
            .map_err(|e| Error::InvalidLayout(e.to_string()))?;
        // SAFETY: layout has a non-zero size
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(base) = NonNull::new(raw) else {
            return Err(Error::InvalidLayout(format!(
                "failed to allocate {size} bytes"
            )));
        };

        Ok(Self {
            base,
            layout,
            header: Memory {
                base: base.as_ptr(),
                size: size as u64,
                state_size: state_size as u64,
                arena: ArenaState::default(),
            },
        })
    }

    /// Total block size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.header.size as usize
    }

    /// Bytes reserved for the plugin state.
    #[must_use]
    pub const fn state_size(&self) -> usize {
        self.header.state_size as usize
    }

    /// Borrow the state bytes and the arena together.
    pub fn split(&mut self) -> (&mut [u8], MemoryArena<'_>) {
        let state_size = self.state_size();
        // SAFETY: base owns size zeroed bytes for the life of self, and the
        // &mut self receiver keeps any other borrow from coexisting
        let bytes = unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.size()) };
        let (state, arena) = bytes.split_at_mut(state_size);
        (state, MemoryArena::new(arena, &mut self.header.arena))
    }

    /// View the state region as a plain-old-data struct.
    pub fn state_mut<T: Pod>(&mut self) -> Result<&mut T> {
        let (state, _) = self.split();
        let size = std::mem::size_of::<T>();
        if size > state.len() {
            return Err(Error::InvalidLayout(format!(
                "state type needs {size} bytes, {} reserved",
                state.len()
            )));
        }
        bytemuck::try_from_bytes_mut(&mut state[..size])
            .map_err(|e| Error::InvalidLayout(e.to_string()))
    }

    /// Borrow the arena.
    pub fn arena(&mut self) -> MemoryArena<'_> {
        self.split().1
    }

    /// Pointer to the ABI header passed to `update_and_render`.
    ///
    /// Valid for as long as `self` is alive and not moved; the block itself
    /// never moves.
    pub fn as_abi_mut(&mut self) -> *mut Memory {
        self.header.base = self.base.as_ptr();
        std::ptr::addr_of_mut!(self.header)
    }

    /// Zero the whole block and reset the arena.
    pub fn clear(&mut self) {
        // SAFETY: base owns size writable bytes
        unsafe { std::ptr::write_bytes(self.base.as_ptr(), 0, self.size()) };
        self.header.arena = ArenaState::default();
    }
}

impl Drop for HostMemory {
    fn drop(&mut self) {
        // SAFETY: base was allocated with layout in new() and is freed once
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
    #[repr(C)]
    struct State {
        initialised: u32,
        frame: u32,
        total: u64,
    }

    #[test]
    fn state_and_arena_are_disjoint() {
        let mut memory = HostMemory::new(1024, 20).unwrap();
        assert_eq!(memory.state_size(), 24);

        memory.state_mut::<State>().unwrap().frame = 7;

        let (state, mut arena) = memory.split();
        assert_eq!(state.len(), 24);
        assert_eq!(arena.capacity(), 1000);
        let handle = arena.allocate(16, 8).unwrap();
        arena.get_mut(handle).unwrap().fill(0xAB);

        assert_eq!(memory.state_mut::<State>().unwrap().frame, 7);
    }

    #[test]
    fn state_larger_than_block_is_rejected() {
        assert!(matches!(
            HostMemory::new(16, 64),
            Err(Error::InvalidLayout(_))
        ));
    }

    #[test]
    fn arena_bumps_and_exhausts() {
        let mut memory = HostMemory::new(64, 0).unwrap();
        let mut arena = memory.arena();

        let a = arena.allocate(10, 1).unwrap();
        let b = arena.allocate(8, 8).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 16);
        assert_eq!(arena.used(), 24);

        let err = arena.allocate(64, 1).unwrap_err();
        assert!(matches!(err, Error::ArenaExhausted { .. }));
        assert_eq!(arena.used(), 24);
    }

    #[test]
    fn reset_invalidates_handles() {
        let mut memory = HostMemory::new(64, 0).unwrap();
        let mut arena = memory.arena();

        let handle = arena.push_array::<u32>(4).unwrap();
        arena.get_slice_mut::<u32>(handle).unwrap()[3] = 9;
        arena.reset();

        assert_eq!(arena.used(), 0);
        assert!(matches!(
            arena.get(handle),
            Err(Error::StaleHandle { .. })
        ));
    }

    #[test]
    fn arena_state_survives_reborrow() {
        let mut memory = HostMemory::new(128, 0).unwrap();
        let handle = memory.arena().push_struct::<u64>().unwrap();
        memory.arena().get_slice_mut::<u64>(handle).unwrap()[0] = 42;

        let arena = memory.arena();
        assert_eq!(arena.used(), 8);
        assert_eq!(arena.get(handle).unwrap(), &42u64.to_ne_bytes());
    }

    #[test]
    fn temporary_memory_rolls_back() {
        let mut memory = HostMemory::new(128, 0).unwrap();
        let mut arena = memory.arena();

        arena.allocate(8, 8).unwrap();
        let mark = arena.begin_temporary();
        arena.allocate(32, 8).unwrap();
        assert_eq!(arena.used(), 40);

        arena.end_temporary(mark);
        assert_eq!(arena.used(), 8);
    }

    #[test]
    fn oversized_allocation_is_exhaustion() {
        let mut memory = HostMemory::new(64, 0).unwrap();
        let mut arena = memory.arena();
        arena.allocate(4, 1).unwrap();

        assert!(matches!(
            arena.allocate(usize::MAX, 8),
            Err(Error::ArenaExhausted { .. })
        ));
        assert!(matches!(
            arena.allocate(8, 1 << (usize::BITS - 1)),
            Err(Error::ArenaExhausted { .. })
        ));
        assert_eq!(arena.used(), 4);
        assert!(arena.allocate(8, 8).is_ok());
    }

    #[test]
    fn forged_handle_is_rejected() {
        let mut memory = HostMemory::new(64, 0).unwrap();
        let mut arena = memory.arena();
        arena.allocate(16, 8).unwrap();

        // Leftover state bytes reinterpreted as a handle after a layout change
        let forged: ArenaHandle = bytemuck::cast([u64::MAX, 2, 0]);
        assert!(matches!(arena.get(forged), Err(Error::OutOfBounds(_))));
        let past_end: ArenaHandle = bytemuck::cast([8u64, 16, 0]);
        assert!(matches!(arena.get_mut(past_end), Err(Error::OutOfBounds(_))));
    }

    #[test]
    fn plugin_view_and_host_view_share_the_block() {
        let mut memory = HostMemory::new(128, 16).unwrap();
        memory.state_mut::<State>().unwrap().frame = 3;
        let handle = memory.arena().push_struct::<u64>().unwrap();

        let abi = memory.as_abi_mut();
        // SAFETY: abi points at the live header and no host borrow is active
        let (state, mut arena) = unsafe { (*abi).split() };
        bytemuck::cast_slice_mut::<u8, u32>(state)[1] = 9;
        arena.get_slice_mut::<u64>(handle).unwrap()[0] = 77;

        // Host borrows after the plugin wrote, then the plugin writes again
        assert_eq!(memory.state_mut::<State>().unwrap().frame, 9);
        let abi = memory.as_abi_mut();
        // SAFETY: as above
        let (state, _) = unsafe { (*abi).split() };
        bytemuck::cast_slice_mut::<u8, u32>(state)[1] = 11;
        assert_eq!(memory.state_mut::<State>().unwrap().frame, 11);
        let arena = memory.arena();
        assert_eq!(arena.get(handle).unwrap(), &77u64.to_ne_bytes());

        memory.clear();
        assert_eq!(memory.state_mut::<State>().unwrap().frame, 0);
        assert_eq!(memory.arena().used(), 0);
    }

    #[test]
    fn temporary_mark_ignored_after_reset() {
        let mut memory = HostMemory::new(128, 0).unwrap();
        let mut arena = memory.arena();

        arena.allocate(16, 8).unwrap();
        let mark = arena.begin_temporary();
        arena.reset();
        arena.allocate(4, 4).unwrap();

        arena.end_temporary(mark);
        assert_eq!(arena.used(), 4);
    }
}
