//! Services handed to the plugin through [`IoFunctions`].

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use hotframe_core::{DebugHooks, IoFunctions, ReadFileResult};
use hotframe_debug::InstrumentationTable;

/// File access rooted at the data directory.
#[derive(Debug, Clone)]
pub struct FileAccess {
    root: PathBuf,
}

impl FileAccess {
    /// Resolve plugin paths against `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory relative paths are resolved against.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, path: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.root.join(path))
    }
}

/// Build the IO table for one `update_and_render` call.
///
/// The returned value borrows `files` and `table` through raw pointers; it
/// must not be used after either is dropped or moved.
#[must_use]
pub fn io_functions(files: &FileAccess, table: &InstrumentationTable) -> IoFunctions {
    IoFunctions {
        host: std::ptr::from_ref(files).cast_mut().cast(),
        read_entire_file,
        free_file_result,
        debug: DebugHooks {
            table: std::ptr::from_ref(table).cast(),
            register_call_site,
            begin_block,
            end_block,
            frame_marker,
        },
    }
}

/// Rebuild a `&str` from a plugin-provided pointer and length.
///
/// # Safety
/// `ptr` must point to `len` readable bytes.
unsafe fn str_from_raw<'a>(ptr: *const u8, len: usize) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: Caller guarantees ptr points to len bytes
    let bytes = unsafe { std::slice::from_raw_parts(ptr, len) };
    std::str::from_utf8(bytes).ok()
}

/// # Safety
/// `table` must come from [`io_functions`] and its table must still be alive.
unsafe fn table_from_raw<'a>(table: *const c_void) -> &'a InstrumentationTable {
    // SAFETY: Caller guarantees the pointer was built from a live table
    unsafe { &*table.cast::<InstrumentationTable>() }
}

unsafe extern "C" fn read_entire_file(
    host: *mut c_void,
    path: *const u8,
    path_len: usize,
) -> ReadFileResult {
    // SAFETY: host was built from a live FileAccess by io_functions
    let files = unsafe { &*host.cast::<FileAccess>() };
    // SAFETY: The plugin passes a pointer/length pair from a &str
    let Some(path) = (unsafe { str_from_raw(path, path_len) }) else {
        return ReadFileResult::empty();
    };

    match files.read(path) {
        Ok(data) => {
            let data = data.into_boxed_slice();
            let size = data.len() as u64;
            ReadFileResult {
                size,
                data: Box::into_raw(data).cast(),
            }
        }
        Err(e) => {
            tracing::warn!("Plugin read of {} failed: {}", path, e);
            ReadFileResult::empty()
        }
    }
}

unsafe extern "C" fn free_file_result(_host: *mut c_void, result: *mut ReadFileResult) {
    if result.is_null() {
        return;
    }
    // SAFETY: result points to a ReadFileResult owned by the plugin
    let result = unsafe { &mut *result };
    if !result.data.is_null() {
        let slice = std::ptr::slice_from_raw_parts_mut(result.data, result.size as usize);
        // SAFETY: data/size came from Box::into_raw in read_entire_file
        drop(unsafe { Box::from_raw(slice) });
    }
    *result = ReadFileResult::empty();
}

unsafe extern "C" fn register_call_site(
    table: *const c_void,
    file: *const u8,
    file_len: usize,
    function: *const u8,
    function_len: usize,
    line: u32,
) -> i32 {
    // SAFETY: table was built from a live table by io_functions
    let table = unsafe { table_from_raw(table) };
    // SAFETY: The plugin passes pointer/length pairs from &str
    let (Some(file), Some(function)) = (unsafe { str_from_raw(file, file_len) }, unsafe {
        str_from_raw(function, function_len)
    }) else {
        return -1;
    };

    match table.register_parts(file, function, line) {
        Ok(id) => i32::from(id.0),
        Err(e) => {
            tracing::warn!("Cannot register {}({}): {}", function, line, e);
            -1
        }
    }
}

unsafe extern "C" fn begin_block(table: *const c_void, site: u16) -> u64 {
    // SAFETY: table was built from a live table by io_functions
    let table = unsafe { table_from_raw(table) };
    table.begin_raw(hotframe_debug::CallSiteId(site))
}

unsafe extern "C" fn end_block(table: *const c_void, site: u16, start: u64, hits: u32) {
    // SAFETY: table was built from a live table by io_functions
    let table = unsafe { table_from_raw(table) };
    // Panicking here would unwind into the plugin
    if usize::from(site) >= table.len() {
        tracing::warn!("Plugin closed unregistered call site {}", site);
        return;
    }
    table.end_raw(hotframe_debug::CallSiteId(site), start, hits);
}

unsafe extern "C" fn frame_marker(table: *const c_void) {
    // SAFETY: table was built from a live table by io_functions
    let table = unsafe { table_from_raw(table) };
    table.frame_marker();
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotframe_debug::CallSiteId;

    #[test]
    fn plugin_blocks_reach_the_table() {
        let files = FileAccess::new(".");
        let table = InstrumentationTable::new(4);
        let io = io_functions(&files, &table);

        let site = io.debug.register("plugin.rs", "simulate", 12).unwrap();
        assert_eq!(io.debug.register("plugin.rs", "simulate", 12), Some(site));
        {
            let mut block = io.debug.begin(site);
            block.set_hits(4);
        }

        let record = table.record(CallSiteId(site)).unwrap();
        assert_eq!(record.function_name, "simulate");
        assert_eq!(record.hit_count, 4);
    }

    #[test]
    fn registration_beyond_capacity_is_refused() {
        let files = FileAccess::new(".");
        let table = InstrumentationTable::new(1);
        let io = io_functions(&files, &table);

        assert!(io.debug.register("a.rs", "a", 1).is_some());
        assert!(io.debug.register("a.rs", "a", 2).is_none());
        assert!(io.debug.block("a.rs", "a", 3).is_none());
    }

    #[test]
    fn unregistered_end_is_ignored() {
        let files = FileAccess::new(".");
        let table = InstrumentationTable::new(4);
        let io = io_functions(&files, &table);

        // SAFETY: table pointer is live
        unsafe { (io.debug.end_block)(io.debug.table, 3, 0, 1) };
        assert!(table.is_empty());
    }

    #[test]
    fn reads_and_frees_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("level.txt"), b"hello plugin").unwrap();
        let files = FileAccess::new(dir.path());
        let table = InstrumentationTable::new(4);
        let io = io_functions(&files, &table);

        let contents = io.read_entire_file("level.txt").unwrap();
        assert_eq!(contents.as_bytes(), b"hello plugin");
        drop(contents);

        assert!(io.read_entire_file("missing.txt").is_none());
    }

    #[test]
    fn frame_marker_hook_records_event() {
        let files = FileAccess::new(".");
        let table = InstrumentationTable::new(4);
        let io = io_functions(&files, &table);

        io.debug.frame_marker();
        assert_eq!(table.events().len(), 1);
    }
}
