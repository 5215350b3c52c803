//! Polling state machine that swaps the active entry point.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use hotframe_core::constants::TOGGLE_SUFFIX;
use hotframe_core::{UpdateAndRender, ENTRY_SYMBOL};

use crate::error::{ReloadError, Result};
use crate::loader::{DylibLoader, FsModTime, LibraryLoader, ModTimeSource};

/// The two artifacts a build alternates between.
///
/// A build writes the toggle artifact while the primary is loaded (and the
/// other way round), so a library is never overwritten while mapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub primary: PathBuf,
    pub toggle: PathBuf,
}

impl ArtifactPaths {
    /// Use `primary` and `primary` + `.toggle`.
    #[must_use]
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        let primary = primary.into();
        let mut toggle = OsString::from(primary.as_os_str());
        toggle.push(".");
        toggle.push(TOGGLE_SUFFIX);
        Self {
            primary,
            toggle: PathBuf::from(toggle),
        }
    }

    /// Platform file names of library `name` in `dir`, e.g.
    /// `dir/libdemo.so` and `dir/libdemo.so.toggle` on Linux.
    #[must_use]
    pub fn for_library(dir: impl AsRef<Path>, name: &str) -> Self {
        Self::new(dir.as_ref().join(libloading::library_filename(name)))
    }

    /// Explicit primary and toggle paths.
    #[must_use]
    pub fn with_toggle(primary: impl Into<PathBuf>, toggle: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            toggle: toggle.into(),
        }
    }
}

/// Result of one [`HotReloader::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// No artifact is newer than the active one.
    Unchanged,
    /// A newer artifact was loaded and is now active.
    Reloaded,
    /// The newer artifact could not be opened; retried next poll.
    OpenFailed,
    /// The newer artifact lacks the entry point; the old one stays active.
    ResolveFailed,
}

/// Whether an entry point is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloaderState {
    Unloaded,
    Loaded,
}

struct ActiveLibrary<H> {
    handle: H,
    entry: UpdateAndRender,
    path: PathBuf,
}

/// Watches the artifact pair and keeps the newest loadable one active.
pub struct HotReloader<L: LibraryLoader = DylibLoader, M: ModTimeSource = FsModTime> {
    loader: L,
    mtimes: M,
    paths: ArtifactPaths,
    primary_mtime: u64,
    toggle_mtime: u64,
    active_mtime: u64,
    active: Option<ActiveLibrary<L::Handle>>,
    reload_count: u32,
    /// Newest mtime whose entry point failed to resolve, to warn once.
    rejected_mtime: u64,
}

impl HotReloader {
    /// Reloader using the platform loader and file metadata.
    #[must_use]
    pub fn new(paths: ArtifactPaths) -> Self {
        Self::with_parts(paths, DylibLoader, FsModTime)
    }
}

impl<L: LibraryLoader, M: ModTimeSource> HotReloader<L, M> {
    /// Reloader with custom loading and timestamp sources.
    #[must_use]
    pub const fn with_parts(paths: ArtifactPaths, loader: L, mtimes: M) -> Self {
        Self {
            loader,
            mtimes,
            paths,
            primary_mtime: 0,
            toggle_mtime: 0,
            active_mtime: 0,
            active: None,
            reload_count: 0,
            rejected_mtime: 0,
        }
    }

    /// Poll once and require an active entry point afterwards.
    pub fn load_initial(&mut self) -> Result<UpdateAndRender> {
        self.poll();
        self.active().ok_or_else(|| ReloadError::NoEntryPoint {
            primary: self.paths.primary.clone(),
            toggle: self.paths.toggle.clone(),
        })
    }

    /// Check both artifacts and load the newer one if it is newer than the
    /// active one.
    ///
    /// Failures keep the previously active entry point.
    pub fn poll(&mut self) -> ReloadOutcome {
        self.primary_mtime = self.mtimes.modified(&self.paths.primary);
        self.toggle_mtime = self.mtimes.modified(&self.paths.toggle);

        let newest = self.primary_mtime.max(self.toggle_mtime);
        if newest <= self.active_mtime {
            return ReloadOutcome::Unchanged;
        }

        let path = if self.primary_mtime > self.toggle_mtime {
            &self.paths.primary
        } else {
            &self.paths.toggle
        }
        .clone();

        let handle = match self.loader.open(&path) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::debug!("Not loading yet: {}", e);
                return ReloadOutcome::OpenFailed;
            }
        };

        let entry = match self.loader.resolve(&handle, ENTRY_SYMBOL) {
            Ok(entry) => entry,
            Err(e) => {
                if self.rejected_mtime == newest {
                    tracing::debug!("{}", e);
                } else {
                    tracing::warn!("Keeping previous entry point: {}", e);
                    self.rejected_mtime = newest;
                }
                self.loader.close(handle);
                return ReloadOutcome::ResolveFailed;
            }
        };

        if let Some(previous) = self.active.take() {
            self.loader.close(previous.handle);
            self.reload_count += 1;
            tracing::info!("Reloaded {}", path.display());
        } else {
            tracing::info!("Loaded {}", path.display());
        }

        self.active = Some(ActiveLibrary {
            handle,
            entry,
            path,
        });
        self.active_mtime = newest;
        ReloadOutcome::Reloaded
    }

    /// The active entry point.
    #[must_use]
    pub fn active(&self) -> Option<UpdateAndRender> {
        self.active.as_ref().map(|active| active.entry)
    }

    /// Path of the active artifact.
    #[must_use]
    pub fn active_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|active| active.path.as_path())
    }

    /// Modification time of the active artifact (0 when unloaded).
    #[must_use]
    pub const fn active_mtime(&self) -> u64 {
        self.active_mtime
    }

    /// Modification times seen by the last poll, `(primary, toggle)`.
    #[must_use]
    pub const fn observed_mtimes(&self) -> (u64, u64) {
        (self.primary_mtime, self.toggle_mtime)
    }

    /// Successful swaps after the first load.
    #[must_use]
    pub const fn reload_count(&self) -> u32 {
        self.reload_count
    }

    /// Whether an entry point is active.
    #[must_use]
    pub const fn state(&self) -> ReloaderState {
        if self.active.is_some() {
            ReloaderState::Loaded
        } else {
            ReloaderState::Unloaded
        }
    }

    /// The watched artifacts.
    #[must_use]
    pub const fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// The library loader.
    #[must_use]
    pub const fn loader(&self) -> &L {
        &self.loader
    }

    /// Release the active library.
    ///
    /// The next successful poll loads again from scratch.
    pub fn shutdown(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::info!("Unloading {}", active.path.display());
            self.loader.close(active.handle);
        }
        self.active_mtime = 0;
    }
}

impl<L: LibraryLoader, M: ModTimeSource> Drop for HotReloader<L, M> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::io;

    use hotframe_core::{Input, IoFunctions, Memory, Surface};

    unsafe extern "C" fn entry_a(
        _: *mut Surface,
        _: *const Input,
        _: *mut Memory,
        _: *const IoFunctions,
    ) {
    }

    unsafe extern "C" fn entry_b(
        _: *mut Surface,
        _: *const Input,
        _: *mut Memory,
        _: *const IoFunctions,
    ) {
    }

    const ENTRY_A: UpdateAndRender = entry_a;
    const ENTRY_B: UpdateAndRender = entry_b;

    fn addr(f: UpdateAndRender) -> usize {
        f as usize
    }

    #[derive(Default)]
    struct FakeFs {
        mtimes: RefCell<HashMap<PathBuf, u64>>,
    }

    impl FakeFs {
        fn touch(&self, path: &Path, mtime: u64) {
            self.mtimes.borrow_mut().insert(path.to_owned(), mtime);
        }
    }

    impl ModTimeSource for FakeFs {
        fn modified(&self, path: &Path) -> u64 {
            self.mtimes.borrow().get(path).copied().unwrap_or(0)
        }
    }

    /// Loader whose artifacts are looked up in a table of path -> entry.
    #[derive(Default)]
    struct FakeLoader {
        /// `None` means the artifact opens but lacks the entry point.
        artifacts: HashMap<PathBuf, Option<UpdateAndRender>>,
        next_handle: u32,
        open: Vec<u32>,
        closed: Vec<u32>,
    }

    impl LibraryLoader for FakeLoader {
        type Handle = (u32, PathBuf);

        fn open(&mut self, path: &Path) -> Result<Self::Handle> {
            if !self.artifacts.contains_key(path) {
                return Err(ReloadError::Open {
                    path: path.to_owned(),
                    source: Box::new(io::Error::from(io::ErrorKind::NotFound)),
                });
            }
            self.next_handle += 1;
            self.open.push(self.next_handle);
            Ok((self.next_handle, path.to_owned()))
        }

        fn resolve(&mut self, handle: &Self::Handle, symbol: &str) -> Result<UpdateAndRender> {
            self.artifacts
                .get(&handle.1)
                .copied()
                .flatten()
                .ok_or_else(|| ReloadError::Resolve {
                    symbol: symbol.to_owned(),
                    path: handle.1.clone(),
                    source: Box::new(io::Error::from(io::ErrorKind::InvalidData)),
                })
        }

        fn close(&mut self, handle: Self::Handle) {
            self.open.retain(|&h| h != handle.0);
            self.closed.push(handle.0);
        }
    }

    fn paths() -> ArtifactPaths {
        ArtifactPaths::new("/build/libgame.so")
    }

    fn loader_with(entries: &[(&Path, Option<UpdateAndRender>)]) -> FakeLoader {
        FakeLoader {
            artifacts: entries
                .iter()
                .map(|(path, entry)| (path.to_path_buf(), *entry))
                .collect(),
            ..FakeLoader::default()
        }
    }

    #[test]
    fn toggle_path_appends_suffix() {
        let paths = paths();
        assert_eq!(paths.toggle, PathBuf::from("/build/libgame.so.toggle"));

        let lib = ArtifactPaths::for_library("/build", "game");
        assert!(lib.primary.starts_with("/build"));
        assert!(lib.toggle.to_string_lossy().ends_with(".toggle"));
    }

    #[test]
    fn loads_newest_artifact() {
        let fs = FakeFs::default();
        let p = paths();
        fs.touch(p.primary.as_path(), 10);
        fs.touch(p.toggle.as_path(), 20);
        let loader = loader_with(&[
            (p.primary.as_path(), Some(ENTRY_A)),
            (p.toggle.as_path(), Some(ENTRY_B)),
        ]);
        let mut reloader = HotReloader::with_parts(p.clone(), loader, &fs);

        assert_eq!(reloader.poll(), ReloadOutcome::Reloaded);
        assert_eq!(reloader.active_mtime(), 20);
        assert_eq!(reloader.active_path(), Some(p.toggle.as_path()));
        assert_eq!(addr(reloader.active().unwrap()), addr(ENTRY_B));
        assert_eq!(reloader.poll(), ReloadOutcome::Unchanged);
    }

    #[test]
    fn alternates_between_primary_and_toggle() {
        let fs = FakeFs::default();
        let p = paths();
        fs.touch(p.primary.as_path(), 100);
        fs.touch(p.toggle.as_path(), 50);
        let loader = loader_with(&[
            (p.primary.as_path(), Some(ENTRY_A)),
            (p.toggle.as_path(), Some(ENTRY_B)),
        ]);
        let mut reloader = HotReloader::with_parts(p.clone(), loader, &fs);

        assert_eq!(reloader.poll(), ReloadOutcome::Reloaded);
        assert_eq!(reloader.active_path(), Some(p.primary.as_path()));
        assert_eq!(reloader.active_mtime(), 100);

        fs.touch(p.toggle.as_path(), 150);
        assert_eq!(reloader.poll(), ReloadOutcome::Reloaded);
        assert_eq!(reloader.active_path(), Some(p.toggle.as_path()));
        assert_eq!(reloader.active_mtime(), 150);
        assert_eq!(reloader.reload_count(), 1);
        // Previous library released only after the swap
        assert_eq!(reloader.loader().closed, vec![1]);
        assert_eq!(reloader.loader().open, vec![2]);
    }

    #[test]
    fn equal_mtimes_pick_toggle() {
        let fs = FakeFs::default();
        let p = paths();
        fs.touch(p.primary.as_path(), 7);
        fs.touch(p.toggle.as_path(), 7);
        let loader = loader_with(&[
            (p.primary.as_path(), Some(ENTRY_A)),
            (p.toggle.as_path(), Some(ENTRY_B)),
        ]);
        let mut reloader = HotReloader::with_parts(p.clone(), loader, &fs);

        assert_eq!(reloader.poll(), ReloadOutcome::Reloaded);
        assert_eq!(reloader.active_path(), Some(p.toggle.as_path()));
    }

    #[test]
    fn missing_symbol_keeps_previous_entry() {
        let fs = FakeFs::default();
        let p = paths();
        fs.touch(p.primary.as_path(), 10);
        let loader = loader_with(&[
            (p.primary.as_path(), Some(ENTRY_A)),
            (p.toggle.as_path(), None),
        ]);
        let mut reloader = HotReloader::with_parts(p.clone(), loader, &fs);
        assert_eq!(reloader.poll(), ReloadOutcome::Reloaded);
        let before = reloader.active().unwrap();

        fs.touch(p.toggle.as_path(), 20);
        assert_eq!(reloader.poll(), ReloadOutcome::ResolveFailed);
        assert_eq!(addr(reloader.active().unwrap()), addr(before));
        assert_eq!(reloader.active_mtime(), 10);
        assert_eq!(reloader.active_path(), Some(p.primary.as_path()));
        // New handle released, old one still open
        assert_eq!(reloader.loader().closed, vec![2]);
        assert_eq!(reloader.loader().open, vec![1]);

        // Retried on the next poll
        assert_eq!(reloader.poll(), ReloadOutcome::ResolveFailed);
        assert_eq!(reloader.loader().closed, vec![2, 3]);
    }

    #[test]
    fn open_failure_retries_next_poll() {
        let fs = FakeFs::default();
        let p = paths();
        fs.touch(p.primary.as_path(), 10);
        let mut reloader = HotReloader::with_parts(p.clone(), FakeLoader::default(), &fs);

        assert_eq!(reloader.poll(), ReloadOutcome::OpenFailed);
        assert_eq!(reloader.state(), ReloaderState::Unloaded);
        assert_eq!(reloader.poll(), ReloadOutcome::OpenFailed);
    }

    #[test]
    fn rewritten_identical_artifact_reloads() {
        let fs = FakeFs::default();
        let p = paths();
        fs.touch(p.primary.as_path(), 10);
        let loader = loader_with(&[
            (p.primary.as_path(), Some(ENTRY_A)),
            (p.toggle.as_path(), Some(ENTRY_A)),
        ]);
        let mut reloader = HotReloader::with_parts(p.clone(), loader, &fs);

        assert_eq!(reloader.poll(), ReloadOutcome::Reloaded);
        assert!(reloader.active().is_some());

        fs.touch(p.primary.as_path(), 11);
        assert_eq!(reloader.poll(), ReloadOutcome::Reloaded);
        assert!(reloader.active().is_some());
        assert_eq!(reloader.active_mtime(), 11);
    }

    #[test]
    fn load_initial_requires_entry_point() {
        let fs = FakeFs::default();
        let mut reloader = HotReloader::with_parts(paths(), FakeLoader::default(), &fs);

        let err = reloader.load_initial().unwrap_err();
        assert!(matches!(err, ReloadError::NoEntryPoint { .. }));
        assert_eq!(reloader.observed_mtimes(), (0, 0));
    }

    #[test]
    fn shutdown_releases_library() {
        let fs = FakeFs::default();
        let p = paths();
        fs.touch(p.primary.as_path(), 10);
        let loader = loader_with(&[(p.primary.as_path(), Some(ENTRY_A))]);
        let mut reloader = HotReloader::with_parts(p, loader, &fs);

        assert!(reloader.load_initial().is_ok());
        reloader.shutdown();
        assert_eq!(reloader.state(), ReloaderState::Unloaded);
        assert!(reloader.loader().open.is_empty());
        assert_eq!(reloader.loader().closed, vec![1]);
    }
}
