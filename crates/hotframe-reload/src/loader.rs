//! Dynamic library capabilities.

use std::path::Path;
use std::time::UNIX_EPOCH;

use hotframe_core::UpdateAndRender;
use libloading::Library;

use crate::error::{ReloadError, Result};

/// Opens artifacts and resolves the entry point in them.
pub trait LibraryLoader {
    /// An open library. Must stay alive while its entry point is in use.
    type Handle;

    /// Open the artifact at `path`.
    fn open(&mut self, path: &Path) -> Result<Self::Handle>;

    /// Look up `symbol` as an [`UpdateAndRender`] function.
    fn resolve(&mut self, handle: &Self::Handle, symbol: &str) -> Result<UpdateAndRender>;

    /// Release a library. Functions resolved from it must not be called
    /// afterwards.
    fn close(&mut self, handle: Self::Handle);
}

/// [`LibraryLoader`] backed by the platform dynamic loader.
#[derive(Debug, Default)]
pub struct DylibLoader;

/// A library opened by [`DylibLoader`].
#[derive(Debug)]
pub struct DylibHandle {
    library: Library,
    path: std::path::PathBuf,
}

impl LibraryLoader for DylibLoader {
    type Handle = DylibHandle;

    fn open(&mut self, path: &Path) -> Result<DylibHandle> {
        // SAFETY: Loading runs the artifact's initializers; plugin builds are
        // trusted code produced for this host.
        let library = unsafe { Library::new(path) }.map_err(|e| ReloadError::Open {
            path: path.to_owned(),
            source: Box::new(e),
        })?;

        Ok(DylibHandle {
            library,
            path: path.to_owned(),
        })
    }

    fn resolve(&mut self, handle: &DylibHandle, symbol: &str) -> Result<UpdateAndRender> {
        // SAFETY: The entry point is declared with the UpdateAndRender
        // signature on the plugin side.
        let entry = unsafe { handle.library.get::<UpdateAndRender>(symbol.as_bytes()) }
            .map_err(|e| ReloadError::Resolve {
                symbol: symbol.to_owned(),
                path: handle.path.clone(),
                source: Box::new(e),
            })?;
        Ok(*entry)
    }

    fn close(&mut self, handle: DylibHandle) {
        let path = handle.path;
        if let Err(e) = handle.library.close() {
            tracing::warn!("Failed to unload {}: {}", path.display(), e);
        }
    }
}

/// Modification times of artifacts.
pub trait ModTimeSource {
    /// Modification time of `path` in nanoseconds since the epoch, or 0 when
    /// the file does not exist.
    fn modified(&self, path: &Path) -> u64;
}

impl<M: ModTimeSource + ?Sized> ModTimeSource for &M {
    fn modified(&self, path: &Path) -> u64 {
        (**self).modified(path)
    }
}

/// [`ModTimeSource`] reading file metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsModTime;

impl ModTimeSource for FsModTime {
    fn modified(&self, path: &Path) -> u64 {
        std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |elapsed| {
                u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
            })
    }
}
