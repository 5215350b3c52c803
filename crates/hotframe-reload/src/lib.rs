//! Hot reloading of the plugin entry point.
//!
//! A [`HotReloader`] watches a primary artifact and its `.toggle` sibling and,
//! once per frame, loads whichever is newer than the active library. Failed
//! loads keep the previous entry point and are retried on the next poll.
//!
//! ```ignore
//! let mut reloader = HotReloader::new(ArtifactPaths::for_library("target/debug", "demo"));
//! reloader.load_initial()?;
//! loop {
//!     reloader.poll();
//!     if let Some(entry) = reloader.active() {
//!         // Never keep `entry` across polls: a reload unmaps the old library.
//!         unsafe { entry(surface, input, memory, io) };
//!     }
//! }
//! ```

pub mod error;
pub mod loader;
pub mod reloader;

pub use error::{ReloadError, Result};
pub use loader::{DylibHandle, DylibLoader, FsModTime, LibraryLoader, ModTimeSource};
pub use reloader::{ArtifactPaths, HotReloader, ReloadOutcome, ReloaderState};
