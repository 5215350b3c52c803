//! Reload error types.

use std::path::PathBuf;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while loading plugin artifacts.
#[derive(Error, Debug)]
pub enum ReloadError {
    /// The artifact could not be opened (missing, partially written, ...).
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// The artifact does not export the entry point.
    #[error("Symbol `{symbol}` not found in {path}: {source}")]
    Resolve {
        symbol: String,
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// Neither artifact produced a usable entry point.
    #[error("No loadable entry point in {primary} or {toggle}")]
    NoEntryPoint { primary: PathBuf, toggle: PathBuf },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, ReloadError>;
