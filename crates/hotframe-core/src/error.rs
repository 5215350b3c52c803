//! Error types shared by the host and plugins.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Arena has no room for the requested allocation
    #[error("Arena exhausted: requested {requested} bytes, {remaining} remaining")]
    ArenaExhausted {
        /// Bytes requested (including alignment padding).
        requested: usize,
        /// Bytes left in the arena.
        remaining: usize,
    },

    /// Handle was issued before the arena was reset
    #[error("Stale arena handle (generation {handle}, arena at {current})")]
    StaleHandle {
        /// Generation stored in the handle.
        handle: u32,
        /// Current arena generation.
        current: u32,
    },

    /// Memory block layout is invalid
    #[error("Invalid memory layout: {0}")]
    InvalidLayout(String),

    /// Out of bounds access
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
