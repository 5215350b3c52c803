//! Instrumentation error types.

use thiserror::Error;

/// Errors raised by the instrumentation table and its IPC channel.
#[derive(Error, Debug)]
pub enum DebugError {
    /// More call sites were registered than the table was sized for.
    #[error("Call-site table full ({capacity} sites)")]
    CapacityExceeded {
        /// Fixed capacity of the table.
        capacity: usize,
    },

    /// I/O error on the IPC socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot encoding failed.
    #[error("Encoding error: {0}")]
    Encode(#[from] bincode::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, DebugError>;
