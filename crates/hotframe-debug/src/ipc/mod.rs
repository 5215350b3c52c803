//! Snapshot broadcast to remote monitors over TCP.

pub mod protocol;
pub mod server;

/// TCP port the host listens on for monitors.
pub const DEFAULT_PORT: u16 = 4343;
