//! Core types for hotframe.
//!
//! This crate provides the pieces shared by the host and hot-reloadable
//! plugins:
//! - The C ABI of the `update_and_render` entry point
//! - The host memory block and its bump arena
//! - Monotonic clock sources for timing blocks
//! - Common error types

pub mod abi;
pub mod clock;
pub mod error;
pub mod memory;

pub use abi::{
    DebugHooks, DigitalButton, FileContents, Input, IoFunctions, Memory, PluginBlock,
    ReadFileResult, Surface, UpdateAndRender, ENTRY_SYMBOL,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{Error, Result};
pub use memory::{ArenaHandle, ArenaState, HostMemory, MemoryArena, TemporaryMemory};

/// Host-wide constants
pub mod constants {
    /// Default size of the host memory block (64 MiB).
    pub const DEFAULT_MEMORY_SIZE: usize = 64 * 1024 * 1024;
    /// Default bytes reserved at the front of the block for plugin state.
    pub const DEFAULT_STATE_SIZE: usize = 4096;
    /// Suffix of the secondary artifact written while the primary is in use.
    pub const TOGGLE_SUFFIX: &str = "toggle";
}
