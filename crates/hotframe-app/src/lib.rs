//! Host runtime for hotframe plugins.
//!
//! This crate provides the host side of the plugin contract:
//! - Configuration (TOML plus builder methods)
//! - Logging setup
//! - The file and instrumentation services handed to the plugin
//! - The frame loop: poll for reload, call `update_and_render`, collate
//!
//! # Example
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use hotframe_app::{run_host, HostConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let running = AtomicBool::new(true);
//!     let config = HostConfig::new("hotframe_demo").with_max_frames(Some(600));
//!     let summary = run_host(config, &running)?;
//!     println!("{} frames", summary.frames);
//!     Ok(())
//! }
//! ```

mod config;
mod logging;
mod runner;
pub mod services;

pub use config::HostConfig;
pub use logging::init_logging;
pub use runner::{run_host, Host, RunSummary};
