//! hotframe host.
//!
//! Loads a plugin exporting `update_and_render`, calls it once per frame and
//! swaps in a newer build whenever one appears next to it.
//!
//! ## Usage
//!
//! ```bash
//! cargo build -p hotframe-demo
//! cargo run -p hotframe-host -- --library-dir target/debug --library hotframe_demo
//! ```
//!
//! Rebuild the plugin while the host runs to see it reload. Connect
//! `hotframe-monitor` to watch the call-site statistics live.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hotframe_app::{run_host, HostConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a hot-reloadable hotframe plugin", long_about = None)]
struct Cli {
    /// TOML config file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the plugin artifacts
    #[arg(short = 'd', long)]
    library_dir: Option<PathBuf>,

    /// Library name without platform prefix/suffix
    #[arg(short, long)]
    library: Option<String>,

    /// Explicit primary artifact path
    #[arg(long)]
    primary: Option<PathBuf>,

    /// Explicit toggle artifact path (defaults to <primary>.toggle)
    #[arg(long, requires = "primary")]
    toggle: Option<PathBuf>,

    /// Directory plugin file reads are resolved against
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Target frames per second (0 for unlimited)
    #[arg(long)]
    fps: Option<u32>,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    frames: Option<u64>,

    /// Log the overlay every N frames (0 disables it)
    #[arg(long)]
    overlay_every: Option<u64>,

    /// Monitor port
    #[arg(short, long)]
    port: Option<u16>,

    /// Do not accept monitor connections
    #[arg(long)]
    no_ipc: bool,

    /// Default log filter when RUST_LOG is unset
    #[arg(long)]
    log: Option<String>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<HostConfig> {
        let mut config = match &self.config {
            Some(path) => HostConfig::from_file(path)?,
            None => HostConfig::default(),
        };

        if let Some(dir) = self.library_dir {
            config = config.with_library_dir(dir);
        }
        if let Some(name) = self.library {
            config.library_name = name;
        }
        if let Some(primary) = self.primary {
            config = config.with_artifacts(primary, self.toggle);
        }
        if let Some(dir) = self.data_dir {
            config = config.with_data_dir(dir);
        }
        if let Some(fps) = self.fps {
            config = config.with_target_fps((fps > 0).then_some(fps));
        }
        if self.frames.is_some() {
            config = config.with_max_frames(self.frames);
        }
        if let Some(interval) = self.overlay_every {
            config = config.with_overlay_interval(interval);
        }
        if let Some(port) = self.port {
            config.ipc_port = port;
        }
        if self.no_ipc {
            config.ipc_enabled = false;
        }
        if let Some(filter) = self.log {
            config = config.with_log_filter(filter);
        }

        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::Relaxed))
            .context("Failed to install Ctrl-C handler")?;
    }

    let summary = run_host(config, &running)?;
    tracing::info!(
        "Exited after {} frames ({} reloads)",
        summary.frames,
        summary.reloads
    );
    Ok(())
}
