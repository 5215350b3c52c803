//! Host configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use hotframe_core::constants::{DEFAULT_MEMORY_SIZE, DEFAULT_STATE_SIZE};
use hotframe_debug::{DEFAULT_CAPACITY, DEFAULT_PORT};
use hotframe_reload::ArtifactPaths;
use serde::Deserialize;

/// Host configuration.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Directory holding the plugin artifacts.
    pub library_dir: PathBuf,
    /// Library name without platform prefix/suffix (`demo` -> `libdemo.so`).
    pub library_name: String,
    /// Explicit primary artifact, overriding `library_dir`/`library_name`.
    pub primary_path: Option<PathBuf>,
    /// Explicit toggle artifact; defaults to the primary plus `.toggle`.
    pub toggle_path: Option<PathBuf>,
    /// Directory plugin file reads are resolved against.
    pub data_dir: PathBuf,
    /// Size of the host memory block in bytes.
    pub memory_size: usize,
    /// Bytes at the front of the block reserved for plugin state.
    pub state_size: usize,
    /// Call-site capacity of the instrumentation table.
    pub call_site_capacity: usize,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Stop after this many frames (None runs until interrupted).
    pub max_frames: Option<u64>,
    /// Surface width in pixels.
    pub width: u32,
    /// Surface height in pixels.
    pub height: u32,
    /// Log the overlay every this many frames (0 disables it).
    pub overlay_interval: u64,
    /// Broadcast snapshots to monitors.
    pub ipc_enabled: bool,
    /// Monitor port.
    pub ipc_port: u16,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            library_dir: PathBuf::from("target/debug"),
            library_name: "hotframe_demo".to_string(),
            primary_path: None,
            toggle_path: None,
            data_dir: PathBuf::from("."),
            memory_size: DEFAULT_MEMORY_SIZE,
            state_size: DEFAULT_STATE_SIZE,
            call_site_capacity: DEFAULT_CAPACITY,
            target_fps: Some(60),
            max_frames: None,
            width: 320,
            height: 180,
            overlay_interval: 120,
            ipc_enabled: true,
            ipc_port: DEFAULT_PORT,
            log_filter: "info".to_string(),
        }
    }
}

impl HostConfig {
    /// Create a config for library `name`.
    pub fn new(library_name: impl Into<String>) -> Self {
        Self {
            library_name: library_name.into(),
            ..Default::default()
        }
    }

    /// Load a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Parse TOML text.
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Set the artifact directory.
    #[must_use]
    pub fn with_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_dir = dir.into();
        self
    }

    /// Use explicit artifact paths.
    #[must_use]
    pub fn with_artifacts(mut self, primary: impl Into<PathBuf>, toggle: Option<PathBuf>) -> Self {
        self.primary_path = Some(primary.into());
        self.toggle_path = toggle;
        self
    }

    /// Set the directory plugin reads are resolved against.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the memory block layout.
    #[must_use]
    pub const fn with_memory(mut self, memory_size: usize, state_size: usize) -> Self {
        self.memory_size = memory_size;
        self.state_size = state_size;
        self
    }

    /// Set the call-site capacity.
    #[must_use]
    pub const fn with_call_site_capacity(mut self, capacity: usize) -> Self {
        self.call_site_capacity = capacity;
        self
    }

    /// Set the target FPS (None for unlimited).
    #[must_use]
    pub const fn with_target_fps(mut self, fps: Option<u32>) -> Self {
        self.target_fps = fps;
        self
    }

    /// Stop after `frames` frames.
    #[must_use]
    pub const fn with_max_frames(mut self, frames: Option<u64>) -> Self {
        self.max_frames = frames;
        self
    }

    /// Set the surface dimensions.
    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the overlay interval in frames.
    #[must_use]
    pub const fn with_overlay_interval(mut self, frames: u64) -> Self {
        self.overlay_interval = frames;
        self
    }

    /// Enable or disable IPC on `port`.
    #[must_use]
    pub const fn with_ipc(mut self, enabled: bool, port: u16) -> Self {
        self.ipc_enabled = enabled;
        self.ipc_port = port;
        self
    }

    /// Set the default log filter.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// The artifact pair to watch.
    #[must_use]
    pub fn artifact_paths(&self) -> ArtifactPaths {
        match (&self.primary_path, &self.toggle_path) {
            (Some(primary), Some(toggle)) => ArtifactPaths::with_toggle(primary, toggle),
            (Some(primary), None) => ArtifactPaths::new(primary),
            _ => ArtifactPaths::for_library(&self.library_dir, &self.library_name),
        }
    }

    /// Seconds per frame at the target rate.
    #[must_use]
    pub fn frame_dt(&self) -> f32 {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map_or(1.0 / 60.0, |fps| 1.0 / fps as f32)
    }
}
