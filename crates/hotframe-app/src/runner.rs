//! Host runner and frame loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use hotframe_core::{HostMemory, Input, Surface};
use hotframe_debug::{DebugContext, InstrumentationTable, ReloadInfo, TracingSink};
use hotframe_reload::{
    DylibLoader, FsModTime, HotReloader, LibraryLoader, ModTimeSource, ReloadOutcome,
};
use tracing::info;

#[cfg(feature = "profiling")]
use hotframe_debug::timed_block;

use crate::config::HostConfig;
use crate::logging::init_logging;
use crate::services::{io_functions, FileAccess};

/// FPS statistics of a finished run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub reloads: u32,
    pub min_fps: f64,
    pub max_fps: f64,
    pub avg_fps: f64,
}

#[derive(Debug)]
struct FrameStats {
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
    samples: u64,
}

impl FrameStats {
    const fn new() -> Self {
        Self {
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
            samples: 0,
        }
    }

    fn record(&mut self, dt: f32) -> f32 {
        if dt <= 0.0 {
            return 0.0;
        }
        let fps = 1.0 / f64::from(dt);
        self.min_fps = self.min_fps.min(fps);
        self.max_fps = self.max_fps.max(fps);
        self.fps_sum += fps;
        self.samples += 1;
        fps as f32
    }

    fn average(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.fps_sum / self.samples as f64
        }
    }
}

/// Everything the host owns: memory block, loader, instrumentation.
///
/// The plugin sees these only through the parameters of each
/// `update_and_render` call.
pub struct Host<L: LibraryLoader = DylibLoader, M: ModTimeSource = FsModTime> {
    config: HostConfig,
    reloader: HotReloader<L, M>,
    debug: DebugContext,
    memory: HostMemory,
    pixels: Vec<u32>,
    input: Input,
    files: FileAccess,
    stats: FrameStats,
    last_frame: Instant,
    target_frame_time: Option<Duration>,
}

impl Host {
    /// Create a host loading plugins from the configured artifacts.
    pub fn new(config: HostConfig) -> anyhow::Result<Self> {
        let reloader = HotReloader::new(config.artifact_paths());
        Self::with_reloader(config, reloader)
    }
}

impl<L: LibraryLoader, M: ModTimeSource> Host<L, M> {
    /// Create a host around an existing reloader.
    pub fn with_reloader(config: HostConfig, reloader: HotReloader<L, M>) -> anyhow::Result<Self> {
        let memory = HostMemory::new(config.memory_size, config.state_size)
            .context("Failed to allocate host memory")?;
        info!(
            "Host memory: {} bytes ({} state)",
            memory.size(),
            memory.state_size()
        );

        let mut debug = DebugContext::new(InstrumentationTable::new(config.call_site_capacity));
        if config.ipc_enabled {
            debug.start_server(config.ipc_port);
        }

        let pixel_count = config.width as usize * config.height as usize;
        let target_frame_time = config
            .target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)));

        Ok(Self {
            files: FileAccess::new(&config.data_dir),
            reloader,
            debug,
            memory,
            pixels: vec![0; pixel_count],
            input: Input::default(),
            stats: FrameStats::new(),
            last_frame: Instant::now(),
            target_frame_time,
            config,
        })
    }

    /// Load the plugin for the first frame.
    ///
    /// Having nothing to run at startup is fatal.
    pub fn load(&mut self) -> anyhow::Result<()> {
        self.reloader
            .load_initial()
            .context("No plugin to run")?;
        Ok(())
    }

    /// Run one frame: poll for a newer plugin, call it, collate.
    pub fn step(&mut self) -> ReloadOutcome {
        let frame_start = Instant::now();
        let dt = frame_start.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = frame_start;
        let fps = self.stats.record(dt);

        self.input.update_dt = self.config.frame_dt();
        self.input.mouse_left.update(false);
        self.input.mouse_right.update(false);
        self.input.mouse_middle.update(false);

        let outcome = {
            let table = self.debug.table();
            #[cfg(feature = "profiling")]
            timed_block!(*table, "host_frame");

            let outcome = {
                #[cfg(feature = "profiling")]
                timed_block!(*table, "poll_reload");
                self.reloader.poll()
            };

            if let Some(entry) = self.reloader.active() {
                #[cfg(feature = "profiling")]
                timed_block!(*table, "update_and_render");

                let io = io_functions(&self.files, table);
                let mut surface = Surface {
                    width: self.config.width,
                    height: self.config.height,
                    pixels: self.pixels.as_mut_ptr(),
                };
                // SAFETY: entry was resolved from the library the reloader
                // keeps open; every pointer refers to host-owned data that
                // outlives the call.
                unsafe { entry(&mut surface, &self.input, self.memory.as_abi_mut(), &io) };
            }

            outcome
        };

        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        let reload = ReloadInfo {
            reload_count: self.reloader.reload_count(),
            active_library: self
                .reloader
                .active_path()
                .map(|path| path.display().to_string()),
        };
        self.debug.end_frame(dt * 1000.0, fps, &reload);

        let interval = self.config.overlay_interval;
        if interval > 0 && self.debug.frame_number() % interval == 0 {
            self.debug.render_overlay(&mut TracingSink);
        }

        outcome
    }

    /// Step until `running` is cleared or `max_frames` is reached.
    pub fn run(&mut self, running: &AtomicBool) -> RunSummary {
        while running.load(Ordering::Relaxed) {
            if self
                .config
                .max_frames
                .is_some_and(|max| self.debug.frame_number() >= max)
            {
                break;
            }
            self.step();
        }

        self.cleanup()
    }

    /// Debug context (table, history, timelines).
    #[must_use]
    pub const fn debug(&self) -> &DebugContext {
        &self.debug
    }

    /// The reloader.
    #[must_use]
    pub const fn reloader(&self) -> &HotReloader<L, M> {
        &self.reloader
    }

    /// Host memory block.
    pub fn memory_mut(&mut self) -> &mut HostMemory {
        &mut self.memory
    }

    /// Pixels of the last frame.
    #[must_use]
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Log FPS statistics and release the IPC server and the plugin.
    pub fn cleanup(&mut self) -> RunSummary {
        let summary = RunSummary {
            frames: self.debug.frame_number(),
            reloads: self.reloader.reload_count(),
            min_fps: if self.stats.samples == 0 {
                0.0
            } else {
                self.stats.min_fps
            },
            max_fps: self.stats.max_fps,
            avg_fps: self.stats.average(),
        };

        if summary.frames > 0 {
            info!("FPS Statistics:");
            info!("  Min: {:.1}", summary.min_fps);
            info!("  Max: {:.1}", summary.max_fps);
            info!("  Avg: {:.1}", summary.avg_fps);
            info!("  Total frames: {}", summary.frames);
            info!("  Reloads: {}", summary.reloads);
        }

        info!("Starting cleanup...");
        self.debug.shutdown();
        self.reloader.shutdown();
        info!("Cleanup complete");

        summary
    }
}

/// Initialize logging, load the plugin and run until `running` is cleared.
pub fn run_host(config: HostConfig, running: &AtomicBool) -> anyhow::Result<RunSummary> {
    init_logging(&config.log_filter);

    let paths = config.artifact_paths();
    info!("hotframe host starting...");
    info!("Watching {} and {}", paths.primary.display(), paths.toggle.display());

    let mut host = Host::new(config)?;
    host.load()?;
    Ok(host.run(running))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use hotframe_core::{IoFunctions, Memory, UpdateAndRender};
    use hotframe_reload::{ArtifactPaths, ReloadError};

    unsafe extern "C" fn counting_entry(
        surface: *mut Surface,
        _input: *const Input,
        memory: *mut Memory,
        io: *const IoFunctions,
    ) {
        // SAFETY: The host passes valid pointers for the duration of the call
        let (surface, memory, io) = unsafe { (&mut *surface, &mut *memory, &*io) };
        let _block = io.debug.block(file!(), "counting_entry", line!());

        // SAFETY: The host's block backs memory
        let (state, _arena) = unsafe { memory.split() };
        state[0] = state[0].wrapping_add(1);

        // SAFETY: The host's pixel buffer backs the surface
        if let Some(pixel) = unsafe { surface.pixels_mut() }.first_mut() {
            *pixel = 0x00ff_00ff;
        }
    }

    const COUNTING: UpdateAndRender = counting_entry;

    /// Every path resolves to the same entry point.
    struct StaticLoader(Option<UpdateAndRender>);

    impl LibraryLoader for StaticLoader {
        type Handle = ();

        fn open(&mut self, _path: &Path) -> hotframe_reload::Result<()> {
            Ok(())
        }

        fn resolve(&mut self, _: &(), symbol: &str) -> hotframe_reload::Result<UpdateAndRender> {
            self.0.ok_or_else(|| ReloadError::Resolve {
                symbol: symbol.to_owned(),
                path: "static".into(),
                source: "missing".into(),
            })
        }

        fn close(&mut self, (): ()) {}
    }

    /// Primary artifact at a fixed mtime, toggle missing.
    struct FixedMtime(u64);

    impl ModTimeSource for FixedMtime {
        fn modified(&self, path: &Path) -> u64 {
            if path.to_string_lossy().ends_with(".toggle") {
                0
            } else {
                self.0
            }
        }
    }

    fn config() -> HostConfig {
        HostConfig::new("test")
            .with_memory(4096, 64)
            .with_size(4, 2)
            .with_target_fps(None)
            .with_ipc(false, 0)
            .with_overlay_interval(0)
    }

    fn host(entry: Option<UpdateAndRender>, mtime: u64) -> Host<StaticLoader, FixedMtime> {
        let reloader = HotReloader::with_parts(
            ArtifactPaths::new("/plugins/libtest.so"),
            StaticLoader(entry),
            FixedMtime(mtime),
        );
        Host::with_reloader(config(), reloader).unwrap()
    }

    #[test]
    fn runs_plugin_until_frame_limit() {
        let mut host = host(Some(COUNTING), 10);
        host.config.max_frames = Some(3);
        host.load().unwrap();

        let running = AtomicBool::new(true);
        let summary = host.run(&running);

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.reloads, 0);
        assert_eq!(host.memory_mut().split().0[0], 3);
        assert_eq!(host.pixels()[0], 0x00ff_00ff);
    }

    #[test]
    fn plugin_timing_reaches_overlay() {
        let mut host = host(Some(COUNTING), 10);
        host.load().unwrap();
        host.step();

        let rows = host.debug().collector().site_stats();
        let row = rows
            .iter()
            .find(|row| row.site.function_name == "counting_entry")
            .unwrap();
        assert_eq!(row.latest.hit_count, 1);
    }

    #[test]
    fn missing_plugin_is_fatal() {
        let mut host = host(Some(COUNTING), 0);
        let err = host.load().unwrap_err();
        assert!(format!("{err:#}").contains("No loadable entry point"));
    }

    #[test]
    fn unresolvable_plugin_is_fatal() {
        let mut host = host(None, 10);
        assert!(host.load().is_err());
        assert_eq!(host.step(), ReloadOutcome::ResolveFailed);
    }

    #[test]
    fn cleared_flag_stops_immediately() {
        let mut host = host(Some(COUNTING), 10);
        host.load().unwrap();

        let running = AtomicBool::new(false);
        let summary = host.run(&running);
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.min_fps, 0.0);
    }
}
