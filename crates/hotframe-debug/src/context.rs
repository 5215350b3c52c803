//! Per-host debug context tying the table, collation and IPC together.

use hotframe_core::{Clock, MonotonicClock};

use crate::collector::Collector;
use crate::events::OverlaySnapshot;
use crate::ipc::server::IpcServer;
use crate::overlay::{render_overlay, OverlaySink};
use crate::table::InstrumentationTable;
use crate::timeline::{collate_frames, Timelines};

/// Reload information shown alongside the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadInfo {
    pub reload_count: u32,
    pub active_library: Option<String>,
}

/// Owns the instrumentation table and everything derived from it.
///
/// Lives on the frame thread; the table is handed out by reference to the
/// code being timed.
pub struct DebugContext<C: Clock = MonotonicClock> {
    table: InstrumentationTable<C>,
    collector: Collector,
    timelines: Timelines,
    server: Option<IpcServer>,
    frame_number: u64,
}

impl<C: Clock> DebugContext<C> {
    /// Create a context around `table`.
    #[must_use]
    pub fn new(table: InstrumentationTable<C>) -> Self {
        Self {
            table,
            collector: Collector::new(),
            timelines: Timelines::default(),
            server: None,
            frame_number: 0,
        }
    }

    /// Start broadcasting snapshots on `port`.
    ///
    /// Failure to bind is logged and leaves the context without IPC.
    pub fn start_server(&mut self, port: u16) {
        if self.server.is_none() {
            match IpcServer::start(port) {
                Ok(server) => self.server = Some(server),
                Err(e) => tracing::warn!("Failed to start debug IPC server: {}", e),
            }
        }
    }

    /// The running IPC server, if any.
    #[must_use]
    pub const fn server(&self) -> Option<&IpcServer> {
        self.server.as_ref()
    }

    /// The instrumentation table.
    #[must_use]
    pub const fn table(&self) -> &InstrumentationTable<C> {
        &self.table
    }

    /// Collated counter history.
    #[must_use]
    pub const fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Timelines of the frames closed since the previous [`end_frame`](Self::end_frame).
    #[must_use]
    pub const fn timelines(&self) -> &Timelines {
        &self.timelines
    }

    /// Frames ended so far.
    #[must_use]
    pub const fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Close the frame: mark the boundary, build timelines, collate counters
    /// and broadcast the result.
    pub fn end_frame(&mut self, frame_time_ms: f32, fps: f32, reload: &ReloadInfo) {
        self.table.frame_marker();
        self.frame_number += 1;

        if self
            .server
            .as_ref()
            .is_some_and(IpcServer::take_reset_request)
        {
            tracing::info!("Resetting counter history");
            self.collector.reset();
        }

        self.timelines = collate_frames(&self.table.drain_closed_frames());

        self.collector
            .set_frame_info(self.frame_number, fps, frame_time_ms);
        self.collector.snapshot_and_reset(&self.table);

        if let Some(server) = &self.server {
            if server.client_count() > 0 {
                server.broadcast(self.snapshot(reload));
            }
        }
    }

    /// Current overlay data.
    #[must_use]
    pub fn snapshot(&self, reload: &ReloadInfo) -> OverlaySnapshot {
        self.collector
            .overlay_snapshot(reload.reload_count, reload.active_library.clone())
    }

    /// Draw the overlay into `sink`; returns the number of lines.
    pub fn render_overlay(&self, sink: &mut impl OverlaySink) -> usize {
        render_overlay(&self.collector, sink)
    }

    /// Stop the IPC server.
    pub fn shutdown(&mut self) {
        if let Some(server) = self.server.take() {
            server.stop();
        }
    }
}

impl<C: Clock> Drop for DebugContext<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
