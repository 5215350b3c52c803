//! Call-site timing instrumentation for hotframe.
//!
//! A host owns one [`InstrumentationTable`] and passes it by reference to
//! whatever it wants to time: its own frame loop directly, a plugin through
//! the `DebugHooks` in its IO table. Each frame the [`Collector`] moves the
//! live counters into a 120-slot history that the overlay and remote monitors
//! read.
//!
//! # Feature Flags
//!
//! - `profiling`: Enable the timing macros. When disabled, `timed_block!`,
//!   `timed_function!` and `frame_marker!` expand to nothing.
//!
//! # Usage
//!
//! ```ignore
//! use hotframe_debug::{timed_block, InstrumentationTable};
//!
//! let table = InstrumentationTable::default();
//!
//! fn simulate(table: &InstrumentationTable) {
//!     timed_block!(table, "simulate");
//!     // ... work
//! }
//! ```
//!
//! At the end of each frame, collate and draw:
//!
//! ```ignore
//! ctx.end_frame(frame_time_ms, fps, &reload_info);
//! ctx.render_overlay(&mut sink);
//! ```

mod collector;
mod context;
mod error;
mod events;
pub mod ipc;
mod macros;
pub mod overlay;
mod ring_buffer;
mod table;
pub mod timeline;

pub use collector::{Collector, SNAPSHOT_HISTORY};
pub use context::{DebugContext, ReloadInfo};
pub use error::{DebugError, Result};
pub use events::{
    CallSite, CallSiteId, CallSiteRecord, CounterSnapshot, CounterStatistics, EventKind,
    OverlaySnapshot, SiteInfo, SiteStats, Statistic, TimingEvent,
};
pub use ipc::DEFAULT_PORT;
pub use macros::{SiteCache, TimedBlock};
pub use overlay::{format_counter_line, render_overlay, OverlaySink, TracingSink};
pub use ring_buffer::{EventRing, DEFAULT_EVENT_CAPACITY};
pub use table::{InstrumentationTable, DEFAULT_CAPACITY, MAX_CAPACITY};
pub use timeline::{collate_frames, FrameRegion, FrameTimeline, Timelines};

// Re-export protocol types for the monitor
pub use ipc::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
