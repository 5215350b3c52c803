//! Call-site identities, timing events and collated statistics.

use serde::{Deserialize, Serialize};

/// Static source location of a timed region.
///
/// Built by the [`call_site!`](crate::call_site) macro from `file!()` and
/// `line!()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub file: &'static str,
    pub function: &'static str,
    pub line: u32,
}

impl CallSite {
    /// Create a call site.
    #[must_use]
    pub const fn new(file: &'static str, function: &'static str, line: u32) -> Self {
        Self {
            file,
            function,
            line,
        }
    }
}

/// Index of a registered call site in an instrumentation table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct CallSiteId(pub u16);

impl CallSiteId {
    /// Position in the table's record array.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Owned description of a registered call site.
///
/// Strings are copied at registration: a plugin's string literals are gone
/// once its library is unloaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteInfo {
    pub source_file: String,
    pub function_name: String,
    pub line_number: u32,
}

/// A call site together with its counters since the last collation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSiteRecord {
    pub id: CallSiteId,
    pub source_file: String,
    pub function_name: String,
    pub line_number: u32,
    pub cumulative_cycles: u64,
    pub hit_count: u32,
}

/// Kind of entry in the event ring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    /// A timed block opened.
    #[default]
    Begin = 0,
    /// A timed block closed.
    End = 1,
    /// Frame boundary.
    FrameMarker = 2,
}

/// A single timestamped event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingEvent {
    /// Clock value when the event was recorded.
    pub timestamp: u64,
    /// Call site the event belongs to (unused for frame markers).
    pub call_site_index: u16,
    /// Event kind.
    pub kind: EventKind,
}

impl TimingEvent {
    /// Create a new timing event.
    #[must_use]
    pub const fn new(kind: EventKind, call_site_index: u16, timestamp: u64) -> Self {
        Self {
            timestamp,
            call_site_index,
            kind,
        }
    }

    /// Frame boundary at `timestamp`.
    #[must_use]
    pub const fn frame_marker(timestamp: u64) -> Self {
        Self::new(EventKind::FrameMarker, 0, timestamp)
    }
}

/// Counters of one call site captured for one frame slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub cycle_count: u64,
    pub hit_count: u32,
}

impl CounterSnapshot {
    /// Average cycles per hit, `None` when the site was not hit.
    #[must_use]
    pub fn cycles_per_hit(&self) -> Option<u64> {
        (self.hit_count > 0).then(|| self.cycle_count / u64::from(self.hit_count))
    }
}

/// Running min/max/average over a series of values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Statistic {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: u32,
}

impl Default for Statistic {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistic {
    /// Create an empty statistic.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            min: f64::MAX,
            max: f64::MIN,
            sum: 0.0,
            count: 0,
        }
    }

    /// Add a value.
    pub fn record(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
    }

    /// Mean of the recorded values (0 when empty).
    #[must_use]
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / f64::from(self.count)
        }
    }

    /// Smallest value (0 when empty).
    #[must_use]
    pub fn min_or_zero(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.min
        }
    }

    /// Largest value (0 when empty).
    #[must_use]
    pub fn max_or_zero(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.max
        }
    }
}

/// Statistics of a call site over its snapshot history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterStatistics {
    pub hits: Statistic,
    pub cycles: Statistic,
    pub cycles_per_hit: Statistic,
}

/// One row of the overlay, as sent to remote monitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteStats {
    pub site: SiteInfo,
    /// Counters of the most recent collation.
    pub latest: CounterSnapshot,
    /// Statistics over the whole history.
    pub stats: CounterStatistics,
    /// Normalized cycle counts, oldest first.
    pub bars: Vec<f32>,
}

/// Complete overlay snapshot sent to the monitor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverlaySnapshot {
    /// Current frame number.
    pub frame_number: u64,
    /// Current FPS.
    pub fps: f32,
    /// Frame time in milliseconds.
    pub frame_time_ms: f32,
    /// Rows for every call site hit in the latest collation.
    pub sites: Vec<SiteStats>,
    /// Number of successful library reloads so far.
    pub reload_count: u32,
    /// Path of the active plugin artifact.
    pub active_library: Option<String>,
}
