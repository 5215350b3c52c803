//! Counter collation and per-site history.

use hotframe_core::Clock;

use crate::events::{
    CallSiteId, CounterSnapshot, CounterStatistics, OverlaySnapshot, SiteInfo, SiteStats,
};
use crate::table::InstrumentationTable;

/// Number of collations kept per call site.
pub const SNAPSHOT_HISTORY: usize = 120;

struct CounterState {
    site: SiteInfo,
    snapshots: Box<[CounterSnapshot; SNAPSHOT_HISTORY]>,
}

impl CounterState {
    fn new(site: SiteInfo) -> Self {
        Self {
            site,
            snapshots: Box::new([CounterSnapshot::default(); SNAPSHOT_HISTORY]),
        }
    }
}

/// Turns the live counters of an [`InstrumentationTable`] into a rolling
/// history of per-frame snapshots.
pub struct Collector {
    counters: Vec<CounterState>,
    /// Slot written by the next collation.
    snapshot_index: usize,
    /// Collations since creation or the last reset.
    collations: u64,
    frame_number: u64,
    fps: f32,
    frame_time_ms: f32,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    /// Create a collector with an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: Vec::new(),
            snapshot_index: 0,
            collations: 0,
            frame_number: 0,
            fps: 0.0,
            frame_time_ms: 0.0,
        }
    }

    /// Copy every registered site's counters into the current slot, zero the
    /// table's counters and advance to the next slot.
    pub fn snapshot_and_reset<C: Clock>(&mut self, table: &InstrumentationTable<C>) {
        for index in 0..table.len() {
            // len() <= capacity <= MAX_CAPACITY
            let id = CallSiteId(index as u16);
            if index >= self.counters.len() {
                let Some(site) = table.site(id) else { break };
                self.counters.push(CounterState::new(site));
            }
            self.counters[index].snapshots[self.snapshot_index] = table.take_counters(id);
        }

        self.snapshot_index = (self.snapshot_index + 1) % SNAPSHOT_HISTORY;
        self.collations += 1;
    }

    /// Update frame info carried by overlay snapshots.
    pub fn set_frame_info(&mut self, frame_number: u64, fps: f32, frame_time_ms: f32) {
        self.frame_number = frame_number;
        self.fps = fps;
        self.frame_time_ms = frame_time_ms;
    }

    /// Number of call sites with a history.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Returns true when nothing has been collated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Collations since creation or the last reset.
    #[must_use]
    pub const fn collations(&self) -> u64 {
        self.collations
    }

    /// Number of history slots holding data.
    #[must_use]
    pub fn filled_slots(&self) -> usize {
        usize::try_from(self.collations).map_or(SNAPSHOT_HISTORY, |n| n.min(SNAPSHOT_HISTORY))
    }

    fn latest_index(&self) -> usize {
        (self.snapshot_index + SNAPSHOT_HISTORY - 1) % SNAPSHOT_HISTORY
    }

    /// Slot indices holding data, oldest first.
    fn history(&self) -> impl Iterator<Item = usize> {
        let filled = self.filled_slots();
        let start = (self.snapshot_index + SNAPSHOT_HISTORY - filled) % SNAPSHOT_HISTORY;
        (0..filled).map(move |i| (start + i) % SNAPSHOT_HISTORY)
    }

    /// Site description for `id`.
    #[must_use]
    pub fn site(&self, id: CallSiteId) -> Option<&SiteInfo> {
        self.counters.get(id.index()).map(|c| &c.site)
    }

    /// Counters of the most recent collation (zero before the first one).
    #[must_use]
    pub fn latest(&self, id: CallSiteId) -> CounterSnapshot {
        if self.collations == 0 {
            return CounterSnapshot::default();
        }
        self.counters
            .get(id.index())
            .map(|c| c.snapshots[self.latest_index()])
            .unwrap_or_default()
    }

    /// Min/max/average of hits, cycles and cycles per hit over the history.
    ///
    /// Slots where the site was not hit do not count towards cycles per hit.
    #[must_use]
    pub fn statistics(&self, id: CallSiteId) -> CounterStatistics {
        let mut stats = CounterStatistics::default();
        let Some(state) = self.counters.get(id.index()) else {
            return stats;
        };

        for slot in self.history() {
            let snapshot = state.snapshots[slot];
            stats.hits.record(f64::from(snapshot.hit_count));
            stats.cycles.record(snapshot.cycle_count as f64);
            if let Some(per_hit) = snapshot.cycles_per_hit() {
                stats.cycles_per_hit.record(per_hit as f64);
            }
        }
        stats
    }

    /// Cycle counts over the history, oldest first, scaled so the largest
    /// is 1.0.
    #[must_use]
    pub fn bar_heights(&self, id: CallSiteId) -> Vec<f32> {
        let Some(state) = self.counters.get(id.index()) else {
            return Vec::new();
        };

        let cycles: Vec<u64> = self
            .history()
            .map(|slot| state.snapshots[slot].cycle_count)
            .collect();
        let max = cycles.iter().copied().max().unwrap_or(0);
        if max == 0 {
            return vec![0.0; cycles.len()];
        }

        let scale = 1.0 / max as f64;
        cycles.iter().map(|&c| (c as f64 * scale) as f32).collect()
    }

    /// Overlay rows for every site hit in the latest collation, in id order.
    #[must_use]
    pub fn site_stats(&self) -> Vec<SiteStats> {
        (0..self.counters.len())
            .map(|i| CallSiteId(i as u16))
            .filter_map(|id| {
                let latest = self.latest(id);
                (latest.hit_count > 0).then(|| SiteStats {
                    site: self.counters[id.index()].site.clone(),
                    latest,
                    stats: self.statistics(id),
                    bars: self.bar_heights(id),
                })
            })
            .collect()
    }

    /// Snapshot of the current overlay for remote monitors.
    #[must_use]
    pub fn overlay_snapshot(
        &self,
        reload_count: u32,
        active_library: Option<String>,
    ) -> OverlaySnapshot {
        OverlaySnapshot {
            frame_number: self.frame_number,
            fps: self.fps,
            frame_time_ms: self.frame_time_ms,
            sites: self.site_stats(),
            reload_count,
            active_library,
        }
    }

    /// Clear the history; known sites stay.
    pub fn reset(&mut self) {
        for state in &mut self.counters {
            state.snapshots.fill(CounterSnapshot::default());
        }
        self.snapshot_index = 0;
        self.collations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotframe_core::ManualClock;

    fn hit(
        table: &InstrumentationTable<&ManualClock>,
        clock: &ManualClock,
        id: CallSiteId,
        cycles: u64,
    ) {
        let start = table.begin_raw(id);
        clock.advance(cycles);
        table.end_raw(id, start, 1);
    }

    #[test]
    fn collation_captures_sum_of_deltas() {
        let clock = ManualClock::new(0);
        let table = InstrumentationTable::with_clock(8, &clock);
        let id = table.register_parts("sim.rs", "simulate", 3).unwrap();
        let mut collector = Collector::new();

        for delta in [10, 20, 30] {
            hit(&table, &clock, id, delta);
        }
        collector.snapshot_and_reset(&table);

        assert_eq!(
            collector.latest(id),
            CounterSnapshot {
                cycle_count: 60,
                hit_count: 3
            }
        );
        // Live counters start a fresh window
        assert_eq!(table.counters(id), CounterSnapshot::default());
    }

    #[test]
    fn idle_collation_writes_zero_snapshot() {
        let clock = ManualClock::new(0);
        let table = InstrumentationTable::with_clock(8, &clock);
        let id = table.register_parts("sim.rs", "simulate", 3).unwrap();
        let mut collector = Collector::new();

        hit(&table, &clock, id, 5);
        collector.snapshot_and_reset(&table);
        collector.snapshot_and_reset(&table);

        assert_eq!(collector.latest(id).hit_count, 0);
        assert!(collector.site_stats().is_empty());
    }

    #[test]
    fn history_wraps_oldest_first() {
        let clock = ManualClock::new(0);
        let table = InstrumentationTable::with_clock(8, &clock);
        let id = table.register_parts("sim.rs", "simulate", 3).unwrap();
        let mut collector = Collector::new();

        for frame in 1..=(SNAPSHOT_HISTORY as u64 + 5) {
            hit(&table, &clock, id, frame);
            collector.snapshot_and_reset(&table);
        }

        assert_eq!(collector.filled_slots(), SNAPSHOT_HISTORY);
        let bars = collector.bar_heights(id);
        assert_eq!(bars.len(), SNAPSHOT_HISTORY);
        assert!((bars[SNAPSHOT_HISTORY - 1] - 1.0).abs() < f32::EPSILON);
        assert!(bars[0] < bars[1]);

        let stats = collector.statistics(id);
        assert_eq!(stats.cycles.min, 6.0);
        assert_eq!(stats.cycles.max, SNAPSHOT_HISTORY as f64 + 5.0);
        assert_eq!(stats.hits.average(), 1.0);
    }

    #[test]
    fn cycles_per_hit_skips_idle_slots() {
        let clock = ManualClock::new(0);
        let table = InstrumentationTable::with_clock(8, &clock);
        let id = table.register_parts("sim.rs", "simulate", 3).unwrap();
        let mut collector = Collector::new();

        hit(&table, &clock, id, 40);
        hit(&table, &clock, id, 40);
        collector.snapshot_and_reset(&table);
        collector.snapshot_and_reset(&table);

        let stats = collector.statistics(id);
        assert_eq!(stats.cycles_per_hit.count, 1);
        assert_eq!(stats.cycles_per_hit.average(), 40.0);
        assert_eq!(stats.hits.count, 2);
    }

    #[test]
    fn sites_registered_late_join_history() {
        let clock = ManualClock::new(0);
        let table = InstrumentationTable::with_clock(8, &clock);
        let first = table.register_parts("a.rs", "a", 1).unwrap();
        let mut collector = Collector::new();

        hit(&table, &clock, first, 1);
        collector.snapshot_and_reset(&table);

        let second = table.register_parts("b.rs", "b", 2).unwrap();
        hit(&table, &clock, second, 7);
        collector.snapshot_and_reset(&table);

        assert_eq!(collector.len(), 2);
        let rows = collector.site_stats();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].site.function_name, "b");
        assert_eq!(rows[0].latest.cycle_count, 7);
    }

    #[test]
    fn reset_clears_history() {
        let clock = ManualClock::new(0);
        let table = InstrumentationTable::with_clock(8, &clock);
        let id = table.register_parts("a.rs", "a", 1).unwrap();
        let mut collector = Collector::new();

        hit(&table, &clock, id, 3);
        collector.snapshot_and_reset(&table);
        collector.reset();

        assert_eq!(collector.collations(), 0);
        assert_eq!(collector.latest(id), CounterSnapshot::default());
        assert!(collector.bar_heights(id).is_empty());
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn overlay_snapshot_carries_frame_info() {
        let mut collector = Collector::new();
        collector.set_frame_info(42, 60.0, 16.6);

        let snapshot = collector.overlay_snapshot(2, Some("libdemo.so".into()));
        assert_eq!(snapshot.frame_number, 42);
        assert_eq!(snapshot.reload_count, 2);
        assert_eq!(snapshot.active_library.as_deref(), Some("libdemo.so"));
        assert!(snapshot.sites.is_empty());
    }
}
