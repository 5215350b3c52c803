//! The instrumentation table: call-site registry, counters and event ring.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU32, Ordering};

use hashbrown::{Equivalent, HashMap};
use hotframe_core::{Clock, MonotonicClock};

use crate::error::{DebugError, Result};
use crate::events::{
    CallSite, CallSiteId, CallSiteRecord, CounterSnapshot, EventKind, SiteInfo, TimingEvent,
};
use crate::macros::TimedBlock;
use crate::ring_buffer::{EventRing, DEFAULT_EVENT_CAPACITY};

/// Default number of call sites a table can hold.
pub const DEFAULT_CAPACITY: usize = 256;

/// Largest capacity addressable by a 16-bit call-site index.
pub const MAX_CAPACITY: usize = u16::MAX as usize + 1;

#[derive(Default)]
struct Counters {
    cycles: Cell<u64>,
    hits: Cell<u32>,
}

/// Borrowed form of a [`SiteInfo`] key; hashes identically.
#[derive(Hash)]
struct SiteRef<'a>(&'a str, &'a str, u32);

impl Equivalent<SiteInfo> for SiteRef<'_> {
    fn equivalent(&self, key: &SiteInfo) -> bool {
        self.2 == key.line_number && self.1 == key.function_name && self.0 == key.source_file
    }
}

#[derive(Default)]
struct Registry {
    sites: Vec<SiteInfo>,
    lookup: HashMap<SiteInfo, CallSiteId>,
}

static NEXT_TABLE_TOKEN: AtomicU32 = AtomicU32::new(1);

/// Process-wide table of call-site counters.
///
/// The table is written through shared references from scope guards, using
/// `Cell`/`RefCell`, and is therefore `!Sync`: it belongs to the single
/// frame thread. Threads that want timing need their own table.
pub struct InstrumentationTable<C: Clock = MonotonicClock> {
    clock: C,
    token: u32,
    counters: Box<[Counters]>,
    registry: RefCell<Registry>,
    events: RefCell<EventRing>,
}

impl Default for InstrumentationTable {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl InstrumentationTable {
    /// Create a table timed by a [`MonotonicClock`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, MonotonicClock::new())
    }
}

impl<C: Clock> InstrumentationTable<C> {
    /// Create a table with a custom clock.
    ///
    /// `capacity` is clamped to [`MAX_CAPACITY`].
    #[must_use]
    pub fn with_clock(capacity: usize, clock: C) -> Self {
        Self::with_event_capacity(capacity, DEFAULT_EVENT_CAPACITY, clock)
    }

    /// Create a table with custom call-site and event capacities.
    #[must_use]
    pub fn with_event_capacity(capacity: usize, event_capacity: usize, clock: C) -> Self {
        let capacity = capacity.min(MAX_CAPACITY);
        Self {
            clock,
            token: NEXT_TABLE_TOKEN.fetch_add(1, Ordering::Relaxed),
            counters: (0..capacity).map(|_| Counters::default()).collect(),
            registry: RefCell::new(Registry::default()),
            events: RefCell::new(EventRing::new(event_capacity)),
        }
    }

    /// Maximum number of call sites.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.counters.len()
    }

    /// Number of registered call sites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.borrow().sites.len()
    }

    /// Returns true when no call site has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The clock used for timestamps.
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Process-unique identity of this table, never 0.
    #[must_use]
    pub const fn token(&self) -> u32 {
        self.token
    }

    /// Register a static call site.
    pub fn register(&self, site: CallSite) -> Result<CallSiteId> {
        self.register_parts(site.file, site.function, site.line)
    }

    /// Register a call site from borrowed strings.
    ///
    /// The same location always maps to the same id. Looking up a known
    /// location does not allocate; the strings are copied only on first
    /// registration.
    pub fn register_parts(&self, file: &str, function: &str, line: u32) -> Result<CallSiteId> {
        let mut registry = self.registry.borrow_mut();
        if let Some(&id) = registry.lookup.get(&SiteRef(file, function, line)) {
            return Ok(id);
        }

        let index = registry.sites.len();
        if index >= self.capacity() {
            return Err(DebugError::CapacityExceeded {
                capacity: self.capacity(),
            });
        }

        // index < capacity <= MAX_CAPACITY, so it fits in u16
        let id = CallSiteId(index as u16);
        let info = SiteInfo {
            source_file: file.to_owned(),
            function_name: function.to_owned(),
            line_number: line,
        };
        tracing::trace!("Registered call site {}({}) as {}", function, line, index);
        registry.lookup.insert(info.clone(), id);
        registry.sites.push(info);
        Ok(id)
    }

    /// Description of a registered call site.
    #[must_use]
    pub fn site(&self, id: CallSiteId) -> Option<SiteInfo> {
        self.registry.borrow().sites.get(id.index()).cloned()
    }

    /// Open a timed block that closes when the guard drops.
    #[must_use]
    pub fn begin_timed_block(&self, id: CallSiteId) -> TimedBlock<'_, C> {
        let start = self.begin_raw(id);
        TimedBlock::from_parts(self, id, start)
    }

    /// Record a Begin event and return the start timestamp.
    pub fn begin_raw(&self, id: CallSiteId) -> u64 {
        let now = self.clock.now();
        self.events
            .borrow_mut()
            .push(TimingEvent::new(EventKind::Begin, id.0, now));
        now
    }

    /// Close a block opened at `start`, adding the elapsed time and `hits`.
    ///
    /// # Panics
    /// If `id` lies outside the table's capacity.
    pub fn end_raw(&self, id: CallSiteId, start: u64, hits: u32) {
        let now = self.clock.now();
        let counters = &self.counters[id.index()];
        counters
            .cycles
            .set(counters.cycles.get().wrapping_add(now.saturating_sub(start)));
        counters.hits.set(counters.hits.get().wrapping_add(hits));
        self.events
            .borrow_mut()
            .push(TimingEvent::new(EventKind::End, id.0, now));
    }

    /// Record a frame boundary in the event ring.
    pub fn frame_marker(&self) {
        let now = self.clock.now();
        self.events.borrow_mut().push(TimingEvent::frame_marker(now));
    }

    /// Current counters of a call site.
    ///
    /// # Panics
    /// If `id` lies outside the table's capacity.
    #[must_use]
    pub fn counters(&self, id: CallSiteId) -> CounterSnapshot {
        let counters = &self.counters[id.index()];
        CounterSnapshot {
            cycle_count: counters.cycles.get(),
            hit_count: counters.hits.get(),
        }
    }

    /// Read and zero the counters of a call site.
    ///
    /// # Panics
    /// If `id` lies outside the table's capacity.
    pub fn take_counters(&self, id: CallSiteId) -> CounterSnapshot {
        let counters = &self.counters[id.index()];
        CounterSnapshot {
            cycle_count: counters.cycles.replace(0),
            hit_count: counters.hits.replace(0),
        }
    }

    /// Registered call site plus its live counters.
    #[must_use]
    pub fn record(&self, id: CallSiteId) -> Option<CallSiteRecord> {
        let info = self.site(id)?;
        let counters = self.counters(id);
        Some(CallSiteRecord {
            id,
            source_file: info.source_file,
            function_name: info.function_name,
            line_number: info.line_number,
            cumulative_cycles: counters.cycle_count,
            hit_count: counters.hit_count,
        })
    }

    /// Every registered call site with its live counters, in id order.
    #[must_use]
    pub fn records(&self) -> Vec<CallSiteRecord> {
        (0..self.len())
            .filter_map(|i| self.record(CallSiteId(i as u16)))
            .collect()
    }

    /// Copy the event ring, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<TimingEvent> {
        self.events.borrow().iter().copied().collect()
    }

    /// Remove and return every event, oldest first.
    pub fn drain_events(&self) -> Vec<TimingEvent> {
        self.events.borrow_mut().drain()
    }

    /// Remove every event, keeping a trailing frame marker in the ring so
    /// the next frame has its opening boundary.
    pub fn drain_closed_frames(&self) -> Vec<TimingEvent> {
        let mut ring = self.events.borrow_mut();
        let events = ring.drain();
        if let Some(&last) = events.last() {
            if last.kind == EventKind::FrameMarker {
                ring.push(last);
            }
        }
        events
    }

    /// Events lost because the ring wrapped.
    #[must_use]
    pub fn overwritten_events(&self) -> u64 {
        self.events.borrow().overwritten()
    }

    /// Zero every counter and clear the event ring; registrations stay.
    pub fn reset(&self) {
        for counters in self.counters.iter() {
            counters.cycles.set(0);
            counters.hits.set(0);
        }
        self.events.borrow_mut().clear();
    }
}
