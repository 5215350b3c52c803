//! Fixed-capacity event ring that overwrites its oldest entries.

use crate::events::TimingEvent;

/// Default number of events kept in the ring.
pub const DEFAULT_EVENT_CAPACITY: usize = 16 * 1024;

/// Ring buffer of timing events.
///
/// The write index wraps modulo the capacity; once full, every push replaces
/// the oldest event. Single-threaded: owned by the instrumentation table.
pub struct EventRing {
    buffer: Box<[TimingEvent]>,
    /// Index of the oldest event.
    tail: usize,
    /// Number of live events.
    len: usize,
    /// Events lost to overwriting since creation.
    overwritten: u64,
}

impl Default for EventRing {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventRing {
    /// Create an empty ring holding up to `capacity` events (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![TimingEvent::default(); capacity.max(1)].into_boxed_slice(),
            tail: 0,
            len: 0,
            overwritten: 0,
        }
    }

    /// Maximum number of events.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Push an event.
    ///
    /// Returns `true` if an older event was overwritten.
    pub fn push(&mut self, event: TimingEvent) -> bool {
        let capacity = self.capacity();
        let head = (self.tail + self.len) % capacity;
        self.buffer[head] = event;

        if self.len == capacity {
            self.tail = (self.tail + 1) % capacity;
            self.overwritten += 1;
            true
        } else {
            self.len += 1;
            false
        }
    }

    /// Pop the oldest event.
    ///
    /// Returns `None` if the ring is empty.
    pub fn pop(&mut self) -> Option<TimingEvent> {
        if self.len == 0 {
            return None;
        }
        let event = self.buffer[self.tail];
        self.tail = (self.tail + 1) % self.capacity();
        self.len -= 1;
        Some(event)
    }

    /// Get the number of events in the ring.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the ring is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Events lost because the ring was full.
    #[must_use]
    pub const fn overwritten(&self) -> u64 {
        self.overwritten
    }

    /// Iterate oldest to newest without consuming.
    pub fn iter(&self) -> impl Iterator<Item = &TimingEvent> + '_ {
        let capacity = self.capacity();
        (0..self.len).map(move |i| &self.buffer[(self.tail + i) % capacity])
    }

    /// Drain all events into a vector, oldest first.
    pub fn drain(&mut self) -> Vec<TimingEvent> {
        let mut events = Vec::with_capacity(self.len);
        while let Some(event) = self.pop() {
            events.push(event);
        }
        events
    }

    /// Drop every event.
    pub fn clear(&mut self) {
        self.tail = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    fn begin(ts: u64) -> TimingEvent {
        TimingEvent::new(EventKind::Begin, 0, ts)
    }

    #[test]
    fn push_pop_single() {
        let mut ring = EventRing::new(8);

        assert!(!ring.push(begin(1000)));
        assert_eq!(ring.len(), 1);

        let popped = ring.pop().unwrap();
        assert_eq!(popped.timestamp, 1000);
        assert!(ring.is_empty());
    }

    #[test]
    fn push_pop_multiple() {
        let mut ring = EventRing::new(128);

        for i in 0..100 {
            ring.push(begin(i));
        }

        assert_eq!(ring.len(), 100);

        for i in 0..100 {
            assert_eq!(ring.pop().unwrap().timestamp, i);
        }

        assert!(ring.is_empty());
    }

    #[test]
    fn wraps_and_overwrites_oldest() {
        let mut ring = EventRing::new(4);

        for i in 0..6 {
            ring.push(begin(i));
        }

        assert_eq!(ring.len(), 4);
        assert_eq!(ring.overwritten(), 2);
        let stamps: Vec<u64> = ring.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![2, 3, 4, 5]);
    }

    #[test]
    fn drain_all() {
        let mut ring = EventRing::new(64);

        for i in 0..50 {
            ring.push(begin(i * 1000));
        }

        let events = ring.drain();
        assert_eq!(events.len(), 50);
        assert_eq!(events[49].timestamp, 49_000);
        assert!(ring.is_empty());
    }
}
