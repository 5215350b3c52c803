//! Frame timelines built from the event ring.

use serde::{Deserialize, Serialize};

use crate::events::{CallSiteId, EventKind, TimingEvent};

/// Regions shorter than this fraction of their frame are dropped.
pub const MIN_REGION_FRACTION: f64 = 0.01;

/// A closed timed block within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameRegion {
    pub site: CallSiteId,
    /// Nesting depth, 0 for top-level blocks.
    pub depth: u16,
    /// Start, relative to the frame's begin clock.
    pub min_t: u64,
    /// End, relative to the frame's begin clock.
    pub max_t: u64,
}

impl FrameRegion {
    /// Length of the region in clock units.
    #[must_use]
    pub const fn duration(&self) -> u64 {
        self.max_t.saturating_sub(self.min_t)
    }
}

/// All regions between two frame markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameTimeline {
    pub begin_clock: u64,
    pub end_clock: u64,
    pub regions: Vec<FrameRegion>,
}

impl FrameTimeline {
    /// Length of the frame in clock units.
    #[must_use]
    pub const fn duration(&self) -> u64 {
        self.end_clock.saturating_sub(self.begin_clock)
    }
}

/// Closed frames, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timelines {
    pub frames: Vec<FrameTimeline>,
    /// `1 / longest frame`, for drawing frame bars to a common scale.
    pub frame_bar_scale: f64,
}

struct OpenBlock {
    site: u16,
    start: u64,
}

/// Collate events into per-frame timelines.
///
/// Begin/End events are matched with a stack; unmatched events are ignored
/// and the stack is cleared at every frame marker. Only frames closed by a
/// marker are returned.
#[must_use]
pub fn collate_frames(events: &[TimingEvent]) -> Timelines {
    let mut frames = Vec::new();
    let mut current: Option<FrameTimeline> = None;
    let mut stack: Vec<OpenBlock> = Vec::new();

    for event in events {
        match event.kind {
            EventKind::FrameMarker => {
                if let Some(mut frame) = current.take() {
                    frame.end_clock = event.timestamp;
                    let min_len = frame.duration() as f64 * MIN_REGION_FRACTION;
                    frame.regions.retain(|r| r.duration() as f64 >= min_len);
                    frames.push(frame);
                }
                stack.clear();
                current = Some(FrameTimeline {
                    begin_clock: event.timestamp,
                    end_clock: event.timestamp,
                    regions: Vec::new(),
                });
            }
            EventKind::Begin => stack.push(OpenBlock {
                site: event.call_site_index,
                start: event.timestamp,
            }),
            EventKind::End => {
                let Some(open) = stack.pop() else { continue };
                if open.site != event.call_site_index {
                    tracing::trace!(
                        "Mismatched end for site {} (open {})",
                        event.call_site_index,
                        open.site
                    );
                    continue;
                }
                if let Some(frame) = current.as_mut() {
                    let depth = u16::try_from(stack.len()).unwrap_or(u16::MAX);
                    frame.regions.push(FrameRegion {
                        site: CallSiteId(open.site),
                        depth,
                        min_t: open.start.saturating_sub(frame.begin_clock),
                        max_t: event.timestamp.saturating_sub(frame.begin_clock),
                    });
                }
            }
        }
    }

    let longest = frames.iter().map(FrameTimeline::duration).max().unwrap_or(0);
    let frame_bar_scale = if longest == 0 {
        0.0
    } else {
        1.0 / longest as f64
    };

    Timelines {
        frames,
        frame_bar_scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn begin(site: u16, ts: u64) -> TimingEvent {
        TimingEvent::new(EventKind::Begin, site, ts)
    }

    fn end(site: u16, ts: u64) -> TimingEvent {
        TimingEvent::new(EventKind::End, site, ts)
    }

    #[test]
    fn nested_regions_get_depth() {
        let events = [
            TimingEvent::frame_marker(1000),
            begin(0, 1000),
            begin(1, 1100),
            end(1, 1400),
            end(0, 1900),
            TimingEvent::frame_marker(2000),
        ];

        let timelines = collate_frames(&events);
        assert_eq!(timelines.frames.len(), 1);

        let frame = &timelines.frames[0];
        assert_eq!(frame.duration(), 1000);
        assert_eq!(
            frame.regions,
            vec![
                FrameRegion {
                    site: CallSiteId(1),
                    depth: 1,
                    min_t: 100,
                    max_t: 400
                },
                FrameRegion {
                    site: CallSiteId(0),
                    depth: 0,
                    min_t: 0,
                    max_t: 900
                },
            ]
        );
        assert!((timelines.frame_bar_scale - 0.001).abs() < 1e-12);
    }

    #[test]
    fn open_frame_is_not_reported() {
        let events = [TimingEvent::frame_marker(0), begin(0, 1), end(0, 5)];
        let timelines = collate_frames(&events);
        assert!(timelines.frames.is_empty());
        assert_eq!(timelines.frame_bar_scale, 0.0);
    }

    #[test]
    fn tiny_regions_are_dropped() {
        let events = [
            TimingEvent::frame_marker(0),
            begin(0, 10),
            end(0, 15),
            begin(1, 100),
            end(1, 600),
            TimingEvent::frame_marker(1000),
        ];

        let frame = &collate_frames(&events).frames[0];
        assert_eq!(frame.regions.len(), 1);
        assert_eq!(frame.regions[0].site, CallSiteId(1));
    }

    #[test]
    fn stack_resets_at_frame_marker() {
        // Block left open across a marker (e.g. events lost to ring wrap)
        let events = [
            TimingEvent::frame_marker(0),
            begin(3, 10),
            TimingEvent::frame_marker(100),
            end(3, 150),
            begin(4, 160),
            end(4, 190),
            TimingEvent::frame_marker(200),
        ];

        let timelines = collate_frames(&events);
        assert_eq!(timelines.frames.len(), 2);
        assert!(timelines.frames[0].regions.is_empty());
        assert_eq!(timelines.frames[1].regions.len(), 1);
        assert_eq!(timelines.frames[1].regions[0].site, CallSiteId(4));
        assert_eq!(timelines.frames[1].regions[0].depth, 0);
    }
}
