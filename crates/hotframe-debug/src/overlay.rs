//! Text presentation of collated counters.

use std::fmt::Write as _;

use crate::collector::Collector;
use crate::events::{CounterSnapshot, SiteInfo};

/// Drawing primitive the overlay renders through.
pub trait OverlaySink {
    /// Draw one line of text.
    fn draw_text(&mut self, text: &str);

    /// Draw a bar chart of heights in `0.0..=1.0`, oldest first.
    fn draw_bars(&mut self, _heights: &[f32]) {}
}

impl OverlaySink for Vec<String> {
    fn draw_text(&mut self, text: &str) {
        self.push(text.to_owned());
    }
}

/// Sink that emits each line as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OverlaySink for TracingSink {
    fn draw_text(&mut self, text: &str) {
        tracing::info!(target: "hotframe::overlay", "{}", text);
    }
}

/// Format one overlay line, e.g. `update(42): 1200cy | 3hits | 400cy per hit`.
///
/// Returns `None` for sites that were not hit.
#[must_use]
pub fn format_counter_line(site: &SiteInfo, counters: CounterSnapshot) -> Option<String> {
    let per_hit = counters.cycles_per_hit()?;
    let mut line = String::with_capacity(64);
    let _ = write!(
        line,
        "{}({}): {}cy | {}hits | {}cy per hit",
        site.function_name, site.line_number, counters.cycle_count, counters.hit_count, per_hit
    );
    Some(line)
}

/// Draw a line (and its history bars) for every site hit in the latest
/// collation. Returns the number of lines drawn.
pub fn render_overlay(collector: &Collector, sink: &mut impl OverlaySink) -> usize {
    let mut drawn = 0;
    for row in collector.site_stats() {
        if let Some(line) = format_counter_line(&row.site, row.latest) {
            sink.draw_text(&line);
            sink.draw_bars(&row.bars);
            drawn += 1;
        }
    }
    drawn
}
