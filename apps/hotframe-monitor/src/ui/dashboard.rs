//! Main monitor dashboard UI.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame,
};

use hotframe_debug::{OverlaySnapshot, SiteStats};

use crate::client::ConnectionState;

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Number of history bars shown per row.
const SPARK_WIDTH: usize = 24;

/// Dashboard state and rendering.
pub struct Dashboard {
    host: String,
    port: u16,
}

impl Dashboard {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }

    /// Render the dashboard.
    pub fn render(
        &self,
        frame: &mut Frame,
        connection_state: ConnectionState,
        snapshot: Option<&OverlaySnapshot>,
        last_error: Option<&str>,
    ) {
        let area = frame.area();

        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Length(3), // Frame info
                Constraint::Min(10),   // Counter table
                Constraint::Length(3), // Footer
            ])
            .split(area);

        self.render_header(frame, sections[0], connection_state, snapshot);
        Self::render_frame_info(frame, sections[1], snapshot, last_error);
        Self::render_counter_table(frame, sections[2], snapshot);
        Self::render_footer(frame, sections[3]);
    }

    fn render_header(
        &self,
        frame: &mut Frame,
        area: Rect,
        state: ConnectionState,
        snapshot: Option<&OverlaySnapshot>,
    ) {
        let (status_text, status_color) = match state {
            ConnectionState::Connected => ("Connected", Color::Green),
            ConnectionState::Connecting => ("Connecting...", Color::Yellow),
            ConnectionState::Disconnected => ("Disconnected", Color::Red),
        };

        let frame_num = snapshot.map_or(0, |s| s.frame_number);

        let title = Line::from(vec![
            Span::styled(
                " Hotframe Monitor ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("| "),
            Span::styled(
                format!("{}:{}", self.host, self.port),
                Style::default().fg(Color::White),
            ),
            Span::raw(" | "),
            Span::styled(status_text, Style::default().fg(status_color)),
            Span::raw(" | Frame: "),
            Span::styled(format!("{frame_num}"), Style::default().fg(Color::Yellow)),
        ]);

        let header = Paragraph::new(title).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        );

        frame.render_widget(header, area);
    }

    fn render_frame_info(
        frame: &mut Frame,
        area: Rect,
        snapshot: Option<&OverlaySnapshot>,
        last_error: Option<&str>,
    ) {
        let info = match snapshot {
            Some(s) => {
                let fps_color = if s.fps >= 60.0 {
                    Color::Green
                } else if s.fps >= 30.0 {
                    Color::Yellow
                } else {
                    Color::Red
                };
                let library = s.active_library.as_deref().unwrap_or("none");

                Line::from(vec![
                    Span::raw(" FPS: "),
                    Span::styled(
                        format!("{:.1}", s.fps),
                        Style::default().fg(fps_color).add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(" | Frame: "),
                    Span::styled(
                        format!("{:.1}ms", s.frame_time_ms),
                        Style::default().fg(Color::White),
                    ),
                    Span::raw(" | Reloads: "),
                    Span::styled(
                        format!("{}", s.reload_count),
                        Style::default().fg(Color::Magenta),
                    ),
                    Span::raw(" | Library: "),
                    Span::styled(library.to_string(), Style::default().fg(Color::Cyan)),
                ])
            }
            None => Line::from(Span::styled(
                format!(" {}", last_error.unwrap_or("Waiting for host...")),
                Style::default().fg(Color::DarkGray),
            )),
        };

        let widget = Paragraph::new(info).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Frame ")
                .border_style(Style::default().fg(Color::Blue)),
        );

        frame.render_widget(widget, area);
    }

    fn render_counter_table(frame: &mut Frame, area: Rect, snapshot: Option<&OverlaySnapshot>) {
        let header_cells = [
            "Call Site", "Cycles", "Hits", "Cy/Hit", "Min", "Avg", "Max", "History",
        ]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow)));
        let header = Row::new(header_cells)
            .style(Style::default().add_modifier(Modifier::BOLD))
            .height(1);

        let rows: Vec<Row> = snapshot.map_or_else(Vec::new, |s| {
            s.sites.iter().map(site_row).collect()
        });

        let widths = [
            Constraint::Min(20),
            Constraint::Length(12),
            Constraint::Length(8),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(u16::try_from(SPARK_WIDTH).unwrap_or(u16::MAX)),
        ];

        let table = Table::new(rows, widths)
            .header(header)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Call Sites ")
                    .border_style(Style::default().fg(Color::Green)),
            )
            .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

        frame.render_widget(table, area);
    }

    fn render_footer(frame: &mut Frame, area: Rect) {
        let footer = Paragraph::new(Line::from(vec![
            Span::styled(" [Q] ", Style::default().fg(Color::Yellow)),
            Span::raw("Quit"),
            Span::raw("  "),
            Span::styled("[R] ", Style::default().fg(Color::Yellow)),
            Span::raw("Reset History"),
            Span::raw("  "),
            Span::styled("[C] ", Style::default().fg(Color::Yellow)),
            Span::raw("Reconnect"),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        );

        frame.render_widget(footer, area);
    }
}

fn site_row(row: &SiteStats) -> Row<'static> {
    let per_hit = row
        .latest
        .cycles_per_hit()
        .map_or_else(|| "-".to_string(), |c| c.to_string());
    let stats = &row.stats.cycles;

    Row::new(vec![
        Cell::from(format!(
            "{}({})",
            row.site.function_name, row.site.line_number
        ))
        .style(Style::default().fg(Color::Cyan)),
        Cell::from(format!("{}", row.latest.cycle_count)),
        Cell::from(format!("{}", row.latest.hit_count)),
        Cell::from(per_hit),
        Cell::from(format!("{:.0}", stats.min_or_zero())),
        Cell::from(format!("{:.0}", stats.average())),
        Cell::from(format!("{:.0}", stats.max_or_zero())),
        Cell::from(spark_text(&row.bars, SPARK_WIDTH)).style(Style::default().fg(Color::Green)),
    ])
}

/// Render the newest `width` bar heights as block characters.
fn spark_text(heights: &[f32], width: usize) -> String {
    let start = heights.len().saturating_sub(width);
    heights[start..]
        .iter()
        .map(|h| {
            let clamped = h.clamp(0.0, 1.0);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let level = (clamped * (SPARK_LEVELS.len() - 1) as f32).round() as usize;
            SPARK_LEVELS[level.min(SPARK_LEVELS.len() - 1)]
        })
        .collect()
}
