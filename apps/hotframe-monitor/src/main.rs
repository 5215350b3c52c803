//! TUI monitor for a running hotframe host.
//!
//! Connects to the host's debug IPC server and shows the per-call-site
//! counters, frame rate and reload state as they are collated.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p hotframe-monitor
//! cargo run -p hotframe-monitor -- --host 127.0.0.1 --port 4343
//! ```

mod client;
mod ui;

use std::io;
use std::time::{Duration, Instant};

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;

use client::{ConnectionState, MonitorClient};
use ui::Dashboard;

/// Target refresh rate for the TUI.
const REFRESH_RATE: Duration = Duration::from_millis(16);

/// Reconnection attempt interval.
const RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "hotframe-monitor", version, about = "Live call-site counters from a hotframe host")]
struct Cli {
    /// Host to connect to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to connect to
    #[arg(short, long, default_value_t = hotframe_debug::DEFAULT_PORT)]
    port: u16,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &cli.host, cli.port);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    host: &str,
    port: u16,
) -> anyhow::Result<()> {
    let mut client = MonitorClient::new(host, port);
    let dashboard = Dashboard::new(host, port);

    let mut last_reconnect: Option<Instant> = None;

    loop {
        if client.state() == ConnectionState::Disconnected
            && last_reconnect.map_or(true, |t| t.elapsed() >= RECONNECT_INTERVAL)
        {
            let _ = client.connect();
            last_reconnect = Some(Instant::now());
        }

        client.poll();

        terminal.draw(|frame| {
            dashboard.render(
                frame,
                client.state(),
                client.last_snapshot(),
                client.last_error(),
            );
        })?;

        if event::poll(REFRESH_RATE)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q' | 'Q') | KeyCode::Esc => {
                            client.disconnect();
                            return Ok(());
                        }
                        KeyCode::Char('r' | 'R') => {
                            let _ = client.send_reset();
                        }
                        KeyCode::Char('c' | 'C') => {
                            client.disconnect();
                            let _ = client.connect();
                            last_reconnect = Some(Instant::now());
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}
