//! Read-only terminal visualizer over drive state.
//!
//! Polls a snapshot of every drive's position/activity at a low fixed rate
//! on its own thread. It never touches the allocator's live structures and
//! cannot stall the event loop: it only ever reads the atomically published
//! `half_period_us`/`active` pair plus the pin numbers.

use crate::drive::Drive;
use ratatui::crossterm::event::{self, Event, KeyCode};
use ratatui::crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use ratatui::style::{Color, Style};
use ratatui::widgets::{Block, Borders, Gauge};
use ratatui::{Frame, Terminal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const POLL_RATE: Duration = Duration::from_millis(66); // ~15Hz

pub fn run(drives: Arc<Vec<Drive>>, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let backend = ratatui::backend::CrosstermBackend::new(std::io::stdout());
    let mut terminal = Terminal::new(backend)?;

    while running.load(Ordering::Acquire) {
        terminal.draw(|f| draw(f, &drives))?;

        if event::poll(POLL_RATE)? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('q') || key.code == KeyCode::Esc {
                    running.store(false, Ordering::Release);
                }
            }
        }
    }

    disable_raw_mode()?;
    Ok(())
}

fn draw(f: &mut Frame, drives: &[Drive]) {
    let area = f.area();
    let rows = ratatui::layout::Layout::default()
        .direction(ratatui::layout::Direction::Vertical)
        .constraints(vec![
            ratatui::layout::Constraint::Length(3);
            drives.len().max(1)
        ])
        .split(area);

    for (drive, row) in drives.iter().zip(rows.iter()) {
        let active = drive.is_active();
        let label = format!(
            "drive {} (step {}, dir {})",
            drive.id, drive.step_pin, drive.dir_pin
        );
        let gauge = Gauge::default()
            .block(Block::default().title(label).borders(Borders::ALL))
            .gauge_style(Style::default().fg(if active { Color::Green } else { Color::DarkGray }))
            .ratio(if active { 1.0 } else { 0.0 });
        f.render_widget(gauge, *row);
    }
}
