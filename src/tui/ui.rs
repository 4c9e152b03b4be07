use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Gauge, Paragraph};
use ratatui::Frame;

use super::app::{App, RunState, View};
use crate::models::GainMode;

const ACCENT: Color = Color::Cyan;
const DIM: Color = Color::DarkGray;
const COMPLETE_COLOR: Color = Color::Green;
const STOPPED_COLOR: Color = Color::Red;
const PROGRESS_COLOR: Color = Color::Yellow;

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(3), // Gauge
            Constraint::Min(3),    // Status
            Constraint::Length(1), // Footer
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_gauge(frame, app, chunks[1]);
    render_status(frame, app, chunks[2]);
    render_footer(frame, app, chunks[3]);

    if app.view == View::About {
        render_about_overlay(frame);
    }
}

fn mode_text(mode: &GainMode) -> String {
    match mode {
        GainMode::TrackGain => "Track gain".to_string(),
        GainMode::TargetNormalize { target_level } => {
            format!("Normalize to {:.1} dB", target_level)
        }
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let text = vec![Line::from(vec![
        Span::styled("Session: ", Style::default().fg(DIM)),
        Span::styled(
            app.path.display().to_string(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled("Mode: ", Style::default().fg(DIM)),
        Span::styled(mode_text(&app.mode), Style::default().fg(Color::White)),
        Span::raw("  "),
        Span::styled("Jobs: ", Style::default().fg(DIM)),
        Span::styled(app.jobs.to_string(), Style::default().fg(Color::White)),
    ])];

    let block = Block::default()
        .title(Span::styled(
            " ReplayGain / Normalization ",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT));

    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn render_gauge(frame: &mut Frame, app: &App, area: Rect) {
    let color = match app.state {
        RunState::Running => PROGRESS_COLOR,
        RunState::Stopping | RunState::Finished { stopped: true } => STOPPED_COLOR,
        RunState::Finished { stopped: false } => COMPLETE_COLOR,
    };
    let label = format!("{}/{} files", app.tally.completed, app.tally.total);

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT)),
        )
        .gauge_style(Style::default().fg(color))
        .ratio(app.tally.ratio())
        .label(label);
    frame.render_widget(gauge, area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let (status, color) = match app.state {
        RunState::Running => ("Analyzing...", PROGRESS_COLOR),
        RunState::Stopping => ("Stopping, waiting for running jobs...", STOPPED_COLOR),
        RunState::Finished { stopped: true } => ("Stopped: no volumes were changed", STOPPED_COLOR),
        RunState::Finished { stopped: false } => ("Finished: volumes adjusted", COMPLETE_COLOR),
    };

    let text = vec![
        Line::from(Span::styled(status, Style::default().fg(color))),
        Line::from(Span::styled(
            format!("Elapsed: {:.1}s", app.elapsed().as_secs_f64()),
            Style::default().fg(DIM),
        )),
    ];

    let paragraph = Paragraph::new(text)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT)),
        );
    frame.render_widget(paragraph, area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let keys = match (&app.view, app.state) {
        (View::About, _) => "[Esc] close",
        (View::Main, RunState::Running) => "[s]top  [a]bout  [q]uit",
        (View::Main, _) => "[a]bout  [q]uit",
    };
    let footer = Paragraph::new(keys)
        .style(Style::default().fg(DIM))
        .alignment(Alignment::Center);
    frame.render_widget(footer, area);
}

fn render_about_overlay(frame: &mut Frame) {
    let area = centered_rect(44, 10, frame.area());
    frame.render_widget(Clear, area);

    let text = vec![
        Line::from(Span::styled(
            "rgain",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!("Version {}", env!("CARGO_PKG_VERSION"))),
        Line::from(""),
        Line::from("Replay gain volume normalization."),
        Line::from("Stopping discards the whole batch."),
        Line::from(""),
        Line::from(Span::styled("[Esc] close", Style::default().fg(DIM))),
    ];

    let block = Block::default()
        .title(" About ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT));

    let paragraph = Paragraph::new(text)
        .alignment(Alignment::Center)
        .block(block);
    frame.render_widget(paragraph, area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}
