//! Rendering.
//!
//! ┌ DebtWatch ─────────────── ● connected ┐
//! │ ▼ Japan      10Y yield up 12 bp  2m ago│
//! │ ▲ Brazil     Rating upgraded    just now│
//! └───────────────────────────────────────┘
//!  admitted 12  ignored 0  malformed 1  reconnects 2
//!  p: ping   q: quit

use chrono::Utc;
use ratatui::{prelude::*, widgets::*};

use super::app::App;
use super::format::{impact_icon, relative_time};
use shared::channel::ConnectionState;
use shared::types::Impact;

pub fn draw(f: &mut Frame, app: &App) {
    let [main, stats, keys] = Layout::vertical([
        Constraint::Min(5),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(f.area());

    draw_updates(f, main, app);
    draw_stats(f, stats, app);
    draw_keys(f, keys, app);
}

fn status_span(state: ConnectionState) -> Span<'static> {
    match state {
        ConnectionState::Connected => Span::styled("● connected ", Style::default().fg(Color::Green)),
        ConnectionState::Connecting => Span::styled("◌ connecting ", Style::default().fg(Color::Yellow)),
        ConnectionState::Disconnected => Span::styled("○ disconnected ", Style::default().fg(Color::Red)),
    }
}

fn impact_color(impact: Impact) -> Color {
    match impact {
        Impact::Positive => Color::Green,
        Impact::Negative => Color::Red,
        Impact::Neutral => Color::Gray,
    }
}

fn draw_updates(f: &mut Frame, area: Rect, app: &App) {
    let state = app.state();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Line::from(vec![
            Span::styled(" DebtWatch ", Style::default().bold().fg(Color::Cyan)),
            Span::styled(format!(" {} ", app.url()), Style::default().fg(Color::DarkGray)),
        ]))
        .title(Line::from(status_span(state.connection())).right_aligned());

    if state.history().is_empty() {
        let waiting = Paragraph::new("Waiting for updates…")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(waiting, area);
        return;
    }

    let now = Utc::now();
    let rows: Vec<Row> = state
        .history()
        .iter()
        .map(|u| {
            Row::new(vec![
                Cell::from(impact_icon(u.impact)).style(Style::default().fg(impact_color(u.impact))),
                Cell::from(u.country.clone()).style(Style::default().bold()),
                Cell::from(u.description.clone()),
                Cell::from(relative_time(u, now)).style(Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Length(16),
            Constraint::Min(20),
            Constraint::Length(10),
        ],
    )
    .block(block);

    f.render_widget(table, area);
}

fn draw_stats(f: &mut Frame, area: Rect, app: &App) {
    let d = app.state().diagnostics();
    let mut spans = vec![Span::styled(
        format!(
            " admitted {}  ignored {}  malformed {}  reconnects {}",
            d.admitted,
            d.ignored,
            d.malformed,
            d.opened.saturating_sub(1)
        ),
        Style::default().fg(Color::DarkGray),
    )];
    if let Some(err) = &d.last_error {
        spans.push(Span::styled(format!("  last error: {err}"), Style::default().fg(Color::Red)));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_keys(f: &mut Frame, area: Rect, app: &App) {
    let text = match app.notice() {
        Some(notice) => format!(" p: ping   q: quit   {notice}"),
        None => " p: ping   q: quit".to_string(),
    };
    let bar = Paragraph::new(text).style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(bar, area);
}
