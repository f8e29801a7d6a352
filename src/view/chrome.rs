use chrono::Local;
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use unicode_width::UnicodeWidthStr;

use crate::app::App;

pub fn header(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let palette = &app.palette;
    let (online, running, connecting, unreachable) = app.status_counts();

    let mut spans = vec![
        Span::styled(
            " rrtop ",
            Style::default()
                .fg(palette.title)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("· ", Style::default().fg(palette.muted)),
        Span::styled(format!("{} up", online), Style::default().fg(palette.ok)),
    ];
    if running > 0 {
        spans.push(Span::styled(
            format!("  {} running", running),
            Style::default().fg(palette.warn),
        ));
    }
    if connecting > 0 {
        spans.push(Span::styled(
            format!("  {} linking", connecting),
            Style::default().fg(palette.dim),
        ));
    }
    if unreachable > 0 {
        spans.push(Span::styled(
            format!("  {} down", unreachable),
            Style::default().fg(palette.critical),
        ));
    }
    spans.push(Span::styled(
        format!("  sort: {}", app.sort_order.label()),
        Style::default().fg(palette.dim),
    ));

    let clock = Local::now().format("%H:%M:%S").to_string();
    let used: usize = spans.iter().map(|span| span.content.width()).sum();
    let pad = (area.width as usize).saturating_sub(used + clock.width() + 1);
    spans.push(Span::raw(" ".repeat(pad)));
    spans.push(Span::styled(clock, Style::default().fg(palette.dim)));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

pub fn footer(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let palette = &app.palette;

    let hints = if app.expanded {
        " esc back  pgup/pgdn scroll  ^u/^d half-page  r refresh  q quit"
    } else {
        " q quit  r refresh  s sort  ←↓↑→/hjkl move  ⏎ expand  ? help"
    };

    let mut spans = vec![Span::styled(hints, Style::default().fg(palette.dim))];

    if let Some(elapsed_ms) = app.last_cycle_ms {
        let mut stats = format!("cycle {}ms", elapsed_ms);
        if app.last_cycle_failures > 0 {
            stats.push_str(&format!(" · {} failed", app.last_cycle_failures));
        }
        let used = hints.width();
        let pad = (area.width as usize).saturating_sub(used + stats.width() + 1);
        spans.push(Span::raw(" ".repeat(pad)));
        spans.push(Span::styled(stats, Style::default().fg(palette.muted)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
