use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Clear, Paragraph};

use crate::app::App;

const BINDINGS: &[(&str, &str)] = &[
    ("q, ^c", "quit"),
    ("r", "refresh now"),
    ("s", "cycle sort order"),
    ("←↓↑→, hjkl", "move selection"),
    ("Home / End", "first / last host"),
    ("⏎", "expand host"),
    ("esc", "collapse / close help"),
    ("pgup / pgdn", "scroll detail"),
    ("^u / ^d", "scroll detail half-page"),
    ("?", "this help"),
];

pub fn draw(frame: &mut Frame<'_>, app: &App) {
    let palette = &app.palette;
    let area = frame.area();

    let width = 44.min(area.width);
    let height = (BINDINGS.len() as u16 + 2).min(area.height);
    let overlay = Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    };

    let lines: Vec<Line<'static>> = BINDINGS
        .iter()
        .map(|(keys, action)| {
            Line::from(vec![
                Span::styled(
                    format!(" {:<12}", keys),
                    Style::default()
                        .fg(palette.accent)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(action.to_string(), Style::default().fg(palette.text)),
            ])
        })
        .collect();

    let block = Block::bordered()
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(palette.border_selected))
        .title(Line::from(Span::styled(
            " keys ",
            Style::default().fg(palette.title),
        )));

    frame.render_widget(Clear, overlay);
    frame.render_widget(Paragraph::new(lines).block(block), overlay);
}
