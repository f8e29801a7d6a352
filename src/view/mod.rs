mod braille;
mod card;
mod chrome;
mod detail;
mod help;
pub mod theme;
mod widgets;

use ratatui::Frame;
use ratatui::layout::{Constraint, Layout};

use crate::app::App;

pub fn draw(frame: &mut Frame<'_>, app: &App) {
    let area = frame.area();

    let footer_visible = app.footer_visible();
    let chunks = if footer_visible {
        Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area)
    } else {
        Layout::vertical([Constraint::Length(1), Constraint::Min(0)]).split(area)
    };

    chrome::header(frame, app, chunks[0]);

    let body = chunks[1];
    match app.selected.clone() {
        Some(alias) if app.expanded => detail::draw(frame, app, &alias, body),
        _ => card::draw_grid(frame, app, body),
    }

    if footer_visible {
        chrome::footer(frame, app, chunks[2]);
    }

    if app.show_help {
        help::draw(frame, app);
    }
}
