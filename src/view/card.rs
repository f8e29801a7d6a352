use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Paragraph};
use size::{Base, SizeFormatter, Style as SizeStyle};

use crate::app::{App, HostState, LayoutMode};
use crate::monitor::metrics::HostStatus;
use crate::view::braille::braille_plot;
use crate::view::theme::{
    Palette, STATUS_CONNECTING_FRAMES, STATUS_IDLE, STATUS_RUNNING_FRAMES, STATUS_SLOW,
    STATUS_UNREACHABLE,
};
use crate::view::widgets::{meter, sparkline};

/// What one card shows at a given layout mode. One renderer reads this
/// instead of four near-identical card functions.
pub struct CardLayout {
    pub height: u16,
    pub meter_width: usize,
    /// Braille rows of CPU history under the meters; 0 disables the plot.
    pub plot_rows: usize,
    pub show_network: bool,
    pub show_load: bool,
}

impl CardLayout {
    pub fn for_mode(mode: LayoutMode) -> Self {
        return match mode {
            LayoutMode::Minimal => CardLayout {
                height: 3,
                meter_width: 8,
                plot_rows: 0,
                show_network: false,
                show_load: false,
            },
            LayoutMode::Compact => CardLayout {
                height: 7,
                meter_width: 14,
                plot_rows: 0,
                show_network: true,
                show_load: true,
            },
            LayoutMode::Standard => CardLayout {
                height: 9,
                meter_width: 12,
                plot_rows: 2,
                show_network: true,
                show_load: true,
            },
            LayoutMode::Wide => CardLayout {
                height: 9,
                meter_width: 18,
                plot_rows: 2,
                show_network: true,
                show_load: true,
            },
        };
    }
}

pub fn draw_grid(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let mode = LayoutMode::for_width(area.width);
    let layout = CardLayout::for_mode(mode);
    let per_row = mode.cards_per_row();

    if app.sorted_hosts.is_empty() || area.height == 0 {
        return;
    }

    let visible_rows = (area.height / layout.height).max(1) as usize;
    let selected_row = app
        .selected
        .as_ref()
        .and_then(|alias| app.sorted_hosts.iter().position(|a| a == alias))
        .unwrap_or(0)
        / per_row;
    // Follow-scroll: keep the selected card inside the viewport
    let top_row = selected_row.saturating_sub(visible_rows.saturating_sub(1));

    let column_width = area.width / per_row as u16;

    for (i, alias) in app.sorted_hosts.iter().enumerate() {
        let row = i / per_row;
        if row < top_row || row >= top_row + visible_rows {
            continue;
        }
        let column = (i % per_row) as u16;
        let y = area.y + ((row - top_row) as u16) * layout.height;
        let height = layout.height.min(area.bottom().saturating_sub(y));
        if height < 3 {
            continue;
        }
        let card_area = Rect {
            x: area.x + column * column_width,
            y,
            width: column_width,
            height,
        };
        draw_card(frame, app, &layout, alias, card_area);
    }
}

fn draw_card(frame: &mut Frame<'_>, app: &App, layout: &CardLayout, alias: &str, area: Rect) {
    let palette = &app.palette;
    let state = app.host_states.get(alias).cloned().unwrap_or_default();
    let selected = app.selected.as_deref() == Some(alias);

    let (glyph, glyph_color) = status_glyph(&state, app.spinner_frame, palette);
    let title = Line::from(vec![
        Span::styled(format!(" {} ", glyph), Style::default().fg(glyph_color)),
        Span::styled(
            alias.to_string(),
            Style::default()
                .fg(palette.text)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
    ]);

    let mut block = Block::bordered()
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(if selected {
            palette.border_selected
        } else {
            palette.border
        }))
        .title(title);
    if !state.connected_via.is_empty() {
        let mut via = format!(" {}", state.connected_via);
        if let Some(latency) = state.latency {
            via.push_str(&format!(" · {}ms", latency.as_millis()));
        }
        via.push(' ');
        block = block.title(
            Line::from(Span::styled(via, Style::default().fg(palette.muted))).right_aligned(),
        );
    }

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines = card_lines(app, layout, alias, &state, inner.width as usize);
    frame.render_widget(Paragraph::new(lines), inner);
}

fn card_lines(
    app: &App,
    layout: &CardLayout,
    alias: &str,
    state: &HostState,
    width: usize,
) -> Vec<Line<'static>> {
    let palette = &app.palette;

    match state.status {
        HostStatus::Connecting => {
            return vec![Line::from(Span::styled(
                app.connecting_text(),
                Style::default().fg(palette.dim),
            ))];
        }
        HostStatus::Unreachable => {
            return unreachable_lines(state, palette);
        }
        HostStatus::Idle | HostStatus::Running | HostStatus::Slow => {}
    }

    let Some(metrics) = &state.metrics else {
        return Vec::new();
    };
    let mut lines = Vec::new();
    let fmt = SizeFormatter::new()
        .with_base(Base::Base2)
        .with_style(SizeStyle::Abbreviated);

    // CPU
    {
        let mut spans = metric_meter("CPU", metrics.cpu.percent, layout.meter_width, palette);
        if layout.show_load {
            let load = metrics.cpu.load_avg;
            spans.push(Span::styled(
                format!("  {:.2} {:.2} {:.2}", load[0], load[1], load[2]),
                Style::default().fg(palette.dim),
            ));
        }
        lines.push(Line::from(spans));
    }

    // RAM
    {
        let percent = metrics.ram.percent();
        let mut spans = metric_meter("RAM", percent, layout.meter_width, palette);
        spans.push(Span::styled(
            format!(
                "  {}/{}",
                fmt.format(metrics.ram.used_bytes),
                fmt.format(metrics.ram.total_bytes)
            ),
            Style::default().fg(palette.dim),
        ));
        lines.push(Line::from(spans));
    }

    // GPU only exists on hosts that have one
    if let Some(gpu) = &metrics.gpu {
        let mut spans = metric_meter("GPU", gpu.percent, layout.meter_width, palette);
        if gpu.memory_total_bytes > 0 {
            spans.push(Span::styled(
                format!(
                    "  {}/{}",
                    fmt.format(gpu.memory_used_bytes),
                    fmt.format(gpu.memory_total_bytes)
                ),
                Style::default().fg(palette.dim),
            ));
        }
        lines.push(Line::from(spans));
    }

    if layout.show_network {
        let (rate_in, rate_out) = app
            .history
            .get_total_network_rate(alias, app.delay_interval.as_secs_f64());
        lines.push(Line::from(vec![
            Span::styled("NET ", Style::default().fg(palette.dim)),
            Span::styled(
                format!("↓ {}/s", fmt.format(rate_in as i64)),
                Style::default().fg(palette.accent),
            ),
            Span::styled(
                format!("  ↑ {}/s", fmt.format(rate_out as i64)),
                Style::default().fg(palette.accent),
            ),
        ]));
    }

    if state.status == HostStatus::Running {
        if let Some(lock) = &state.lock_info {
            let mut text = format!("⚿ {}", lock.holder);
            if !lock.command.is_empty() {
                text.push_str(&format!(" · {}", lock.command));
            }
            lines.push(Line::from(Span::styled(
                text,
                Style::default().fg(palette.warn),
            )));
        }
    }

    if layout.plot_rows > 0 {
        if let Some(history) = app.history.get_cpu(alias, width * 2) {
            lines.extend(braille_plot(
                &history,
                width,
                layout.plot_rows,
                palette.accent,
                palette,
            ));
        }
    } else if let Some(history) = app.history.get_cpu(alias, width) {
        // No room for a plot: squeeze a one-row sparkline in minimal mode
        if matches!(app.layout_mode(), LayoutMode::Minimal) && !history.is_empty() {
            let spark = sparkline(&history, width.saturating_sub(2));
            lines.push(Line::from(Span::styled(
                spark,
                Style::default().fg(palette.accent),
            )));
        }
    }

    return lines;
}

fn unreachable_lines(state: &HostState, palette: &Palette) -> Vec<Line<'static>> {
    let message = state
        .connection
        .last_error
        .clone()
        .unwrap_or_else(|| "unreachable".to_string());
    let (core, suggestion) = split_error(&message);

    let mut lines = vec![Line::from(Span::styled(
        core,
        Style::default().fg(palette.critical),
    ))];
    if let Some(suggestion) = suggestion {
        lines.push(Line::from(Span::styled(
            format!("↳ {}", suggestion),
            Style::default().fg(palette.dim),
        )));
    }
    if state.connection.attempts > 1 {
        lines.push(Line::from(Span::styled(
            format!("attempt {}", state.connection.attempts),
            Style::default().fg(palette.muted),
        )));
    }
    return lines;
}

fn metric_meter(
    label: &'static str,
    percent: f64,
    meter_width: usize,
    palette: &Palette,
) -> Vec<Span<'static>> {
    let mut spans = vec![Span::styled(
        format!("{} ", label),
        Style::default().fg(palette.dim),
    )];
    spans.extend(meter(percent, meter_width, palette).spans);
    spans.push(Span::styled(
        format!(" {:>5.1}%", percent),
        Style::default().fg(palette.threshold_color(percent)),
    ));
    return spans;
}

fn status_glyph(state: &HostState, spinner_frame: usize, palette: &Palette) -> (char, Color) {
    return match state.status {
        HostStatus::Connecting => (
            STATUS_CONNECTING_FRAMES[spinner_frame % STATUS_CONNECTING_FRAMES.len()],
            palette.dim,
        ),
        HostStatus::Idle => (STATUS_IDLE, palette.ok),
        HostStatus::Running => (
            STATUS_RUNNING_FRAMES[spinner_frame % STATUS_RUNNING_FRAMES.len()],
            palette.amber_cycle[spinner_frame % palette.amber_cycle.len()],
        ),
        HostStatus::Slow => (STATUS_SLOW, palette.warn),
        HostStatus::Unreachable => (STATUS_UNREACHABLE, palette.critical),
    };
}

/// First line of the error for the card, plus a "what to do" hint when the
/// message carries one.
pub fn split_error(message: &str) -> (String, Option<String>) {
    const CUES: &[&str] = &["Try:", "Try ", "Check ", "Check:", "Make sure", "Verify "];

    let cue_at = CUES
        .iter()
        .filter_map(|cue| message.find(cue))
        .min();

    let Some(position) = cue_at else {
        let core = message.lines().next().unwrap_or("").trim().to_string();
        return (core, None);
    };

    let suggestion = message[position..]
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .to_string();
    let core = message[..position]
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .trim_end_matches(|c: char| c == '.' || c == ':' || c.is_whitespace())
        .to_string();

    if core.is_empty() {
        return (suggestion, None);
    }
    return (core, Some(suggestion));
}
