use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Paragraph};
use size::{Base, SizeFormatter, Style as SizeStyle};

use crate::app::App;
use crate::monitor::metrics::HostStatus;
use crate::view::braille::braille_plot;
use crate::view::widgets::gradient_bar;

/// How many samples the big plots look back over.
const PLOT_WINDOW: usize = 240;

pub fn draw(frame: &mut Frame<'_>, app: &App, alias: &str, area: Rect) {
    let palette = &app.palette;
    let state = app.host_states.get(alias).cloned().unwrap_or_default();

    let block = Block::bordered()
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(palette.border_selected))
        .title(Line::from(vec![
            Span::raw(" "),
            Span::styled(
                alias.to_string(),
                Style::default()
                    .fg(palette.text)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(" · expanded ", Style::default().fg(palette.muted)),
        ]));
    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.width < 10 || inner.height == 0 {
        return;
    }

    let width = inner.width as usize;
    let plot_width = width.saturating_sub(2);
    let fmt = SizeFormatter::new()
        .with_base(Base::Base2)
        .with_style(SizeStyle::Abbreviated);
    let mut lines: Vec<Line<'static>> = Vec::new();

    // Connection summary
    {
        let mut spans = vec![Span::styled(
            format!("{:?}", state.status).to_lowercase(),
            Style::default().fg(match state.status {
                HostStatus::Unreachable => palette.critical,
                HostStatus::Running => palette.warn,
                _ => palette.ok,
            }),
        )];
        if !state.connected_via.is_empty() {
            spans.push(Span::styled(
                format!("  via {}", state.connected_via),
                Style::default().fg(palette.dim),
            ));
        }
        if let Some(latency) = state.latency {
            spans.push(Span::styled(
                format!("  {}ms", latency.as_millis()),
                Style::default().fg(palette.dim),
            ));
        }
        lines.push(Line::from(spans));
    }

    if let Some(error) = &state.connection.last_error {
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(palette.critical),
        )));
    }

    if let Some(lock) = &state.lock_info {
        let mut text = format!("⚿ locked by {}", lock.holder);
        if !lock.command.is_empty() {
            text.push_str(&format!(" · {}", lock.command));
        }
        if let Some(started_at) = lock.started_at {
            let age = chrono::Local::now().signed_duration_since(started_at);
            if let Ok(age) = age.to_std() {
                let age = std::time::Duration::from_secs(age.as_secs());
                text.push_str(&format!(" · {} ago", humantime::format_duration(age)));
            }
        }
        lines.push(Line::from(Span::styled(
            text,
            Style::default().fg(palette.warn),
        )));
    }
    lines.push(Line::default());

    let Some(metrics) = &state.metrics else {
        let paragraph = Paragraph::new(lines).scroll((app.detail_scroll, 0));
        frame.render_widget(paragraph, inner);
        return;
    };

    // CPU
    lines.push(section_title(
        format!(
            "CPU {:>5.1}%  ({} cores, load {:.2} {:.2} {:.2})",
            metrics.cpu.percent,
            metrics.cpu.cores,
            metrics.cpu.load_avg[0],
            metrics.cpu.load_avg[1],
            metrics.cpu.load_avg[2]
        ),
        app,
    ));
    if let Some(history) = app.history.get_cpu(alias, PLOT_WINDOW) {
        lines.extend(braille_plot(&history, plot_width, 4, palette.accent, palette));
    }
    lines.push(Line::default());

    // RAM
    lines.push(section_title(
        format!(
            "RAM {:>5.1}%  {} used · {} cached · {} available of {}",
            metrics.ram.percent(),
            fmt.format(metrics.ram.used_bytes),
            fmt.format(metrics.ram.cached_bytes),
            fmt.format(metrics.ram.available_bytes),
            fmt.format(metrics.ram.total_bytes),
        ),
        app,
    ));
    lines.push(gradient_bar(metrics.ram.percent(), plot_width, palette));
    if let Some(history) = app.history.get_ram(alias, PLOT_WINDOW) {
        lines.extend(braille_plot(&history, plot_width, 2, palette.accent, palette));
    }
    lines.push(Line::default());

    // GPU
    if let Some(gpu) = &metrics.gpu {
        let mut title = format!("GPU {:>5.1}%  {}", gpu.percent, gpu.name);
        if gpu.memory_total_bytes > 0 {
            title.push_str(&format!(
                " · {}/{}",
                fmt.format(gpu.memory_used_bytes),
                fmt.format(gpu.memory_total_bytes)
            ));
        }
        if gpu.temperature_c > 0 {
            title.push_str(&format!(" · {}°C", gpu.temperature_c));
        }
        if gpu.power_watts > 0 {
            title.push_str(&format!(" · {}W", gpu.power_watts));
        }
        lines.push(section_title(title, app));
        if let Some(history) = app.history.get_gpu(alias, PLOT_WINDOW) {
            lines.extend(braille_plot(&history, plot_width, 2, palette.accent, palette));
        }
        lines.push(Line::default());
    }

    // Network: one line per interface, rates over the refresh interval
    let rates = app
        .history
        .get_network_rates(alias, app.delay_interval.as_secs_f64());
    if !rates.is_empty() {
        lines.push(section_title("NET".to_string(), app));
        for rate in &rates {
            lines.push(Line::from(vec![
                Span::styled(
                    format!("  {:<10}", rate.name),
                    Style::default().fg(palette.dim),
                ),
                Span::styled(
                    format!("↓ {:>10}/s", fmt.format(rate.bytes_in_per_sec as i64)),
                    Style::default().fg(palette.accent),
                ),
                Span::styled(
                    format!("  ↑ {:>10}/s", fmt.format(rate.bytes_out_per_sec as i64)),
                    Style::default().fg(palette.accent),
                ),
            ]));
        }
        lines.push(Line::default());
    }

    // Processes arrive pre-sorted by CPU from the remote side
    if !metrics.processes.is_empty() {
        lines.push(section_title("TOP PROCESSES".to_string(), app));
        lines.push(Line::from(Span::styled(
            format!(
                "  {:>7} {:<10} {:>6} {:>6} {:>9}  {}",
                "PID", "USER", "%CPU", "%MEM", "TIME", "COMMAND"
            ),
            Style::default().fg(palette.muted),
        )));
        for process in &metrics.processes {
            lines.push(Line::from(vec![
                Span::styled(
                    format!(
                        "  {:>7} {:<10} ",
                        process.pid,
                        truncate(&process.user, 10)
                    ),
                    Style::default().fg(palette.dim),
                ),
                Span::styled(
                    format!("{:>6.1}", process.cpu_percent),
                    Style::default().fg(palette.threshold_color(process.cpu_percent)),
                ),
                Span::styled(
                    format!(" {:>6.1}", process.memory_percent),
                    Style::default().fg(palette.dim),
                ),
                Span::styled(
                    format!(" {:>9}  {}", process.time, process.command),
                    Style::default().fg(palette.text),
                ),
            ]));
        }
    }

    let paragraph = Paragraph::new(lines).scroll((app.detail_scroll, 0));
    frame.render_widget(paragraph, inner);
}

fn section_title(text: String, app: &App) -> Line<'static> {
    return Line::from(Span::styled(
        text,
        Style::default()
            .fg(app.palette.title)
            .add_modifier(Modifier::BOLD),
    ));
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    return text.chars().take(max).collect();
}
