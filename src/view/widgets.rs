use ratatui::style::Style;
use ratatui::text::{Line, Span};

use crate::view::theme::Palette;

const BLOCKS: &[char] = &['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// One-row sparkline, one block character per sample, newest on the right.
/// Percentage series lock to [0, 100] like the braille plot does.
pub fn sparkline(data: &[f64], width: usize) -> String {
    if data.is_empty() || width == 0 {
        return String::new();
    }

    let samples: Vec<f64> = data.iter().rev().take(width).rev().copied().collect();

    let is_percentage = data.iter().all(|v| (0.0..=100.0).contains(v));
    let (min, max) = if is_percentage {
        (0.0, 100.0)
    } else {
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (min, max)
    };
    let range = max - min;

    return samples
        .iter()
        .map(|&v| {
            if range == 0.0 {
                return BLOCKS[BLOCKS.len() / 2];
            }
            let index = ((v - min) / range * (BLOCKS.len() - 1) as f64).round() as usize;
            return BLOCKS[index.min(BLOCKS.len() - 1)];
        })
        .collect();
}

/// Horizontal meter: `▰▰▰▱▱`. Every filled cell is colored by the
/// percentage its own position stands for, which is what makes the bar
/// read as a gradient as it grows.
pub fn meter(percent: f64, width: usize, palette: &Palette) -> Line<'static> {
    return bar(percent, width, '▰', '▱', palette);
}

/// Plot-style variant of the same bar for wide detail rows.
pub fn gradient_bar(percent: f64, width: usize, palette: &Palette) -> Line<'static> {
    return bar(percent, width, '█', '░', palette);
}

fn bar(percent: f64, width: usize, filled: char, empty: char, palette: &Palette) -> Line<'static> {
    if width == 0 {
        return Line::default();
    }

    let percent = percent.clamp(0.0, 100.0);
    let filled_cells = (percent / 100.0 * width as f64).round() as usize;

    let spans: Vec<Span<'static>> = (0..width)
        .map(|cell| {
            if cell < filled_cells {
                let position_percent = (cell + 1) as f64 / width as f64 * 100.0;
                return Span::styled(
                    filled.to_string(),
                    Style::default().fg(palette.threshold_color(position_percent)),
                );
            }
            return Span::styled(empty.to_string(), Style::default().fg(palette.muted));
        })
        .collect();
    return Line::from(spans);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn line_text(line: &Line<'_>) -> String {
        return line.spans.iter().map(|s| s.content.as_ref()).collect();
    }

    #[test]
    fn test_sparkline_empty() {
        assert_eq!(sparkline(&[], 10), "");
        assert_eq!(sparkline(&[1.0], 0), "");
    }

    #[test]
    fn test_sparkline_percentage_lock() {
        // 0% and 100% map to the extreme blocks
        assert_eq!(sparkline(&[0.0, 100.0], 10), "▁█");
        // A flat half series stays mid-block instead of zooming
        assert_eq!(sparkline(&[50.0, 50.0], 10), "▅▅");
    }

    #[test]
    fn test_sparkline_takes_newest_window() {
        let data = [0.0, 0.0, 0.0, 100.0, 100.0];
        assert_eq!(sparkline(&data, 2), "██");
    }

    #[test]
    fn test_sparkline_free_scale() {
        let rendered = sparkline(&[1000.0, 2000.0], 10);
        assert_eq!(rendered, "▁█");
    }

    #[test]
    fn test_meter_fill_counts() {
        let palette = Palette::default();
        assert_eq!(line_text(&meter(0.0, 4, &palette)), "▱▱▱▱");
        assert_eq!(line_text(&meter(50.0, 4, &palette)), "▰▰▱▱");
        assert_eq!(line_text(&meter(100.0, 4, &palette)), "▰▰▰▰");
    }

    #[test]
    fn test_gradient_bar_glyphs() {
        let palette = Palette::default();
        assert_eq!(line_text(&gradient_bar(50.0, 4, &palette)), "██░░");
    }

    #[test]
    fn test_bar_positional_coloring() {
        let palette = Palette::default();
        let line = meter(100.0, 10, &palette);
        // Cells past the thresholds pick up their own band color
        assert_eq!(line.spans[0].style.fg, Some(palette.ok));
        assert_eq!(line.spans[6].style.fg, Some(palette.warn));
        assert_eq!(line.spans[9].style.fg, Some(palette.critical));
    }

    #[test]
    fn test_bar_low_fill_has_no_hot_colors() {
        let palette = Palette::default();
        let line = meter(30.0, 10, &palette);
        for span in &line.spans {
            assert_eq!(span.style.fg != Some(palette.critical), true);
        }
    }

    #[test]
    fn test_zero_width_bar() {
        let palette = Palette::default();
        assert_eq!(meter(50.0, 0, &palette).spans.len(), 0);
    }
}
