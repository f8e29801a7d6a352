use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::view::theme::Palette;

/// Braille patterns start at U+2800; the low 8 bits select dots.
const BRAILLE_BASE: u32 = 0x2800;

/// Dot-bit offsets of one braille cell, row 0..3 top to bottom, column
/// 0..1 left to right.
const BRAILLE_BITS: [[u8; 2]; 4] = [[0, 3], [1, 4], [2, 5], [6, 7]];

/// A plot cell grid plus the per-column color decisions, kept separate from
/// the styled-text assembly so the rasterizing math is testable on its own.
struct Raster {
    /// `height` rows of `width` braille code points.
    grid: Vec<Vec<u32>>,
    /// Highest sample value that landed in each character column.
    col_max: Vec<f64>,
    is_percentage: bool,
}

/// Plots a series into `width`×`height` braille characters, two points per
/// column, four dot levels per row.
///
/// Columns are colored from the data alone: in percentage mode each column
/// takes the threshold color of its own maximum, never a color derived
/// from the character row. Partial data is right-aligned so the newest
/// sample always sits in the rightmost column.
pub fn braille_plot(
    data: &[f64],
    width: usize,
    height: usize,
    fallback: Color,
    palette: &Palette,
) -> Vec<Line<'static>> {
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let raster = rasterize(data, width, height);

    let colors: Vec<Color> = raster
        .col_max
        .iter()
        .map(|max| {
            if raster.is_percentage {
                return palette.threshold_color(*max);
            }
            return fallback;
        })
        .collect();

    return raster
        .grid
        .into_iter()
        .map(|row| {
            let spans: Vec<Span<'static>> = row
                .into_iter()
                .enumerate()
                .map(|(column, code)| {
                    let glyph = char::from_u32(code).unwrap_or(' ').to_string();
                    return Span::styled(glyph, Style::default().fg(colors[column]));
                })
                .collect();
            return Line::from(spans);
        })
        .collect();
}

fn rasterize(data: &[f64], width: usize, height: usize) -> Raster {
    let total_dots = height * 4;
    let target_points = width * 2;

    // Values that all fit [0, 100] are percentages; lock the display range
    // so a calm series does not zoom into its own noise
    let is_percentage = data.iter().all(|v| (0.0..=100.0).contains(v));
    let (min, max) = if is_percentage {
        (0.0, 100.0)
    } else {
        data.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
            (min.min(*v), max.max(*v))
        })
    };

    let resampled = resample_max(data, target_points);

    let mut grid = vec![vec![BRAILLE_BASE; width]; height];
    let mut col_max = vec![0.0f64; width];

    // Right-align partial data
    let offset = target_points.saturating_sub(resampled.len());

    for (i, value) in resampled.iter().enumerate() {
        let normalized = if max > min {
            ((value - min) / (max - min)).clamp(0.0, 1.0)
        } else {
            0.5
        };
        let dot_height = ((normalized * total_dots as f64).round() as usize).min(total_dots);

        let char_col = (i + offset) / 2;
        if char_col >= width {
            continue;
        }
        let sub_col = (i + offset) % 2;
        col_max[char_col] = col_max[char_col].max(*value);

        for dot in 0..dot_height {
            let row = height - 1 - dot / 4;
            let sub_row = 3 - dot % 4;
            grid[row][char_col] |= 1 << BRAILLE_BITS[sub_row][sub_col];
        }
    }

    return Raster {
        grid,
        col_max,
        is_percentage,
    };
}

/// Bucket-max downsampling: spikes survive, which is the whole point of a
/// utilization plot. Never upsamples.
fn resample_max(data: &[f64], target: usize) -> Vec<f64> {
    if target == 0 || data.len() <= target {
        return data.to_vec();
    }

    let mut out = Vec::with_capacity(target);
    for bucket in 0..target {
        let start = bucket * data.len() / target;
        let end = ((bucket + 1) * data.len() / target).max(start + 1);
        let max = data[start..end]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        out.push(max);
    }
    return out;
}
