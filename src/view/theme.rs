use ratatui::style::Color;

/// Usage below this renders calm.
pub const WARN_THRESHOLD: f64 = 70.0;
/// At or above this renders critical.
pub const CRITICAL_THRESHOLD: f64 = 90.0;

pub const STATUS_CONNECTING_FRAMES: &[char] = &['◐', '◓', '◑', '◒'];
pub const STATUS_RUNNING_FRAMES: &[char] = &['⣾', '⣽', '⣻', '⢿', '⡿', '⣟', '⣯', '⣷'];
pub const STATUS_IDLE: char = '◉';
pub const STATUS_UNREACHABLE: char = '◌';
pub const STATUS_SLOW: char = '◔';

/// One immutable palette, created at startup and passed around by
/// reference. All output is truecolor.
#[derive(Debug, Clone)]
pub struct Palette {
    /// Neon green: below the warn threshold.
    pub ok: Color,
    /// Electric amber: warn band.
    pub warn: Color,
    /// Hot red-pink: critical band.
    pub critical: Color,

    pub text: Color,
    pub dim: Color,
    pub muted: Color,
    pub border: Color,
    pub border_selected: Color,
    pub accent: Color,
    pub title: Color,
    /// Rotation for the running-status spinner.
    pub amber_cycle: [Color; 4],
}

impl Default for Palette {
    fn default() -> Self {
        return Palette {
            ok: Color::Rgb(57, 255, 120),
            warn: Color::Rgb(255, 191, 0),
            critical: Color::Rgb(255, 45, 105),
            text: Color::Rgb(219, 223, 232),
            dim: Color::Rgb(140, 148, 164),
            muted: Color::Rgb(84, 90, 106),
            border: Color::Rgb(62, 70, 88),
            border_selected: Color::Rgb(0, 205, 255),
            accent: Color::Rgb(0, 205, 255),
            title: Color::Rgb(189, 147, 255),
            amber_cycle: [
                Color::Rgb(255, 170, 0),
                Color::Rgb(255, 188, 46),
                Color::Rgb(255, 206, 92),
                Color::Rgb(255, 188, 46),
            ],
        };
    }
}

impl Palette {
    /// Data-magnitude color: calm / warn / critical.
    pub fn threshold_color(&self, percent: f64) -> Color {
        if percent >= CRITICAL_THRESHOLD {
            return self.critical;
        }
        if percent >= WARN_THRESHOLD {
            return self.warn;
        }
        return self.ok;
    }
}
