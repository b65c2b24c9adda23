//! FILENAME: pivot-values/src/color.rs
//! PURPOSE: Color parsing, shading and the fixed gray palette used for group summaries.
//! CONTEXT: Header backgrounds are entity colors shaded toward white per nesting level,
//! summary backgrounds come from a 5-step gray palette.

use serde::{Deserialize, Serialize};

pub const COLOR_GRAY100: &str = "#f8f9fa";
pub const COLOR_GRAY200: &str = "#ecf0f1";
pub const COLOR_GRAY300: &str = "#dee2e6";
pub const COLOR_GRAY400: &str = "#ced4da";
pub const COLOR_GRAY500: &str = "#b4bcc2";
pub const COLOR_GRAY600: &str = "#95a5a6";
pub const COLOR_GRAY700: &str = "#7b8a8b";
pub const COLOR_GRAY800: &str = "#343a40";
pub const COLOR_GRAY900: &str = "#212529";

pub const COLOR_PRIMARY: &str = "#253746";
pub const COLOR_LIGHT: &str = COLOR_GRAY200;

/// Backgrounds for group summaries, indexed by nesting level.
pub const GROUP_COLORS: [&str; 5] = [
    COLOR_GRAY100,
    COLOR_GRAY200,
    COLOR_GRAY300,
    COLOR_GRAY400,
    COLOR_GRAY500,
];

/// RGB color representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    /// Parse from hex string (e.g., "#FF0000" or "FF0000").
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Color::new(r, g, b))
    }

    /// Lowercase `#rrggbb`.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Blends toward white for positive `percent`, toward black for negative.
    /// `percent` is a fraction in [-1, 1].
    pub fn shade(&self, percent: f64) -> Color {
        let target = if percent < 0.0 { 0.0 } else { 255.0 };
        let p = percent.abs().min(1.0);
        let channel = |c: u8| -> u8 {
            let c = c as f64;
            // half-up rounding
            (c + ((target - c) * p + 0.5).floor()).clamp(0.0, 255.0) as u8
        };
        Color::new(channel(self.r), channel(self.g), channel(self.b))
    }

    /// Relative luminance in [0, 1].
    pub fn luminance(&self) -> f64 {
        (0.299 * self.r as f64 + 0.587 * self.g as f64 + 0.114 * self.b as f64) / 255.0
    }
}

/// Shades a hex color. Returns `None` when the color cannot be parsed.
pub fn shade_color(hex: &str, percent: f64) -> Option<String> {
    Color::from_hex(hex).map(|c| c.shade(percent).to_hex())
}

/// Summary background for a nesting level, clamped at the last palette entry.
pub fn summary_background(level: usize) -> &'static str {
    GROUP_COLORS[level.min(GROUP_COLORS.len() - 1)]
}

/// Picks a readable text color for the given background.
pub fn contrast_color(background: Option<&str>) -> &'static str {
    match background.and_then(Color::from_hex) {
        Some(color) if color.luminance() <= 0.5 => COLOR_LIGHT,
        _ => COLOR_PRIMARY,
    }
}
