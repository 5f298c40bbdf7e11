use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timeline::TimelinePosition;

/// Output height that `TextStyle::font_size` is expressed against.
pub const REFERENCE_HEIGHT: f64 = 1080.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba(pub u8, pub u8, pub u8, pub u8);

impl Rgba {
    pub const WHITE: Rgba = Rgba(255, 255, 255, 255);
    pub const BLACK: Rgba = Rgba(0, 0, 0, 255);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    /// Pixels at a 1080-line output; scaled with the output height.
    pub font_size: f64,
    pub color: Rgba,
    pub background: Option<Rgba>,
    pub bold: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 48.0,
            color: Rgba::WHITE,
            background: None,
            bold: false,
        }
    }
}

impl TextStyle {
    pub fn font_px_for_height(&self, output_height: u32, scale: f64) -> f64 {
        (self.font_size * output_height as f64 / REFERENCE_HEIGHT * scale).max(1.0)
    }
}

/// Free-floating text shown over every video layer on `[start, start + duration)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub id: Uuid,
    pub text: String,
    /// Center of the text block, percent of the canvas.
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub style: TextStyle,
    pub start: TimelinePosition,
    pub duration: Duration,
    #[serde(default)]
    pub scale: Option<f64>,
}

impl TextOverlay {
    pub fn new(text: impl Into<String>, start: TimelinePosition, duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            x: 50.0,
            y: 50.0,
            style: TextStyle::default(),
            start,
            duration,
            scale: None,
        }
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_style(mut self, style: TextStyle) -> Self {
        self.style = style;
        self
    }

    pub fn end(&self) -> TimelinePosition {
        self.start + TimelinePosition::from_duration(self.duration)
    }

    pub fn is_visible_at(&self, t: TimelinePosition) -> bool {
        t >= self.start && t < self.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_is_half_open() {
        let overlay = TextOverlay::new("Title", TimelinePosition::from_secs_f64(1.0), Duration::from_secs(2));
        assert!(!overlay.is_visible_at(TimelinePosition::from_millis(999)));
        assert!(overlay.is_visible_at(TimelinePosition::from_secs_f64(1.0)));
        assert!(overlay.is_visible_at(TimelinePosition::from_millis(2999)));
        assert!(!overlay.is_visible_at(TimelinePosition::from_secs_f64(3.0)));
    }

    #[test]
    fn test_font_scales_with_output_height() {
        let style = TextStyle::default();
        assert_eq!(style.font_px_for_height(1080, 1.0), 48.0);
        assert_eq!(style.font_px_for_height(540, 1.0), 24.0);
        assert_eq!(style.font_px_for_height(540, 2.0), 48.0);
    }
}
