use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::preview::QualityTier;

fn parse_json<T: DeserializeOwned>(s: &str) -> Result<T> {
    Ok(serde_json::from_str(s)?)
}

/// Short-side height of the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ResolutionPreset {
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[default]
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "2160p")]
    P2160,
}

impl ResolutionPreset {
    pub fn short_side(&self) -> u32 {
        match self {
            Self::P480 => 480,
            Self::P720 => 720,
            Self::P1080 => 1080,
            Self::P1440 => 1440,
            Self::P2160 => 2160,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape16x9,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Classic4x3,
}

impl AspectRatio {
    /// Width over height.
    pub fn ratio(&self) -> (u32, u32) {
        match self {
            Self::Landscape16x9 => (16, 9),
            Self::Portrait9x16 => (9, 16),
            Self::Square => (1, 1),
            Self::Classic4x3 => (4, 3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Mp4,
    WebM,
}

impl ExportFormat {
    pub fn video_codec(&self) -> &'static str {
        match self {
            Self::Mp4 => "h264",
            Self::WebM => "vp9",
        }
    }

    pub fn audio_codec(&self) -> &'static str {
        match self {
            Self::Mp4 => "aac",
            Self::WebM => "opus",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::WebM => "webm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportQuality {
    Low,
    #[default]
    Medium,
    High,
    Ultra,
}

impl ExportQuality {
    pub fn bitrate_multiplier(&self) -> f64 {
        match self {
            Self::Low => 0.5,
            Self::Medium => 1.0,
            Self::High => 1.5,
            Self::Ultra => 2.0,
        }
    }
}

/// Bits per pixel per frame at `ExportQuality::Medium`.
const BASE_BITS_PER_PIXEL: f64 = 0.07;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub resolution: ResolutionPreset,
    pub aspect: AspectRatio,
    pub fps: u32,
    pub format: ExportFormat,
    pub quality: ExportQuality,
    pub audio_bitrate_kbps: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            resolution: ResolutionPreset::default(),
            aspect: AspectRatio::default(),
            fps: 30,
            format: ExportFormat::default(),
            quality: ExportQuality::default(),
            audio_bitrate_kbps: 192,
        }
    }
}

impl ExportSettings {
    pub fn from_json_str(s: &str) -> Result<Self> {
        parse_json(s)
    }

    /// Output frame size. The preset fixes the short side; both sides are even.
    pub fn dimensions(&self) -> (u32, u32) {
        let short = self.resolution.short_side();
        let (rw, rh) = self.aspect.ratio();
        let even = |v: f64| ((v / 2.0).round() as u32 * 2).max(2);
        if rw >= rh {
            (even(short as f64 * rw as f64 / rh as f64), short)
        } else {
            (short, even(short as f64 * rh as f64 / rw as f64))
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps.max(1)
    }

    pub fn video_bitrate_kbps(&self) -> u32 {
        let (w, h) = self.dimensions();
        let bits = w as f64 * h as f64 * self.fps() as f64 * BASE_BITS_PER_PIXEL;
        (bits * self.quality.bitrate_multiplier() / 1000.0).round() as u32
    }
}

/// Hardware capability summary handed in by the host; the probing that
/// produces it lives outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityProfile {
    pub recommended_tier: QualityTier,
    pub target_fps: f64,
    pub frame_skipping: bool,
    pub max_preview_height: u32,
    /// Low-end devices get looser sync thresholds.
    pub constrained: bool,
}

impl Default for CapabilityProfile {
    fn default() -> Self {
        Self {
            recommended_tier: QualityTier::High,
            target_fps: 30.0,
            frame_skipping: false,
            max_preview_height: 1080,
            constrained: false,
        }
    }
}

impl CapabilityProfile {
    pub fn from_json_str(s: &str) -> Result<Self> {
        parse_json(s)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (e.g. "info", "clipweave_media=debug,warn").
    pub level: String,
    /// Emit structured JSON lines.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        parse_json(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dimensions() {
        assert_eq!(ExportSettings::default().dimensions(), (1920, 1080));
    }

    #[test]
    fn test_aspect_variants() {
        let mut s = ExportSettings {
            resolution: ResolutionPreset::P720,
            ..ExportSettings::default()
        };
        s.aspect = AspectRatio::Portrait9x16;
        assert_eq!(s.dimensions(), (720, 1280));
        s.aspect = AspectRatio::Square;
        assert_eq!(s.dimensions(), (720, 720));
        s.aspect = AspectRatio::Classic4x3;
        assert_eq!(s.dimensions(), (960, 720));
    }

    #[test]
    fn test_quality_scales_bitrate() {
        let medium = ExportSettings::default();
        let ultra = ExportSettings {
            quality: ExportQuality::Ultra,
            ..ExportSettings::default()
        };
        let diff = ultra.video_bitrate_kbps() as i64 - 2 * medium.video_bitrate_kbps() as i64;
        assert!(diff.abs() <= 1);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let s = ExportSettings::from_json_str(r#"{"resolution":"480p","format":"webm","fps":24}"#).unwrap();
        assert_eq!(s.resolution, ResolutionPreset::P480);
        assert_eq!(s.format.video_codec(), "vp9");
        assert_eq!(s.fps, 24);
        assert_eq!(s.aspect, AspectRatio::Landscape16x9);
        assert_eq!(s.dimensions(), (854, 480));
    }

    #[test]
    fn test_bad_json_is_serialization_error() {
        assert!(matches!(
            LoggingConfig::from_json_str("{"),
            Err(crate::error::CoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_capability_profile_json() {
        let p = CapabilityProfile::from_json_str(r#"{"recommended_tier":"Low","frame_skipping":true}"#).unwrap();
        assert_eq!(p.recommended_tier, QualityTier::Low);
        assert!(p.frame_skipping);
        assert_eq!(p.target_fps, 30.0);
    }
}
