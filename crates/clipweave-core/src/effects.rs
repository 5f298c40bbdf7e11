use serde::{Deserialize, Serialize};

use crate::geometry::{Affine, SourceRect};

/// Per-clip color filter. Percent fields are relative to 100 (identity).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoFilter {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub grayscale: bool,
    pub sepia: bool,
    /// Blur radius in output pixels.
    pub blur: f64,
}

impl Default for VideoFilter {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            grayscale: false,
            sepia: false,
            blur: 0.0,
        }
    }
}

impl VideoFilter {
    pub fn is_identity(&self) -> bool {
        FilterDescriptor::from(self).is_identity()
    }
}

/// Normalized filter parameters shared by the raster pipeline and the
/// style backend. Ratios are 1.0 at identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub grayscale: bool,
    pub sepia: bool,
    pub blur_px: f64,
}

impl Default for FilterDescriptor {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<&VideoFilter> for FilterDescriptor {
    fn from(filter: &VideoFilter) -> Self {
        let ratio = |pct: f64| {
            if pct.is_finite() {
                (pct / 100.0).max(0.0)
            } else {
                1.0
            }
        };
        Self {
            brightness: ratio(filter.brightness),
            contrast: ratio(filter.contrast),
            saturation: ratio(filter.saturation),
            grayscale: filter.grayscale,
            sepia: filter.sepia,
            blur_px: if filter.blur.is_finite() {
                filter.blur.max(0.0)
            } else {
                0.0
            },
        }
    }
}

impl FilterDescriptor {
    pub const fn identity() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
            grayscale: false,
            sepia: false,
            blur_px: 0.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        const EPS: f64 = 1e-9;
        (self.brightness - 1.0).abs() < EPS
            && (self.contrast - 1.0).abs() < EPS
            && (self.saturation - 1.0).abs() < EPS
            && !self.grayscale
            && !self.sepia
            && self.blur_px < EPS
    }

    /// CSS `filter` value with the same operation order as [`crate::pipeline::apply_filter`].
    pub fn to_css(&self) -> String {
        if self.is_identity() {
            return "none".to_string();
        }
        let pct = |r: f64| (r * 100.0).round() as i64;
        let mut parts = vec![
            format!("brightness({}%)", pct(self.brightness)),
            format!("contrast({}%)", pct(self.contrast)),
            format!("saturate({}%)", pct(self.saturation)),
        ];
        if self.grayscale {
            parts.push("grayscale(100%)".to_string());
        }
        if self.sepia {
            parts.push("sepia(100%)".to_string());
        }
        if self.blur_px > 0.0 {
            parts.push(format!("blur({}px)", self.blur_px));
        }
        parts.join(" ")
    }
}

/// Rectangular crop, in percent of the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Crop {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Aspect lock used by editing UIs; has no effect on rendering.
    #[serde(default)]
    pub locked: bool,
}

impl Default for Crop {
    fn default() -> Self {
        Self::full()
    }
}

impl Crop {
    pub fn full() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
            locked: false,
        }
    }

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            locked: false,
        }
    }
}

/// Free placement of a clip: anchor position (percent of the output frame),
/// uniform or per-axis scale, and rotation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub scale_x: Option<f64>,
    pub scale_y: Option<f64>,
    pub rotation: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            x: 50.0,
            y: 50.0,
            scale: 1.0,
            scale_x: None,
            scale_y: None,
            rotation: 0.0,
        }
    }
}

impl Transform {
    pub fn scale_factors(&self) -> (f64, f64) {
        (
            self.scale_x.unwrap_or(self.scale),
            self.scale_y.unwrap_or(self.scale),
        )
    }

    pub fn is_identity(&self) -> bool {
        let (sx, sy) = self.scale_factors();
        self.x == 50.0 && self.y == 50.0 && sx == 1.0 && sy == 1.0 && self.rotation == 0.0
    }

    /// Style-backend equivalent of [`transform_matrix`] for an element
    /// absolutely positioned at `left: x%; top: y%`.
    pub fn to_css(&self) -> String {
        let (sx, sy) = self.scale_factors();
        format!(
            "translate(-50%, -50%) rotate({}deg) scale({}, {})",
            self.rotation, sx, sy
        )
    }
}

/// Maps a crop (percent of the source) to a pixel rectangle inside the
/// source frame. Coordinates are clamped to the frame and the rectangle is
/// at least 1x1 pixels.
pub fn crop_source_rect(crop: &Crop, src_w: u32, src_h: u32) -> SourceRect {
    let w = src_w.max(1) as f64;
    let h = src_h.max(1) as f64;
    let clean = |v: f64, fallback: f64| if v.is_finite() { v } else { fallback };

    let x = (clean(crop.x, 0.0) / 100.0 * w).clamp(0.0, w - 1.0);
    let y = (clean(crop.y, 0.0) / 100.0 * h).clamp(0.0, h - 1.0);
    let width = (clean(crop.width, 100.0) / 100.0 * w).clamp(1.0, w - x);
    let height = (clean(crop.height, 100.0) / 100.0 * h).clamp(1.0, h - y);

    SourceRect {
        x,
        y,
        width,
        height,
    }
}

/// Matrix mapping source image pixels onto the destination frame.
///
/// The image is first aspect-fit into the destination, centered on the
/// anchor `(x%, y%)`, then rotated and scaled about that anchor.
pub fn transform_matrix(transform: &Transform, dst_w: u32, dst_h: u32, img_w: u32, img_h: u32) -> Affine {
    let (dw, dh) = (dst_w as f64, dst_h as f64);
    let (iw, ih) = (img_w.max(1) as f64, img_h.max(1) as f64);
    let fit = (dw / iw).min(dh / ih);
    let (sx, sy) = transform.scale_factors();

    let anchor_x = transform.x / 100.0 * dw;
    let anchor_y = transform.y / 100.0 * dh;

    Affine::translation(anchor_x, anchor_y)
        .then(&Affine::rotation_deg(transform.rotation))
        .then(&Affine::scaling(sx * fit, sy * fit))
        .then(&Affine::translation(-iw / 2.0, -ih / 2.0))
}
