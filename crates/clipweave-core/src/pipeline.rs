use rayon::prelude::*;

use crate::effects::FilterDescriptor;
use crate::error::{CoreError, Result};
use crate::geometry::{Affine, ClipRegion, SourceRect};

// =============================================================================
// FrameBuffer
// =============================================================================

/// An owned RGBA pixel buffer. 4 bytes per pixel, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameBuffer {
    /// Create a new transparent black buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * 4],
        }
    }

    /// Buffer filled with a single color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut fb = Self::new(width, height);
        fb.fill(rgba);
        fb
    }

    /// Opaque black, the export background.
    pub fn black(width: u32, height: u32) -> Self {
        Self::solid(width, height, [0, 0, 0, 255])
    }

    /// Create from existing RGBA data.
    pub fn from_rgba_vec(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(CoreError::invalid_state(format!(
                "RGBA data length {} doesn't match {width}x{height}x4={expected}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Get pixel RGBA at (x, y). Panics if out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        &self.data[idx..idx + 4]
    }

    /// Get mutable pixel RGBA at (x, y). Panics if out of bounds.
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        &mut self.data[idx..idx + 4]
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Total number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn row_bytes(&self) -> usize {
        self.width as usize * 4
    }
}

// =============================================================================
// Color filters
// =============================================================================

fn saturate_matrix(s: f64) -> [[f64; 3]; 3] {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

const SEPIA: [[f64; 3]; 3] = [
    [0.393, 0.769, 0.189],
    [0.349, 0.686, 0.168],
    [0.272, 0.534, 0.131],
];

fn apply_matrix(rgb: [f64; 3], m: &[[f64; 3]; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (i, row) in m.iter().enumerate() {
        out[i] = (row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2]).clamp(0.0, 1.0);
    }
    out
}

/// Apply a color filter in place: brightness, contrast, saturation,
/// grayscale, sepia, then blur. Each stage clamps to the displayable range.
pub fn apply_filter(frame: &mut FrameBuffer, filter: &FilterDescriptor) {
    if filter.is_identity() || frame.is_empty() {
        return;
    }
    let f = *filter;
    let saturation = (f.saturation - 1.0).abs() > 1e-9;
    let sat = saturate_matrix(f.saturation);
    let gray = saturate_matrix(0.0);

    let row_bytes = frame.row_bytes();
    frame.data.par_chunks_exact_mut(row_bytes).for_each(|row| {
        for pixel in row.chunks_exact_mut(4) {
            let mut rgb = [
                pixel[0] as f64 / 255.0,
                pixel[1] as f64 / 255.0,
                pixel[2] as f64 / 255.0,
            ];
            for c in &mut rgb {
                *c = (*c * f.brightness).clamp(0.0, 1.0);
                *c = ((*c - 0.5) * f.contrast + 0.5).clamp(0.0, 1.0);
            }
            if saturation {
                rgb = apply_matrix(rgb, &sat);
            }
            if f.grayscale {
                rgb = apply_matrix(rgb, &gray);
            }
            if f.sepia {
                rgb = apply_matrix(rgb, &SEPIA);
            }
            for (dst, c) in pixel.iter_mut().zip(rgb) {
                *dst = (c * 255.0).round() as u8;
            }
            // alpha unchanged
        }
    });

    let radius = f.blur_px.round() as usize;
    if radius > 0 {
        box_blur(frame, radius);
    }
}

/// Separable box blur over all four channels; edges clamp.
fn box_blur(frame: &mut FrameBuffer, radius: usize) {
    let w = frame.width as usize;
    let h = frame.height as usize;
    let stride = w * 4;

    let src = frame.data.clone();
    frame
        .data
        .par_chunks_exact_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let src_row = &src[y * stride..(y + 1) * stride];
            for x in 0..w {
                let lo = x.saturating_sub(radius);
                let hi = (x + radius).min(w - 1);
                let n = (hi - lo + 1) as u32;
                for c in 0..4 {
                    let sum: u32 = (lo..=hi).map(|i| src_row[i * 4 + c] as u32).sum();
                    row[x * 4 + c] = ((sum + n / 2) / n) as u8;
                }
            }
        });

    let src = frame.data.clone();
    frame
        .data
        .par_chunks_exact_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let lo = y.saturating_sub(radius);
            let hi = (y + radius).min(h - 1);
            let n = (hi - lo + 1) as u32;
            for x in 0..w {
                for c in 0..4 {
                    let sum: u32 = (lo..=hi).map(|r| src[r * stride + x * 4 + c] as u32).sum();
                    row[x * 4 + c] = ((sum + n / 2) / n) as u8;
                }
            }
        });
}

// =============================================================================
// Placement and drawing
// =============================================================================

/// Matrix that aspect-fits a `src_w`x`src_h` image centered in the destination.
pub fn fit_matrix(src_w: f64, src_h: f64, dst_w: u32, dst_h: u32) -> Affine {
    if src_w <= 0.0 || src_h <= 0.0 {
        return Affine::identity();
    }
    let (dw, dh) = (dst_w as f64, dst_h as f64);
    let scale = (dw / src_w).min(dh / src_h);
    let off_x = (dw - src_w * scale) / 2.0;
    let off_y = (dh - src_h * scale) / 2.0;
    Affine::translation(off_x, off_y).then(&Affine::scaling(scale, scale))
}

/// Matrix that stretches a source rectangle over the whole destination.
pub fn fill_matrix(rect: &SourceRect, dst_w: u32, dst_h: u32) -> Affine {
    Affine::scaling(
        dst_w as f64 / rect.width.max(1.0),
        dst_h as f64 / rect.height.max(1.0),
    )
}

/// Porter-Duff "over" of one pixel with source alpha `sa` (0..=255).
fn blend_over(dst: &mut [u8], src: &[u8], sa: u32) {
    if sa == 255 {
        dst[..3].copy_from_slice(&src[..3]);
        dst[3] = 255;
    } else if sa > 0 {
        let da = dst[3] as u32;
        let inv_sa = 255 - sa;
        // out_a = sa + da * (1 - sa/255), scaled to 0..255
        let out_a = sa + ((da * inv_sa + 127) / 255);
        if out_a > 0 {
            for c in 0..3 {
                let sc = src[c] as u32;
                let dc = dst[c] as u32;
                let num = sc * sa + ((dc * da * inv_sa + 127) / 255);
                dst[c] = ((num + out_a / 2) / out_a).min(255) as u8;
            }
            dst[3] = out_a.min(255) as u8;
        }
    }
    // sa == 0: fully transparent source, dst unchanged
}

/// Draw the `source_rect` portion of `src` onto `canvas`.
///
/// `affine` maps coordinates local to `source_rect` (origin at its top-left)
/// into canvas pixels. Sampling is nearest-neighbour through the inverse
/// matrix; `alpha` scales the source alpha and `clip_region`, when set,
/// masks canvas pixels outside it.
pub fn draw_image(
    canvas: &mut FrameBuffer,
    src: &FrameBuffer,
    source_rect: &SourceRect,
    affine: &Affine,
    alpha: f64,
    clip_region: Option<&ClipRegion>,
) {
    if canvas.is_empty() || src.is_empty() || alpha <= 0.0 {
        return;
    }
    let Some(inverse) = affine.invert() else {
        return;
    };
    let alpha = alpha.min(1.0);

    // Bounding box of the transformed rect limits the rows touched.
    let corners = [
        affine.apply(0.0, 0.0),
        affine.apply(source_rect.width, 0.0),
        affine.apply(0.0, source_rect.height),
        affine.apply(source_rect.width, source_rect.height),
    ];
    let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
    let max_y = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);
    let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
    let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
    let y0 = min_y.floor().max(0.0) as usize;
    let y1 = (max_y.ceil().max(0.0) as usize).min(canvas.height as usize);
    let x0 = min_x.floor().max(0.0) as usize;
    let x1 = (max_x.ceil().max(0.0) as usize).min(canvas.width as usize);
    if y0 >= y1 || x0 >= x1 {
        return;
    }

    let row_bytes = canvas.row_bytes();
    let src_w = src.width as f64;
    let src_h = src.height as f64;
    let src_stride = src.row_bytes();

    canvas
        .data
        .par_chunks_exact_mut(row_bytes)
        .enumerate()
        .skip(y0)
        .take(y1 - y0)
        .for_each(|(y, row)| {
            let py = y as f64 + 0.5;
            for x in x0..x1 {
                let px = x as f64 + 0.5;
                if let Some(region) = clip_region {
                    if !region.contains(px, py) {
                        continue;
                    }
                }
                let (u, v) = inverse.apply(px, py);
                if u < 0.0 || v < 0.0 || u >= source_rect.width || v >= source_rect.height {
                    continue;
                }
                let sx = (source_rect.x + u).floor();
                let sy = (source_rect.y + v).floor();
                if sx < 0.0 || sy < 0.0 || sx >= src_w || sy >= src_h {
                    continue;
                }
                let si = sy as usize * src_stride + sx as usize * 4;
                let sample = &src.data[si..si + 4];
                let sa = (sample[3] as f64 * alpha).round() as u32;
                blend_over(&mut row[x * 4..x * 4 + 4], sample, sa);
            }
        });
}

/// Aspect-fit `src` over an opaque black frame of the given size.
pub fn letterbox(src: &FrameBuffer, width: u32, height: u32) -> FrameBuffer {
    let mut canvas = FrameBuffer::black(width, height);
    fit_onto(src, &mut canvas);
    canvas
}

fn fit_onto(clip: &FrameBuffer, canvas: &mut FrameBuffer) {
    if clip.is_empty() || canvas.is_empty() {
        return;
    }
    let scale_x = canvas.width as f64 / clip.width as f64;
    let scale_y = canvas.height as f64 / clip.height as f64;
    let scale = scale_x.min(scale_y);

    let dst_w = (clip.width as f64 * scale).round() as u32;
    let dst_h = (clip.height as f64 * scale).round() as u32;
    if dst_w == 0 || dst_h == 0 {
        return;
    }

    let offset_x = canvas.width.saturating_sub(dst_w) / 2;
    let offset_y = canvas.height.saturating_sub(dst_h) / 2;

    let src_stride = clip.row_bytes();
    let dst_stride = canvas.row_bytes();
    let canvas_w = canvas.width;
    let canvas_h = canvas.height;

    // Nearest-neighbor blit using integer math to avoid f64 division per pixel
    for dy in 0..dst_h {
        let cy = offset_y + dy;
        if cy >= canvas_h {
            break;
        }
        let sy = ((dy as u64 * clip.height as u64) / dst_h as u64).min(clip.height as u64 - 1) as usize;
        let dst_row_offset = cy as usize * dst_stride;
        let src_row_offset = sy * src_stride;

        for dx in 0..dst_w {
            let cx = offset_x + dx;
            if cx >= canvas_w {
                break;
            }
            let sx = ((dx as u64 * clip.width as u64) / dst_w as u64).min(clip.width as u64 - 1) as usize;
            let si = src_row_offset + sx * 4;
            let di = dst_row_offset + cx as usize * 4;
            canvas.data[di..di + 4].copy_from_slice(&clip.data[si..si + 4]);
        }
    }
}
