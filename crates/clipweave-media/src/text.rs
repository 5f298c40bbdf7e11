use std::path::Path;

use clipweave_core::overlay::{Rgba, TextOverlay};
use clipweave_core::pipeline::FrameBuffer;
use rusttype::{point, Font, PositionedGlyph, Scale};

use crate::error::{MediaError, Result};

/// Draws text overlays in screen space, after all video layers.
pub trait TextRasterizer {
    fn draw(&self, canvas: &mut FrameBuffer, overlay: &TextOverlay) -> Result<()>;
}

/// Rasterizer backed by a caller-supplied TrueType/OpenType font.
pub struct RusttypeRasterizer {
    font: Font<'static>,
}

impl RusttypeRasterizer {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let font = Font::try_from_vec(bytes).ok_or_else(|| MediaError::Text("unreadable font data".into()))?;
        Ok(Self { font })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    fn layout_line(&self, line: &str, scale: Scale, x: f32, baseline: f32) -> (Vec<PositionedGlyph<'static>>, f32) {
        let glyphs: Vec<_> = self.font.layout(line, scale, point(x, baseline)).collect();
        let width = glyphs
            .last()
            .map(|g| g.position().x - x + g.unpositioned().h_metrics().advance_width)
            .unwrap_or(0.0);
        (glyphs, width)
    }
}

impl TextRasterizer for RusttypeRasterizer {
    fn draw(&self, canvas: &mut FrameBuffer, overlay: &TextOverlay) -> Result<()> {
        if overlay.text.trim().is_empty() || canvas.is_empty() {
            return Ok(());
        }
        let px = overlay
            .style
            .font_px_for_height(canvas.height, overlay.scale.unwrap_or(1.0)) as f32;
        let scale = Scale::uniform(px);
        let metrics = self.font.v_metrics(scale);
        let line_height = metrics.ascent - metrics.descent + metrics.line_gap;

        let lines: Vec<&str> = overlay.text.lines().collect();
        let widths: Vec<f32> = lines
            .iter()
            .map(|line| self.layout_line(line, scale, 0.0, 0.0).1)
            .collect();
        let block_w = widths.iter().copied().fold(0.0, f32::max);
        let block_h = line_height * lines.len() as f32;

        let center_x = (overlay.x / 100.0 * canvas.width as f64) as f32;
        let center_y = (overlay.y / 100.0 * canvas.height as f64) as f32;
        let top = center_y - block_h / 2.0;

        if let Some(bg) = overlay.style.background {
            let pad = px * 0.25;
            fill_rect(
                canvas,
                (center_x - block_w / 2.0 - pad) as i32,
                (top - pad) as i32,
                (block_w + 2.0 * pad).ceil() as i32,
                (block_h + 2.0 * pad).ceil() as i32,
                bg,
            );
        }

        let bold_offset = if overlay.style.bold { (px / 24.0).max(1.0) } else { 0.0 };
        for (i, (line, width)) in lines.iter().zip(&widths).enumerate() {
            let x = center_x - width / 2.0;
            let baseline = top + metrics.ascent + line_height * i as f32;
            let (glyphs, _) = self.layout_line(line, scale, x, baseline);
            draw_glyphs(canvas, &glyphs, 0, overlay.style.color);
            if bold_offset > 0.0 {
                draw_glyphs(canvas, &glyphs, bold_offset.round() as i32, overlay.style.color);
            }
        }
        Ok(())
    }
}

fn draw_glyphs(canvas: &mut FrameBuffer, glyphs: &[PositionedGlyph<'static>], dx: i32, color: Rgba) {
    for glyph in glyphs {
        let Some(bb) = glyph.pixel_bounding_box() else {
            continue;
        };
        glyph.draw(|gx, gy, coverage| {
            let x = bb.min.x + gx as i32 + dx;
            let y = bb.min.y + gy as i32;
            blend_pixel(canvas, x, y, color, coverage);
        });
    }
}

/// Blend a solid rectangle over the canvas; parts outside are dropped.
fn fill_rect(canvas: &mut FrameBuffer, x: i32, y: i32, width: i32, height: i32, color: Rgba) {
    for py in y.max(0)..(y + height).min(canvas.height as i32) {
        for px in x.max(0)..(x + width).min(canvas.width as i32) {
            blend_pixel(canvas, px, py, color, 1.0);
        }
    }
}

fn blend_pixel(canvas: &mut FrameBuffer, x: i32, y: i32, color: Rgba, coverage: f32) {
    if x < 0 || y < 0 || x >= canvas.width as i32 || y >= canvas.height as i32 {
        return;
    }
    let a = (coverage.clamp(0.0, 1.0) * color.3 as f32 / 255.0).clamp(0.0, 1.0);
    if a <= 0.0 {
        return;
    }
    let px = canvas.pixel_mut(x as u32, y as u32);
    for (c, src) in [color.0, color.1, color.2].into_iter().enumerate() {
        px[c] = (src as f32 * a + px[c] as f32 * (1.0 - a)).round() as u8;
    }
    px[3] = px[3].max((a * 255.0).round() as u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_font_is_text_error() {
        let result = RusttypeRasterizer::from_bytes(vec![0, 1, 2, 3]);
        assert!(matches!(result, Err(MediaError::Text(_))));
    }

    #[test]
    fn test_missing_font_file_is_io_error() {
        let result = RusttypeRasterizer::from_file(Path::new("/nonexistent/font.ttf"));
        assert!(matches!(result, Err(MediaError::Io(_))));
    }

    #[test]
    fn test_fill_rect_clips_to_canvas() {
        let mut canvas = FrameBuffer::black(4, 4);
        fill_rect(&mut canvas, -2, 2, 4, 10, Rgba(200, 100, 50, 255));
        assert_eq!(canvas.pixel(0, 2), &[200, 100, 50, 255]);
        assert_eq!(canvas.pixel(1, 3), &[200, 100, 50, 255]);
        assert_eq!(canvas.pixel(2, 2), &[0, 0, 0, 255]);
        assert_eq!(canvas.pixel(0, 1), &[0, 0, 0, 255]);
    }

    #[test]
    fn test_translucent_fill_blends() {
        let mut canvas = FrameBuffer::black(1, 1);
        fill_rect(&mut canvas, 0, 0, 1, 1, Rgba(255, 255, 255, 128));
        let v = canvas.pixel(0, 0)[0];
        assert!((127..=129).contains(&v));
    }
}
