//! Decoded PCM blocks as they travel from a [`MediaSource`](crate::decoder::MediaSource)
//! to a [`Muxer`](crate::encoder::Muxer).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sample encoding of one PCM value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    /// Unsigned, silence at 128.
    U8,
    I16,
    I32,
    /// Nominal range -1.0..=1.0.
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleLayout {
    /// One buffer, channels alternating per frame.
    Interleaved,
    /// One buffer per channel.
    Planar,
}

/// A run of PCM samples starting at `timestamp`.
///
/// Samples are little-endian. An interleaved block has exactly one plane,
/// a planar block has one plane per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    pub timestamp: Duration,
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    pub layout: SampleLayout,
    pub planes: Vec<Vec<u8>>,
}

impl AudioBlock {
    pub fn from_f32_interleaved(timestamp: Duration, sample_rate: u32, channels: u16, samples: &[f32]) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * 4);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        Self {
            timestamp,
            sample_rate,
            channels,
            format: SampleFormat::F32,
            layout: SampleLayout::Interleaved,
            planes: vec![bytes],
        }
    }

    pub fn silence(timestamp: Duration, sample_rate: u32, channels: u16, frames: usize) -> Self {
        Self::from_f32_interleaved(timestamp, sample_rate, channels, &vec![0.0; frames * channels as usize])
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        let Some(first) = self.planes.first() else {
            return 0;
        };
        let bps = self.format.bytes_per_sample();
        match self.layout {
            SampleLayout::Interleaved => first.len() / (bps * self.channels.max(1) as usize),
            SampleLayout::Planar => first.len() / bps,
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn is_compatible(&self, sample_rate: u32, channels: u16) -> bool {
        self.sample_rate == sample_rate && self.channels == channels
    }

    /// Scale every sample by `gain`, clamping to the format's range.
    pub fn apply_gain(&mut self, gain: f64) {
        if !gain.is_finite() || (gain - 1.0).abs() < f64::EPSILON {
            return;
        }
        let gain = gain.max(0.0);
        for plane in &mut self.planes {
            match self.format {
                SampleFormat::F32 => {
                    for chunk in plane.chunks_exact_mut(4) {
                        let v = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                        let scaled = (v as f64 * gain).clamp(-1.0, 1.0) as f32;
                        chunk.copy_from_slice(&scaled.to_le_bytes());
                    }
                }
                SampleFormat::I16 => {
                    for chunk in plane.chunks_exact_mut(2) {
                        let v = i16::from_le_bytes([chunk[0], chunk[1]]);
                        let scaled = (v as f64 * gain).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
                        chunk.copy_from_slice(&scaled.to_le_bytes());
                    }
                }
                SampleFormat::I32 => {
                    for chunk in plane.chunks_exact_mut(4) {
                        let v = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                        let scaled = (v as f64 * gain).round().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
                        chunk.copy_from_slice(&scaled.to_le_bytes());
                    }
                }
                SampleFormat::U8 => {
                    for v in plane.iter_mut() {
                        let centered = *v as f64 - 128.0;
                        *v = (centered * gain + 128.0).round().clamp(0.0, 255.0) as u8;
                    }
                }
            }
        }
    }

    /// All samples as interleaved f32 in -1.0..=1.0.
    pub fn to_f32_interleaved(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        let frames = self.frames();
        let bps = self.format.bytes_per_sample();
        let mut out = Vec::with_capacity(frames * channels);
        for frame in 0..frames {
            for ch in 0..channels {
                let (plane, index) = match self.layout {
                    SampleLayout::Interleaved => (0, frame * channels + ch),
                    SampleLayout::Planar => (ch, frame),
                };
                let value = self
                    .planes
                    .get(plane)
                    .and_then(|p| p.get(index * bps..index * bps + bps))
                    .map(|bytes| decode_sample(self.format, bytes))
                    .unwrap_or(0.0);
                out.push(value);
            }
        }
        out
    }
}

fn decode_sample(format: SampleFormat, bytes: &[u8]) -> f32 {
    match format {
        SampleFormat::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        SampleFormat::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
        SampleFormat::I32 => (i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64 / 2_147_483_648.0) as f32,
        SampleFormat::U8 => (bytes[0] as f32 - 128.0) / 128.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i16_block(samples: &[i16], layout: SampleLayout, channels: u16) -> AudioBlock {
        let planes = match layout {
            SampleLayout::Interleaved => vec![samples.iter().flat_map(|s| s.to_le_bytes()).collect()],
            SampleLayout::Planar => {
                let per = samples.len() / channels as usize;
                samples
                    .chunks(per)
                    .map(|c| c.iter().flat_map(|s| s.to_le_bytes()).collect())
                    .collect()
            }
        };
        AudioBlock {
            timestamp: Duration::ZERO,
            sample_rate: 48_000,
            channels,
            format: SampleFormat::I16,
            layout,
            planes,
        }
    }

    #[test]
    fn test_f32_gain_clamps() {
        let mut block = AudioBlock::from_f32_interleaved(Duration::ZERO, 48_000, 2, &[0.25, -0.25, 0.75, -0.75]);
        block.apply_gain(2.0);
        assert_eq!(block.to_f32_interleaved(), vec![0.5, -0.5, 1.0, -1.0]);
    }

    #[test]
    fn test_i16_gain_saturates() {
        let mut block = i16_block(&[1000, -1000, 30000, -30000], SampleLayout::Interleaved, 2);
        block.apply_gain(2.0);
        let values: Vec<i16> = block.planes[0]
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(values, vec![2000, -2000, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_i32_half_gain() {
        let bytes: Vec<u8> = [1_000_000i32, -1_000_000].iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut block = AudioBlock {
            timestamp: Duration::ZERO,
            sample_rate: 44_100,
            channels: 1,
            format: SampleFormat::I32,
            layout: SampleLayout::Interleaved,
            planes: vec![bytes],
        };
        block.apply_gain(0.5);
        let values: Vec<i32> = block.planes[0]
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(values, vec![500_000, -500_000]);
    }

    #[test]
    fn test_u8_gain_is_centered() {
        let mut block = AudioBlock {
            timestamp: Duration::ZERO,
            sample_rate: 8_000,
            channels: 1,
            format: SampleFormat::U8,
            layout: SampleLayout::Interleaved,
            planes: vec![vec![128, 138, 118, 250, 5]],
        };
        block.apply_gain(2.0);
        assert_eq!(block.planes[0], vec![128, 148, 108, 255, 0]);
    }

    #[test]
    fn test_zero_gain_silences() {
        let mut block = i16_block(&[1200, -5, 7, 9], SampleLayout::Planar, 2);
        block.apply_gain(0.0);
        assert!(block.to_f32_interleaved().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_planar_to_interleaved() {
        let block = i16_block(&[16384, 16384, -16384, -16384], SampleLayout::Planar, 2);
        assert_eq!(block.frames(), 2);
        assert_eq!(block.to_f32_interleaved(), vec![0.5, -0.5, 0.5, -0.5]);
    }

    #[test]
    fn test_frames_and_duration() {
        let block = AudioBlock::silence(Duration::ZERO, 48_000, 2, 4800);
        assert_eq!(block.frames(), 4800);
        assert_eq!(block.duration(), Duration::from_millis(100));
        assert!(block.is_compatible(48_000, 2));
        assert!(!block.is_compatible(44_100, 2));
    }
}
