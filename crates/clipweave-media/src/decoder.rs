use std::ops::Range;
use std::time::Duration;

use clipweave_core::media::MediaAsset;
use clipweave_core::pipeline::FrameBuffer;

use crate::audio::AudioBlock;
use crate::error::Result;

/// Decoded video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// RGBA pixels at the source's native size.
    pub image: FrameBuffer,
    /// Presentation timestamp in source time.
    pub timestamp: Duration,
}

impl VideoFrame {
    pub fn new(image: FrameBuffer, timestamp: Duration) -> Self {
        Self { image, timestamp }
    }
}

/// Channel layout and rate of a source's audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub duration: Duration,
    /// Native frame size, absent for audio-only sources.
    pub dimensions: Option<(u32, u32)>,
    pub fps: Option<f64>,
    pub audio: Option<AudioConfig>,
    pub codec_name: String,
}

pub type VideoFrames = Box<dyn Iterator<Item = Result<VideoFrame>>>;
pub type AudioBlocks = Box<dyn Iterator<Item = Result<AudioBlock>>>;

/// An opened media file.
///
/// Streams are time-ordered and cover `range` in source time. A stream may
/// start with the last sample before `range.start` so callers can hold it.
pub trait MediaSource {
    fn probe(&self) -> Result<SourceInfo>;

    fn video_frames(&mut self, range: Range<Duration>) -> Result<VideoFrames>;

    fn audio_blocks(&mut self, range: Range<Duration>) -> Result<AudioBlocks>;
}

/// Resolves a library asset to a readable source.
pub trait MediaOpener {
    fn open(&self, asset: &MediaAsset) -> Result<Box<dyn MediaSource>>;
}
