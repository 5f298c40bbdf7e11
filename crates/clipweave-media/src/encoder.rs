use std::time::Duration;

use clipweave_core::pipeline::FrameBuffer;
use clipweave_core::settings::ExportSettings;

use crate::audio::AudioBlock;
use crate::decoder::AudioConfig;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct VideoTrackConfig {
    pub codec: &'static str,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_kbps: u32,
}

impl VideoTrackConfig {
    pub fn from_settings(settings: &ExportSettings) -> Self {
        let (width, height) = settings.dimensions();
        Self {
            codec: settings.format.video_codec(),
            width,
            height,
            fps: settings.fps(),
            bitrate_kbps: settings.video_bitrate_kbps(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrackConfig {
    pub codec: &'static str,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate_kbps: u32,
}

impl AudioTrackConfig {
    pub fn from_settings(settings: &ExportSettings, audio: AudioConfig) -> Self {
        Self {
            codec: settings.format.audio_codec(),
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            bitrate_kbps: settings.audio_bitrate_kbps,
        }
    }
}

/// Output container writer.
///
/// Calls arrive as `start`, track registration, appends with strictly
/// increasing timestamps per track, then `finalize`.
pub trait Muxer {
    fn start(&mut self) -> Result<()>;

    fn add_video_track(&mut self, config: &VideoTrackConfig) -> Result<()>;

    fn add_audio_track(&mut self, config: &AudioTrackConfig) -> Result<()>;

    fn append_video(&mut self, frame: &FrameBuffer, timestamp: Duration) -> Result<()>;

    fn append_audio(&mut self, block: &AudioBlock, timestamp: Duration) -> Result<()>;

    /// Encoded container bytes. An empty buffer means encoding failed.
    fn finalize(&mut self) -> Result<Vec<u8>>;
}
