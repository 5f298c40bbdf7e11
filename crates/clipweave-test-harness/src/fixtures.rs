//! In-memory media for driving the export and preview paths without
//! real files, plus helpers that generate real files with the ffmpeg CLI.

use std::cell::Cell;
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use clipweave_core::media::MediaAsset;
use clipweave_core::overlay::TextOverlay;
use clipweave_core::pipeline::FrameBuffer;
use clipweave_core::preview::{PlaybackSurface, SurfaceStatus};
use clipweave_media::audio::AudioBlock;
use clipweave_media::decoder::{
    AudioBlocks, AudioConfig, MediaOpener, MediaSource, SourceInfo, VideoFrame, VideoFrames,
};
use clipweave_media::encoder::{AudioTrackConfig, Muxer, VideoTrackConfig};
use clipweave_media::error::{MediaError, Result};
use clipweave_media::text::TextRasterizer;
use uuid::Uuid;

// =============================================================================
// Synthetic sources
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticVideo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub color: [u8; 4],
    /// A single frame at time zero.
    pub still: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticAudio {
    pub sample_rate: u32,
    pub channels: u16,
    /// Constant sample value on every channel.
    pub level: f32,
    pub block_frames: usize,
}

/// Description of a fake media file.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticMedia {
    pub duration: Duration,
    pub video: Option<SyntheticVideo>,
    pub audio: Option<SyntheticAudio>,
    /// Video decode fails after this many frames.
    pub fail_video_after: Option<usize>,
}

impl SyntheticMedia {
    pub fn video(duration_secs: f64, width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            duration: Duration::from_secs_f64(duration_secs),
            video: Some(SyntheticVideo {
                width,
                height,
                fps: 30.0,
                color,
                still: false,
            }),
            audio: None,
            fail_video_after: None,
        }
    }

    pub fn audio(duration_secs: f64, sample_rate: u32, channels: u16, level: f32) -> Self {
        Self {
            duration: Duration::from_secs_f64(duration_secs),
            video: None,
            audio: None,
            fail_video_after: None,
        }
        .with_audio(sample_rate, channels, level)
    }

    pub fn image(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            duration: Duration::ZERO,
            video: Some(SyntheticVideo {
                width,
                height,
                fps: 0.0,
                color,
                still: true,
            }),
            audio: None,
            fail_video_after: None,
        }
    }

    pub fn with_audio(mut self, sample_rate: u32, channels: u16, level: f32) -> Self {
        self.audio = Some(SyntheticAudio {
            sample_rate,
            channels,
            level,
            block_frames: 1024,
        });
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        if let Some(video) = self.video.as_mut() {
            video.fps = fps;
        }
        self
    }

    pub fn failing_after(mut self, frames: usize) -> Self {
        self.fail_video_after = Some(frames);
        self
    }

    fn frames(&self, range: Range<Duration>) -> Result<VideoFrames> {
        let video = self.video.clone().ok_or(MediaError::NoVideoStream)?;
        let image = FrameBuffer::solid(video.width, video.height, video.color);
        if video.still {
            return Ok(Box::new(std::iter::once(Ok(VideoFrame::new(image, Duration::ZERO)))));
        }

        let end = range.end.min(self.duration);
        let fps = video.fps.max(1.0);
        // Start with the frame at or before the range start.
        let first = (range.start.as_secs_f64() * fps).floor() as u64;
        let fail_after = self.fail_video_after;
        let frames = (first..)
            .map(move |i| Duration::from_secs_f64(i as f64 / fps))
            .take_while(move |ts| *ts < end)
            .enumerate()
            .map(move |(n, ts)| {
                if fail_after.is_some_and(|limit| n >= limit) {
                    Err(MediaError::DecoderError("synthetic decode failure".into()))
                } else {
                    Ok(VideoFrame::new(image.clone(), ts))
                }
            });
        Ok(Box::new(frames))
    }

    fn blocks(&self, range: Range<Duration>) -> Result<AudioBlocks> {
        let audio = self.audio.clone().ok_or(MediaError::NoAudioStream)?;
        let rate = audio.sample_rate as u64;
        let block = audio.block_frames.max(1) as u64;
        let to_samples = |d: Duration| (d.as_nanos() * rate as u128 / 1_000_000_000) as u64;
        let total = to_samples(self.duration);
        let first = to_samples(range.start) / block;
        let last = to_samples(range.end).min(total);

        let blocks = (first..)
            .map(move |k| k * block)
            .take_while(move |start| *start < last)
            .map(move |start| {
                let frames = block.min(total - start) as usize;
                let samples = vec![audio.level; frames * audio.channels as usize];
                let ts = Duration::from_nanos(start * 1_000_000_000 / rate);
                Ok(AudioBlock::from_f32_interleaved(ts, audio.sample_rate, audio.channels, &samples))
            });
        Ok(Box::new(blocks))
    }
}

pub struct SyntheticSource {
    media: SyntheticMedia,
}

impl MediaSource for SyntheticSource {
    fn probe(&self) -> Result<SourceInfo> {
        let media = &self.media;
        Ok(SourceInfo {
            duration: media.duration,
            dimensions: media.video.as_ref().map(|v| (v.width, v.height)),
            fps: media.video.as_ref().filter(|v| !v.still).map(|v| v.fps),
            audio: media.audio.as_ref().map(|a| AudioConfig {
                sample_rate: a.sample_rate,
                channels: a.channels,
            }),
            codec_name: "synthetic".into(),
        })
    }

    fn video_frames(&mut self, range: Range<Duration>) -> Result<VideoFrames> {
        self.media.frames(range)
    }

    fn audio_blocks(&mut self, range: Range<Duration>) -> Result<AudioBlocks> {
        self.media.blocks(range)
    }
}

/// Opener serving [`SyntheticMedia`] by asset id.
#[derive(Default)]
pub struct SyntheticOpener {
    media: HashMap<Uuid, SyntheticMedia>,
    opens: Cell<usize>,
}

impl SyntheticOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, asset: &MediaAsset, media: SyntheticMedia) -> Self {
        self.media.insert(asset.id, media);
        self
    }

    /// Number of `open` calls so far.
    pub fn opens(&self) -> usize {
        self.opens.get()
    }
}

impl MediaOpener for SyntheticOpener {
    fn open(&self, asset: &MediaAsset) -> Result<Box<dyn MediaSource>> {
        self.opens.set(self.opens.get() + 1);
        let media = self
            .media
            .get(&asset.id)
            .cloned()
            .ok_or_else(|| MediaError::OpenFailed(asset.source.display().to_string()))?;
        Ok(Box::new(SyntheticSource { media }))
    }
}

// =============================================================================
// Recording muxer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub timestamp: Duration,
    pub width: u32,
    pub height: u32,
    pub checksum: u64,
    /// Pixel at the frame center.
    pub center: [u8; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedBlock {
    pub timestamp: Duration,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl RecordedBlock {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0, |acc, s| acc.max(s.abs()))
    }
}

/// Muxer that keeps a summary of everything appended. `finalize` returns
/// the frame checksums as bytes, so identical renders give identical output.
#[derive(Debug, Default)]
pub struct RecordingMuxer {
    pub started: bool,
    pub video_config: Option<VideoTrackConfig>,
    pub audio_config: Option<AudioTrackConfig>,
    pub frames: Vec<RecordedFrame>,
    pub blocks: Vec<RecordedBlock>,
    /// Full images, only kept when requested.
    pub images: Vec<FrameBuffer>,
    pub finalized: bool,
    keep_images: bool,
    empty_output: bool,
}

impl RecordingMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keeping_images() -> Self {
        Self {
            keep_images: true,
            ..Self::default()
        }
    }

    /// A muxer whose `finalize` produces no bytes.
    pub fn producing_nothing() -> Self {
        Self {
            empty_output: true,
            ..Self::default()
        }
    }

    pub fn frame_timestamps(&self) -> Vec<Duration> {
        self.frames.iter().map(|f| f.timestamp).collect()
    }

    pub fn block_timestamps(&self) -> Vec<Duration> {
        self.blocks.iter().map(|b| b.timestamp).collect()
    }

    /// Total audio length appended, in seconds.
    pub fn audio_secs(&self) -> f64 {
        self.blocks
            .iter()
            .map(|b| b.frames() as f64 / b.sample_rate.max(1) as f64)
            .sum()
    }
}

fn checksum(data: &[u8]) -> u64 {
    // FNV-1a
    data.iter().fold(0xcbf29ce484222325u64, |hash, byte| {
        (hash ^ *byte as u64).wrapping_mul(0x100000001b3)
    })
}

impl Muxer for RecordingMuxer {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn add_video_track(&mut self, config: &VideoTrackConfig) -> Result<()> {
        self.video_config = Some(config.clone());
        Ok(())
    }

    fn add_audio_track(&mut self, config: &AudioTrackConfig) -> Result<()> {
        self.audio_config = Some(config.clone());
        Ok(())
    }

    fn append_video(&mut self, frame: &FrameBuffer, timestamp: Duration) -> Result<()> {
        let center = if frame.is_empty() {
            [0; 4]
        } else {
            let px = frame.pixel(frame.width / 2, frame.height / 2);
            [px[0], px[1], px[2], px[3]]
        };
        self.frames.push(RecordedFrame {
            timestamp,
            width: frame.width,
            height: frame.height,
            checksum: checksum(&frame.data),
            center,
        });
        if self.keep_images {
            self.images.push(frame.clone());
        }
        Ok(())
    }

    fn append_audio(&mut self, block: &AudioBlock, timestamp: Duration) -> Result<()> {
        self.blocks.push(RecordedBlock {
            timestamp,
            sample_rate: block.sample_rate,
            channels: block.channels,
            samples: block.to_f32_interleaved(),
        });
        Ok(())
    }

    fn finalize(&mut self) -> Result<Vec<u8>> {
        self.finalized = true;
        if self.empty_output {
            return Ok(Vec::new());
        }
        Ok(self.frames.iter().flat_map(|f| f.checksum.to_le_bytes()).collect())
    }
}

// =============================================================================
// Text and preview stand-ins
// =============================================================================

/// Paints a 3x3 block of the overlay color at the overlay center.
#[derive(Debug, Default)]
pub struct StubTextRasterizer {
    draws: Cell<usize>,
}

impl StubTextRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draws(&self) -> usize {
        self.draws.get()
    }
}

impl TextRasterizer for StubTextRasterizer {
    fn draw(&self, canvas: &mut FrameBuffer, overlay: &TextOverlay) -> Result<()> {
        self.draws.set(self.draws.get() + 1);
        if canvas.is_empty() {
            return Ok(());
        }
        let cx = (overlay.x / 100.0 * canvas.width as f64) as i64;
        let cy = (overlay.y / 100.0 * canvas.height as f64) as i64;
        let c = overlay.style.color;
        for y in cy - 1..=cy + 1 {
            for x in cx - 1..=cx + 1 {
                if x >= 0 && y >= 0 && (x as u32) < canvas.width && (y as u32) < canvas.height {
                    canvas.pixel_mut(x as u32, y as u32).copy_from_slice(&[c.0, c.1, c.2, c.3]);
                }
            }
        }
        Ok(())
    }
}

/// Playback surface that records every command it receives.
#[derive(Debug, Clone)]
pub struct FakeSurface {
    pub status: SurfaceStatus,
    pub position: Option<Duration>,
    pub playing: bool,
    pub muted: bool,
    pub volume: f64,
    pub rate: f64,
    pub seeks: Vec<Duration>,
}

impl Default for FakeSurface {
    fn default() -> Self {
        Self {
            status: SurfaceStatus::Ready,
            position: Some(Duration::ZERO),
            playing: false,
            muted: false,
            volume: 1.0,
            rate: 1.0,
            seeks: Vec::new(),
        }
    }
}

impl FakeSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failed() -> Self {
        Self {
            status: SurfaceStatus::Failed,
            position: None,
            ..Self::default()
        }
    }

    /// Let `wall` elapse; a playing surface moves at its rate.
    pub fn advance(&mut self, wall: Duration) {
        if self.playing {
            if let Some(pos) = self.position.as_mut() {
                *pos += wall.mul_f64(self.rate);
            }
        }
    }
}

impl PlaybackSurface for FakeSurface {
    fn status(&self) -> SurfaceStatus {
        self.status
    }

    fn position(&self) -> Option<Duration> {
        self.position
    }

    fn seek(&mut self, source_time: Duration) {
        self.position = Some(source_time);
        self.seeks.push(source_time);
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume;
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }
}

// =============================================================================
// ffmpeg CLI fixtures
// =============================================================================

/// Generate a small test video using ffmpeg's lavfi test source.
/// Returns the path to the generated file.
pub fn generate_test_video(output_dir: &Path, name: &str, duration_secs: f64) -> PathBuf {
    let output_path = output_dir.join(format!("{name}.mp4"));

    let status = Command::new("ffmpeg")
        .args([
            "-y",
            "-f",
            "lavfi",
            "-i",
            &format!("testsrc=duration={duration_secs}:size=320x240:rate=30"),
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-preset",
            "ultrafast",
        ])
        .arg(&output_path)
        .stderr(std::process::Stdio::null())
        .status()
        .expect("ffmpeg must be installed to generate test fixtures");

    assert!(status.success(), "ffmpeg failed to generate test video {name}");
    assert!(output_path.exists(), "test video was not created: {name}");

    output_path
}

/// Generate a test video with a 440 Hz tone.
pub fn generate_test_video_with_audio(output_dir: &Path, name: &str, duration_secs: f64) -> PathBuf {
    let output_path = output_dir.join(format!("{name}.mp4"));

    let status = Command::new("ffmpeg")
        .args([
            "-y",
            "-f",
            "lavfi",
            "-i",
            &format!("testsrc=duration={duration_secs}:size=320x240:rate=30"),
            "-f",
            "lavfi",
            "-i",
            &format!("sine=frequency=440:duration={duration_secs}"),
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-preset",
            "ultrafast",
            "-c:a",
            "aac",
            "-shortest",
        ])
        .arg(&output_path)
        .stderr(std::process::Stdio::null())
        .status()
        .expect("ffmpeg must be installed to generate test fixtures");

    assert!(status.success(), "ffmpeg failed to generate test video with audio {name}");

    output_path
}

/// Get a temporary directory for test fixtures that persists for the test run.
pub fn fixture_dir() -> tempfile::TempDir {
    tempfile::TempDir::new().expect("failed to create temp dir for fixtures")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipweave_core::media::MediaKind;

    fn asset() -> MediaAsset {
        MediaAsset::new("clip", MediaKind::Video, "clip.mp4".into(), Duration::from_secs(2))
    }

    #[test]
    fn test_synthetic_frames_cover_range() {
        let asset = asset();
        let opener = SyntheticOpener::new().with(&asset, SyntheticMedia::video(2.0, 4, 4, [255, 0, 0, 255]));
        let mut source = opener.open(&asset).unwrap();
        let frames: Vec<VideoFrame> = source
            .video_frames(Duration::from_millis(500)..Duration::from_secs(1))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(frames.len(), 15);
        assert_eq!(frames[0].timestamp, Duration::from_millis(500));
        assert_eq!(frames[0].image.pixel(0, 0), &[255, 0, 0, 255]);
        assert_eq!(opener.opens(), 1);
    }

    #[test]
    fn test_synthetic_audio_truncates_last_block() {
        let asset = asset();
        let opener = SyntheticOpener::new().with(&asset, SyntheticMedia::audio(0.05, 48_000, 2, 0.25));
        let mut source = opener.open(&asset).unwrap();
        let blocks: Vec<AudioBlock> = source
            .audio_blocks(Duration::ZERO..Duration::from_secs(1))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let total: usize = blocks.iter().map(|b| b.frames()).sum();
        assert_eq!(total, 2_400);
        assert_eq!(blocks.len(), 3);
    }

    #[test]
    fn test_unknown_asset_fails_to_open() {
        let opener = SyntheticOpener::new();
        assert!(matches!(opener.open(&asset()), Err(MediaError::OpenFailed(_))));
    }

    #[test]
    fn test_fake_surface_advances_while_playing() {
        let mut surface = FakeSurface::new();
        surface.advance(Duration::from_secs(1));
        assert_eq!(surface.position, Some(Duration::ZERO));
        surface.play();
        surface.set_rate(2.0);
        surface.advance(Duration::from_secs(1));
        assert_eq!(surface.position, Some(Duration::from_secs(2)));
    }

    #[test]
    #[ignore = "needs the ffmpeg binary"]
    fn test_generate_test_video() {
        let dir = fixture_dir();
        let path = generate_test_video(dir.path(), "test_basic", 1.0);
        let metadata = std::fs::metadata(&path).unwrap();
        assert!(metadata.len() > 0, "generated video should not be empty");
    }

    #[test]
    #[ignore = "needs the ffmpeg binary"]
    fn test_generate_test_video_with_audio() {
        let dir = fixture_dir();
        let path = generate_test_video_with_audio(dir.path(), "test_audio", 1.0);
        assert!(path.exists());
    }
}
