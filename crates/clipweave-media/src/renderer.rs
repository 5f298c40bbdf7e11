//! Offline export.
//!
//! Video is rendered on a constant frame grid: every output frame asks the
//! resolver which layers are visible and draws them bottom to top, so export
//! and preview agree on what is on screen. Audio is mixed on a grid of fixed
//! size blocks from every source the resolver reports as audible.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clipweave_core::effects::{crop_source_rect, transform_matrix, FilterDescriptor};
use clipweave_core::error::CoreError;
use clipweave_core::geometry::{Affine, SourceRect};
use clipweave_core::media::{MediaAsset, SourceLibrary};
use clipweave_core::pipeline::{apply_filter, draw_image, fill_matrix, fit_matrix, letterbox, FrameBuffer};
use clipweave_core::resolver::{has_live_detached_audio, resolve};
use clipweave_core::settings::ExportSettings;
use clipweave_core::timeline::{Clip, ClipKind, Timeline, TimelinePosition, TrackKind};
use clipweave_core::transition::evaluate_at;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::AudioBlock;
use crate::decoder::{AudioBlocks, AudioConfig, MediaOpener, MediaSource, VideoFrame, VideoFrames};
use crate::encoder::{AudioTrackConfig, Muxer, VideoTrackConfig};
use crate::error::{MediaError, Result};
use crate::progress::{ProgressReporter, RenderStage};
use crate::text::TextRasterizer;

/// Gaps between clips no longer than this are bridged instead of filled
/// with black.
pub const GAP_EPSILON: Duration = Duration::from_millis(10);

/// Samples per channel in each muxed audio block.
pub const AUDIO_BLOCK_FRAMES: usize = 1024;

/// Decoded frames this close after the target still count as "at" it.
const FRAME_TOLERANCE: Duration = Duration::from_micros(500);

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Shared flag that stops an export at the next frame or audio block.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(MediaError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything an export reads. The timeline is a snapshot, so edits made
/// while the export runs are not observed.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub timeline: Timeline,
    pub library: SourceLibrary,
    pub settings: ExportSettings,
}

impl ExportJob {
    pub fn new(timeline: &Timeline, library: &SourceLibrary, settings: ExportSettings) -> Self {
        Self {
            timeline: timeline.clone(),
            library: library.clone(),
            settings,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOutput {
    /// Finalized container bytes.
    pub bytes: Vec<u8>,
    pub video_frames: u64,
    pub audio_blocks: u64,
    /// Source audio blocks dropped for not matching `audio`.
    pub skipped_audio_blocks: u64,
    pub duration: Duration,
    pub audio: AudioConfig,
}

/// Render the timeline to the muxer.
///
/// Decode failures abort with the failing clip's id. Incompatible audio
/// blocks are logged, counted and skipped.
pub fn render_timeline(
    job: &ExportJob,
    opener: &dyn MediaOpener,
    muxer: &mut dyn Muxer,
    text: &dyn TextRasterizer,
    progress: &mut ProgressReporter,
    cancel: &CancellationToken,
) -> Result<ExportOutput> {
    job.timeline.validate()?;
    let total = job.timeline.duration();
    if total.is_zero() {
        return Err(CoreError::invalid_state("timeline is empty").into());
    }

    progress.set_stage(RenderStage::Setup);
    let (width, height) = job.settings.dimensions();
    let fps = job.settings.fps();
    let total_frames = frame_count(total, fps);
    let audio = choose_audio_config(job, opener)?;
    let total_samples = sample_count(total, audio.sample_rate);
    let total_blocks = total_samples.div_ceil(AUDIO_BLOCK_FRAMES as u64);
    let units = total_frames + total_blocks;

    info!(
        width,
        height,
        fps,
        frames = total_frames,
        duration_secs = total.as_secs_f64(),
        sample_rate = audio.sample_rate,
        channels = audio.channels,
        format = job.settings.format.extension(),
        "export started"
    );

    muxer.start()?;
    muxer.add_video_track(&VideoTrackConfig::from_settings(&job.settings))?;
    muxer.add_audio_track(&AudioTrackConfig::from_settings(&job.settings, audio))?;
    progress.report(0, units);

    progress.set_stage(RenderStage::VideoEncoding);
    let mut compositor = FrameCompositor::new(job, opener, text, width, height);
    let mut black_run = 0u64;
    for index in 0..total_frames {
        cancel.check()?;
        let ts = frame_time(index, fps);
        let t = TimelinePosition::from_duration(ts);
        let frame = compositor.render_frame(t)?;
        if frame.layers == 0 {
            black_run += 1;
        } else if black_run > 0 {
            debug!(frames = black_run, until_secs = t.as_secs_f64(), "filled gap with black frames");
            black_run = 0;
        }
        muxer.append_video(&frame.image, ts)?;
        compositor.evict_before(t);
        progress.report(index + 1, units);
    }
    if black_run > 0 {
        debug!(frames = black_run, "filled tail with black frames");
    }

    progress.set_stage(RenderStage::AudioEncoding);
    let mut mixer = AudioMixer::new(job, opener, audio);
    let mut audio_blocks = 0u64;
    let mut start = 0u64;
    while start < total_samples {
        cancel.check()?;
        let end = (start + AUDIO_BLOCK_FRAMES as u64).min(total_samples);
        let block = mixer.mix_block(start as i64, end as i64)?;
        muxer.append_audio(&block, block.timestamp)?;
        audio_blocks += 1;
        start = end;
        progress.report(total_frames + audio_blocks, units);
    }
    if mixer.skipped > 0 {
        warn!(skipped = mixer.skipped, "audio blocks skipped for incompatible configuration");
    }

    progress.set_stage(RenderStage::Finalizing);
    let bytes = muxer.finalize()?;
    if bytes.is_empty() {
        return Err(MediaError::EncoderFinalizeFailure);
    }
    progress.finish(units);

    info!(
        frames = total_frames,
        audio_blocks,
        skipped_audio_blocks = mixer.skipped,
        bytes = bytes.len(),
        "export finished"
    );

    Ok(ExportOutput {
        bytes,
        video_frames: total_frames,
        audio_blocks,
        skipped_audio_blocks: mixer.skipped,
        duration: frame_time(total_frames, fps),
        audio,
    })
}

/// Number of output frames covering `total` (last frame may overhang).
pub fn frame_count(total: Duration, fps: u32) -> u64 {
    (total.as_nanos() * fps.max(1) as u128).div_ceil(NANOS_PER_SEC) as u64
}

/// Presentation time of frame `index`.
pub fn frame_time(index: u64, fps: u32) -> Duration {
    nanos(index as u128 * NANOS_PER_SEC / fps.max(1) as u128)
}

fn sample_count(total: Duration, rate: u32) -> u64 {
    (total.as_nanos() * rate as u128).div_ceil(NANOS_PER_SEC) as u64
}

fn sample_time(sample: i64, rate: u32) -> Duration {
    nanos(sample.max(0) as u128 * NANOS_PER_SEC / rate.max(1) as u128)
}

fn nanos(n: u128) -> Duration {
    Duration::from_nanos(u64::try_from(n).unwrap_or(u64::MAX))
}

/// Nearest sample index for a (possibly negative) nanosecond offset.
fn to_sample(nanos: i128, rate: u32) -> i64 {
    let half = NANOS_PER_SEC as i128 / 2;
    (nanos * rate as i128 + half).div_euclid(NANOS_PER_SEC as i128) as i64
}

/// Audio format of the first clip that will be heard, or 48 kHz stereo.
fn choose_audio_config(job: &ExportJob, opener: &dyn MediaOpener) -> Result<AudioConfig> {
    let timeline = &job.timeline;
    let mut candidates: Vec<&Clip> = timeline
        .tracks
        .iter()
        .filter(|track| !track.muted)
        .flat_map(|track| track.clips.iter().map(move |clip| (track.kind, clip)))
        .filter(|(kind, clip)| {
            !clip.audio_muted
                && match kind {
                    TrackKind::Audio => true,
                    TrackKind::Video => {
                        clip.kind == ClipKind::Video
                            && job.library.get(clip.asset_id).is_some_and(|a| a.has_audio)
                            && !has_live_detached_audio(timeline, clip)
                    }
                }
        })
        .map(|(_, clip)| clip)
        .collect();
    candidates.sort_by_key(|clip| clip.start);

    for clip in candidates {
        let Some(asset) = job.library.get(clip.asset_id) else {
            continue;
        };
        let source = opener.open(asset).map_err(|e| MediaError::decode_failure(clip.id, e))?;
        let info = source.probe().map_err(|e| MediaError::decode_failure(clip.id, e))?;
        if let Some(config) = info.audio {
            info!(clip_id = %clip.id, sample_rate = config.sample_rate, channels = config.channels, "audio configuration chosen");
            return Ok(config);
        }
    }
    debug!("no audible clip with audio, using default configuration");
    Ok(AudioConfig::default())
}

// =============================================================================
// Video
// =============================================================================

struct RenderedFrame {
    image: FrameBuffer,
    /// Visible video layers; zero means a black (or text-only) frame.
    layers: usize,
}

/// Sequential frame reader for one clip.
struct VideoCursor {
    _source: Box<dyn MediaSource>,
    frames: VideoFrames,
    current: Option<VideoFrame>,
    next: Option<VideoFrame>,
    exhausted: bool,
    end: TimelinePosition,
}

impl VideoCursor {
    fn open(opener: &dyn MediaOpener, clip: &Clip, asset: &MediaAsset) -> Result<Self> {
        let mut source = opener.open(asset)?;
        let (from, to) = clip.source_range();
        let frames = source.video_frames(from..to)?;
        Ok(Self {
            _source: source,
            frames,
            current: None,
            next: None,
            exhausted: false,
            end: clip.end(),
        })
    }

    /// Latest frame at or before `target`, or the first frame if the stream
    /// starts later. The last frame is held once the stream ends.
    fn frame_at(&mut self, target: Duration) -> Result<Option<&FrameBuffer>> {
        let limit = target + FRAME_TOLERANCE;
        loop {
            if self.next.is_none() && !self.exhausted {
                match self.frames.next() {
                    Some(frame) => self.next = Some(frame?),
                    None => self.exhausted = true,
                }
            }
            match &self.next {
                Some(next) if next.timestamp <= limit || self.current.is_none() => {
                    self.current = self.next.take();
                }
                _ => break,
            }
        }
        Ok(self.current.as_ref().map(|f| &f.image))
    }
}

struct Still {
    image: FrameBuffer,
    end: TimelinePosition,
}

fn load_still(opener: &dyn MediaOpener, clip: &Clip, asset: &MediaAsset, width: u32, height: u32) -> Result<Still> {
    let mut source = opener.open(asset)?;
    let mut frames = source.video_frames(Duration::ZERO..clip.duration.max(Duration::from_millis(1)))?;
    let frame = frames
        .next()
        .transpose()?
        .ok_or_else(|| MediaError::DecoderError("image has no pixels".into()))?;
    Ok(Still {
        image: letterbox(&frame.image, width, height),
        end: clip.end(),
    })
}

struct FrameCompositor<'a> {
    job: &'a ExportJob,
    opener: &'a dyn MediaOpener,
    text: &'a dyn TextRasterizer,
    width: u32,
    height: u32,
    cursors: HashMap<Uuid, VideoCursor>,
    stills: HashMap<Uuid, Still>,
}

impl<'a> FrameCompositor<'a> {
    fn new(job: &'a ExportJob, opener: &'a dyn MediaOpener, text: &'a dyn TextRasterizer, width: u32, height: u32) -> Self {
        Self {
            job,
            opener,
            text,
            width,
            height,
            cursors: HashMap::new(),
            stills: HashMap::new(),
        }
    }

    fn render_frame(&mut self, t: TimelinePosition) -> Result<RenderedFrame> {
        let job = self.job;
        let (width, height) = (self.width, self.height);
        let state = resolve(&job.timeline, &job.library, t);
        let at = bridge_small_gap(&job.timeline, t);
        let layers = if at == t {
            state.video_layers
        } else {
            resolve(&job.timeline, &job.library, at).video_layers
        };

        // A lone untouched layer at output size is forwarded as decoded.
        if let [layer] = layers.as_slice() {
            if state.texts.is_empty() && is_plain(&job.timeline, layer.clip, at, width, height) {
                let image = self.source_image(layer.clip, layer.asset, at)?;
                if image.width == width && image.height == height {
                    return Ok(RenderedFrame {
                        image: image.clone(),
                        layers: 1,
                    });
                }
            }
        }

        let mut canvas = FrameBuffer::black(width, height);
        for layer in &layers {
            let clip = layer.clip;
            let transition = evaluate_at(
                clip.visible_duration().as_secs_f64(),
                job.timeline.transitions_for(clip.id),
                clip.local_time(at).as_secs_f64(),
                width,
                height,
            )
            .unwrap_or_default();
            let filter = job
                .timeline
                .filter_for(clip.id)
                .map(FilterDescriptor::from)
                .filter(|f| !f.is_identity());

            let image = self.source_image(clip, layer.asset, at)?;
            let filtered;
            let src = match filter {
                Some(filter) => {
                    let mut copy = image.clone();
                    apply_filter(&mut copy, &filter);
                    filtered = copy;
                    &filtered
                }
                None => image,
            };

            let (rect, placement) = placement(clip, src.width, src.height, width, height);
            let affine = transition.to_affine(width, height).then(&placement);
            draw_image(
                &mut canvas,
                src,
                &rect,
                &affine,
                transition.alpha,
                transition.clip_region.as_ref(),
            );
        }

        for overlay in &state.texts {
            self.text.draw(&mut canvas, overlay)?;
        }

        Ok(RenderedFrame {
            image: canvas,
            layers: layers.len(),
        })
    }

    /// Decoded pixels for `clip` at timeline time `at`. Images come back
    /// letterboxed to the output size.
    fn source_image(&mut self, clip: &Clip, asset: &MediaAsset, at: TimelinePosition) -> Result<&FrameBuffer> {
        if clip.kind == ClipKind::Image {
            let still = match self.stills.entry(clip.id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(
                    load_still(self.opener, clip, asset, self.width, self.height)
                        .map_err(|e| MediaError::decode_failure(clip.id, e))?,
                ),
            };
            return Ok(&still.image);
        }

        let cursor = match self.cursors.entry(clip.id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(
                VideoCursor::open(self.opener, clip, asset).map_err(|e| MediaError::decode_failure(clip.id, e))?,
            ),
        };
        cursor
            .frame_at(clip.source_time(at))
            .map_err(|e| MediaError::decode_failure(clip.id, e))?
            .ok_or_else(|| MediaError::decode_failure(clip.id, "no video frames in clip range"))
    }

    /// Drop readers for clips that can no longer be shown.
    fn evict_before(&mut self, t: TimelinePosition) {
        self.cursors.retain(|_, c| c.end + GAP_EPSILON >= t);
        self.stills.retain(|_, s| s.end + GAP_EPSILON >= t);
    }
}

/// Time to sample video layers at. Inside a gap of at most
/// [`GAP_EPSILON`] the nearest clip edge is used instead of black.
fn bridge_small_gap(timeline: &Timeline, t: TimelinePosition) -> TimelinePosition {
    let covered = timeline
        .video_tracks()
        .any(|(_, track)| track.clip_at_inclusive(t).is_some());
    if covered {
        return t;
    }
    timeline
        .video_tracks()
        .flat_map(|(_, track)| track.clips.iter())
        .find_map(|clip| {
            let range = clip.range();
            if t < range.start && t + GAP_EPSILON >= range.start {
                Some(range.start)
            } else if t > range.end && range.end + GAP_EPSILON >= t {
                Some(range.end)
            } else {
                None
            }
        })
        .unwrap_or(t)
}

fn is_plain(timeline: &Timeline, clip: &Clip, at: TimelinePosition, width: u32, height: u32) -> bool {
    clip.crop.is_none()
        && clip.transform.as_ref().is_none_or(|t| t.is_identity())
        && timeline.filter_for(clip.id).is_none_or(|f| f.is_identity())
        && evaluate_at(
            clip.visible_duration().as_secs_f64(),
            timeline.transitions_for(clip.id),
            clip.local_time(at).as_secs_f64(),
            width,
            height,
        )
        .is_none_or(|rt| rt.is_identity())
}

/// Source rectangle and its mapping onto the output frame.
fn placement(clip: &Clip, src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (SourceRect, Affine) {
    match (&clip.crop, &clip.transform) {
        (Some(crop), _) => {
            let rect = crop_source_rect(crop, src_w, src_h);
            (rect, fill_matrix(&rect, dst_w, dst_h))
        }
        (None, Some(transform)) => (
            SourceRect::full(src_w, src_h),
            transform_matrix(transform, dst_w, dst_h, src_w, src_h),
        ),
        (None, None) => (
            SourceRect::full(src_w, src_h),
            fit_matrix(src_w as f64, src_h as f64, dst_w, dst_h),
        ),
    }
}

// =============================================================================
// Audio
// =============================================================================

/// Sequential block reader for one clip, buffered as interleaved f32 on the
/// timeline's sample grid.
struct AudioCursor {
    _source: Box<dyn MediaSource>,
    blocks: AudioBlocks,
    clip_id: Uuid,
    /// Timeline position of source time zero, in nanoseconds.
    origin_nanos: i128,
    start_sample: i64,
    end_sample: i64,
    gain: f64,
    pending: Vec<f32>,
    pending_start: i64,
    exhausted: bool,
    warned: bool,
}

impl AudioCursor {
    fn open(opener: &dyn MediaOpener, clip: &Clip, asset: &MediaAsset, rate: u32) -> Result<Self> {
        let mut source = opener.open(asset)?;
        let (from, to) = clip.source_range();
        let blocks = source.audio_blocks(from..to)?;
        let start_sample = to_sample(clip.start.as_duration().as_nanos() as i128, rate);
        Ok(Self {
            _source: source,
            blocks,
            clip_id: clip.id,
            origin_nanos: clip.start.as_duration().as_nanos() as i128 - clip.trim_start.as_nanos() as i128,
            start_sample,
            end_sample: to_sample(clip.end().as_duration().as_nanos() as i128, rate),
            gain: clip.volume,
            pending: Vec::new(),
            pending_start: start_sample,
            exhausted: false,
            warned: false,
        })
    }

    fn pending_end(&self, channels: usize) -> i64 {
        self.pending_start + (self.pending.len() / channels) as i64
    }

    /// Pull blocks until sample `until` is buffered or the stream ends.
    fn fill(&mut self, until: i64, config: AudioConfig, skipped: &mut u64) -> Result<()> {
        let channels = config.channels.max(1) as usize;
        while !self.exhausted && self.pending_end(channels) < until {
            let Some(next) = self.blocks.next() else {
                self.exhausted = true;
                break;
            };
            let mut block = next.map_err(|e| MediaError::decode_failure(self.clip_id, e))?;
            if !block.is_compatible(config.sample_rate, config.channels) {
                *skipped += 1;
                if !self.warned {
                    let err = MediaError::IncompatibleAudioConfiguration {
                        expected_rate: config.sample_rate,
                        expected_channels: config.channels,
                        found_rate: block.sample_rate,
                        found_channels: block.channels,
                    };
                    warn!(clip_id = %self.clip_id, error = %err, "skipping audio blocks");
                    self.warned = true;
                }
                continue;
            }
            block.apply_gain(self.gain);
            let mut samples = block.to_f32_interleaved();
            let at = to_sample(self.origin_nanos + block.timestamp.as_nanos() as i128, config.sample_rate);

            if self.pending.is_empty() {
                self.pending_start = at;
                self.pending = samples;
                continue;
            }
            let end = self.pending_end(channels);
            if at > end {
                self.pending.resize(self.pending.len() + (at - end) as usize * channels, 0.0);
            } else if at < end {
                let overlap = ((end - at) as usize * channels).min(samples.len());
                samples.drain(..overlap);
            }
            self.pending.extend(samples);
        }
        Ok(())
    }

    fn discard_before(&mut self, sample: i64, channels: usize) {
        if sample <= self.pending_start {
            return;
        }
        let n = ((sample - self.pending_start) as usize * channels).min(self.pending.len());
        self.pending.drain(..n);
        self.pending_start += (n / channels) as i64;
    }

    /// Add this clip's samples in `[from, to)` into `out`.
    fn mix_into(&mut self, out: &mut [f32], from: i64, to: i64, config: AudioConfig, skipped: &mut u64) -> Result<()> {
        let channels = config.channels.max(1) as usize;
        self.fill(to.min(self.end_sample), config, skipped)?;
        self.discard_before(from, channels);

        let lo = from.max(self.pending_start).max(self.start_sample);
        let hi = to.min(self.pending_end(channels)).min(self.end_sample);
        for s in lo..hi {
            let src = (s - self.pending_start) as usize * channels;
            let dst = (s - from) as usize * channels;
            for c in 0..channels {
                out[dst + c] += self.pending[src + c];
            }
        }
        self.discard_before(to, channels);
        Ok(())
    }
}

struct AudioMixer<'a> {
    job: &'a ExportJob,
    opener: &'a dyn MediaOpener,
    config: AudioConfig,
    cursors: HashMap<Uuid, AudioCursor>,
    /// Every clip start and end, sorted; layers can only change here.
    edges: Vec<TimelinePosition>,
    skipped: u64,
}

impl<'a> AudioMixer<'a> {
    fn new(job: &'a ExportJob, opener: &'a dyn MediaOpener, config: AudioConfig) -> Self {
        let mut edges: Vec<TimelinePosition> = job.timeline.clips().flat_map(|c| [c.start, c.end()]).collect();
        edges.sort();
        edges.dedup();
        Self {
            job,
            opener,
            config,
            cursors: HashMap::new(),
            edges,
            skipped: 0,
        }
    }

    /// Mix `[from, to)`. The block is cut at every clip edge inside it and
    /// each piece mixes only the sources audible there.
    fn mix_block(&mut self, from: i64, to: i64) -> Result<AudioBlock> {
        let config = self.config;
        let rate = config.sample_rate;
        let channels = config.channels.max(1) as usize;
        let t0 = TimelinePosition::from_duration(sample_time(from, rate));
        let t1 = TimelinePosition::from_duration(sample_time(to, rate));

        let mut cuts = vec![t0];
        cuts.extend(self.edges.iter().copied().filter(|e| *e > t0 && *e < t1));
        cuts.push(t1);

        let mut mix = vec![0.0f32; (to - from) as usize * channels];
        for span in cuts.windows(2) {
            let (ta, tb) = (span[0], span[1]);
            let edge = |t: TimelinePosition| to_sample(t.as_duration().as_nanos() as i128, rate).clamp(from, to);
            let a = if ta == t0 { from } else { edge(ta) };
            let b = if tb == t1 { to } else { edge(tb) };
            if a >= b {
                continue;
            }
            // No edge lies strictly inside the span, so its midpoint sees
            // the same layers as every sample in it.
            let mid = ta + tb.saturating_sub(ta) / 2;
            let out = &mut mix[(a - from) as usize * channels..(b - from) as usize * channels];
            self.mix_span(out, a, b, mid)?;
        }
        for sample in &mut mix {
            *sample = sample.clamp(-1.0, 1.0);
        }
        self.cursors.retain(|_, c| c.end_sample > to);

        Ok(AudioBlock::from_f32_interleaved(
            t0.as_duration(),
            rate,
            config.channels,
            &mix,
        ))
    }

    fn mix_span(&mut self, out: &mut [f32], from: i64, to: i64, at: TimelinePosition) -> Result<()> {
        let job = self.job;
        for layer in resolve(&job.timeline, &job.library, at).audio_layers {
            let clip = layer.clip;
            let cursor = match self.cursors.entry(clip.id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(
                    AudioCursor::open(self.opener, clip, layer.asset, self.config.sample_rate)
                        .map_err(|e| MediaError::decode_failure(clip.id, e))?,
                ),
            };
            cursor.mix_into(out, from, to, self.config, &mut self.skipped)?;
        }
        Ok(())
    }
}
