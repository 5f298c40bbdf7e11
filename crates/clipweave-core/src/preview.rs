//! Soft-real-time preview: a logical clock that follower playback surfaces
//! (one per clip) are kept in step with.
//!
//! The synchronizer never decodes anything itself. Each `tick` resolves the
//! active layers at the clock position, then seeks, plays, pauses and mutes
//! the matching surfaces. Correction thresholds depend on what the user is
//! doing: playback tolerates drift, scrubbing and paused seeks do not.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::media::SourceLibrary;
use crate::resolver::{resolve, AudioSource};
use crate::settings::CapabilityProfile;
use crate::timeline::{Timeline, TimelinePosition};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);
pub const DEFAULT_TIER_COOLDOWN: Duration = Duration::from_secs(5);
/// Frame skipping renders two of every three frames.
pub const FRAME_SKIP_EVERY: u32 = 3;

const MONITOR_WINDOW: usize = 60;
const MONITOR_MIN_SAMPLES: usize = 30;
const MIN_ACCEPTABLE_FPS: f64 = 20.0;
const MAX_DROP_RATIO: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PlaybackPhase {
    #[default]
    Idle,
    Seeking,
    Syncing,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OperatingMode {
    Playing,
    Scrubbing,
    #[default]
    Paused,
}

/// Preview render quality. Higher tiers render closer to output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum QualityTier {
    Low,
    Medium,
    #[default]
    High,
    Ultra,
}

impl QualityTier {
    pub fn scale_factor(&self) -> f64 {
        match self {
            Self::Low => 0.25,
            Self::Medium => 0.5,
            Self::High => 0.75,
            Self::Ultra => 1.0,
        }
    }

    pub fn step_down(&self) -> Option<QualityTier> {
        match self {
            Self::Low => None,
            Self::Medium => Some(Self::Low),
            Self::High => Some(Self::Medium),
            Self::Ultra => Some(Self::High),
        }
    }

    /// Preview raster size for an output of `width`x`height`, capped at
    /// `max_height` lines. Sides are kept even.
    pub fn preview_size(&self, width: u32, height: u32, max_height: u32) -> (u32, u32) {
        if width == 0 || height == 0 {
            return (0, 0);
        }
        let target_h = (height as f64 * self.scale_factor()).min(max_height.max(2) as f64);
        let scale = target_h / height as f64;
        let even = |v: f64| ((v / 2.0).round() as u32 * 2).max(2);
        (even(width as f64 * scale), even(height as f64 * scale))
    }
}

// =============================================================================
// SyncPolicy
// =============================================================================

/// Drift thresholds, in seconds, above which a surface is re-seeked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPolicy {
    /// During playback corrections are suppressed below this drift.
    pub playing_hard_limit: f64,
    pub scrubbing: f64,
    pub paused: f64,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            playing_hard_limit: 1.0,
            scrubbing: 0.3,
            paused: 0.05,
        }
    }
}

impl SyncPolicy {
    /// Looser thresholds for low-end devices, where frequent seeks stall.
    pub fn constrained() -> Self {
        Self {
            playing_hard_limit: 1.0,
            scrubbing: 0.5,
            paused: 0.1,
        }
    }

    pub fn for_profile(profile: &CapabilityProfile) -> Self {
        if profile.constrained {
            Self::constrained()
        } else {
            Self::default()
        }
    }

    /// Regular correction threshold for `mode`; `None` while playing.
    pub fn threshold(&self, mode: OperatingMode) -> Option<f64> {
        match mode {
            OperatingMode::Playing => None,
            OperatingMode::Scrubbing => Some(self.scrubbing),
            OperatingMode::Paused => Some(self.paused),
        }
    }

    /// The threshold exceeded by `drift` seconds, if a resync is due.
    pub fn should_resync(&self, mode: OperatingMode, drift: f64) -> Option<f64> {
        let drift = drift.abs();
        if !drift.is_finite() {
            return None;
        }
        let limit = self.threshold(mode).unwrap_or(self.playing_hard_limit);
        (drift > limit).then_some(limit)
    }
}

// =============================================================================
// ResyncScheduler
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct PendingResync {
    target: TimelinePosition,
    due: Instant,
}

/// Debounces seek requests: only the most recent one fires.
#[derive(Debug, Clone)]
pub struct ResyncScheduler {
    debounce: Duration,
    pending: Option<PendingResync>,
}

impl Default for ResyncScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl ResyncScheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: None,
        }
    }

    /// Replace any pending request.
    pub fn request(&mut self, target: TimelinePosition, now: Instant) {
        self.pending = Some(PendingResync {
            target,
            due: now + self.debounce,
        });
    }

    /// Take the pending request once its debounce interval has passed.
    pub fn poll(&mut self, now: Instant) -> Option<TimelinePosition> {
        match self.pending {
            Some(p) if now >= p.due => {
                self.pending = None;
                Some(p.target)
            }
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn pending_target(&self) -> Option<TimelinePosition> {
        self.pending.map(|p| p.target)
    }
}

// =============================================================================
// FrameLimiter
// =============================================================================

#[derive(Debug, Clone)]
pub struct FrameLimiter {
    pub target_fps: f64,
    /// Drop every Nth due frame; 0 or 1 disables skipping.
    pub skip_every: u32,
    last: Option<Instant>,
    frames: u64,
}

impl FrameLimiter {
    pub fn new(target_fps: f64, skip_every: u32) -> Self {
        Self {
            target_fps: if target_fps.is_finite() { target_fps.max(1.0) } else { 30.0 },
            skip_every,
            last: None,
            frames: 0,
        }
    }

    pub fn from_profile(profile: &CapabilityProfile) -> Self {
        let skip = if profile.frame_skipping { FRAME_SKIP_EVERY } else { 0 };
        Self::new(profile.target_fps, skip)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps)
    }

    /// Whether a new frame should be painted at `now`.
    pub fn should_advance(&mut self, now: Instant) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.frame_interval(),
        };
        if !due {
            return false;
        }
        self.last = Some(now);
        self.frames += 1;
        !(self.skip_every > 1 && self.frames % u64::from(self.skip_every) == 0)
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.frames = 0;
    }
}

// =============================================================================
// PerformanceMonitor
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct FrameSample {
    interval: Duration,
    dropped: bool,
}

/// Rolling window of frame timings that recommends stepping the preview
/// quality down when playback cannot keep up.
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    samples: VecDeque<FrameSample>,
    tier: QualityTier,
    cooldown: Duration,
    last_change: Option<Instant>,
}

impl PerformanceMonitor {
    pub fn new(tier: QualityTier) -> Self {
        Self {
            samples: VecDeque::with_capacity(MONITOR_WINDOW),
            tier,
            cooldown: DEFAULT_TIER_COOLDOWN,
            last_change: None,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn tier(&self) -> QualityTier {
        self.tier
    }

    pub fn record(&mut self, interval: Duration, dropped: bool) {
        if self.samples.len() == MONITOR_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(FrameSample { interval, dropped });
    }

    pub fn fps(&self) -> Option<f64> {
        let total: f64 = self.samples.iter().map(|s| s.interval.as_secs_f64()).sum();
        (total > 0.0).then(|| self.samples.len() as f64 / total)
    }

    pub fn drop_ratio(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().filter(|s| s.dropped).count() as f64 / self.samples.len() as f64
    }

    /// A lower tier, when the window is full enough, the cooldown since the
    /// last change has passed, and playback is too slow or dropping frames.
    pub fn recommend(&mut self, now: Instant) -> Option<QualityTier> {
        if self.samples.len() < MONITOR_MIN_SAMPLES {
            return None;
        }
        if let Some(last) = self.last_change {
            if now.saturating_duration_since(last) < self.cooldown {
                return None;
            }
        }
        let fps = self.fps()?;
        let drops = self.drop_ratio();
        if fps >= MIN_ACCEPTABLE_FPS && drops <= MAX_DROP_RATIO {
            return None;
        }
        let lower = self.tier.step_down()?;
        info!(from = ?self.tier, to = ?lower, fps, drop_ratio = drops, "lowering preview quality");
        self.tier = lower;
        self.last_change = Some(now);
        self.samples.clear();
        Some(lower)
    }
}

// =============================================================================
// Surfaces
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    Ready,
    Loading,
    Failed,
}

/// A follower media element (one per clip) driven by the synchronizer.
/// Times are source-media times.
pub trait PlaybackSurface {
    fn status(&self) -> SurfaceStatus;
    /// Current playhead, or `None` while nothing is loaded.
    fn position(&self) -> Option<Duration>;
    fn seek(&mut self, source_time: Duration);
    fn set_volume(&mut self, volume: f64);
    fn set_muted(&mut self, muted: bool);
    fn set_rate(&mut self, rate: f64);
    fn play(&mut self);
    fn pause(&mut self);
}

/// What a tick did, for the host to paint and report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub position: TimelinePosition,
    pub phase: PlaybackPhase,
    /// Whether the host should paint a new frame this tick.
    pub render_frame: bool,
    /// The clock hit the end of the timeline and was rewound.
    pub ended: bool,
    /// Visible clips, bottom to top.
    pub visible_clips: Vec<Uuid>,
    pub texts: Vec<Uuid>,
    /// Surfaces re-seeked because they drifted past the threshold.
    pub resynced: Vec<Uuid>,
    /// Surfaces skipped because they failed to load.
    pub failed: Vec<Uuid>,
    pub quality_change: Option<QualityTier>,
}

#[derive(Debug, Clone, Copy)]
struct ClockAnchor {
    at: Instant,
    position: TimelinePosition,
}

pub const MIN_RATE: f64 = 0.25;
pub const MAX_RATE: f64 = 4.0;

// =============================================================================
// PreviewSynchronizer
// =============================================================================

#[derive(Debug, Clone)]
pub struct PreviewSynchronizer {
    phase: PlaybackPhase,
    mode: OperatingMode,
    position: TimelinePosition,
    anchor: Option<ClockAnchor>,
    resume_after_scrub: bool,
    rate: f64,
    volume: f64,
    muted: bool,
    policy: SyncPolicy,
    limiter: FrameLimiter,
    monitor: PerformanceMonitor,
    scheduler: ResyncScheduler,
    last_tick: Option<Instant>,
    active: HashSet<Uuid>,
    /// Audible surfaces and their clip gain.
    audible: HashMap<Uuid, f64>,
}

impl PreviewSynchronizer {
    pub fn new(profile: &CapabilityProfile) -> Self {
        Self {
            phase: PlaybackPhase::Idle,
            mode: OperatingMode::Paused,
            position: TimelinePosition::zero(),
            anchor: None,
            resume_after_scrub: false,
            rate: 1.0,
            volume: 1.0,
            muted: false,
            policy: SyncPolicy::for_profile(profile),
            limiter: FrameLimiter::from_profile(profile),
            monitor: PerformanceMonitor::new(profile.recommended_tier),
            scheduler: ResyncScheduler::default(),
            last_tick: None,
            active: HashSet::new(),
            audible: HashMap::new(),
        }
    }

    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn position(&self) -> TimelinePosition {
        self.position
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn tier(&self) -> QualityTier {
        self.monitor.tier()
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    fn clock_at(&self, now: Instant) -> TimelinePosition {
        match self.anchor {
            Some(anchor) => {
                let elapsed = now.saturating_duration_since(anchor.at).as_secs_f64() * self.rate;
                TimelinePosition::from_secs_f64(anchor.position.as_secs_f64() + elapsed)
            }
            None => self.position,
        }
    }

    pub fn play(&mut self, now: Instant) {
        if self.mode == OperatingMode::Playing {
            return;
        }
        self.position = self.clock_at(now);
        self.anchor = Some(ClockAnchor {
            at: now,
            position: self.position,
        });
        self.mode = OperatingMode::Playing;
        self.phase = PlaybackPhase::Syncing;
        self.limiter.reset();
        debug!(position = self.position.as_secs_f64(), "preview play");
    }

    pub fn pause(&mut self, now: Instant) {
        self.position = self.clock_at(now);
        self.anchor = None;
        self.mode = OperatingMode::Paused;
        self.phase = PlaybackPhase::Paused;
        debug!(position = self.position.as_secs_f64(), "preview pause");
    }

    /// Jump the clock. Surfaces follow once the debounce interval passes.
    pub fn seek(&mut self, position: TimelinePosition, now: Instant) {
        self.position = position;
        if self.anchor.is_some() {
            self.anchor = Some(ClockAnchor { at: now, position });
        }
        self.scheduler.request(position, now);
        self.phase = PlaybackPhase::Seeking;
    }

    pub fn begin_scrub(&mut self, now: Instant) {
        if self.mode == OperatingMode::Scrubbing {
            return;
        }
        self.resume_after_scrub = self.mode == OperatingMode::Playing;
        self.position = self.clock_at(now);
        self.anchor = None;
        self.mode = OperatingMode::Scrubbing;
        self.phase = PlaybackPhase::Seeking;
    }

    pub fn scrub_to(&mut self, position: TimelinePosition, now: Instant) {
        self.position = position;
        self.scheduler.request(position, now);
        self.phase = PlaybackPhase::Seeking;
    }

    pub fn end_scrub(&mut self, now: Instant) {
        if self.mode != OperatingMode::Scrubbing {
            return;
        }
        if self.resume_after_scrub {
            self.mode = OperatingMode::Playing;
            self.anchor = Some(ClockAnchor {
                at: now,
                position: self.position,
            });
        } else {
            self.mode = OperatingMode::Paused;
        }
        self.resume_after_scrub = false;
        if self.scheduler.pending_target().is_none() {
            self.phase = self.settled_phase();
        }
    }

    fn settled_phase(&self) -> PlaybackPhase {
        match self.mode {
            OperatingMode::Playing => PlaybackPhase::Syncing,
            _ => PlaybackPhase::Paused,
        }
    }

    pub fn set_volume<S: PlaybackSurface>(&mut self, volume: f64, surfaces: &mut HashMap<Uuid, S>) {
        self.volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 1.0 };
        for (id, surface) in surfaces.iter_mut() {
            if let Some(gain) = self.audible.get(id) {
                surface.set_volume((self.volume * gain).clamp(0.0, 1.0));
            }
        }
    }

    pub fn set_muted<S: PlaybackSurface>(&mut self, muted: bool, surfaces: &mut HashMap<Uuid, S>) {
        self.muted = muted;
        for (id, surface) in surfaces.iter_mut() {
            surface.set_muted(muted || !self.audible.contains_key(id));
        }
    }

    pub fn set_rate<S: PlaybackSurface>(&mut self, rate: f64, now: Instant, surfaces: &mut HashMap<Uuid, S>) {
        // re-anchor so elapsed time before the change keeps the old rate
        self.position = self.clock_at(now);
        if self.anchor.is_some() {
            self.anchor = Some(ClockAnchor {
                at: now,
                position: self.position,
            });
        }
        self.rate = if rate.is_finite() { rate.clamp(MIN_RATE, MAX_RATE) } else { 1.0 };
        for surface in surfaces.values_mut() {
            surface.set_rate(self.rate);
        }
    }

    /// Advance the clock and drive the surfaces for the clips active now.
    pub fn tick<S: PlaybackSurface>(
        &mut self,
        now: Instant,
        timeline: &Timeline,
        library: &SourceLibrary,
        surfaces: &mut HashMap<Uuid, S>,
    ) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        if let Some(last) = self.last_tick {
            if self.phase == PlaybackPhase::Playing {
                let interval = now.saturating_duration_since(last);
                let dropped = interval > self.limiter.frame_interval().mul_f64(1.5);
                self.monitor.record(interval, dropped);
                outcome.quality_change = self.monitor.recommend(now);
            }
        }
        self.last_tick = Some(now);

        self.position = self.clock_at(now);
        let total = timeline.duration();
        if self.anchor.is_some() && !total.is_zero() && self.position.as_duration() >= total {
            info!(duration = total.as_secs_f64(), "preview reached end of timeline");
            self.position = TimelinePosition::zero();
            self.anchor = None;
            self.mode = OperatingMode::Paused;
            self.phase = PlaybackPhase::Paused;
            self.scheduler.cancel();
            for surface in surfaces.values_mut() {
                surface.pause();
            }
            self.active.clear();
            self.audible.clear();
            outcome.ended = true;
            outcome.render_frame = true;
            outcome.position = self.position;
            outcome.phase = self.phase;
            return outcome;
        }

        let forced = self.scheduler.poll(now).is_some();
        if forced {
            self.phase = self.settled_phase();
        }
        // drift corrections wait for a pending seek to fire
        let debouncing = self.scheduler.pending_target().is_some();
        let syncing = self.phase == PlaybackPhase::Syncing;
        let playing = self.mode == OperatingMode::Playing;

        let state = resolve(timeline, library, self.position);
        let followers = state
            .video_layers
            .iter()
            .map(|l| (l.clip, l.audible))
            .chain(
                state
                    .audio_layers
                    .iter()
                    .filter(|a| a.source == AudioSource::Track)
                    .map(|a| (a.clip, true)),
            );

        let mut now_active = HashSet::new();
        let mut audible = HashMap::new();
        for (clip, is_audible) in followers {
            let Some(surface) = surfaces.get_mut(&clip.id) else {
                continue;
            };
            if surface.status() == SurfaceStatus::Failed {
                outcome.failed.push(clip.id);
                continue;
            }
            now_active.insert(clip.id);
            if is_audible {
                audible.insert(clip.id, clip.volume);
            }

            let target = clip.source_time(self.position);
            let newly = !self.active.contains(&clip.id);
            let drifted = surface.position().is_some_and(|current| {
                let drift = current.as_secs_f64() - target.as_secs_f64();
                self.policy.should_resync(self.mode, drift).is_some()
            });
            if newly || forced || syncing {
                surface.seek(target);
            } else if drifted && !debouncing {
                debug!(clip = %clip.id, target = target.as_secs_f64(), "resyncing surface");
                surface.seek(target);
                outcome.resynced.push(clip.id);
            }

            surface.set_muted(self.muted || !is_audible);
            surface.set_volume((self.volume * clip.volume).clamp(0.0, 1.0));
            if playing {
                if newly || syncing {
                    surface.set_rate(self.rate);
                    surface.play();
                }
            } else {
                surface.pause();
            }
        }

        for id in self.active.difference(&now_active) {
            if let Some(surface) = surfaces.get_mut(id) {
                surface.pause();
            }
        }
        self.active = now_active;
        self.audible = audible;

        if syncing {
            self.phase = PlaybackPhase::Playing;
        }

        outcome.render_frame = if playing {
            self.limiter.should_advance(now)
        } else {
            forced || syncing
        };
        outcome.visible_clips = state
            .video_layers
            .iter()
            .map(|l| l.clip.id)
            .filter(|id| !outcome.failed.contains(id))
            .collect();
        outcome.texts = state.texts.iter().map(|t| t.id).collect();
        outcome.position = self.position;
        outcome.phase = self.phase;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_thresholds() {
        let p = SyncPolicy::default();
        assert_eq!(p.threshold(OperatingMode::Playing), None);
        assert_eq!(p.threshold(OperatingMode::Scrubbing), Some(0.3));
        assert_eq!(p.threshold(OperatingMode::Paused), Some(0.05));
    }

    #[test]
    fn test_playing_suppresses_small_drift() {
        let p = SyncPolicy::default();
        assert_eq!(p.should_resync(OperatingMode::Playing, 0.8), None);
        assert_eq!(p.should_resync(OperatingMode::Playing, -1.2), Some(1.0));
        assert_eq!(p.should_resync(OperatingMode::Paused, 0.06), Some(0.05));
        assert_eq!(p.should_resync(OperatingMode::Scrubbing, 0.2), None);
    }

    #[test]
    fn test_constrained_profile_loosens_thresholds() {
        let profile = CapabilityProfile {
            constrained: true,
            ..CapabilityProfile::default()
        };
        let p = SyncPolicy::for_profile(&profile);
        assert_eq!(p.should_resync(OperatingMode::Paused, 0.08), None);
    }

    #[test]
    fn test_scheduler_debounces_to_latest() {
        let t0 = Instant::now();
        let mut s = ResyncScheduler::default();
        s.request(TimelinePosition::from_secs_f64(1.0), t0);
        s.request(TimelinePosition::from_secs_f64(2.0), t0 + Duration::from_millis(30));
        assert_eq!(s.poll(t0 + Duration::from_millis(60)), None);
        assert_eq!(
            s.poll(t0 + Duration::from_millis(80)),
            Some(TimelinePosition::from_secs_f64(2.0))
        );
        assert_eq!(s.poll(t0 + Duration::from_millis(200)), None);
    }

    #[test]
    fn test_scheduler_cancel() {
        let t0 = Instant::now();
        let mut s = ResyncScheduler::default();
        s.request(TimelinePosition::zero(), t0);
        s.cancel();
        assert_eq!(s.poll(t0 + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_limiter_paces_frames() {
        let t0 = Instant::now();
        let mut l = FrameLimiter::new(10.0, 0);
        assert!(l.should_advance(t0));
        assert!(!l.should_advance(t0 + Duration::from_millis(50)));
        assert!(l.should_advance(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn test_limiter_skips_every_third() {
        let t0 = Instant::now();
        let mut l = FrameLimiter::new(10.0, 3);
        let rendered: Vec<bool> = (0..6)
            .map(|i| l.should_advance(t0 + Duration::from_millis(100 * i)))
            .collect();
        assert_eq!(rendered, vec![true, true, false, true, true, false]);
    }

    #[test]
    fn test_monitor_needs_enough_samples() {
        let mut m = PerformanceMonitor::new(QualityTier::High);
        for _ in 0..10 {
            m.record(Duration::from_millis(100), true);
        }
        assert_eq!(m.recommend(Instant::now()), None);
    }

    #[test]
    fn test_monitor_steps_down_once_per_cooldown() {
        let t0 = Instant::now();
        let mut m = PerformanceMonitor::new(QualityTier::Medium);
        for _ in 0..40 {
            m.record(Duration::from_millis(100), false);
        }
        assert_eq!(m.recommend(t0), Some(QualityTier::Low));
        for _ in 0..40 {
            m.record(Duration::from_millis(100), false);
        }
        assert_eq!(m.recommend(t0 + Duration::from_secs(1)), None);
        assert_eq!(m.recommend(t0 + Duration::from_secs(6)), None, "never below Low");
        assert_eq!(m.tier(), QualityTier::Low);
    }

    #[test]
    fn test_monitor_drop_ratio_triggers() {
        let mut m = PerformanceMonitor::new(QualityTier::Ultra);
        for i in 0..40 {
            m.record(Duration::from_millis(16), i % 5 == 0);
        }
        assert_eq!(m.recommend(Instant::now()), Some(QualityTier::High));
    }

    #[test]
    fn test_healthy_playback_keeps_tier() {
        let mut m = PerformanceMonitor::new(QualityTier::High);
        for _ in 0..60 {
            m.record(Duration::from_millis(16), false);
        }
        assert_eq!(m.recommend(Instant::now()), None);
    }

    #[test]
    fn test_preview_size_caps_height() {
        assert_eq!(QualityTier::Ultra.preview_size(1920, 1080, 720), (1280, 720));
        assert_eq!(QualityTier::Medium.preview_size(1920, 1080, 1080), (960, 540));
    }
}
