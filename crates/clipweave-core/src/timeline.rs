use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::effects::{Crop, Transform, VideoFilter};
use crate::error::{CoreError, Result};
use crate::media::{MediaAsset, MediaKind};
use crate::overlay::TextOverlay;
use crate::transition::{Transition, TransitionKind, TransitionPosition};

/// Length given to image clips whose asset reports no duration.
pub const DEFAULT_IMAGE_DURATION: Duration = Duration::from_secs(5);

pub const MAX_CLIP_VOLUME: f64 = 2.0;

/// A position on the timeline, represented as a duration from the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct TimelinePosition(Duration);

impl TimelinePosition {
    pub fn zero() -> Self {
        Self(Duration::ZERO)
    }

    /// Negative and non-finite inputs clamp to zero; values past the
    /// representable range saturate.
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() {
            return Self::zero();
        }
        Self(Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX))
    }

    pub fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    pub fn from_duration(d: Duration) -> Self {
        Self(d)
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    pub fn saturating_sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

impl std::ops::Add for TimelinePosition {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Add<Duration> for TimelinePosition {
    type Output = Self;
    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs))
    }
}

impl std::ops::Sub for TimelinePosition {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

/// A time range with start (inclusive) and end (exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: TimelinePosition,
    pub end: TimelinePosition,
}

impl TimeRange {
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    pub fn contains(&self, pos: TimelinePosition) -> bool {
        pos >= self.start && pos < self.end
    }

    /// Like `contains` but the end instant counts as inside.
    pub fn contains_inclusive(&self, pos: TimelinePosition) -> bool {
        pos >= self.start && pos <= self.end
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Whether a track holds visual or audio clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TrackKind {
    #[default]
    Video,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClipKind {
    Video,
    Image,
    Audio,
}

impl ClipKind {
    pub fn fits(self, track: TrackKind) -> bool {
        match self {
            ClipKind::Video | ClipKind::Image => track == TrackKind::Video,
            ClipKind::Audio => track == TrackKind::Audio,
        }
    }
}

impl From<MediaKind> for ClipKind {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Video => ClipKind::Video,
            MediaKind::Image => ClipKind::Image,
            MediaKind::Audio => ClipKind::Audio,
        }
    }
}

/// Relationship between a video clip and an audio clip split off from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AudioLink {
    #[default]
    Standalone,
    /// Video clip whose soundtrack now lives on the named audio clip.
    SourceOf(Uuid),
    /// Audio clip detached from the named video clip.
    DetachedFrom(Uuid),
}

impl AudioLink {
    pub fn partner(&self) -> Option<Uuid> {
        match *self {
            AudioLink::Standalone => None,
            AudioLink::SourceOf(id) | AudioLink::DetachedFrom(id) => Some(id),
        }
    }
}

fn unit_volume() -> f64 {
    1.0
}

/// A clip placed on a track, referencing a portion of a media asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clip {
    pub id: Uuid,
    pub asset_id: Uuid,
    /// Owning track; rewritten when the clip is added to a track.
    pub track_id: Uuid,
    pub kind: ClipKind,
    pub start: TimelinePosition,
    /// Length of the source span before trimming.
    pub duration: Duration,
    /// Offsets into the source media.
    #[serde(default)]
    pub trim_start: Duration,
    #[serde(default)]
    pub trim_end: Duration,
    #[serde(default)]
    pub crop: Option<Crop>,
    #[serde(default)]
    pub transform: Option<Transform>,
    #[serde(default)]
    pub audio: AudioLink,
    #[serde(default)]
    pub audio_muted: bool,
    #[serde(default = "unit_volume")]
    pub volume: f64,
}

impl Clip {
    pub fn new(asset_id: Uuid, kind: ClipKind, start: TimelinePosition, duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset_id,
            track_id: Uuid::nil(),
            kind,
            start,
            duration,
            trim_start: Duration::ZERO,
            trim_end: Duration::ZERO,
            crop: None,
            transform: None,
            audio: AudioLink::Standalone,
            audio_muted: false,
            volume: 1.0,
        }
    }

    /// Clip covering the whole asset.
    pub fn from_asset(asset: &MediaAsset, start: TimelinePosition) -> Self {
        let duration = if asset.kind == MediaKind::Image && asset.duration_hint.is_zero() {
            DEFAULT_IMAGE_DURATION
        } else {
            asset.duration_hint
        };
        Self::new(asset.id, asset.kind.into(), start, duration)
    }

    pub fn with_trim(mut self, trim_start: Duration, trim_end: Duration) -> Self {
        self.trim_start = trim_start;
        self.trim_end = trim_end;
        self
    }

    /// Length on the timeline after trimming.
    pub fn visible_duration(&self) -> Duration {
        self.duration
            .saturating_sub(self.trim_start)
            .saturating_sub(self.trim_end)
    }

    pub fn end(&self) -> TimelinePosition {
        self.start + self.visible_duration()
    }

    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end(),
        }
    }

    /// Time since the clip's start, zero before it.
    pub fn local_time(&self, t: TimelinePosition) -> Duration {
        t.saturating_sub(self.start)
    }

    /// Source media time shown at timeline time `t`.
    pub fn source_time(&self, t: TimelinePosition) -> Duration {
        self.trim_start + self.local_time(t)
    }

    /// Half-open span of the source media this clip plays.
    pub fn source_range(&self) -> (Duration, Duration) {
        (self.trim_start, self.duration.saturating_sub(self.trim_end))
    }

    pub fn is_visual(&self) -> bool {
        self.kind != ClipKind::Audio
    }

    fn validate_trim(&self) -> Result<()> {
        if self.trim_start + self.trim_end >= self.duration {
            return Err(CoreError::InvalidTrim {
                trim_start: self.trim_start,
                trim_end: self.trim_end,
                duration: self.duration,
            });
        }
        Ok(())
    }
}

/// A track containing an ordered sequence of clips.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: Uuid,
    pub name: String,
    pub kind: TrackKind,
    pub clips: Vec<Clip>,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub locked: bool,
}

impl Track {
    pub fn new(name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            clips: Vec::new(),
            muted: false,
            locked: false,
        }
    }

    pub fn video(name: impl Into<String>) -> Self {
        Self::new(name, TrackKind::Video)
    }

    pub fn audio(name: impl Into<String>) -> Self {
        Self::new(name, TrackKind::Audio)
    }

    /// Add a clip, checking kind and overlaps with existing clips.
    pub fn add_clip(&mut self, mut clip: Clip) -> Result<()> {
        if !clip.kind.fits(self.kind) {
            return Err(CoreError::TrackKindMismatch { track_kind: self.kind });
        }
        clip.validate_trim()?;
        if self.overlapping(&clip.range(), None).is_some() {
            return Err(CoreError::ClipOverlap { position: clip.start });
        }
        clip.track_id = self.id;
        self.clips.push(clip);
        self.sort_clips();
        Ok(())
    }

    /// First clip other than `exclude` overlapping `range`.
    pub fn overlapping(&self, range: &TimeRange, exclude: Option<Uuid>) -> Option<&Clip> {
        self.clips
            .iter()
            .find(|c| Some(c.id) != exclude && c.range().overlaps(range))
    }

    pub fn remove_clip(&mut self, clip_id: Uuid) -> Result<Clip> {
        let idx = self
            .clips
            .iter()
            .position(|c| c.id == clip_id)
            .ok_or(CoreError::ClipNotFound(clip_id))?;
        Ok(self.clips.remove(idx))
    }

    pub fn get_clip(&self, clip_id: Uuid) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == clip_id)
    }

    pub fn get_clip_mut(&mut self, clip_id: Uuid) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|c| c.id == clip_id)
    }

    /// Find the clip playing at the given position (end exclusive).
    pub fn clip_at(&self, pos: TimelinePosition) -> Option<&Clip> {
        self.clips.iter().find(|c| c.range().contains(pos))
    }

    /// Find the first clip whose span contains `pos`, end inclusive.
    pub fn clip_at_inclusive(&self, pos: TimelinePosition) -> Option<&Clip> {
        self.clips.iter().find(|c| c.range().contains_inclusive(pos))
    }

    /// Get the end position of the last clip on this track.
    pub fn end_position(&self) -> TimelinePosition {
        self.clips
            .iter()
            .map(|c| c.end())
            .max()
            .unwrap_or_else(TimelinePosition::zero)
    }

    fn sort_clips(&mut self) {
        self.clips.sort_by_key(|c| c.start);
    }
}

/// The timeline: tracks in z-order plus the clip-keyed decorations.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Timeline {
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub text_overlays: Vec<TextOverlay>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub filters: BTreeMap<Uuid, VideoFilter>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against a copy and return the copy if it validates. `self`
    /// is left untouched either way.
    pub fn apply<F>(&self, f: F) -> Result<Timeline>
    where
        F: FnOnce(&mut Timeline) -> Result<()>,
    {
        let mut next = self.clone();
        f(&mut next)?;
        next.validate()?;
        Ok(next)
    }

    /// Atomic in-place mutation: commits only when `f` succeeds and the
    /// resulting state validates.
    fn commit<T, F>(&mut self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Timeline) -> Result<T>,
    {
        let mut next = self.clone();
        match f(&mut next).and_then(|value| next.validate().map(|()| value)) {
            Ok(value) => {
                *self = next;
                Ok(value)
            }
            Err(err) => {
                debug!(op, error = %err, "timeline mutation rejected");
                Err(err)
            }
        }
    }

    // --- lookup ---

    pub fn track(&self, track_id: Uuid) -> Result<&Track> {
        self.tracks
            .iter()
            .find(|t| t.id == track_id)
            .ok_or(CoreError::TrackNotFound(track_id))
    }

    pub fn track_index(&self, track_id: Uuid) -> Result<usize> {
        self.tracks
            .iter()
            .position(|t| t.id == track_id)
            .ok_or(CoreError::TrackNotFound(track_id))
    }

    fn track_mut(&mut self, track_id: Uuid) -> Result<&mut Track> {
        self.tracks
            .iter_mut()
            .find(|t| t.id == track_id)
            .ok_or(CoreError::TrackNotFound(track_id))
    }

    /// Video tracks with their z-order index, bottom first.
    pub fn video_tracks(&self) -> impl Iterator<Item = (usize, &Track)> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Audio)
    }

    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.tracks.iter().flat_map(|t| t.clips.iter())
    }

    pub fn find_clip(&self, clip_id: Uuid) -> Option<&Clip> {
        self.clips().find(|c| c.id == clip_id)
    }

    fn locate(&self, clip_id: Uuid) -> Result<(usize, usize)> {
        self.tracks
            .iter()
            .enumerate()
            .find_map(|(ti, t)| t.clips.iter().position(|c| c.id == clip_id).map(|ci| (ti, ci)))
            .ok_or(CoreError::ClipNotFound(clip_id))
    }

    fn clip_mut(&mut self, clip_id: Uuid) -> Result<&mut Clip> {
        let (ti, ci) = self.locate(clip_id)?;
        Ok(&mut self.tracks[ti].clips[ci])
    }

    fn ensure_unlocked(&self, track_index: usize) -> Result<()> {
        let track = &self.tracks[track_index];
        if track.locked {
            return Err(CoreError::TrackLocked(track.id));
        }
        Ok(())
    }

    // --- tracks ---

    pub fn add_track(&mut self, name: impl Into<String>, kind: TrackKind) -> Uuid {
        let track = Track::new(name, kind);
        let id = track.id;
        self.tracks.push(track);
        id
    }

    /// Remove a track with all its clips. Link partners on other tracks are
    /// handled as if each clip were removed individually.
    pub fn remove_track(&mut self, track_id: Uuid) -> Result<Track> {
        self.commit("remove_track", |tl| {
            let idx = tl.track_index(track_id)?;
            tl.ensure_unlocked(idx)?;
            let ids: Vec<Uuid> = tl.tracks[idx].clips.iter().map(|c| c.id).collect();
            for id in ids {
                if tl.locate(id).is_ok() {
                    tl.remove_cascading(id)?;
                }
            }
            let idx = tl.track_index(track_id)?;
            Ok(tl.tracks.remove(idx))
        })
    }

    pub fn set_track_muted(&mut self, track_id: Uuid, muted: bool) -> Result<()> {
        self.track_mut(track_id)?.muted = muted;
        Ok(())
    }

    pub fn set_track_locked(&mut self, track_id: Uuid, locked: bool) -> Result<()> {
        self.track_mut(track_id)?.locked = locked;
        Ok(())
    }

    // --- clips ---

    /// Add a clip to the specified track. Returns the clip id.
    pub fn add_clip(&mut self, track_id: Uuid, clip: Clip) -> Result<Uuid> {
        self.commit("add_clip", |tl| {
            let idx = tl.track_index(track_id)?;
            tl.ensure_unlocked(idx)?;
            let id = clip.id;
            tl.tracks[idx].add_clip(clip)?;
            Ok(id)
        })
    }

    /// Remove a clip. Removing a video clip also removes its detached audio;
    /// removing detached audio mutes the video clip it came from.
    pub fn remove_clip(&mut self, clip_id: Uuid) -> Result<Clip> {
        self.commit("remove_clip", |tl| {
            let (ti, _) = tl.locate(clip_id)?;
            tl.ensure_unlocked(ti)?;
            tl.remove_cascading(clip_id)
        })
    }

    fn remove_cascading(&mut self, clip_id: Uuid) -> Result<Clip> {
        let (ti, ci) = self.locate(clip_id)?;
        let clip = self.tracks[ti].clips.remove(ci);
        self.transitions.retain(|t| t.clip_id != clip_id);
        self.filters.remove(&clip_id);

        match clip.audio {
            AudioLink::Standalone => {}
            AudioLink::SourceOf(audio_id) => {
                if self.locate(audio_id).is_ok() {
                    self.remove_cascading(audio_id)?;
                }
            }
            AudioLink::DetachedFrom(video_id) => {
                if let Ok(video) = self.clip_mut(video_id) {
                    video.audio = AudioLink::Standalone;
                    video.audio_muted = true;
                }
            }
        }
        Ok(clip)
    }

    /// Move a clip within its track. A link partner moves by the same delta.
    pub fn move_clip(&mut self, clip_id: Uuid, new_start: TimelinePosition) -> Result<()> {
        self.commit("move_clip", |tl| {
            let (ti, ci) = tl.locate(clip_id)?;
            tl.ensure_unlocked(ti)?;
            let clip = &tl.tracks[ti].clips[ci];
            let old_start = clip.start;
            let partner = clip.audio.partner();

            tl.reposition(clip_id, new_start)?;

            if let Some(partner_id) = partner {
                let partner_start = tl.locate(partner_id).map(|(pt, pc)| tl.tracks[pt].clips[pc].start)?;
                let shifted = if new_start >= old_start {
                    partner_start + new_start.saturating_sub(old_start)
                } else {
                    TimelinePosition::from_duration(
                        partner_start
                            .as_duration()
                            .saturating_sub(old_start.saturating_sub(new_start)),
                    )
                };
                tl.reposition(partner_id, shifted)?;
            }
            Ok(())
        })
    }

    fn reposition(&mut self, clip_id: Uuid, new_start: TimelinePosition) -> Result<()> {
        let (ti, ci) = self.locate(clip_id)?;
        let track = &mut self.tracks[ti];
        track.clips[ci].start = new_start;
        let range = track.clips[ci].range();
        if track.overlapping(&range, Some(clip_id)).is_some() {
            return Err(CoreError::ClipOverlap { position: new_start });
        }
        track.sort_clips();
        Ok(())
    }

    /// Set a clip's trims. The clip keeps its start; its end moves. A link
    /// partner receives the same trims.
    pub fn trim_clip(&mut self, clip_id: Uuid, trim_start: Duration, trim_end: Duration) -> Result<()> {
        self.commit("trim_clip", |tl| {
            let (ti, ci) = tl.locate(clip_id)?;
            tl.ensure_unlocked(ti)?;
            let partner = tl.tracks[ti].clips[ci].audio.partner();
            tl.retrim(clip_id, trim_start, trim_end)?;
            if let Some(partner_id) = partner {
                tl.retrim(partner_id, trim_start, trim_end)?;
            }
            Ok(())
        })
    }

    fn retrim(&mut self, clip_id: Uuid, trim_start: Duration, trim_end: Duration) -> Result<()> {
        let (ti, ci) = self.locate(clip_id)?;
        let track = &mut self.tracks[ti];
        let clip = &mut track.clips[ci];
        clip.trim_start = trim_start;
        clip.trim_end = trim_end;
        clip.validate_trim()?;
        let range = clip.range();
        if track.overlapping(&range, Some(clip_id)).is_some() {
            return Err(CoreError::ClipOverlap { position: range.start });
        }
        Ok(())
    }

    /// Split a clip at `at`, strictly inside its span. The left piece keeps
    /// the original id. A linked partner spanning `at` is split too and the
    /// right halves are linked to each other.
    pub fn split_clip(&mut self, clip_id: Uuid, at: TimelinePosition) -> Result<(Uuid, Uuid)> {
        self.commit("split_clip", |tl| {
            let (ti, ci) = tl.locate(clip_id)?;
            tl.ensure_unlocked(ti)?;
            let link = tl.tracks[ti].clips[ci].audio;
            let right_id = tl.split_in_place(clip_id, at)?;

            if let Some(partner_id) = link.partner() {
                let partner_spans = tl
                    .find_clip(partner_id)
                    .is_some_and(|p| p.start < at && at < p.end());
                if partner_spans {
                    let partner_right = tl.split_in_place(partner_id, at)?;
                    match link {
                        AudioLink::SourceOf(_) => tl.link(right_id, partner_right)?,
                        _ => tl.link(partner_right, right_id)?,
                    }
                } else {
                    let right = tl.clip_mut(right_id)?;
                    right.audio = AudioLink::Standalone;
                    // the soundtrack lives on the detached clip, which ends before `at`
                    if matches!(link, AudioLink::SourceOf(_)) {
                        right.audio_muted = true;
                    }
                }
            }
            Ok((clip_id, right_id))
        })
    }

    fn split_in_place(&mut self, clip_id: Uuid, at: TimelinePosition) -> Result<Uuid> {
        let (ti, ci) = self.locate(clip_id)?;
        let original = self.tracks[ti].clips[ci].clone();
        if at <= original.start || at >= original.end() {
            return Err(CoreError::SplitOutsideClip { position: at });
        }
        let offset = at.saturating_sub(original.start);

        let mut right = original.clone();
        right.id = Uuid::new_v4();
        right.start = at;
        right.trim_start = original.trim_start + offset;
        let right_id = right.id;

        self.tracks[ti].clips[ci].trim_end = original.duration - (original.trim_start + offset);
        self.tracks[ti].clips.insert(ci + 1, right);

        for t in &mut self.transitions {
            if t.clip_id == clip_id && t.position == TransitionPosition::End {
                t.clip_id = right_id;
            }
        }
        if let Some(filter) = self.filters.get(&clip_id).copied() {
            self.filters.insert(right_id, filter);
        }
        Ok(right_id)
    }

    fn link(&mut self, video_id: Uuid, audio_id: Uuid) -> Result<()> {
        self.clip_mut(video_id)?.audio = AudioLink::SourceOf(audio_id);
        self.clip_mut(audio_id)?.audio = AudioLink::DetachedFrom(video_id);
        Ok(())
    }

    /// Move a video clip's soundtrack onto its own audio clip. Uses the
    /// first unlocked audio track with room, or creates one.
    pub fn detach_audio(&mut self, video_clip_id: Uuid) -> Result<Uuid> {
        self.commit("detach_audio", |tl| {
            let (ti, ci) = tl.locate(video_clip_id)?;
            let video = tl.tracks[ti].clips[ci].clone();
            if video.kind != ClipKind::Video || video.audio != AudioLink::Standalone {
                return Err(CoreError::NotDetachable(video_clip_id));
            }
            tl.ensure_unlocked(ti)?;

            let mut audio = video.clone();
            audio.id = Uuid::new_v4();
            audio.kind = ClipKind::Audio;
            audio.crop = None;
            audio.transform = None;
            audio.audio = AudioLink::Standalone;
            audio.audio_muted = false;

            let range = audio.range();
            let target = tl
                .audio_tracks()
                .find(|t| !t.locked && t.overlapping(&range, None).is_none())
                .map(|t| t.id);
            let track_id = match target {
                Some(id) => id,
                None => {
                    let n = tl.audio_tracks().count() + 1;
                    tl.add_track(format!("Audio {n}"), TrackKind::Audio)
                }
            };

            let audio_id = audio.id;
            tl.track_mut(track_id)?.add_clip(audio)?;
            tl.link(video_clip_id, audio_id)?;
            Ok(audio_id)
        })
    }

    /// Remove every clip using the asset, following link cascades.
    /// Returns the number of clips removed.
    pub fn remove_clips_by_asset(&mut self, asset_id: Uuid) -> Result<usize> {
        self.commit("remove_clips_by_asset", |tl| {
            let before = tl.clips().count();
            for id in tl.clips_using_asset(asset_id) {
                if tl.locate(id).is_ok() {
                    tl.remove_cascading(id)?;
                }
            }
            Ok(before - tl.clips().count())
        })
    }

    pub fn clips_using_asset(&self, asset_id: Uuid) -> Vec<Uuid> {
        self.clips()
            .filter(|c| c.asset_id == asset_id)
            .map(|c| c.id)
            .collect()
    }

    // --- per-clip attributes ---

    pub fn set_crop(&mut self, clip_id: Uuid, crop: Option<Crop>) -> Result<()> {
        self.commit("set_crop", |tl| {
            tl.clip_mut(clip_id)?.crop = crop;
            Ok(())
        })
    }

    pub fn set_transform(&mut self, clip_id: Uuid, transform: Option<Transform>) -> Result<()> {
        self.commit("set_transform", |tl| {
            tl.clip_mut(clip_id)?.transform = transform;
            Ok(())
        })
    }

    /// Linear gain, clamped to `0..=2`.
    pub fn set_clip_volume(&mut self, clip_id: Uuid, volume: f64) -> Result<()> {
        if !volume.is_finite() {
            return Err(CoreError::invalid_state(format!("volume {volume} is not finite")));
        }
        self.commit("set_clip_volume", |tl| {
            tl.clip_mut(clip_id)?.volume = volume.clamp(0.0, MAX_CLIP_VOLUME);
            Ok(())
        })
    }

    pub fn set_clip_audio_muted(&mut self, clip_id: Uuid, muted: bool) -> Result<()> {
        self.commit("set_clip_audio_muted", |tl| {
            tl.clip_mut(clip_id)?.audio_muted = muted;
            Ok(())
        })
    }

    // --- transitions ---

    /// Set the transition at `(clip_id, position)`, replacing any existing
    /// one there but keeping its id.
    pub fn set_transition(
        &mut self,
        clip_id: Uuid,
        kind: TransitionKind,
        duration: Duration,
        position: TransitionPosition,
    ) -> Result<Uuid> {
        self.commit("set_transition", |tl| {
            tl.locate(clip_id)?;
            if duration.is_zero() {
                return Err(CoreError::invalid_state("transition duration must be positive"));
            }
            if let Some(existing) = tl
                .transitions
                .iter_mut()
                .find(|t| t.clip_id == clip_id && t.position == position)
            {
                existing.kind = kind;
                existing.duration = duration;
                return Ok(existing.id);
            }
            let transition = Transition::new(clip_id, kind, duration, position);
            let id = transition.id;
            tl.transitions.push(transition);
            Ok(id)
        })
    }

    pub fn remove_transition(&mut self, transition_id: Uuid) -> Result<Transition> {
        let idx = self
            .transitions
            .iter()
            .position(|t| t.id == transition_id)
            .ok_or(CoreError::TransitionNotFound(transition_id))?;
        Ok(self.transitions.remove(idx))
    }

    pub fn transitions_for(&self, clip_id: Uuid) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(move |t| t.clip_id == clip_id)
    }

    // --- filters ---

    pub fn set_filter(&mut self, clip_id: Uuid, filter: VideoFilter) -> Result<()> {
        self.locate(clip_id)?;
        self.filters.insert(clip_id, filter);
        Ok(())
    }

    pub fn clear_filter(&mut self, clip_id: Uuid) -> Option<VideoFilter> {
        self.filters.remove(&clip_id)
    }

    pub fn filter_for(&self, clip_id: Uuid) -> Option<&VideoFilter> {
        self.filters.get(&clip_id)
    }

    // --- text overlays ---

    pub fn add_text_overlay(&mut self, overlay: TextOverlay) -> Result<Uuid> {
        self.commit("add_text_overlay", |tl| {
            let id = overlay.id;
            tl.text_overlays.push(overlay);
            Ok(id)
        })
    }

    pub fn update_text_overlay(&mut self, overlay: TextOverlay) -> Result<()> {
        self.commit("update_text_overlay", |tl| {
            let slot = tl
                .text_overlays
                .iter_mut()
                .find(|o| o.id == overlay.id)
                .ok_or(CoreError::OverlayNotFound(overlay.id))?;
            *slot = overlay;
            Ok(())
        })
    }

    pub fn remove_text_overlay(&mut self, overlay_id: Uuid) -> Result<TextOverlay> {
        let idx = self
            .text_overlays
            .iter()
            .position(|o| o.id == overlay_id)
            .ok_or(CoreError::OverlayNotFound(overlay_id))?;
        Ok(self.text_overlays.remove(idx))
    }

    // --- derived ---

    /// Latest end over all clips and overlays.
    pub fn duration(&self) -> Duration {
        let clips = self.tracks.iter().map(|t| t.end_position().as_duration());
        let overlays = self.text_overlays.iter().map(|o| o.end().as_duration());
        clips.chain(overlays).max().unwrap_or(Duration::ZERO)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for track in &self.tracks {
            for clip in &track.clips {
                if !seen.insert(clip.id) {
                    return Err(CoreError::invalid_state(format!("duplicate clip id {}", clip.id)));
                }
                if clip.track_id != track.id {
                    return Err(CoreError::invalid_state(format!(
                        "clip {} claims track {} but lives on {}",
                        clip.id, clip.track_id, track.id
                    )));
                }
                if !clip.kind.fits(track.kind) {
                    return Err(CoreError::TrackKindMismatch { track_kind: track.kind });
                }
                clip.validate_trim()?;
                if clip.crop.is_some() && clip.transform.is_some() {
                    return Err(CoreError::CropTransformConflict(clip.id));
                }
                if !(0.0..=MAX_CLIP_VOLUME).contains(&clip.volume) {
                    return Err(CoreError::invalid_state(format!(
                        "clip {} volume {} out of range",
                        clip.id, clip.volume
                    )));
                }
            }
        }

        for clip in self.clips() {
            let mirrored = match clip.audio {
                AudioLink::Standalone => true,
                AudioLink::SourceOf(audio_id) => self.find_clip(audio_id).is_some_and(|a| {
                    clip.kind == ClipKind::Video && a.audio == AudioLink::DetachedFrom(clip.id)
                }),
                AudioLink::DetachedFrom(video_id) => self.find_clip(video_id).is_some_and(|v| {
                    clip.kind == ClipKind::Audio && v.audio == AudioLink::SourceOf(clip.id)
                }),
            };
            if !mirrored {
                return Err(CoreError::invalid_state(format!(
                    "clip {} has a dangling audio link {:?}",
                    clip.id, clip.audio
                )));
            }
        }

        let mut keys = HashSet::new();
        for t in &self.transitions {
            if !seen.contains(&t.clip_id) {
                return Err(CoreError::invalid_state(format!(
                    "transition {} references missing clip {}",
                    t.id, t.clip_id
                )));
            }
            if t.duration.is_zero() {
                return Err(CoreError::invalid_state(format!("transition {} has zero duration", t.id)));
            }
            if !keys.insert((t.clip_id, t.position)) {
                return Err(CoreError::invalid_state(format!(
                    "clip {} has two {:?} transitions",
                    t.clip_id, t.position
                )));
            }
        }

        if let Some(orphan) = self.filters.keys().find(|id| !seen.contains(*id)) {
            return Err(CoreError::invalid_state(format!("filter references missing clip {orphan}")));
        }

        for overlay in &self.text_overlays {
            if overlay.duration.is_zero() {
                return Err(CoreError::invalid_state(format!(
                    "text overlay {} has zero duration",
                    overlay.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_secs_clamps_negative() {
        assert_eq!(TimelinePosition::from_secs_f64(-1.0), TimelinePosition::zero());
        assert_eq!(TimelinePosition::from_secs_f64(f64::NAN), TimelinePosition::zero());
        assert_eq!(TimelinePosition::from_secs_f64(f64::INFINITY), TimelinePosition::zero());
    }

    #[test]
    fn test_addition_saturates() {
        let huge = TimelinePosition::from_secs_f64(1e300);
        assert_eq!(huge.as_duration(), Duration::MAX);
        assert_eq!(huge + Duration::from_secs(1), huge);
        assert_eq!(huge + TimelinePosition::from_secs_f64(1.0), huge);
    }

    #[test]
    fn test_range_inclusive_end() {
        let range = TimeRange {
            start: TimelinePosition::from_secs_f64(1.0),
            end: TimelinePosition::from_secs_f64(2.0),
        };
        assert!(!range.contains(range.end));
        assert!(range.contains_inclusive(range.end));
    }

    #[test]
    fn test_adjacent_ranges_do_not_overlap() {
        let a = TimeRange {
            start: TimelinePosition::zero(),
            end: TimelinePosition::from_secs_f64(1.0),
        };
        let b = TimeRange {
            start: TimelinePosition::from_secs_f64(1.0),
            end: TimelinePosition::from_secs_f64(2.0),
        };
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn test_clip_kind_fits_track() {
        assert!(ClipKind::Image.fits(TrackKind::Video));
        assert!(!ClipKind::Audio.fits(TrackKind::Video));
        assert!(!ClipKind::Video.fits(TrackKind::Audio));
    }

    #[test]
    fn test_visible_duration_and_source_time() {
        let clip = Clip::new(Uuid::new_v4(), ClipKind::Video, TimelinePosition::from_secs_f64(10.0), Duration::from_secs(8))
            .with_trim(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(clip.visible_duration(), Duration::from_secs(5));
        assert_eq!(clip.end(), TimelinePosition::from_secs_f64(15.0));
        assert_eq!(clip.source_time(TimelinePosition::from_secs_f64(11.0)), Duration::from_secs(3));
        assert_eq!(clip.source_range(), (Duration::from_secs(2), Duration::from_secs(7)));
    }
}
