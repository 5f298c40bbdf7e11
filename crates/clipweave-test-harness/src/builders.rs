use std::path::PathBuf;
use std::time::Duration;

use clipweave_core::effects::{Crop, Transform};
use clipweave_core::media::{MediaAsset, MediaKind, SourceLibrary};
use clipweave_core::timeline::{Clip, ClipKind, Timeline, TimelinePosition, TrackKind};
use uuid::Uuid;

/// Builder for creating test MediaAssets with sensible defaults.
pub struct MediaAssetBuilder {
    name: String,
    kind: MediaKind,
    path: PathBuf,
    duration: Duration,
    width: u32,
    height: u32,
    fps: f64,
    has_audio: bool,
}

impl MediaAssetBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            kind: MediaKind::Video,
            path: PathBuf::from(format!("/test/{name}.mp4")),
            duration: Duration::from_secs(10),
            width: 1920,
            height: 1080,
            fps: 30.0,
            has_audio: true,
        }
    }

    pub fn audio(name: &str) -> Self {
        Self {
            kind: MediaKind::Audio,
            path: PathBuf::from(format!("/test/{name}.wav")),
            has_audio: true,
            ..Self::new(name)
        }
    }

    pub fn image(name: &str) -> Self {
        Self {
            kind: MediaKind::Image,
            path: PathBuf::from(format!("/test/{name}.png")),
            duration: Duration::ZERO,
            has_audio: false,
            ..Self::new(name)
        }
    }

    pub fn duration_secs(mut self, secs: f64) -> Self {
        self.duration = Duration::from_secs_f64(secs);
        self
    }

    pub fn resolution(mut self, w: u32, h: u32) -> Self {
        self.width = w;
        self.height = h;
        self
    }

    pub fn fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn no_audio(mut self) -> Self {
        self.has_audio = false;
        self
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn build(self) -> MediaAsset {
        let asset = MediaAsset::new(self.name, self.kind, self.path, self.duration).with_audio(self.has_audio);
        match self.kind {
            MediaKind::Audio => asset,
            MediaKind::Image => asset.with_dimensions(self.width, self.height),
            MediaKind::Video => asset.with_dimensions(self.width, self.height).with_fps(self.fps),
        }
    }
}

/// Builder for creating test Clips with sensible defaults.
pub struct ClipBuilder {
    asset_id: Uuid,
    kind: ClipKind,
    start_secs: f64,
    duration_secs: f64,
    trim_start_secs: f64,
    trim_end_secs: f64,
    volume: f64,
    audio_muted: bool,
    crop: Option<Crop>,
    transform: Option<Transform>,
}

impl ClipBuilder {
    pub fn new(asset_id: Uuid) -> Self {
        Self {
            asset_id,
            kind: ClipKind::Video,
            start_secs: 0.0,
            duration_secs: 5.0,
            trim_start_secs: 0.0,
            trim_end_secs: 0.0,
            volume: 1.0,
            audio_muted: false,
            crop: None,
            transform: None,
        }
    }

    /// Clip spanning the whole asset, with the asset's kind.
    pub fn for_asset(asset: &MediaAsset) -> Self {
        Self {
            kind: asset.kind.into(),
            duration_secs: asset.duration_hint.as_secs_f64(),
            ..Self::new(asset.id)
        }
    }

    pub fn kind(mut self, kind: ClipKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn at(mut self, start_secs: f64) -> Self {
        self.start_secs = start_secs;
        self
    }

    pub fn duration_secs(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn trim(mut self, start_secs: f64, end_secs: f64) -> Self {
        self.trim_start_secs = start_secs;
        self.trim_end_secs = end_secs;
        self
    }

    pub fn volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    pub fn muted(mut self) -> Self {
        self.audio_muted = true;
        self
    }

    pub fn crop(mut self, crop: Crop) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn build(self) -> Clip {
        let mut clip = Clip::new(
            self.asset_id,
            self.kind,
            TimelinePosition::from_secs_f64(self.start_secs),
            Duration::from_secs_f64(self.duration_secs),
        )
        .with_trim(
            Duration::from_secs_f64(self.trim_start_secs),
            Duration::from_secs_f64(self.trim_end_secs),
        );
        clip.volume = self.volume;
        clip.audio_muted = self.audio_muted;
        clip.crop = self.crop;
        clip.transform = self.transform;
        clip
    }
}

/// A timeline plus the library its clips point into.
pub struct TimelineFixture {
    pub timeline: Timeline,
    pub library: SourceLibrary,
    /// Track ids in creation order.
    pub tracks: Vec<Uuid>,
}

impl TimelineFixture {
    pub fn asset(&self, name: &str) -> &MediaAsset {
        self.library
            .assets()
            .iter()
            .find(|a| a.name == name)
            .unwrap_or_else(|| panic!("no asset named {name}"))
    }

    pub fn track(&self, index: usize) -> Uuid {
        self.tracks[index]
    }
}

/// Build a timeline and library in one go. Clips are placed on tracks by
/// index, in the order tracks were added.
pub struct TimelineBuilder {
    assets: Vec<MediaAsset>,
    tracks: Vec<(String, TrackKind)>,
    clips: Vec<(usize, Clip)>,
}

impl Default for TimelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TimelineBuilder {
    pub fn new() -> Self {
        Self {
            assets: Vec::new(),
            tracks: Vec::new(),
            clips: Vec::new(),
        }
    }

    pub fn with_asset(mut self, asset: MediaAsset) -> Self {
        self.assets.push(asset);
        self
    }

    pub fn video_track(mut self, name: &str) -> Self {
        self.tracks.push((name.into(), TrackKind::Video));
        self
    }

    pub fn audio_track(mut self, name: &str) -> Self {
        self.tracks.push((name.into(), TrackKind::Audio));
        self
    }

    pub fn with_clip(mut self, track_index: usize, clip: Clip) -> Self {
        self.clips.push((track_index, clip));
        self
    }

    pub fn build(self) -> TimelineFixture {
        let mut library = SourceLibrary::new();
        for asset in self.assets {
            library.import(asset);
        }
        let mut timeline = Timeline::new();
        let tracks: Vec<Uuid> = self
            .tracks
            .into_iter()
            .map(|(name, kind)| timeline.add_track(name, kind))
            .collect();
        for (index, clip) in self.clips {
            timeline
                .add_clip(tracks[index], clip)
                .expect("fixture clip must fit its track");
        }
        TimelineFixture {
            timeline,
            library,
            tracks,
        }
    }
}
