//! Which clips are visible and audible at a timeline instant.
//!
//! Preview and export both call [`resolve`], so a frame's layer stack is
//! decided in exactly one place.

use crate::media::{MediaAsset, SourceLibrary};
use crate::overlay::TextOverlay;
use crate::timeline::{AudioLink, Clip, ClipKind, Timeline, TimelinePosition};

#[derive(Debug, Clone, Copy)]
pub struct VideoLayer<'a> {
    pub clip: &'a Clip,
    pub asset: &'a MediaAsset,
    /// Index into `Timeline::tracks`; higher draws on top.
    pub track_index: usize,
    pub track_muted: bool,
    pub audible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSource {
    /// A clip on an audio track.
    Track,
    /// The soundtrack of the main video layer.
    VideoSoundtrack,
}

#[derive(Debug, Clone, Copy)]
pub struct AudioLayer<'a> {
    pub clip: &'a Clip,
    pub asset: &'a MediaAsset,
    pub source: AudioSource,
}

#[derive(Debug, Clone, Default)]
pub struct ActiveState<'a> {
    /// Bottom to top.
    pub video_layers: Vec<VideoLayer<'a>>,
    pub audio_layers: Vec<AudioLayer<'a>>,
    pub texts: Vec<&'a TextOverlay>,
}

impl<'a> ActiveState<'a> {
    /// The one video layer allowed to contribute sound.
    pub fn main_video(&self) -> Option<&VideoLayer<'a>> {
        self.video_layers.iter().find(|l| l.audible)
    }

    pub fn is_empty(&self) -> bool {
        self.video_layers.is_empty() && self.audio_layers.is_empty() && self.texts.is_empty()
    }
}

/// Whether a video clip's own soundtrack is superseded by a detached audio clip.
pub fn has_live_detached_audio(timeline: &Timeline, clip: &Clip) -> bool {
    match clip.audio {
        AudioLink::SourceOf(audio_id) => timeline.find_clip(audio_id).is_some(),
        _ => false,
    }
}

pub fn resolve<'a>(timeline: &'a Timeline, library: &'a SourceLibrary, t: TimelinePosition) -> ActiveState<'a> {
    let mut state = ActiveState::default();

    for (track_index, track) in timeline.video_tracks() {
        let Some(clip) = track.clip_at_inclusive(t) else {
            continue;
        };
        let Some(asset) = library.get(clip.asset_id) else {
            continue;
        };
        state.video_layers.push(VideoLayer {
            clip,
            asset,
            track_index,
            track_muted: track.muted,
            audible: false,
        });
    }

    // Only the bottom-most layer may be heard, so stacked copies of the
    // same footage do not echo.
    if let Some(main) = state.video_layers.first_mut() {
        main.audible = !main.track_muted
            && main.clip.kind == ClipKind::Video
            && !main.clip.audio_muted
            && main.asset.has_audio
            && !has_live_detached_audio(timeline, main.clip);
    }

    for track in timeline.audio_tracks().filter(|t| !t.muted) {
        for clip in &track.clips {
            if clip.audio_muted || !clip.range().contains(t) {
                continue;
            }
            if let Some(asset) = library.get(clip.asset_id) {
                state.audio_layers.push(AudioLayer {
                    clip,
                    asset,
                    source: AudioSource::Track,
                });
            }
        }
    }

    if let Some(main) = state.main_video().copied() {
        state.audio_layers.push(AudioLayer {
            clip: main.clip,
            asset: main.asset,
            source: AudioSource::VideoSoundtrack,
        });
    }

    state.texts = timeline
        .text_overlays
        .iter()
        .filter(|o| o.is_visible_at(t))
        .collect();

    state
}
