use std::time::Duration;

use clipweave_core::overlay::TextOverlay;
use clipweave_core::resolver::{AudioSource, resolve};
use clipweave_core::timeline::*;
use clipweave_test_harness::builders::{ClipBuilder, MediaAssetBuilder, TimelineBuilder};
use proptest::prelude::*;

fn secs(s: f64) -> TimelinePosition {
    TimelinePosition::from_secs_f64(s)
}

#[test]
fn test_one_layer_per_video_track_bottom_first() {
    let base = MediaAssetBuilder::new("base").duration_secs(10.0).build();
    let overlay = MediaAssetBuilder::new("overlay").duration_secs(4.0).build();
    let fixture = TimelineBuilder::new()
        .with_asset(base.clone())
        .with_asset(overlay.clone())
        .video_track("V1")
        .video_track("V2")
        .with_clip(0, ClipBuilder::for_asset(&base).build())
        .with_clip(1, ClipBuilder::for_asset(&overlay).at(2.0).build())
        .build();

    let state = resolve(&fixture.timeline, &fixture.library, secs(3.0));
    let assets: Vec<_> = state.video_layers.iter().map(|l| l.asset.id).collect();
    assert_eq!(assets, vec![base.id, overlay.id]);
    assert_eq!(state.video_layers[1].track_index, 1);

    let state = resolve(&fixture.timeline, &fixture.library, secs(8.0));
    assert_eq!(state.video_layers.len(), 1);
}

#[test]
fn test_only_bottom_layer_is_audible() {
    let a = MediaAssetBuilder::new("a").duration_secs(5.0).build();
    let b = MediaAssetBuilder::new("b").duration_secs(5.0).build();
    let fixture = TimelineBuilder::new()
        .with_asset(a.clone())
        .with_asset(b.clone())
        .video_track("V1")
        .video_track("V2")
        .with_clip(0, ClipBuilder::for_asset(&a).build())
        .with_clip(1, ClipBuilder::for_asset(&b).build())
        .build();

    let state = resolve(&fixture.timeline, &fixture.library, secs(1.0));
    assert_eq!(state.video_layers.iter().filter(|l| l.audible).count(), 1);
    assert_eq!(state.main_video().unwrap().asset.id, a.id);

    let soundtracks: Vec<_> = state
        .audio_layers
        .iter()
        .filter(|l| l.source == AudioSource::VideoSoundtrack)
        .collect();
    assert_eq!(soundtracks.len(), 1);
    assert_eq!(soundtracks[0].asset.id, a.id);
}

#[test]
fn test_silent_bottom_layer_keeps_upper_layers_quiet() {
    let silent = MediaAssetBuilder::new("silent").no_audio().build();
    let loud = MediaAssetBuilder::new("loud").build();
    let fixture = TimelineBuilder::new()
        .with_asset(silent.clone())
        .with_asset(loud.clone())
        .video_track("V1")
        .video_track("V2")
        .with_clip(0, ClipBuilder::for_asset(&silent).build())
        .with_clip(1, ClipBuilder::for_asset(&loud).build())
        .build();

    let state = resolve(&fixture.timeline, &fixture.library, secs(1.0));
    assert!(state.main_video().is_none());
    assert!(state.audio_layers.is_empty());
}

#[test]
fn test_adjacent_clips_boundary_goes_to_earlier_clip() {
    let a = MediaAssetBuilder::new("a").duration_secs(2.0).build();
    let b = MediaAssetBuilder::new("b").duration_secs(2.0).build();
    let fixture = TimelineBuilder::new()
        .with_asset(a.clone())
        .with_asset(b.clone())
        .video_track("V1")
        .with_clip(0, ClipBuilder::for_asset(&a).build())
        .with_clip(0, ClipBuilder::for_asset(&b).at(2.0).build())
        .build();

    let at_edge = resolve(&fixture.timeline, &fixture.library, secs(2.0));
    assert_eq!(at_edge.video_layers.len(), 1);
    assert_eq!(at_edge.video_layers[0].asset.id, a.id);

    let just_after = resolve(&fixture.timeline, &fixture.library, secs(2.001));
    assert_eq!(just_after.video_layers[0].asset.id, b.id);

    // The last clip stays on screen at its own end instant.
    let at_end = resolve(&fixture.timeline, &fixture.library, secs(4.0));
    assert_eq!(at_end.video_layers.len(), 1);
    let past_end = resolve(&fixture.timeline, &fixture.library, secs(4.001));
    assert!(past_end.video_layers.is_empty());
}

#[test]
fn test_detached_audio_replaces_video_soundtrack() {
    let asset = MediaAssetBuilder::new("talk").duration_secs(4.0).build();
    let mut fixture = TimelineBuilder::new()
        .with_asset(asset.clone())
        .video_track("V1")
        .with_clip(0, ClipBuilder::for_asset(&asset).build())
        .build();
    let video = fixture.timeline.tracks[0].clips[0].id;
    let audio = fixture.timeline.detach_audio(video).unwrap();

    let state = resolve(&fixture.timeline, &fixture.library, secs(1.0));
    assert!(!state.video_layers[0].audible);
    assert_eq!(state.audio_layers.len(), 1);
    assert_eq!(state.audio_layers[0].clip.id, audio);
    assert_eq!(state.audio_layers[0].source, AudioSource::Track);

    // Deleting the detached clip leaves the video muted, so nothing plays.
    fixture.timeline.remove_clip(audio).unwrap();
    let state = resolve(&fixture.timeline, &fixture.library, secs(1.0));
    assert!(state.audio_layers.is_empty());
}

#[test]
fn test_muted_tracks_and_clips_are_skipped_for_audio() {
    let video = MediaAssetBuilder::new("video").duration_secs(4.0).build();
    let music = MediaAssetBuilder::audio("music").duration_secs(4.0).build();
    let voice = MediaAssetBuilder::audio("voice").duration_secs(4.0).build();
    let mut fixture = TimelineBuilder::new()
        .with_asset(video.clone())
        .with_asset(music.clone())
        .with_asset(voice.clone())
        .video_track("V1")
        .audio_track("A1")
        .audio_track("A2")
        .with_clip(0, ClipBuilder::for_asset(&video).build())
        .with_clip(1, ClipBuilder::for_asset(&music).build())
        .with_clip(2, ClipBuilder::for_asset(&voice).muted().build())
        .build();
    fixture.timeline.set_track_muted(fixture.track(0), true).unwrap();

    let state = resolve(&fixture.timeline, &fixture.library, secs(1.0));
    // A muted video track still draws.
    assert_eq!(state.video_layers.len(), 1);
    let sources: Vec<_> = state.audio_layers.iter().map(|l| l.asset.id).collect();
    assert_eq!(sources, vec![music.id]);
}

#[test]
fn test_audio_selection_uses_exclusive_end() {
    let music = MediaAssetBuilder::audio("music").duration_secs(2.0).build();
    let fixture = TimelineBuilder::new()
        .with_asset(music.clone())
        .audio_track("A1")
        .with_clip(0, ClipBuilder::for_asset(&music).build())
        .build();
    assert_eq!(resolve(&fixture.timeline, &fixture.library, secs(1.999)).audio_layers.len(), 1);
    assert!(resolve(&fixture.timeline, &fixture.library, secs(2.0)).audio_layers.is_empty());
}

#[test]
fn test_clips_with_unknown_assets_are_skipped() {
    let fixture = TimelineBuilder::new()
        .video_track("V1")
        .with_clip(0, ClipBuilder::new(uuid::Uuid::new_v4()).build())
        .build();
    assert!(resolve(&fixture.timeline, &fixture.library, secs(1.0)).is_empty());
}

#[test]
fn test_text_overlays_use_half_open_span() {
    let mut fixture = TimelineBuilder::new().build();
    let title = TextOverlay::new("Title", secs(1.0), Duration::from_secs(2));
    let id = fixture.timeline.add_text_overlay(title).unwrap();

    let visible = |t: f64| resolve(&fixture.timeline, &fixture.library, secs(t)).texts.len();
    assert_eq!(visible(0.999), 0);
    assert_eq!(visible(1.0), 1);
    assert_eq!(visible(2.999), 1);
    assert_eq!(visible(3.0), 0);
    assert_eq!(
        resolve(&fixture.timeline, &fixture.library, secs(2.0)).texts[0].id,
        id
    );
}

proptest! {
    #[test]
    fn at_most_one_layer_per_track_and_one_soundtrack(
        clips in prop::collection::vec((0usize..3, 0.0f64..20.0, 0.5f64..5.0), 1..12),
        t in 0.0f64..26.0,
    ) {
        let asset = MediaAssetBuilder::new("a").duration_secs(5.0).build();
        let mut builder = TimelineBuilder::new()
            .with_asset(asset.clone())
            .video_track("V1")
            .video_track("V2")
            .video_track("V3");
        // Keep only clips that fit their track without overlap.
        let mut placed: Vec<(usize, f64, f64)> = Vec::new();
        for (track, start, len) in clips {
            let fits = placed
                .iter()
                .all(|&(tr, s, l)| tr != track || start + len + 0.01 < s || s + l + 0.01 < start);
            if fits {
                placed.push((track, start, len));
                builder = builder.with_clip(track, ClipBuilder::for_asset(&asset).at(start).duration_secs(len).build());
            }
        }
        let fixture = builder.build();

        let state = resolve(&fixture.timeline, &fixture.library, secs(t));
        prop_assert!(state.video_layers.len() <= 3);
        let mut indices: Vec<_> = state.video_layers.iter().map(|l| l.track_index).collect();
        indices.dedup();
        prop_assert_eq!(indices.len(), state.video_layers.len());
        prop_assert!(state.video_layers.iter().filter(|l| l.audible).count() <= 1);
        let soundtracks = state
            .audio_layers
            .iter()
            .filter(|l| l.source == AudioSource::VideoSoundtrack)
            .count();
        prop_assert_eq!(soundtracks, usize::from(state.main_video().is_some()));
        if let Some(main) = state.main_video() {
            prop_assert_eq!(main.track_index, state.video_layers[0].track_index);
        }
    }
}
