use std::time::Duration;

use clipweave_core::timeline::{AudioLink, Timeline, TimelinePosition};

/// Assert that a track has a specific number of clips.
pub fn assert_track_clip_count(timeline: &Timeline, track_index: usize, expected: usize) {
    let track = &timeline.tracks[track_index];
    assert_eq!(
        track.clips.len(),
        expected,
        "track {} has {} clips, expected {}",
        track_index,
        track.clips.len(),
        expected
    );
}

/// Assert that no clips overlap on any track.
pub fn assert_no_overlaps(timeline: &Timeline) {
    for (index, track) in timeline.tracks.iter().enumerate() {
        for (i, a) in track.clips.iter().enumerate() {
            for b in track.clips.iter().skip(i + 1) {
                assert!(
                    !a.range().overlaps(&b.range()),
                    "clips {} and {} overlap on track {}",
                    a.id,
                    b.id,
                    index
                );
            }
        }
    }
}

/// Assert that clips are sorted by start position on a track.
pub fn assert_clips_sorted(timeline: &Timeline, track_index: usize) {
    let track = &timeline.tracks[track_index];
    for window in track.clips.windows(2) {
        assert!(
            window[0].start <= window[1].start,
            "clips not sorted on track {}: {} should come before {}",
            track_index,
            window[0].id,
            window[1].id
        );
    }
}

/// Every audio link points at a live clip that links back.
pub fn assert_links_consistent(timeline: &Timeline) {
    for clip in timeline.clips() {
        match clip.audio {
            AudioLink::Standalone => {}
            AudioLink::SourceOf(audio_id) => {
                let audio = timeline
                    .find_clip(audio_id)
                    .unwrap_or_else(|| panic!("video clip {} links to missing audio {audio_id}", clip.id));
                assert_eq!(
                    audio.audio,
                    AudioLink::DetachedFrom(clip.id),
                    "audio clip {audio_id} does not link back to {}",
                    clip.id
                );
            }
            AudioLink::DetachedFrom(video_id) => {
                let video = timeline
                    .find_clip(video_id)
                    .unwrap_or_else(|| panic!("audio clip {} links to missing video {video_id}", clip.id));
                assert_eq!(
                    video.audio,
                    AudioLink::SourceOf(clip.id),
                    "video clip {video_id} does not link back to {}",
                    clip.id
                );
            }
        }
    }
}

/// Assert the timeline total duration is approximately the expected value.
pub fn assert_timeline_duration_approx(timeline: &Timeline, expected_secs: f64, tolerance_secs: f64) {
    let actual = timeline.duration().as_secs_f64();
    assert!(
        (actual - expected_secs).abs() < tolerance_secs,
        "timeline duration {actual:.3}s != expected {expected_secs:.3}s (tolerance {tolerance_secs:.3}s)"
    );
}

/// Assert that a clip exists at the given position on a track.
pub fn assert_clip_at(timeline: &Timeline, track_index: usize, position_secs: f64) {
    let track = &timeline.tracks[track_index];
    let pos = TimelinePosition::from_secs_f64(position_secs);
    assert!(
        track.clip_at(pos).is_some(),
        "expected clip at {position_secs}s on track {track_index}, but none found"
    );
}

/// Timestamps rise strictly.
pub fn assert_monotonic(timestamps: &[Duration]) {
    for pair in timestamps.windows(2) {
        assert!(
            pair[0] < pair[1],
            "timestamps not strictly increasing: {:?} then {:?}",
            pair[0],
            pair[1]
        );
    }
}
