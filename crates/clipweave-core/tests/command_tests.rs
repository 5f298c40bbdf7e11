use clipweave_core::commands::CommandHistory;
use clipweave_core::error::CoreError;
use clipweave_core::timeline::*;
use clipweave_test_harness::builders::ClipBuilder;
use uuid::Uuid;

fn clip(start_secs: f64, duration_secs: f64) -> Clip {
    ClipBuilder::new(Uuid::new_v4()).at(start_secs).duration_secs(duration_secs).build()
}

fn video_timeline() -> (Timeline, Uuid) {
    let mut timeline = Timeline::new();
    let track = timeline.add_track("Video 1", TrackKind::Video);
    (timeline, track)
}

#[test]
fn test_undo_redo() {
    let (mut timeline, track) = video_timeline();
    let mut history = CommandHistory::new();

    history
        .execute(&mut timeline, "Add clip", |tl| tl.add_clip(track, clip(0.0, 5.0)))
        .unwrap();
    assert_eq!(timeline.tracks[0].clips.len(), 1);
    assert!(history.can_undo());
    assert!(!history.can_redo());

    history.undo(&mut timeline).unwrap();
    assert_eq!(timeline.tracks[0].clips.len(), 0);
    assert!(!history.can_undo());
    assert!(history.can_redo());

    history.redo(&mut timeline).unwrap();
    assert_eq!(timeline.tracks[0].clips.len(), 1);
}

#[test]
fn test_multiple_undo_redo() {
    let (mut timeline, track) = video_timeline();
    let mut history = CommandHistory::new();

    history
        .execute(&mut timeline, "Add clip 1", |tl| tl.add_clip(track, clip(0.0, 5.0)))
        .unwrap();
    history
        .execute(&mut timeline, "Add clip 2", |tl| tl.add_clip(track, clip(5.0, 3.0)))
        .unwrap();
    assert_eq!(history.undo_description(), Some("Add clip 2"));

    history.undo(&mut timeline).unwrap();
    history.undo(&mut timeline).unwrap();
    assert_eq!(timeline.tracks[0].clips.len(), 0);

    history.redo(&mut timeline).unwrap();
    assert_eq!(timeline.tracks[0].clips.len(), 1);
    assert_eq!(history.redo_description(), Some("Add clip 2"));
}

#[test]
fn test_new_edit_clears_redo() {
    let (mut timeline, track) = video_timeline();
    let mut history = CommandHistory::new();

    history
        .execute(&mut timeline, "Add clip 1", |tl| tl.add_clip(track, clip(0.0, 5.0)))
        .unwrap();
    history.undo(&mut timeline).unwrap();
    history
        .execute(&mut timeline, "Add clip 2", |tl| tl.add_clip(track, clip(1.0, 1.0)))
        .unwrap();
    assert!(!history.can_redo());
    assert!(matches!(history.redo(&mut timeline), Err(CoreError::NothingToRedo)));
}

#[test]
fn test_failed_edit_not_recorded() {
    let (mut timeline, track) = video_timeline();
    let mut history = CommandHistory::new();
    history
        .execute(&mut timeline, "Add clip", |tl| tl.add_clip(track, clip(0.0, 5.0)))
        .unwrap();
    let before = timeline.clone();

    let result = history.execute(&mut timeline, "Overlap", |tl| tl.add_clip(track, clip(2.0, 5.0)));
    assert!(result.is_err());
    assert_eq!(timeline, before);
    assert_eq!(history.undo_description(), Some("Add clip"));
}

#[test]
fn test_undo_restores_detached_audio_links() {
    let (mut timeline, track) = video_timeline();
    let mut history = CommandHistory::new();
    let video = history
        .execute(&mut timeline, "Add clip", |tl| tl.add_clip(track, clip(0.0, 4.0)))
        .unwrap();
    let audio = history
        .execute(&mut timeline, "Detach audio", |tl| tl.detach_audio(video))
        .unwrap();
    history
        .execute(&mut timeline, "Delete audio", |tl| tl.remove_clip(audio))
        .unwrap();
    assert!(timeline.find_clip(video).unwrap().audio_muted);

    history.undo(&mut timeline).unwrap();
    let v = timeline.find_clip(video).unwrap();
    assert_eq!(v.audio, AudioLink::SourceOf(audio));
    assert!(!v.audio_muted);
    timeline.validate().unwrap();
}

#[test]
fn test_record_external_apply() {
    let (mut timeline, track) = video_timeline();
    let mut history = CommandHistory::new();
    let next = timeline
        .apply(|tl| tl.add_clip(track, clip(0.0, 1.0)).map(|_| ()))
        .unwrap();
    history.record("Add clip", &timeline, &next);
    timeline = next;

    history.undo(&mut timeline).unwrap();
    assert_eq!(timeline.clips().count(), 0);
}

#[test]
fn test_history_limit_drops_oldest() {
    let (mut timeline, track) = video_timeline();
    let mut history = CommandHistory::with_limit(3);
    for i in 0..5 {
        history
            .execute(&mut timeline, &format!("Add clip {i}"), |tl| {
                tl.add_clip(track, clip(i as f64 * 2.0, 1.0))
            })
            .unwrap();
    }

    let mut undone = 0;
    while history.undo(&mut timeline).is_ok() {
        undone += 1;
    }
    assert_eq!(undone, 3);
    assert_eq!(timeline.clips().count(), 2);
    assert!(matches!(history.undo(&mut timeline), Err(CoreError::NothingToUndo)));
}
