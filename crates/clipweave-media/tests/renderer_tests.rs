use std::time::Duration;

use clipweave_core::effects::VideoFilter;
use clipweave_core::logging::init_test_logging;
use clipweave_core::overlay::{Rgba, TextOverlay, TextStyle};
use clipweave_core::pipeline::FrameBuffer;
use clipweave_core::settings::{AspectRatio, ExportSettings, ResolutionPreset};
use clipweave_core::timeline::{ClipKind, TimelinePosition};
use clipweave_core::transition::{TransitionKind, TransitionPosition};
use clipweave_media::decoder::AudioConfig;
use clipweave_media::error::MediaError;
use clipweave_media::progress::{ProgressReporter, RenderStage};
use clipweave_media::renderer::{render_timeline, CancellationToken, ExportJob, ExportOutput, AUDIO_BLOCK_FRAMES};
use clipweave_test_harness::assertions::assert_monotonic;
use clipweave_test_harness::builders::{ClipBuilder, MediaAssetBuilder, TimelineBuilder, TimelineFixture};
use clipweave_test_harness::fixtures::{RecordingMuxer, StubTextRasterizer, SyntheticMedia, SyntheticOpener};

const RED: [u8; 4] = [255, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];

/// 480x480 at 30 fps.
fn settings() -> ExportSettings {
    ExportSettings {
        resolution: ResolutionPreset::P480,
        aspect: AspectRatio::Square,
        ..ExportSettings::default()
    }
}

fn export(
    fixture: &TimelineFixture,
    opener: &SyntheticOpener,
    muxer: &mut RecordingMuxer,
) -> clipweave_media::Result<ExportOutput> {
    init_test_logging();
    let job = ExportJob::new(&fixture.timeline, &fixture.library, settings());
    render_timeline(
        &job,
        opener,
        muxer,
        &StubTextRasterizer::new(),
        &mut ProgressReporter::silent(),
        &CancellationToken::new(),
    )
}

/// One red 480x480 video clip with no sound, placed at `start_secs`.
fn single_clip(start_secs: f64, duration_secs: f64) -> (TimelineFixture, SyntheticOpener) {
    let asset = MediaAssetBuilder::new("red")
        .duration_secs(duration_secs)
        .resolution(480, 480)
        .no_audio()
        .build();
    let opener = SyntheticOpener::new().with(&asset, SyntheticMedia::video(duration_secs, 480, 480, RED));
    let fixture = TimelineBuilder::new()
        .with_asset(asset.clone())
        .video_track("Video 1")
        .with_clip(0, ClipBuilder::for_asset(&asset).at(start_secs).build())
        .build();
    (fixture, opener)
}

#[test]
fn test_leading_gap_renders_black_frames() {
    let (fixture, opener) = single_clip(2.0, 3.0);
    let mut muxer = RecordingMuxer::new();
    let output = export(&fixture, &opener, &mut muxer).unwrap();

    assert_eq!(output.video_frames, 150);
    assert_eq!(muxer.frames.len(), 150);
    for frame in &muxer.frames[..60] {
        assert_eq!(frame.center, BLACK, "frame at {:?} should be black", frame.timestamp);
    }
    assert_eq!(muxer.frames[60].timestamp, Duration::from_secs(2));
    assert_eq!(muxer.frames[60].center, RED);
    assert!(muxer.frames[60..].iter().all(|f| f.center == RED));
    assert_monotonic(&muxer.frame_timestamps());
}

#[test]
fn test_output_spans_longest_track() {
    let video = MediaAssetBuilder::new("video").duration_secs(5.0).resolution(480, 480).no_audio().build();
    let music = MediaAssetBuilder::audio("music").duration_secs(8.0).build();
    let opener = SyntheticOpener::new()
        .with(&video, SyntheticMedia::video(5.0, 480, 480, RED))
        .with(&music, SyntheticMedia::audio(8.0, 48_000, 2, 0.5));
    let fixture = TimelineBuilder::new()
        .with_asset(video.clone())
        .with_asset(music.clone())
        .video_track("Video 1")
        .audio_track("Audio 1")
        .with_clip(0, ClipBuilder::for_asset(&video).build())
        .with_clip(1, ClipBuilder::for_asset(&music).build())
        .build();

    let mut muxer = RecordingMuxer::new();
    let output = export(&fixture, &opener, &mut muxer).unwrap();

    assert_eq!(output.duration, Duration::from_secs(8));
    assert_eq!(output.video_frames, 240);
    assert_eq!(output.audio, AudioConfig { sample_rate: 48_000, channels: 2 });
    // The clip's end instant still shows its last frame.
    assert_eq!(muxer.frames[150].center, RED);
    assert_eq!(muxer.frames[151].center, BLACK);
    assert_eq!(muxer.frames.last().unwrap().center, BLACK);

    assert!((muxer.audio_secs() - 8.0).abs() < 1e-9);
    assert_monotonic(&muxer.block_timestamps());
    for block in &muxer.blocks {
        assert!(
            block.samples.iter().all(|s| (s - 0.5).abs() < 1e-6),
            "block at {:?} is not at the source level",
            block.timestamp
        );
    }
}

#[test]
fn test_audio_blocks_cover_duration_on_fixed_grid() {
    let (fixture, opener) = single_clip(0.0, 1.0);
    let mut muxer = RecordingMuxer::new();
    let output = export(&fixture, &opener, &mut muxer).unwrap();

    // No audible clips: silent 48 kHz stereo.
    assert_eq!(output.audio, AudioConfig::default());
    assert_eq!(output.audio_blocks, 47);
    assert!(muxer.blocks[..46].iter().all(|b| b.frames() == AUDIO_BLOCK_FRAMES));
    assert_eq!(muxer.blocks[46].frames(), 48_000 - 46 * AUDIO_BLOCK_FRAMES);
    assert!(muxer.blocks.iter().all(|b| b.peak() == 0.0));
}

#[test]
fn test_cancellation_stops_export() {
    let (fixture, opener) = single_clip(0.0, 3.0);
    let token = CancellationToken::new();
    let trigger = token.clone();
    let mut progress = ProgressReporter::new(move |update| {
        if update.percent >= 10 {
            trigger.cancel();
        }
    });

    let job = ExportJob::new(&fixture.timeline, &fixture.library, settings());
    let mut muxer = RecordingMuxer::new();
    let result = render_timeline(&job, &opener, &mut muxer, &StubTextRasterizer::new(), &mut progress, &token);

    assert!(matches!(result, Err(MediaError::Cancelled)));
    assert!(!muxer.finalized);
    assert!(muxer.frames.len() < 90);
}

#[test]
fn test_cancel_before_start() {
    let (fixture, opener) = single_clip(0.0, 1.0);
    let token = CancellationToken::new();
    token.cancel();
    let job = ExportJob::new(&fixture.timeline, &fixture.library, settings());
    let mut muxer = RecordingMuxer::new();
    let result = render_timeline(
        &job,
        &opener,
        &mut muxer,
        &StubTextRasterizer::new(),
        &mut ProgressReporter::silent(),
        &token,
    );
    assert!(matches!(result, Err(MediaError::Cancelled)));
    assert!(muxer.frames.is_empty());
}

#[test]
fn test_export_is_deterministic() {
    let bottom = MediaAssetBuilder::new("bottom").duration_secs(2.0).resolution(640, 360).no_audio().build();
    let top = MediaAssetBuilder::new("top").duration_secs(1.0).resolution(320, 240).no_audio().build();
    let opener = SyntheticOpener::new()
        .with(&bottom, SyntheticMedia::video(2.0, 640, 360, RED))
        .with(&top, SyntheticMedia::video(1.0, 320, 240, BLUE));
    let mut fixture = TimelineBuilder::new()
        .with_asset(bottom.clone())
        .with_asset(top.clone())
        .video_track("Video 1")
        .video_track("Video 2")
        .with_clip(0, ClipBuilder::for_asset(&bottom).build())
        .with_clip(1, ClipBuilder::for_asset(&top).at(0.5).build())
        .build();
    let top_id = fixture.timeline.tracks[1].clips[0].id;
    fixture
        .timeline
        .set_transition(top_id, TransitionKind::CircleWipe, Duration::from_millis(400), TransitionPosition::Start)
        .unwrap();
    fixture
        .timeline
        .set_filter(
            top_id,
            VideoFilter {
                grayscale: true,
                ..VideoFilter::default()
            },
        )
        .unwrap();
    fixture
        .timeline
        .add_text_overlay(TextOverlay::new("Title", TimelinePosition::zero(), Duration::from_secs(1)))
        .unwrap();

    let mut first = RecordingMuxer::new();
    let mut second = RecordingMuxer::new();
    let a = export(&fixture, &opener, &mut first).unwrap();
    let b = export(&fixture, &opener, &mut second).unwrap();

    assert_eq!(a.bytes, b.bytes);
    assert_eq!(first.frames, second.frames);
    assert_eq!(first.blocks, second.blocks);
}

#[test]
fn test_decode_failure_names_clip() {
    let asset = MediaAssetBuilder::new("broken").duration_secs(2.0).resolution(480, 480).no_audio().build();
    let opener = SyntheticOpener::new().with(&asset, SyntheticMedia::video(2.0, 480, 480, RED).failing_after(10));
    let fixture = TimelineBuilder::new()
        .with_asset(asset.clone())
        .video_track("Video 1")
        .with_clip(0, ClipBuilder::for_asset(&asset).build())
        .build();
    let clip_id = fixture.timeline.tracks[0].clips[0].id;

    let mut muxer = RecordingMuxer::new();
    match export(&fixture, &opener, &mut muxer) {
        Err(MediaError::MediaDecodeFailure { clip_id: failed, .. }) => assert_eq!(failed, clip_id),
        other => panic!("expected decode failure, got {other:?}"),
    }
    assert!(!muxer.finalized);
}

#[test]
fn test_missing_source_is_decode_failure() {
    let (fixture, _) = single_clip(0.0, 1.0);
    let clip_id = fixture.timeline.tracks[0].clips[0].id;
    let mut muxer = RecordingMuxer::new();
    let result = export(&fixture, &SyntheticOpener::new(), &mut muxer);
    assert!(matches!(result, Err(MediaError::MediaDecodeFailure { clip_id: id, .. }) if id == clip_id));
}

#[test]
fn test_progress_rises_to_one_hundred() {
    let (fixture, opener) = single_clip(0.5, 2.0);
    let (mut progress, rx) = ProgressReporter::channel();
    let job = ExportJob::new(&fixture.timeline, &fixture.library, settings());
    let mut muxer = RecordingMuxer::new();
    render_timeline(
        &job,
        &opener,
        &mut muxer,
        &StubTextRasterizer::new(),
        &mut progress,
        &CancellationToken::new(),
    )
    .unwrap();

    let updates: Vec<_> = rx.try_iter().collect();
    assert_eq!(updates.first().map(|u| u.percent), Some(0));
    assert!(updates.windows(2).all(|w| w[0].percent < w[1].percent));
    let last = updates.last().unwrap();
    assert_eq!(last.percent, 100);
    assert_eq!(last.stage, RenderStage::Complete);
}

#[test]
fn test_incompatible_audio_blocks_are_skipped() {
    let first = MediaAssetBuilder::audio("first").duration_secs(2.0).build();
    let second = MediaAssetBuilder::audio("second").duration_secs(2.0).build();
    let opener = SyntheticOpener::new()
        .with(&first, SyntheticMedia::audio(2.0, 48_000, 2, 0.25))
        .with(&second, SyntheticMedia::audio(2.0, 44_100, 1, 0.25));
    let fixture = TimelineBuilder::new()
        .with_asset(first.clone())
        .with_asset(second.clone())
        .audio_track("Audio 1")
        .with_clip(0, ClipBuilder::for_asset(&first).build())
        .with_clip(0, ClipBuilder::for_asset(&second).at(2.0).build())
        .build();

    let mut muxer = RecordingMuxer::new();
    let output = export(&fixture, &opener, &mut muxer).unwrap();

    assert_eq!(output.audio, AudioConfig { sample_rate: 48_000, channels: 2 });
    // 88_200 source samples in 1024-sample blocks.
    assert_eq!(output.skipped_audio_blocks, 87);
    assert!((muxer.audio_secs() - 4.0).abs() < 1e-9);
    let late = muxer
        .blocks
        .iter()
        .filter(|b| b.timestamp >= Duration::from_millis(2_100));
    assert!(late.clone().count() > 0);
    assert!(late.into_iter().all(|b| b.peak() == 0.0));
}

#[test]
fn test_plain_layer_is_forwarded_unchanged() {
    let translucent = [10, 20, 30, 128];
    let asset = MediaAssetBuilder::new("clip").duration_secs(1.0).resolution(480, 480).no_audio().build();
    let opener = SyntheticOpener::new().with(&asset, SyntheticMedia::video(1.0, 480, 480, translucent));
    let fixture = TimelineBuilder::new()
        .with_asset(asset.clone())
        .video_track("Video 1")
        .with_clip(0, ClipBuilder::for_asset(&asset).build())
        .build();

    let mut muxer = RecordingMuxer::keeping_images();
    export(&fixture, &opener, &mut muxer).unwrap();

    // Compositing over black would have made the pixels opaque.
    assert_eq!(muxer.images[0], FrameBuffer::solid(480, 480, translucent));
}

#[test]
fn test_fade_in_halfway_is_half_alpha() {
    let (mut fixture, opener) = single_clip(0.0, 2.0);
    let clip_id = fixture.timeline.tracks[0].clips[0].id;
    fixture
        .timeline
        .set_transition(clip_id, TransitionKind::Fade, Duration::from_secs(1), TransitionPosition::Start)
        .unwrap();

    let mut muxer = RecordingMuxer::new();
    export(&fixture, &opener, &mut muxer).unwrap();

    assert_eq!(muxer.frames[0].center, BLACK);
    let half = muxer.frames[15].center;
    assert!((126..=130).contains(&half[0]), "red at 0.5s was {}", half[0]);
    assert_eq!(muxer.frames[30].center, RED);
}

#[test]
fn test_higher_track_draws_on_top() {
    let bottom = MediaAssetBuilder::new("bottom").duration_secs(1.0).resolution(480, 480).no_audio().build();
    let top = MediaAssetBuilder::new("top").duration_secs(1.0).resolution(240, 240).no_audio().build();
    let opener = SyntheticOpener::new()
        .with(&bottom, SyntheticMedia::video(1.0, 480, 480, RED))
        .with(&top, SyntheticMedia::video(1.0, 240, 240, BLUE));
    let mut fixture = TimelineBuilder::new()
        .with_asset(bottom.clone())
        .with_asset(top.clone())
        .video_track("Video 1")
        .video_track("Video 2")
        .with_clip(0, ClipBuilder::for_asset(&bottom).build())
        .with_clip(1, ClipBuilder::for_asset(&top).build())
        .build();
    fixture.timeline.tracks[1].clips[0].transform = Some(clipweave_core::effects::Transform {
        scale: 0.5,
        ..Default::default()
    });

    let mut muxer = RecordingMuxer::keeping_images();
    export(&fixture, &opener, &mut muxer).unwrap();

    let frame = &muxer.images[0];
    assert_eq!(frame.pixel(240, 240), &BLUE);
    assert_eq!(frame.pixel(5, 5), &RED);
}

#[test]
fn test_image_clip_is_letterboxed() {
    let image = MediaAssetBuilder::image("poster").resolution(240, 480).build();
    let opener = SyntheticOpener::new().with(&image, SyntheticMedia::image(240, 480, [255, 255, 255, 255]));
    let fixture = TimelineBuilder::new()
        .with_asset(image.clone())
        .video_track("Video 1")
        .with_clip(0, ClipBuilder::new(image.id).kind(ClipKind::Image).duration_secs(1.0).build())
        .build();

    let mut muxer = RecordingMuxer::keeping_images();
    export(&fixture, &opener, &mut muxer).unwrap();

    let frame = &muxer.images[10];
    assert_eq!(frame.pixel(240, 240), &[255, 255, 255, 255]);
    assert_eq!(frame.pixel(10, 240), &BLACK);
    assert_eq!(frame.pixel(470, 240), &BLACK);
    // Decoded once, not once per frame.
    assert_eq!(opener.opens(), 1);
}

#[test]
fn test_text_overlay_drawn_over_video() {
    let (mut fixture, opener) = single_clip(0.0, 1.0);
    let style = TextStyle {
        color: Rgba(0, 255, 0, 255),
        ..TextStyle::default()
    };
    fixture
        .timeline
        .add_text_overlay(TextOverlay::new("Hi", TimelinePosition::zero(), Duration::from_millis(500)).with_style(style))
        .unwrap();

    let mut muxer = RecordingMuxer::new();
    let job = ExportJob::new(&fixture.timeline, &fixture.library, settings());
    let text = StubTextRasterizer::new();
    render_timeline(
        &job,
        &opener,
        &mut muxer,
        &text,
        &mut ProgressReporter::silent(),
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(text.draws(), 15);
    assert_eq!(muxer.frames[0].center, [0, 255, 0, 255]);
    assert_eq!(muxer.frames[15].center, RED);
}

#[test]
fn test_overlapping_audio_is_mixed_and_clamped() {
    let quiet = MediaAssetBuilder::audio("quiet").duration_secs(1.0).build();
    let loud = MediaAssetBuilder::audio("loud").duration_secs(1.0).build();
    let opener = SyntheticOpener::new()
        .with(&quiet, SyntheticMedia::audio(1.0, 48_000, 2, 0.25))
        .with(&loud, SyntheticMedia::audio(1.0, 48_000, 2, 0.9));
    let fixture = TimelineBuilder::new()
        .with_asset(quiet.clone())
        .with_asset(loud.clone())
        .audio_track("Audio 1")
        .audio_track("Audio 2")
        .with_clip(0, ClipBuilder::for_asset(&quiet).build())
        .with_clip(1, ClipBuilder::for_asset(&loud).at(0.5).build())
        .build();

    let mut muxer = RecordingMuxer::new();
    export(&fixture, &opener, &mut muxer).unwrap();

    let first = &muxer.blocks[0];
    assert!(first.samples.iter().all(|s| (s - 0.25).abs() < 1e-6));
    let overlap = muxer
        .blocks
        .iter()
        .find(|b| b.timestamp >= Duration::from_millis(600))
        .unwrap();
    assert!(overlap.samples.iter().all(|s| (s - 1.0).abs() < 1e-6));
}

/// Left-channel samples of the whole export, in order.
fn left_channel(muxer: &RecordingMuxer) -> Vec<f32> {
    muxer
        .blocks
        .iter()
        .flat_map(|b| b.samples.iter().step_by(b.channels.max(1) as usize).copied())
        .collect()
}

/// Two stacked video clips with sound; `lower` starts at `lower_at` on V1,
/// `upper` covers V2 from zero.
fn stacked_soundtracks(lower_at: f64, lower_secs: f64, upper_secs: f64) -> (TimelineFixture, SyntheticOpener) {
    let lower = MediaAssetBuilder::new("lower").duration_secs(lower_secs).resolution(480, 480).build();
    let upper = MediaAssetBuilder::new("upper").duration_secs(upper_secs).resolution(480, 480).build();
    let opener = SyntheticOpener::new()
        .with(&lower, SyntheticMedia::video(lower_secs, 480, 480, RED).with_audio(48_000, 2, 0.25))
        .with(&upper, SyntheticMedia::video(upper_secs, 480, 480, BLUE).with_audio(48_000, 2, 0.5));
    let fixture = TimelineBuilder::new()
        .with_asset(lower.clone())
        .with_asset(upper.clone())
        .video_track("Video 1")
        .video_track("Video 2")
        .with_clip(0, ClipBuilder::for_asset(&lower).at(lower_at).build())
        .with_clip(1, ClipBuilder::for_asset(&upper).build())
        .build();
    (fixture, opener)
}

#[test]
fn test_main_soundtrack_switches_mid_block() {
    // 1.01 s is sample 48480, inside the block starting at 48128.
    let (fixture, opener) = stacked_soundtracks(1.01, 1.0, 2.0);
    let mut muxer = RecordingMuxer::new();
    export(&fixture, &opener, &mut muxer).unwrap();

    let left = left_channel(&muxer);
    assert!(left[48128..48480].iter().all(|s| (s - 0.5).abs() < 1e-6));
    // Only the lower clip is heard once it starts; the upper one must not
    // keep playing underneath it for the rest of the block.
    assert!(left[48480..49152].iter().all(|s| (s - 0.25).abs() < 1e-6));
}

#[test]
fn test_uncovered_soundtrack_starts_mid_block() {
    let (fixture, opener) = stacked_soundtracks(0.0, 1.01, 2.0);
    let mut muxer = RecordingMuxer::new();
    export(&fixture, &opener, &mut muxer).unwrap();

    let left = left_channel(&muxer);
    assert!(left[48128..48480].iter().all(|s| (s - 0.25).abs() < 1e-6));
    assert!(left[48480..49152].iter().all(|s| (s - 0.5).abs() < 1e-6));
}

#[test]
fn test_clip_volume_scales_audio() {
    let music = MediaAssetBuilder::audio("music").duration_secs(1.0).build();
    let opener = SyntheticOpener::new().with(&music, SyntheticMedia::audio(1.0, 48_000, 2, 0.8));
    let fixture = TimelineBuilder::new()
        .with_asset(music.clone())
        .audio_track("Audio 1")
        .with_clip(0, ClipBuilder::for_asset(&music).volume(0.5).build())
        .build();

    let mut muxer = RecordingMuxer::new();
    export(&fixture, &opener, &mut muxer).unwrap();
    assert!(muxer.blocks.iter().all(|b| (b.peak() - 0.4).abs() < 1e-6));
}

#[test]
fn test_muted_track_is_silent() {
    let music = MediaAssetBuilder::audio("music").duration_secs(1.0).build();
    let opener = SyntheticOpener::new().with(&music, SyntheticMedia::audio(1.0, 48_000, 2, 0.8));
    let mut fixture = TimelineBuilder::new()
        .with_asset(music.clone())
        .audio_track("Audio 1")
        .with_clip(0, ClipBuilder::for_asset(&music).build())
        .build();
    let track = fixture.track(0);
    fixture.timeline.set_track_muted(track, true).unwrap();

    let mut muxer = RecordingMuxer::new();
    export(&fixture, &opener, &mut muxer).unwrap();
    assert!(muxer.blocks.iter().all(|b| b.peak() == 0.0));
}

#[test]
fn test_empty_timeline_is_rejected() {
    let fixture = TimelineBuilder::new().video_track("Video 1").build();
    let mut muxer = RecordingMuxer::new();
    let result = export(&fixture, &SyntheticOpener::new(), &mut muxer);
    assert!(matches!(result, Err(MediaError::InvalidTimeline(_))));
    assert!(!muxer.started);
}

#[test]
fn test_empty_container_is_finalize_failure() {
    let (fixture, opener) = single_clip(0.0, 1.0);
    let mut muxer = RecordingMuxer::producing_nothing();
    let result = export(&fixture, &opener, &mut muxer);
    assert!(matches!(result, Err(MediaError::EncoderFinalizeFailure)));
}

#[test]
fn test_tracks_registered_from_settings() {
    let (fixture, opener) = single_clip(0.0, 1.0);
    let mut muxer = RecordingMuxer::new();
    export(&fixture, &opener, &mut muxer).unwrap();

    let video = muxer.video_config.unwrap();
    assert_eq!((video.width, video.height, video.fps), (480, 480, 30));
    assert_eq!(video.codec, "h264");
    let audio = muxer.audio_config.unwrap();
    assert_eq!((audio.sample_rate, audio.channels, audio.codec), (48_000, 2, "aac"));
}
