//! End-to-end production runs against the mock provider.

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{config, drain, orchestrator, plan};
use montage_core::continuity::Emotion;
use montage_core::error::CoreError;
use montage_core::retry::RetryStrategy;
use montage_core::shot_plan::{CharacterSpec, Shot};
use montage_events::{ProductionEventKind, ProductionStage};
use montage_pipeline::mock::MockProvider;
use montage_pipeline::{PipelineError, ShotOutcome};

// ---------------------------------------------------------------------------
// Test: segmentation through the orchestrator
// ---------------------------------------------------------------------------

/// A silent 21 second, three beat shot with limits 3..8 renders as three
/// 7 second clips, each later clip continuing from its predecessor.
#[tokio::test]
async fn twenty_one_second_shot_renders_three_equal_segments() {
    let provider = Arc::new(MockProvider::new("mock"));
    let orchestrator = orchestrator(config(3.0, 8.0), vec![Arc::clone(&provider)]);
    let plan = plan(vec![Shot::new(
        "s1",
        "A man walks in. Then he sits. Suddenly he stands.",
    )
    .with_duration(21.0)]);

    let result = orchestrator.produce(&plan).await.unwrap();

    let durations: Vec<f64> = result.generated.iter().map(|g| g.duration).collect();
    assert_eq!(durations.len(), 3);
    for d in durations {
        assert!((d - 7.0).abs() < 1e-6, "unexpected duration {d}");
    }
    assert_eq!(
        result.shot("s1").unwrap().segment_ids,
        vec!["s1_seg00", "s1_seg01", "s1_seg02"]
    );
    assert_eq!(result.shot("s1").unwrap().committed_frame, Some(21 * 24));

    let calls = provider.calls().await;
    assert_eq!(calls[0].starting_frame, None);
    assert_eq!(calls[1].starting_frame, Some(PathBuf::from("mock_output/s1_seg00.mp4")));
    assert_eq!(calls[2].starting_frame, Some(PathBuf::from("mock_output/s1_seg01.mp4")));
}

/// Every segment after the first starts from the previous clip's frame.
#[tokio::test]
async fn segments_are_chained_by_starting_frame() {
    let provider = Arc::new(MockProvider::new("mock").with_output_dir("clips"));
    let orchestrator = orchestrator(config(2.0, 8.0), vec![Arc::clone(&provider)]);
    let plan = plan(vec![Shot::new("s1", "Gulls circle the mast").with_duration(20.0)]);

    orchestrator.produce(&plan).await.unwrap();

    let calls = provider.calls().await;
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].starting_frame, None);
    assert_eq!(calls[1].starting_frame, Some(PathBuf::from("clips/s1_seg00.mp4")));
    assert_eq!(calls[2].starting_frame, Some(PathBuf::from("clips/s1_seg01.mp4")));
    let total: f64 = calls.iter().map(|c| c.duration).sum();
    assert!((total - 20.0).abs() < 1e-6);
}

/// A provider with a shorter clip limit lowers the segment maximum.
#[tokio::test]
async fn provider_max_duration_caps_segments() {
    let provider = Arc::new(MockProvider::new("short").with_max_duration(5.0));
    let orchestrator = orchestrator(config(2.0, 8.0), vec![Arc::clone(&provider)]);
    let plan = plan(vec![Shot::new("s1", "Waves break").with_duration(12.0)]);

    let result = orchestrator.produce(&plan).await.unwrap();
    assert!(result.generated.iter().all(|g| g.duration <= 5.0 + 1e-6));
    assert_eq!(result.generated.len(), 3);
}

// ---------------------------------------------------------------------------
// Test: continuity commits
// ---------------------------------------------------------------------------

/// A declared emotion is applied on commit with one audited transition.
#[tokio::test]
async fn declared_emotion_is_committed_once() {
    let orchestrator = orchestrator(config(2.0, 8.0), vec![Arc::new(MockProvider::new("mock"))]);
    let plan = plan(vec![Shot::new("s1", "Emma reads the letter")
        .with_duration(4.0)
        .with_character("emma", CharacterSpec::with_emotion("happy", 0.8))]);

    let result = orchestrator.produce(&plan).await.unwrap();

    let snapshot = result.snapshots.last().unwrap();
    let emma = snapshot.entity("emma").unwrap().character.as_ref().unwrap();
    assert_eq!(emma.emotion, Emotion::Happy);
    assert!((emma.intensity - 0.8).abs() < 1e-9);
    assert_eq!(emma.emotion_history.len(), 1);
}

/// Dialogue with a speaker prefix marks that character as speaking.
#[tokio::test]
async fn dialogue_sets_active_speaker() {
    let orchestrator = orchestrator(config(2.0, 8.0), vec![Arc::new(MockProvider::new("mock"))]);
    let mut shot = Shot::new("s1", "Tom turns to Emma").with_duration(4.0);
    shot.audio.dialogue = Some("Tom: We sail at noon.".into());
    shot.audio.music_cue = Some("low strings".into());

    let result = orchestrator.produce(&plan(vec![shot])).await.unwrap();

    let snapshot = result.snapshots.last().unwrap();
    assert_eq!(snapshot.active_speaker.as_deref(), Some("tom"));
    assert_eq!(snapshot.last_dialogue.as_deref(), Some("We sail at noon."));
    assert!(snapshot.entity("tom").unwrap().character.as_ref().unwrap().speaking);
    assert!(snapshot.recent_audio_cues.iter().any(|cue| cue.kind == "music"));
}

/// Shots commit in plan order even when a later chain finishes first.
#[tokio::test(start_paused = true)]
async fn commits_follow_plan_order() {
    let slow = Arc::new(MockProvider::new("slow").with_latency(Duration::from_secs(30)));
    let fast = Arc::new(MockProvider::new("fast"));
    let orchestrator = orchestrator(config(2.0, 8.0), vec![slow, fast]);
    let mut first = Shot::new("s1", "Dawn over the bay")
        .with_duration(4.0)
        .with_location("bay");
    first.provider = Some("slow".into());
    let mut second = Shot::new("s2", "Inside the tavern")
        .with_duration(2.0)
        .with_location("tavern");
    second.provider = Some("fast".into());
    let mut rx = orchestrator.events().subscribe();

    let result = orchestrator.produce(&plan(vec![first, second])).await.unwrap();

    let committed: Vec<(String, u64)> = drain(&mut rx)
        .into_iter()
        .filter_map(|kind| match kind {
            ProductionEventKind::ShotCommitted {
                shot_id,
                frame_number,
            } => Some((shot_id, frame_number)),
            _ => None,
        })
        .collect();
    assert_eq!(committed, vec![("s1".to_string(), 96), ("s2".to_string(), 144)]);
    assert_eq!(result.snapshots.len(), 2);
    assert_eq!(result.snapshots[1].frame_number, 96);
}

/// Each snapshot holds the staging of the shot it commits, even when a
/// later chain has already generated its own overrides.
#[tokio::test(start_paused = true)]
async fn snapshots_hold_the_committed_shots_staging() {
    let slow = Arc::new(MockProvider::new("slow").with_latency(Duration::from_secs(30)));
    let fast = Arc::new(MockProvider::new("fast"));
    let orchestrator = orchestrator(config(2.0, 8.0), vec![slow, fast]);
    let rowing = CharacterSpec {
        action: Some("rowing".into()),
        ..Default::default()
    };
    let drinking = CharacterSpec {
        action: Some("drinking".into()),
        ..Default::default()
    };
    let mut first = Shot::new("s1", "Emma rows across the bay")
        .with_duration(4.0)
        .with_location("bay")
        .with_character("emma", rowing);
    first.provider = Some("slow".into());
    let mut second = Shot::new("s2", "Emma drinks in the tavern")
        .with_duration(2.0)
        .with_location("tavern")
        .with_character("emma", drinking);
    second.provider = Some("fast".into());

    let result = orchestrator.produce(&plan(vec![first, second])).await.unwrap();

    let staged: Vec<(Option<String>, Option<String>)> = result
        .snapshots
        .iter()
        .map(|snapshot| {
            let location = snapshot.environment.as_ref().map(|env| env.location.clone());
            let action = snapshot
                .entity("emma")
                .and_then(|e| e.character.as_ref())
                .map(|c| c.action.clone());
            (location, action)
        })
        .collect();
    assert_eq!(
        staged,
        vec![
            (Some("bay".to_string()), Some("rowing".to_string())),
            (Some("tavern".to_string()), Some("drinking".to_string())),
        ]
    );
}

/// A location change is a hard cut; the same location carries the frame.
#[tokio::test]
async fn hard_cut_drops_starting_frame() {
    let provider = Arc::new(MockProvider::new("mock").with_output_dir("clips"));
    let orchestrator = orchestrator(config(2.0, 8.0), vec![Arc::clone(&provider)]);
    let plan = plan(vec![
        Shot::new("s1", "Emma on deck").with_duration(4.0).with_location("ship"),
        Shot::new("s2", "Tom on deck").with_duration(4.0),
        Shot::new("s3", "The tavern door").with_duration(4.0).with_location("tavern"),
    ]);

    orchestrator.produce(&plan).await.unwrap();

    let calls = provider.calls().await;
    let frame_of = |id: &str| {
        calls
            .iter()
            .find(|c| c.segment_id == id)
            .and_then(|c| c.starting_frame.clone())
    };
    assert_eq!(frame_of("s2_seg00"), Some(PathBuf::from("clips/s1_seg00.mp4")));
    assert_eq!(frame_of("s3_seg00"), None);
}

// ---------------------------------------------------------------------------
// Test: failures and retries
// ---------------------------------------------------------------------------

/// With max_retries 3 a segment that always fails is skipped after four
/// attempts and the production still completes.
#[tokio::test]
async fn always_failing_segment_is_skipped() {
    let provider = Arc::new(MockProvider::new("mock").always_failing());
    let orchestrator = orchestrator(config(2.0, 8.0), vec![provider]);
    let plan = plan(vec![Shot::new("s1", "A storm rolls in").with_duration(6.0)]);
    let mut rx = orchestrator.events().subscribe();

    let result = orchestrator.produce(&plan).await.unwrap();

    assert!(!result.cancelled);
    assert!(result.generated.is_empty());
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].segment_id, "s1_seg00");
    assert!(result.skipped[0].error.contains("after 4 attempts"));

    let entry = result.shot("s1").unwrap();
    assert_eq!(entry.outcome, ShotOutcome::Failed);
    assert_eq!(entry.retry_attempts.len(), 4);
    // The timeline still advances past the shot.
    assert_eq!(entry.committed_frame, Some(144));

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|kind| matches!(kind, ProductionEventKind::SegmentSkipped { segment_id, .. } if segment_id == "s1_seg00")));
}

/// A failing segment is recovered by a later strategy and recorded.
#[tokio::test]
async fn transient_failure_is_recovered() {
    let provider = Arc::new(MockProvider::new("mock").failing_first(1));
    let orchestrator = orchestrator(config(2.0, 8.0), vec![provider]);
    let plan = plan(vec![Shot::new("s1", "Sails unfurl").with_duration(4.0)]);

    let result = orchestrator.produce(&plan).await.unwrap();

    assert!(result.skipped.is_empty());
    assert_eq!(result.generated[0].strategy, Some(RetryStrategy::DirectRetry));
    assert_eq!(result.shot("s1").unwrap().outcome, ShotOutcome::Complete);
}

/// Only the failing segment is skipped; its neighbours still render.
#[tokio::test]
async fn partial_shot_keeps_other_segments() {
    let provider = Arc::new(MockProvider::new("mock").failing_segments(["s1_seg01"]));
    let orchestrator = orchestrator(config(2.0, 8.0), vec![provider]);
    let plan = plan(vec![Shot::new("s1", "The fleet departs").with_duration(21.0)]);

    let result = orchestrator.produce(&plan).await.unwrap();

    assert_eq!(result.shot("s1").unwrap().outcome, ShotOutcome::Partial);
    assert_eq!(result.skipped.len(), 1);
    assert!(result.clips_for("s1").any(|g| g.segment_id == "s1_seg00"));
    assert!(result.clips_for("s1").any(|g| g.segment_id == "s1_seg02"));
}

// ---------------------------------------------------------------------------
// Test: validation errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_gaze_target_is_rejected() {
    let provider = Arc::new(MockProvider::new("mock"));
    let orchestrator = orchestrator(config(2.0, 8.0), vec![Arc::clone(&provider)]);
    let gaze = CharacterSpec {
        gaze_target: Some("tmo".into()),
        ..Default::default()
    };
    let plan = plan(vec![Shot::new("s1", "Emma looks across the room")
        .with_duration(4.0)
        .with_character("emma", gaze)]);

    assert_matches!(
        orchestrator.produce(&plan).await,
        Err(PipelineError::Core(CoreError::UnknownEntity(id))) if id == "tmo"
    );
    assert_eq!(provider.call_count().await, 0);
}

#[tokio::test]
async fn unknown_character_is_rejected() {
    let orchestrator = orchestrator(config(2.0, 8.0), vec![Arc::new(MockProvider::new("mock"))]);
    let plan = plan(vec![Shot::new("s1", "A stranger arrives")
        .with_duration(4.0)
        .with_character("ghost", CharacterSpec::with_emotion("fear", 0.5))]);

    assert_matches!(
        orchestrator.produce(&plan).await,
        Err(PipelineError::Core(CoreError::UnknownEntity(id))) if id == "ghost"
    );
}

#[tokio::test]
async fn inverted_duration_limits_are_rejected() {
    let orchestrator = orchestrator(config(9.0, 8.0), vec![Arc::new(MockProvider::new("mock"))]);
    let plan = plan(vec![Shot::new("s1", "Calm water").with_duration(4.0)]);

    assert_matches!(
        orchestrator.produce(&plan).await,
        Err(PipelineError::Core(CoreError::InvalidDurationConfig(_)))
    );
}

#[tokio::test]
async fn unregistered_provider_is_rejected() {
    let orchestrator = orchestrator(config(2.0, 8.0), vec![Arc::new(MockProvider::new("mock"))]);
    let mut shot = Shot::new("s1", "Calm water").with_duration(4.0);
    shot.provider = Some("nowhere".into());

    assert_matches!(
        orchestrator.produce(&plan(vec![shot])).await,
        Err(PipelineError::ProviderNotFound(name)) if name == "nowhere"
    );
}

// ---------------------------------------------------------------------------
// Test: progress and cancellation
// ---------------------------------------------------------------------------

/// One progress report per finished segment, bracketed by stage changes.
#[tokio::test]
async fn progress_is_reported_per_segment() {
    let orchestrator = orchestrator(config(2.0, 8.0), vec![Arc::new(MockProvider::new("mock"))]);
    let plan = plan(vec![
        Shot::new("s1", "Morning").with_duration(12.0),
        Shot::new("s2", "Noon").with_duration(4.0),
    ]);
    let mut rx = orchestrator.events().subscribe();

    orchestrator.produce(&plan).await.unwrap();
    let events = drain(&mut rx);

    let reports: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|kind| match kind {
            ProductionEventKind::Progress(report) => {
                Some((report.completed_segments, report.total_segments))
            }
            _ => None,
        })
        .collect();
    assert_eq!(reports, vec![(1, 3), (2, 3), (3, 3)]);

    let stages: Vec<ProductionStage> = events
        .iter()
        .filter_map(|kind| match kind {
            ProductionEventKind::StageChanged { stage } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            ProductionStage::Preparing,
            ProductionStage::Generating,
            ProductionStage::Finalizing,
            ProductionStage::Complete,
        ]
    );
}

/// Cancelling mid-shot lets the in-flight call finish and keeps what was
/// generated.
#[tokio::test(start_paused = true)]
async fn cancellation_stops_between_segments() {
    let provider = Arc::new(MockProvider::new("mock").with_latency(Duration::from_secs(10)));
    let orchestrator = orchestrator(config(2.0, 8.0), vec![Arc::clone(&provider)]);
    let plan = plan(vec![Shot::new("s1", "Night falls").with_duration(24.0)]);
    let token = orchestrator.cancel_token();

    let (result, ()) = tokio::join!(orchestrator.produce(&plan), async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        token.cancel();
    });
    let result = result.unwrap();

    assert!(result.cancelled);
    assert_eq!(provider.call_count().await, 2);
    assert_eq!(result.generated.len(), 2);
    let entry = result.shot("s1").unwrap();
    assert_eq!(entry.outcome, ShotOutcome::Cancelled);
    assert!(entry.committed_frame.is_some());
}

/// A production cancelled before it starts generates nothing.
#[tokio::test]
async fn cancelled_before_start_generates_nothing() {
    let provider = Arc::new(MockProvider::new("mock"));
    let orchestrator = orchestrator(config(2.0, 8.0), vec![Arc::clone(&provider)]);
    let plan = plan(vec![Shot::new("s1", "Night falls").with_duration(4.0)]);
    orchestrator.cancel_token().cancel();
    let mut rx = orchestrator.events().subscribe();

    let result = orchestrator.produce(&plan).await.unwrap();

    assert!(result.cancelled);
    assert_eq!(provider.call_count().await, 0);
    assert!(result.snapshots.is_empty());
    assert_eq!(result.shot("s1").unwrap().committed_frame, None);
    assert!(drain(&mut rx).contains(&ProductionEventKind::StageChanged {
        stage: ProductionStage::Cancelled
    }));
}

// ---------------------------------------------------------------------------
// Test: persisted result
// ---------------------------------------------------------------------------

#[tokio::test]
async fn result_serialises_manifest_and_snapshots() {
    let orchestrator = orchestrator(config(2.0, 8.0), vec![Arc::new(MockProvider::new("mock"))]);
    let plan = plan(vec![Shot::new("s1", "Harbour lights").with_duration(4.0)]);

    let result = orchestrator.produce(&plan).await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();

    assert_eq!(json["title"], "Harbour at dawn");
    assert_eq!(json["manifest"][0]["shot_id"], "s1");
    assert_eq!(json["manifest"][0]["outcome"], "complete");
    assert_eq!(json["snapshots"][0]["frame_number"], 0);
    assert_eq!(json["cancelled"], false);
}
