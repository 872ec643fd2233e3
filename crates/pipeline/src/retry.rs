//! Executes retry strategies for failed segments.
//!
//! The escalation order and per-segment state machine come from
//! [`montage_core::retry`]; this module turns each strategy into provider
//! calls and reports what was produced.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use montage_core::continuity::ContinuityContext;
use montage_core::error::CoreError;
use montage_core::retry::{
    simplify_segment, RetryAction, RetryAttempt, RetryPolicy, RetryStrategy, SegmentRetryState,
};
use montage_core::segmentation::{DurationLimits, Segment, ShotSegmenter};
use montage_core::shot_plan::Shot;
use serde::{Deserialize, Serialize};

use crate::dispatch::SegmentDispatcher;
use crate::error::GenerationError;
use crate::frames::FrameExtractor;

/// Smallest sub-segment a re-split may produce, in seconds.
pub const RESPLIT_MIN_SEGMENT: f64 = 1.5;

/// One rendered clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedClip {
    pub segment_id: String,
    pub provider: String,
    pub output_path: PathBuf,
    pub duration: f64,
    /// `None` when the initial attempt succeeded.
    pub strategy: Option<RetryStrategy>,
}

/// Everything needed to render one segment.
#[derive(Clone, Copy)]
pub struct SegmentJob<'a> {
    pub shot: &'a Shot,
    pub segment: &'a Segment,
    pub context: &'a ContinuityContext,
    pub provider: &'a str,
    pub starting_frame: Option<&'a PathBuf>,
    /// Segment length limit the segment was produced under.
    pub max_segment: f64,
}

#[derive(Debug)]
pub enum RecoveryOutcome {
    /// One clip, or several when the segment was re-split.
    Generated(Vec<GeneratedClip>),
    Skipped(GenerationError),
}

#[derive(Debug)]
pub struct SegmentResult {
    pub segment_id: String,
    pub outcome: RecoveryOutcome,
    pub attempts: Vec<RetryAttempt>,
}

impl SegmentResult {
    pub fn clips(&self) -> &[GeneratedClip] {
        match &self.outcome {
            RecoveryOutcome::Generated(clips) => clips,
            RecoveryOutcome::Skipped(_) => &[],
        }
    }
}

/// Runs a segment's initial attempt and, on failure, walks the retry
/// policy until the segment succeeds or is skipped.
#[derive(Clone)]
pub struct RetryCoordinator {
    dispatcher: SegmentDispatcher,
    frames: Arc<dyn FrameExtractor>,
    segmenter: ShotSegmenter,
    policy: RetryPolicy,
    fallback_providers: Vec<String>,
    max_split_depth: u32,
}

impl RetryCoordinator {
    pub fn new(
        dispatcher: SegmentDispatcher,
        frames: Arc<dyn FrameExtractor>,
        segmenter: ShotSegmenter,
        policy: RetryPolicy,
        fallback_providers: Vec<String>,
        max_split_depth: u32,
    ) -> Self {
        Self {
            dispatcher,
            frames,
            segmenter,
            policy,
            fallback_providers,
            max_split_depth,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generate one segment, absorbing provider failures.
    ///
    /// Only state machine misuse surfaces as an error; provider failures
    /// end in [`RecoveryOutcome::Skipped`].
    pub async fn generate(&self, job: SegmentJob<'_>) -> Result<SegmentResult, CoreError> {
        let mut state = SegmentRetryState::new(&job.segment.id);

        let mut last_error = match self.attempt_once(&job, job.provider, 1, None).await {
            Ok(clip) => {
                state.record_success()?;
                return Ok(SegmentResult {
                    segment_id: job.segment.id.clone(),
                    outcome: RecoveryOutcome::Generated(vec![clip]),
                    attempts: state.into_attempts(),
                });
            }
            Err(e) => {
                state.record_failure(e.to_string())?;
                e
            }
        };

        loop {
            let strategy = match state.escalate(&self.policy)? {
                RetryAction::Retry(strategy) => strategy,
                RetryAction::Skip => {
                    let attempts = state.attempts().len() as u32;
                    tracing::warn!(
                        segment_id = %job.segment.id,
                        attempts,
                        error = %last_error,
                        "Segment skipped after exhausting retries",
                    );
                    return Ok(SegmentResult {
                        segment_id: job.segment.id.clone(),
                        outcome: RecoveryOutcome::Skipped(GenerationError::RetriesExhausted {
                            segment_id: job.segment.id.clone(),
                            attempts,
                            last_error: last_error.to_string(),
                        }),
                        attempts: state.into_attempts(),
                    });
                }
            };

            let attempt = state.attempts().len() as u32 + 1;
            tracing::info!(
                segment_id = %job.segment.id,
                attempt,
                strategy = strategy.as_str(),
                "Retrying segment",
            );

            match self.execute(strategy, &job, attempt).await {
                Ok(clips) => {
                    state.record_success()?;
                    return Ok(SegmentResult {
                        segment_id: job.segment.id.clone(),
                        outcome: RecoveryOutcome::Generated(clips),
                        attempts: state.into_attempts(),
                    });
                }
                Err(e) => {
                    state.record_failure(e.to_string())?;
                    last_error = e;
                }
            }
        }
    }

    async fn execute(
        &self,
        strategy: RetryStrategy,
        job: &SegmentJob<'_>,
        attempt: u32,
    ) -> Result<Vec<GeneratedClip>, GenerationError> {
        match strategy {
            RetryStrategy::DirectRetry => self
                .attempt_once(job, job.provider, attempt, Some(strategy))
                .await
                .map(|clip| vec![clip]),
            RetryStrategy::Simplified => {
                let simplified = simplify_segment(job.segment);
                let job = SegmentJob {
                    segment: &simplified,
                    ..*job
                };
                self.attempt_once(&job, job.provider, attempt, Some(strategy))
                    .await
                    .map(|clip| vec![clip])
            }
            RetryStrategy::Resplit => self.resplit(*job, attempt, 1).await,
            RetryStrategy::FallbackProvider => {
                let provider = self.fallback_provider(job.provider, attempt).await?;
                self.attempt_once(job, &provider, attempt, Some(strategy))
                    .await
                    .map(|clip| vec![clip])
            }
            RetryStrategy::Skip => Err(GenerationError::RetriesExhausted {
                segment_id: job.segment.id.clone(),
                attempts: attempt - 1,
                last_error: "skip requested".to_string(),
            }),
        }
    }

    async fn attempt_once(
        &self,
        job: &SegmentJob<'_>,
        provider: &str,
        attempt: u32,
        strategy: Option<RetryStrategy>,
    ) -> Result<GeneratedClip, GenerationError> {
        let output = self
            .dispatcher
            .dispatch(
                provider,
                job.shot,
                job.segment,
                job.context,
                job.starting_frame.cloned(),
                attempt,
            )
            .await?;
        Ok(GeneratedClip {
            segment_id: job.segment.id.clone(),
            provider: provider.to_string(),
            output_path: output.output_path,
            duration: job.segment.duration,
            strategy,
        })
    }

    /// Pick `fallbacks[attempt % len]`, preferring configured providers
    /// over the registry's healthy ones.
    async fn fallback_provider(&self, primary: &str, attempt: u32) -> Result<String, GenerationError> {
        let candidates = if self.fallback_providers.is_empty() {
            self.dispatcher.registry().fallback_chain(primary).await
        } else {
            self.fallback_providers.clone()
        };
        if candidates.is_empty() {
            return Err(GenerationError::NoFallbackProvider);
        }
        Ok(candidates[attempt as usize % candidates.len()].clone())
    }

    /// Split the segment into pieces of at most half its limit and render
    /// them in order, threading starting frames. Succeeds only when every
    /// piece does; a failed piece is split again while `depth` allows.
    fn resplit<'a>(
        &'a self,
        job: SegmentJob<'a>,
        attempt: u32,
        depth: u32,
    ) -> BoxFuture<'a, Result<Vec<GeneratedClip>, GenerationError>> {
        async move {
            let max_segment = job.max_segment.min(job.segment.duration) / 2.0;
            let limits = DurationLimits::new(RESPLIT_MIN_SEGMENT.min(max_segment), max_segment)?;
            let view = job.shot.for_segment(job.segment);
            let pieces = self
                .segmenter
                .split_with_limits(&Shot::from_segment(job.segment), &limits)?;
            let total = pieces.len();
            tracing::debug!(
                segment_id = %job.segment.id,
                pieces = total,
                depth,
                max_segment,
                "Re-splitting segment",
            );

            let mut clips = Vec::with_capacity(total);
            let mut frame = job.starting_frame.cloned();
            for piece in &pieces {
                let piece_job = SegmentJob {
                    shot: &view,
                    segment: piece,
                    starting_frame: frame.as_ref(),
                    max_segment,
                    ..job
                };
                let result = match self
                    .attempt_once(&piece_job, job.provider, attempt, Some(RetryStrategy::Resplit))
                    .await
                {
                    Ok(clip) => Ok(vec![clip]),
                    Err(e) if depth < self.max_split_depth => {
                        tracing::debug!(segment_id = %piece.id, error = %e, "Piece failed, splitting again");
                        self.resplit(piece_job, attempt, depth + 1).await
                    }
                    Err(e) => Err(e),
                };
                match result {
                    Ok(mut rendered) => {
                        if let Some(last) = rendered.last() {
                            frame = Some(self.frames.extract_last_frame(&last.output_path).await?);
                        }
                        clips.append(&mut rendered);
                    }
                    Err(e) => {
                        tracing::debug!(segment_id = %piece.id, error = %e, "Re-split piece failed");
                        return Err(GenerationError::PartialSplit {
                            succeeded: clips.len(),
                            total,
                        });
                    }
                }
            }
            Ok(clips)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::ClipFrameExtractor;
    use crate::mock::MockProvider;
    use crate::pacing::PacingConfig;
    use crate::prompt::ContextPromptCompiler;
    use crate::registry::ProviderRegistry;
    use assert_matches::assert_matches;
    use montage_core::retry::{AttemptOutcome, SIMPLIFIED_SUFFIX};
    use montage_core::segmentation::SplitConfig;

    fn coordinator(providers: Vec<(Arc<MockProvider>, i32)>, fallbacks: Vec<String>) -> RetryCoordinator {
        let mut registry = ProviderRegistry::new();
        for (provider, priority) in providers {
            registry.register(provider, priority);
        }
        let dispatcher = SegmentDispatcher::new(
            Arc::new(registry),
            Arc::new(ContextPromptCompiler),
            2,
            PacingConfig::none(),
            None,
        );
        RetryCoordinator::new(
            dispatcher,
            Arc::new(ClipFrameExtractor),
            ShotSegmenter::new(SplitConfig::default()).unwrap(),
            RetryPolicy::default(),
            fallbacks,
            2,
        )
    }

    fn segment(duration: f64) -> (Shot, Segment) {
        let shot = Shot::new("s1", "Emma crosses the room (slowly) and meanwhile Tom waits.")
            .with_duration(duration);
        let segment = ShotSegmenter::new(SplitConfig::default())
            .unwrap()
            .split(&shot)
            .unwrap()
            .remove(0);
        (shot, segment)
    }

    fn job<'a>(shot: &'a Shot, segment: &'a Segment, context: &'a ContinuityContext) -> SegmentJob<'a> {
        SegmentJob {
            shot,
            segment,
            context,
            provider: "primary",
            starting_frame: None,
            max_segment: 8.0,
        }
    }

    fn strategies(result: &SegmentResult) -> Vec<Option<RetryStrategy>> {
        result.attempts.iter().map(|a| a.strategy).collect()
    }

    // -- escalation --

    #[tokio::test]
    async fn first_attempt_success_has_single_attempt() {
        let c = coordinator(vec![(Arc::new(MockProvider::new("primary")), 10)], vec![]);
        let (shot, seg) = segment(6.0);
        let context = ContinuityContext::default();
        let result = c.generate(job(&shot, &seg, &context)).await.unwrap();
        assert_eq!(result.clips().len(), 1);
        assert_eq!(result.clips()[0].strategy, None);
        assert_eq!(strategies(&result), vec![None]);
    }

    #[tokio::test]
    async fn always_failing_provider_is_skipped_after_four_attempts() {
        let c = coordinator(
            vec![(Arc::new(MockProvider::new("primary").always_failing()), 10)],
            vec![],
        );
        let (shot, seg) = segment(6.0);
        let context = ContinuityContext::default();
        let result = c.generate(job(&shot, &seg, &context)).await.unwrap();

        assert_eq!(result.attempts.len(), 4);
        assert_eq!(
            strategies(&result),
            vec![
                None,
                Some(RetryStrategy::DirectRetry),
                Some(RetryStrategy::Simplified),
                Some(RetryStrategy::Resplit),
            ]
        );
        assert!(result
            .attempts
            .iter()
            .all(|a| matches!(a.outcome, AttemptOutcome::Failed { .. })));
        assert_matches!(
            result.outcome,
            RecoveryOutcome::Skipped(GenerationError::RetriesExhausted { attempts: 4, .. })
        );
    }

    #[tokio::test]
    async fn direct_retry_recovers_transient_failure() {
        let c = coordinator(
            vec![(Arc::new(MockProvider::new("primary").failing_first(1)), 10)],
            vec![],
        );
        let (shot, seg) = segment(6.0);
        let context = ContinuityContext::default();
        let result = c.generate(job(&shot, &seg, &context)).await.unwrap();
        assert_eq!(result.clips()[0].strategy, Some(RetryStrategy::DirectRetry));
        assert_eq!(result.attempts.len(), 2);
    }

    // -- strategies --

    #[tokio::test]
    async fn simplified_retry_uses_derived_segment() {
        let provider = Arc::new(MockProvider::new("primary").failing_first(2));
        let c = coordinator(vec![(Arc::clone(&provider), 10)], vec![]);
        let (shot, seg) = segment(6.0);
        let context = ContinuityContext::default();
        let result = c.generate(job(&shot, &seg, &context)).await.unwrap();

        let clip = &result.clips()[0];
        assert_eq!(clip.segment_id, format!("{}{SIMPLIFIED_SUFFIX}", seg.id));
        let calls = provider.calls().await;
        let last = calls.last().unwrap();
        assert!(!last.prompt.contains("meanwhile"));
        assert!(!last.prompt.contains("(slowly)"));
    }

    #[tokio::test]
    async fn resplit_renders_half_length_pieces_in_order() {
        let provider = Arc::new(MockProvider::new("primary").failing_first(3));
        let c = coordinator(vec![(Arc::clone(&provider), 10)], vec![]);
        let (shot, seg) = segment(6.0);
        let context = ContinuityContext::default();
        let result = c.generate(job(&shot, &seg, &context)).await.unwrap();

        let clips = result.clips();
        assert_eq!(clips.len(), 2);
        assert!(clips.iter().all(|c| c.duration <= 3.0 + 1e-9));
        let total: f64 = clips.iter().map(|c| c.duration).sum();
        assert!((total - 6.0).abs() < 1e-6);

        let calls = provider.calls().await;
        let pieces = &calls[calls.len() - 2..];
        assert_eq!(pieces[0].starting_frame, None);
        assert_eq!(pieces[1].starting_frame, Some(clips[0].output_path.clone()));
    }

    fn resplit_only(provider: Arc<MockProvider>, max_split_depth: u32) -> RetryCoordinator {
        RetryCoordinator {
            policy: RetryPolicy {
                max_retries: 1,
                strategies: vec![RetryStrategy::Resplit],
            },
            max_split_depth,
            ..coordinator(vec![(provider, 10)], vec![])
        }
    }

    #[tokio::test]
    async fn resplit_stops_at_first_failed_piece() {
        let provider = Arc::new(MockProvider::new("primary").always_failing());
        let c = resplit_only(Arc::clone(&provider), 1);
        let (shot, seg) = segment(6.0);
        let context = ContinuityContext::default();
        let result = c.generate(job(&shot, &seg, &context)).await.unwrap();

        assert_matches!(result.outcome, RecoveryOutcome::Skipped(_));
        assert_matches!(
            &result.attempts[1].outcome,
            AttemptOutcome::Failed { error } if error.contains("0 of 2")
        );
        // Initial attempt plus the first piece.
        assert_eq!(provider.call_count().await, 2);
    }

    #[tokio::test]
    async fn failed_piece_is_split_again_up_to_the_depth_cap() {
        let provider = Arc::new(MockProvider::new("primary").always_failing());
        let c = resplit_only(Arc::clone(&provider), 2);
        let (shot, seg) = segment(6.0);
        let context = ContinuityContext::default();
        c.generate(job(&shot, &seg, &context)).await.unwrap();

        let ids: Vec<String> = provider
            .calls()
            .await
            .into_iter()
            .map(|call| call.segment_id)
            .collect();
        assert_eq!(ids, vec!["s1_seg00", "s1_seg00_seg00", "s1_seg00_seg00_seg00"]);
    }

    #[tokio::test]
    async fn fallback_uses_configured_provider() {
        let primary = Arc::new(MockProvider::new("primary").always_failing());
        let backup = Arc::new(MockProvider::new("backup"));
        let c = RetryCoordinator {
            policy: RetryPolicy {
                max_retries: 1,
                strategies: vec![RetryStrategy::FallbackProvider],
            },
            ..coordinator(
                vec![(primary, 10), (Arc::clone(&backup), 5)],
                vec!["backup".to_string()],
            )
        };
        let (shot, seg) = segment(6.0);
        let context = ContinuityContext::default();
        let result = c.generate(job(&shot, &seg, &context)).await.unwrap();
        assert_eq!(result.clips()[0].provider, "backup");
        assert_eq!(backup.call_count().await, 1);
    }

    #[tokio::test]
    async fn fallback_without_candidates_fails() {
        let c = RetryCoordinator {
            policy: RetryPolicy {
                max_retries: 1,
                strategies: vec![RetryStrategy::FallbackProvider],
            },
            ..coordinator(
                vec![(Arc::new(MockProvider::new("primary").always_failing()), 10)],
                vec![],
            )
        };
        let (shot, seg) = segment(6.0);
        let context = ContinuityContext::default();
        let result = c.generate(job(&shot, &seg, &context)).await.unwrap();
        assert_matches!(result.outcome, RecoveryOutcome::Skipped(_));
        assert_matches!(
            &result.attempts[1].outcome,
            AttemptOutcome::Failed { error } if error.contains("No fallback provider")
        );
    }
}
