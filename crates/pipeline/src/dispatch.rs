//! Single generation calls: prompt compilation, pacing, concurrency
//! permits, timeouts and provider health bookkeeping.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use montage_core::continuity::ContinuityContext;
use montage_core::segmentation::Segment;
use montage_core::shot_plan::Shot;
use tokio::sync::Semaphore;

use crate::error::GenerationError;
use crate::pacing::PacingConfig;
use crate::prompt::PromptCompiler;
use crate::provider::{GenerationOutput, GenerationRequest};
use crate::registry::ProviderRegistry;

/// Issues one provider call per [`dispatch`](Self::dispatch).
///
/// A permit from the shared semaphore is held only for the duration of the
/// call itself, so at most `max_workers` calls are in flight across every
/// chain of a production.
#[derive(Clone)]
pub struct SegmentDispatcher {
    registry: Arc<ProviderRegistry>,
    compiler: Arc<dyn PromptCompiler>,
    permits: Arc<Semaphore>,
    pacing: PacingConfig,
    timeout: Option<Duration>,
}

impl SegmentDispatcher {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        compiler: Arc<dyn PromptCompiler>,
        max_workers: usize,
        pacing: PacingConfig,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            compiler,
            permits: Arc::new(Semaphore::new(max_workers.max(1))),
            pacing,
            timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Render `segment` of `shot` on `provider`.
    ///
    /// `attempt` is 1-based and only drives the pacing delay.
    pub async fn dispatch(
        &self,
        provider: &str,
        shot: &Shot,
        segment: &Segment,
        context: &ContinuityContext,
        starting_frame: Option<PathBuf>,
        attempt: u32,
    ) -> Result<GenerationOutput, GenerationError> {
        let backend = self
            .registry
            .get(provider)
            .ok_or_else(|| GenerationError::ProviderNotFound(provider.to_string()))?;

        let request = GenerationRequest {
            segment_id: segment.id.clone(),
            prompt: self.compiler.compile(&shot.for_segment(segment), context),
            duration: segment.duration,
            starting_frame,
            negative_prompt: shot.negative_prompt.clone(),
        };

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| GenerationError::provider(provider, format!("worker pool closed: {e}")))?;

        let delay = self.pacing.delay_for_attempt(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        tracing::debug!(
            provider,
            segment_id = %segment.id,
            attempt,
            duration = segment.duration,
            "Dispatching segment",
        );

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, backend.generate(request)).await {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout {
                    provider: provider.to_string(),
                    secs: limit.as_secs(),
                }),
            },
            None => backend.generate(request).await,
        };

        self.registry.record_result(provider, result.is_ok()).await;
        if let Err(e) = &result {
            tracing::warn!(provider, segment_id = %segment.id, attempt, error = %e, "Generation failed");
        }
        result
    }
}
