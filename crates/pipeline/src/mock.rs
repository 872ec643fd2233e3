//! Scriptable in-memory provider for dry runs and tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::GenerationError;
use crate::provider::{GenerationOutput, GenerationRequest, VideoProvider};

/// Default clip limit of the mock provider, in seconds.
pub const MOCK_MAX_DURATION: f64 = 8.0;

#[derive(Debug, Clone)]
enum FailureMode {
    Never,
    /// Fail while the shared countdown is positive.
    FirstCalls,
    Always,
    /// Fail any request whose segment id contains one of the patterns.
    SegmentsContaining(Vec<String>),
}

/// Provider that never leaves the process.
///
/// Successful calls return `<output_dir>/<segment_id>.mp4` without writing
/// anything. Every request is recorded for inspection.
pub struct MockProvider {
    name: String,
    max_duration: f64,
    output_dir: PathBuf,
    latency: Duration,
    mode: FailureMode,
    failures_left: AtomicU32,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_duration: MOCK_MAX_DURATION,
            output_dir: PathBuf::from("mock_output"),
            latency: Duration::ZERO,
            mode: FailureMode::Never,
            failures_left: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_max_duration(mut self, seconds: f64) -> Self {
        self.max_duration = seconds;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the first `n` calls, then succeed.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.mode = FailureMode::FirstCalls;
        self.failures_left = AtomicU32::new(n);
        self
    }

    pub fn always_failing(mut self) -> Self {
        self.mode = FailureMode::Always;
        self
    }

    /// Fail requests whose segment id contains any of `patterns`.
    pub fn failing_segments<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mode = FailureMode::SegmentsContaining(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub async fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    fn should_fail(&self, request: &GenerationRequest) -> bool {
        match &self.mode {
            FailureMode::Never => false,
            FailureMode::Always => true,
            FailureMode::FirstCalls => self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok(),
            FailureMode::SegmentsContaining(patterns) => patterns
                .iter()
                .any(|p| request.segment_id.contains(p.as_str())),
        }
    }
}

#[async_trait]
impl VideoProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_duration(&self) -> f64 {
        self.max_duration
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, GenerationError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let fail = self.should_fail(&request);
        let segment_id = request.segment_id.clone();
        self.calls.lock().await.push(request);

        if fail {
            return Err(GenerationError::provider(
                &self.name,
                format!("scripted failure for {segment_id}"),
            ));
        }
        Ok(GenerationOutput {
            output_path: self.output_dir.join(format!("{segment_id}.mp4")),
        })
    }
}
