//! The seam to external clip generation services.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// One call to a provider: render `duration` seconds for `prompt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub segment_id: String,
    pub prompt: String,
    pub duration: f64,
    /// Frame the clip should continue from.
    pub starting_frame: Option<PathBuf>,
    pub negative_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub output_path: PathBuf,
}

/// A clip generation service.
///
/// Implementations own their transport, authentication and timeouts; any
/// failure is reported as a [`GenerationError`] and handled by the retry
/// coordinator.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Longest clip this provider renders in one call, in seconds.
    fn max_duration(&self) -> f64;

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, GenerationError>;
}
