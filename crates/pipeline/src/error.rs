use montage_core::error::CoreError;

/// Why a single generation call (or a whole retry chain) failed.
///
/// These are absorbed by the retry coordinator and recorded in the
/// production result; they never abort a production.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Provider '{provider}' timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    #[error("Provider not registered: {0}")]
    ProviderNotFound(String),

    #[error("No fallback provider configured")]
    NoFallbackProvider,

    #[error("Split retry failed: {succeeded} of {total} sub-segments succeeded")]
    PartialSplit { succeeded: usize, total: usize },

    #[error("Retries exhausted for segment '{segment_id}' after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        segment_id: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Frame extraction failed: {0}")]
    Frame(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl GenerationError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Errors that stop a production before or outside generation.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Provider not registered: {0}")]
    ProviderNotFound(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
