//! Multi-shot generation pipeline.
//!
//! [`GenerationOrchestrator`] takes a [`ShotPlan`](montage_core::shot_plan::ShotPlan),
//! segments every shot, renders segments through registered
//! [`VideoProvider`]s with retries, and folds each finished shot into a
//! shared continuity store in plan order.

pub mod barrier;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod frames;
pub mod manifest;
pub mod mock;
pub mod orchestrator;
pub mod pacing;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod store;

pub use config::PipelineConfig;
pub use error::{GenerationError, PipelineError};
pub use manifest::{ProductionResult, ShotManifestEntry, ShotOutcome};
pub use orchestrator::GenerationOrchestrator;
pub use provider::{GenerationOutput, GenerationRequest, VideoProvider};
pub use registry::ProviderRegistry;
