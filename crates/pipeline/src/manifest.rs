//! What a production produced: clips, skipped segments and the per-shot
//! manifest, serialisable to JSON for persistence.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use montage_core::continuity::Snapshot;
use montage_core::retry::{RetryAttempt, RetryStrategy};
use montage_core::types::FrameNumber;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::retry::GeneratedClip;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSegment {
    pub shot_id: String,
    pub segment_id: String,
    pub provider: String,
    pub output_path: PathBuf,
    pub duration: f64,
    /// Strategy that produced the clip; `None` for first-attempt successes.
    pub strategy: Option<RetryStrategy>,
}

impl GeneratedSegment {
    pub fn from_clip(shot_id: &str, clip: GeneratedClip) -> Self {
        Self {
            shot_id: shot_id.to_string(),
            segment_id: clip.segment_id,
            provider: clip.provider,
            output_path: clip.output_path,
            duration: clip.duration,
            strategy: clip.strategy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSegment {
    pub shot_id: String,
    pub segment_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShotOutcome {
    /// Every segment was generated.
    Complete,
    /// Some segments were skipped.
    Partial,
    /// Every segment was skipped.
    Failed,
    /// Cancellation stopped the shot before all segments were attempted.
    Cancelled,
}

impl ShotOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn classify(planned: usize, generated: usize, skipped: usize) -> Self {
        if generated + skipped < planned {
            Self::Cancelled
        } else if skipped == 0 {
            Self::Complete
        } else if generated == 0 {
            Self::Failed
        } else {
            Self::Partial
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotManifestEntry {
    pub shot_id: String,
    pub provider: String,
    /// Planned segment ids, in order.
    pub segment_ids: Vec<String>,
    pub retry_attempts: Vec<RetryAttempt>,
    pub outcome: ShotOutcome,
    /// Timeline frame after the shot was committed; `None` when the shot
    /// never reached the store.
    pub committed_frame: Option<FrameNumber>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionResult {
    pub production_id: Uuid,
    pub title: String,
    pub generated: Vec<GeneratedSegment>,
    pub skipped: Vec<SkippedSegment>,
    pub manifest: Vec<ShotManifestEntry>,
    pub snapshots: Vec<Snapshot>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ProductionResult {
    pub fn to_json(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn shot(&self, shot_id: &str) -> Option<&ShotManifestEntry> {
        self.manifest.iter().find(|entry| entry.shot_id == shot_id)
    }

    /// Clips of one shot, in timeline order.
    pub fn clips_for<'a>(
        &'a self,
        shot_id: &'a str,
    ) -> impl Iterator<Item = &'a GeneratedSegment> + 'a {
        self.generated.iter().filter(move |g| g.shot_id == shot_id)
    }
}
