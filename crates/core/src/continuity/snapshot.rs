//! Immutable point-in-time captures of the continuity store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::continuity::camera::CameraState;
use crate::continuity::entity::Entity;
use crate::continuity::lighting::LightingState;
use crate::continuity::relationship::ConflictRelationship;
use crate::types::{EntityId, FrameNumber, Timestamp};

/// Where the action currently takes place.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvironmentState {
    pub location: String,
    pub weather: Option<String>,
    pub time_of_day: Option<String>,
}

impl EnvironmentState {
    pub fn at(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Default::default()
        }
    }
}

/// A music or sound-effect cue placed on the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioCue {
    pub frame: FrameNumber,
    pub kind: String,
    pub detail: String,
}

/// Full state of the store when a frame was advanced.
///
/// Snapshots are only created by `ContinuityStore::advance_frame` and are
/// never mutated after being appended to the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub frame_number: FrameNumber,
    pub captured_at: Timestamp,
    pub entities: BTreeMap<EntityId, Entity>,
    pub camera: CameraState,
    pub lighting: LightingState,
    pub conflicts: Vec<ConflictRelationship>,
    pub environment: Option<EnvironmentState>,
    pub active_speaker: Option<EntityId>,
    pub last_dialogue: Option<String>,
    pub recent_audio_cues: Vec<AudioCue>,
}

impl Snapshot {
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }
}
