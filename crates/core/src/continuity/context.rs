//! Read-only continuity summary handed to prompt compilation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::continuity::entity::{Emotion, EmotionTransition, Vec3};
use crate::continuity::snapshot::AudioCue;
use crate::types::{EntityId, FrameNumber};

/// Number of snapshots aggregated when no lookback is given.
pub const DEFAULT_CONTEXT_LOOKBACK: usize = 3;

/// Number of emotion transitions reported per character.
pub const ARC_TRANSITION_COUNT: usize = 3;

/// Audio cues newer than this many frames are considered recent.
pub const AUDIO_CUE_WINDOW_FRAMES: FrameNumber = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterArc {
    pub emotion: Emotion,
    pub intensity: f64,
    pub recent_transitions: Vec<EmotionTransition>,
    pub action: String,
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightingSample {
    pub frame: FrameNumber,
    pub ambient_intensity: f64,
    pub key_intensity: f64,
    pub saturation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictSummary {
    pub entity_a: EntityId,
    pub entity_b: EntityId,
    pub tension: f64,
    pub relationship_type: String,
}

/// Continuity facts the prompt compiler is allowed to see.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContinuityContext {
    pub frame_number: FrameNumber,
    pub character_arcs: BTreeMap<EntityId, CharacterArc>,
    /// Camera positions of the looked-back snapshots, oldest first.
    pub camera_trajectory: Vec<Vec3>,
    pub lighting_series: Vec<LightingSample>,
    pub active_conflicts: Vec<ConflictSummary>,
    pub last_speaker: Option<EntityId>,
    pub last_dialogue: Option<String>,
    pub recent_audio_cues: Vec<AudioCue>,
}

impl ContinuityContext {
    pub fn arc(&self, id: &str) -> Option<&CharacterArc> {
        self.character_arcs.get(id)
    }
}
