//! Entities tracked across a production: spatial transforms, entity kinds,
//! and the emotional state carried by characters.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::threshold_validation::validate_unit_range;
use crate::types::EntityId;

// ---------------------------------------------------------------------------
// Spatial primitives
// ---------------------------------------------------------------------------

/// A point or direction in scene space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vec3 = Vec3 { x: 1.0, y: 1.0, z: 1.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Linear interpolation towards `other`; `t` is not clamped.
    pub fn lerp(&self, other: &Vec3, t: f64) -> Vec3 {
        Vec3 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    pub fn distance_to(&self, other: &Vec3) -> f64 {
        let (dx, dy, dz) = (other.x - self.x, other.y - self.y, other.z - self.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Position, rotation (Euler degrees) and scale of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Character,
    Prop,
    Environment,
    Light,
    Camera,
    Effect,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Prop => "prop",
            Self::Environment => "environment",
            Self::Light => "light",
            Self::Camera => "camera",
            Self::Effect => "effect",
        }
    }
}

// ---------------------------------------------------------------------------
// Emotion
// ---------------------------------------------------------------------------

/// Closed set of emotional states a character can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Surprised,
    Disgusted,
    Contempt,
    Curious,
    Determined,
    Confused,
    Hopeful,
    Anxious,
}

/// Every emotion in declaration order.
pub const ALL_EMOTIONS: &[Emotion] = &[
    Emotion::Neutral,
    Emotion::Happy,
    Emotion::Sad,
    Emotion::Angry,
    Emotion::Fearful,
    Emotion::Surprised,
    Emotion::Disgusted,
    Emotion::Contempt,
    Emotion::Curious,
    Emotion::Determined,
    Emotion::Confused,
    Emotion::Hopeful,
    Emotion::Anxious,
];

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Fearful => "fearful",
            Self::Surprised => "surprised",
            Self::Disgusted => "disgusted",
            Self::Contempt => "contempt",
            Self::Curious => "curious",
            Self::Determined => "determined",
            Self::Confused => "confused",
            Self::Hopeful => "hopeful",
            Self::Anxious => "anxious",
        }
    }

    /// Strict lookup by label (case-insensitive).
    pub fn from_label(label: &str) -> Option<Emotion> {
        let label = label.trim();
        ALL_EMOTIONS
            .iter()
            .copied()
            .find(|e| e.as_str().eq_ignore_ascii_case(label))
    }

    /// Lookup that maps unrecognised labels to [`Emotion::Neutral`].
    ///
    /// The rejected label is logged so bad shot plans stay visible.
    pub fn parse_lenient(label: &str) -> Emotion {
        match Self::from_label(label) {
            Some(emotion) => emotion,
            None => {
                tracing::warn!(label, "Unrecognised emotion label, falling back to neutral");
                Emotion::Neutral
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Character state
// ---------------------------------------------------------------------------

/// One entry of a character's emotional history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionTransition {
    pub from: Emotion,
    pub to: Emotion,
    pub intensity: f64,
}

/// What a character is looking at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum GazeTarget {
    Camera,
    Entity(EntityId),
}

impl GazeTarget {
    /// Parse a plan-level gaze string: `"camera"` or an entity id.
    pub fn parse(value: &str) -> GazeTarget {
        if value.eq_ignore_ascii_case("camera") {
            GazeTarget::Camera
        } else {
            GazeTarget::Entity(value.to_string())
        }
    }
}

pub const DEFAULT_EMOTION_INTENSITY: f64 = 0.5;
pub const DEFAULT_POSTURE: &str = "standing";
pub const DEFAULT_ACTION: &str = "idle";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    pub emotion: Emotion,
    pub intensity: f64,
    pub posture: String,
    pub action: String,
    pub gaze_target: Option<GazeTarget>,
    pub speaking: bool,
    pub emotion_history: Vec<EmotionTransition>,
}

impl Default for CharacterState {
    fn default() -> Self {
        Self {
            emotion: Emotion::Neutral,
            intensity: DEFAULT_EMOTION_INTENSITY,
            posture: DEFAULT_POSTURE.to_string(),
            action: DEFAULT_ACTION.to_string(),
            gaze_target: None,
            speaking: false,
            emotion_history: Vec::new(),
        }
    }
}

impl CharacterState {
    /// Move to a new emotion, recording the transition first.
    ///
    /// History is append-only: the entry captures the emotion being left,
    /// so it must be pushed before the current value changes.
    pub fn transition_emotion(&mut self, to: Emotion, intensity: f64) -> Result<(), CoreError> {
        validate_unit_range(intensity, "emotion intensity")?;
        self.emotion_history.push(EmotionTransition {
            from: self.emotion,
            to,
            intensity,
        });
        self.emotion = to;
        self.intensity = intensity;
        Ok(())
    }

    /// The most recent `n` transitions, oldest first.
    pub fn recent_transitions(&self, n: usize) -> &[EmotionTransition] {
        let start = self.emotion_history.len().saturating_sub(n);
        &self.emotion_history[start..]
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub transform: Transform,
    pub visible: bool,
    /// Stable visual description used to keep identity consistent.
    pub visual_anchor: Option<String>,
    pub parent: Option<EntityId>,
    pub children: Vec<EntityId>,
    /// Present only for [`EntityKind::Character`].
    pub character: Option<CharacterState>,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, kind: EntityKind) -> Self {
        let character = (kind == EntityKind::Character).then(CharacterState::default);
        Self {
            id: id.into(),
            kind,
            transform: Transform::default(),
            visible: true,
            visual_anchor: None,
            parent: None,
            children: Vec::new(),
            character,
        }
    }

    pub fn character(id: impl Into<EntityId>) -> Self {
        Self::new(id, EntityKind::Character)
    }

    pub fn with_visual_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.visual_anchor = Some(anchor.into());
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }

    pub fn is_character(&self) -> bool {
        self.kind == EntityKind::Character
    }
}

// ---------------------------------------------------------------------------
// EntityUpdate
// ---------------------------------------------------------------------------

/// Partial update applied by `ContinuityStore::update_entity`.
///
/// Every `None` field leaves the current value untouched. The character
/// fields (`emotion` onwards) are rejected for non-character entities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityUpdate {
    pub position: Option<Vec3>,
    pub rotation: Option<Vec3>,
    pub scale: Option<Vec3>,
    pub visible: Option<bool>,
    pub visual_anchor: Option<String>,
    /// New emotion; intensity falls back to the current one when absent.
    pub emotion: Option<Emotion>,
    pub intensity: Option<f64>,
    pub posture: Option<String>,
    pub action: Option<String>,
    pub gaze_target: Option<GazeTarget>,
    pub speaking: Option<bool>,
}

impl EntityUpdate {
    pub fn emotion(emotion: Emotion, intensity: f64) -> Self {
        Self {
            emotion: Some(emotion),
            intensity: Some(intensity),
            ..Default::default()
        }
    }

    pub fn touches_character(&self) -> bool {
        self.emotion.is_some()
            || self.intensity.is_some()
            || self.posture.is_some()
            || self.action.is_some()
            || self.gaze_target.is_some()
            || self.speaking.is_some()
    }

    /// Apply to `entity`. Validation happens before any field is written.
    pub(crate) fn apply(self, entity: &mut Entity) -> Result<(), CoreError> {
        if let Some(intensity) = self.intensity {
            validate_unit_range(intensity, "emotion intensity")?;
        }
        if self.touches_character() && entity.character.is_none() {
            return Err(CoreError::Validation(format!(
                "Entity '{}' is a {} and has no character state",
                entity.id,
                entity.kind.as_str()
            )));
        }

        if let Some(position) = self.position {
            entity.transform.position = position;
        }
        if let Some(rotation) = self.rotation {
            entity.transform.rotation = rotation;
        }
        if let Some(scale) = self.scale {
            entity.transform.scale = scale;
        }
        if let Some(visible) = self.visible {
            entity.visible = visible;
        }
        if let Some(anchor) = self.visual_anchor {
            entity.visual_anchor = Some(anchor);
        }

        if let Some(state) = entity.character.as_mut() {
            match (self.emotion, self.intensity) {
                (Some(emotion), intensity) => {
                    state.transition_emotion(emotion, intensity.unwrap_or(state.intensity))?
                }
                (None, Some(intensity)) => state.intensity = intensity,
                (None, None) => {}
            }
            if let Some(posture) = self.posture {
                state.posture = posture;
            }
            if let Some(action) = self.action {
                state.action = action;
            }
            if let Some(gaze) = self.gaze_target {
                state.gaze_target = Some(gaze);
            }
            if let Some(speaking) = self.speaking {
                state.speaking = speaking;
            }
        }
        Ok(())
    }
}
