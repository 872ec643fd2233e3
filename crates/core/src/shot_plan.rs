//! Declarative shot plan: the input a production is generated from.
//!
//! Plans are deserialised from JSON and validated before any generation
//! starts. Per-shot specs are overrides; they are converted into
//! continuity-store updates by the orchestrator.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::continuity::{
    CameraMotion, CameraTarget, CameraUpdate, DepthOfField, Emotion, EntityUpdate,
    EnvironmentState, GazeTarget, LightingState, Rgb, Vec3,
};
use crate::error::CoreError;
use crate::segmentation::Segment;
use crate::threshold_validation::{validate_positive_duration, validate_unit_range};
use crate::types::EntityId;

/// Lower bound on a shot's derived duration in seconds.
pub const DEFAULT_SHOT_MIN_DURATION: f64 = 3.0;
/// Upper bound on a shot's derived duration in seconds.
pub const DEFAULT_SHOT_MAX_DURATION: f64 = 30.0;

fn default_min_duration() -> f64 {
    DEFAULT_SHOT_MIN_DURATION
}

fn default_max_duration() -> f64 {
    DEFAULT_SHOT_MAX_DURATION
}

fn default_true() -> bool {
    true
}

fn default_intensity() -> f64 {
    crate::continuity::entity::DEFAULT_EMOTION_INTENSITY
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CharacterDefinition {
    pub name: String,
    #[serde(default)]
    pub visual_anchor: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShotPlan {
    pub title: String,
    #[serde(default)]
    pub characters: BTreeMap<EntityId, CharacterDefinition>,
    #[serde(default)]
    pub initial_environment: Option<EnvironmentSpec>,
    #[serde(default)]
    pub shots: Vec<Shot>,
}

impl ShotPlan {
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        serde_json::from_str(json)
            .map_err(|e| CoreError::Validation(format!("Invalid shot plan: {e}")))
    }

    /// Check the plan before generation starts.
    ///
    /// Character overrides must reference declared characters; shot ids
    /// must be unique; durations must be positive with `min <= max`.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut seen = HashSet::new();
        for shot in &self.shots {
            if shot.id.trim().is_empty() {
                return Err(CoreError::Validation("Shot id must not be empty".to_string()));
            }
            if !seen.insert(shot.id.as_str()) {
                return Err(CoreError::Validation(format!(
                    "Duplicate shot id '{}'",
                    shot.id
                )));
            }
            shot.validate()?;
            let gaze_targets = shot
                .characters
                .values()
                .filter_map(|spec| spec.gaze_target.as_deref())
                .filter(|target| !target.eq_ignore_ascii_case("camera"));
            let camera_target = shot.camera.as_ref().and_then(|c| c.target.as_deref());
            let referenced = shot
                .characters
                .keys()
                .map(String::as_str)
                .chain(gaze_targets)
                .chain(camera_target);
            for id in referenced {
                if !self.characters.contains_key(id) {
                    return Err(CoreError::UnknownEntity(id.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Resolve a dialogue speaker label (id or display name) to a character id.
    pub fn resolve_speaker(&self, label: &str) -> Option<&EntityId> {
        self.characters.iter().find_map(|(id, def)| {
            (id.eq_ignore_ascii_case(label) || def.name.eq_ignore_ascii_case(label)).then_some(id)
        })
    }
}

// ---------------------------------------------------------------------------
// Shot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub id: String,
    #[serde(default)]
    pub scene_id: Option<String>,
    pub action: String,
    /// Explicit duration in seconds; derived from audio when absent.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default = "default_min_duration")]
    pub min_duration: f64,
    #[serde(default = "default_max_duration")]
    pub max_duration: f64,
    #[serde(default)]
    pub camera: Option<CameraSpec>,
    #[serde(default)]
    pub lighting: Option<LightingSpec>,
    #[serde(default)]
    pub characters: BTreeMap<EntityId, CharacterSpec>,
    #[serde(default)]
    pub environment: Option<EnvironmentSpec>,
    #[serde(default)]
    pub audio: AudioSpec,
    /// Provider name; the configured default is used when absent.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default = "default_true")]
    pub continuity_required: bool,
    #[serde(default)]
    pub starting_frame: Option<String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
}

impl Shot {
    pub fn new(id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            scene_id: None,
            action: action.into(),
            duration: None,
            min_duration: DEFAULT_SHOT_MIN_DURATION,
            max_duration: DEFAULT_SHOT_MAX_DURATION,
            camera: None,
            lighting: None,
            characters: BTreeMap::new(),
            environment: None,
            audio: AudioSpec::default(),
            provider: None,
            continuity_required: true,
            starting_frame: None,
            negative_prompt: None,
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_character(mut self, id: impl Into<EntityId>, spec: CharacterSpec) -> Self {
        self.characters.insert(id.into(), spec);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.environment = Some(EnvironmentSpec {
            location: location.into(),
            ..Default::default()
        });
        self
    }

    pub fn with_narration(mut self, narration: impl Into<String>) -> Self {
        self.audio.narration = Some(narration.into());
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(duration) = self.duration {
            validate_positive_duration(duration, &format!("Shot '{}' duration", self.id))?;
        }
        if !(self.min_duration > 0.0 && self.max_duration > 0.0)
            || self.min_duration > self.max_duration
        {
            return Err(CoreError::InvalidDurationConfig(format!(
                "Shot '{}' duration bounds must satisfy 0 < min ({}) <= max ({})",
                self.id, self.min_duration, self.max_duration
            )));
        }
        for (id, spec) in &self.characters {
            validate_unit_range(spec.emotion_intensity, &format!("Intensity for '{id}'"))?;
        }
        Ok(())
    }

    /// Location this shot declares, if any.
    pub fn location(&self) -> Option<&str> {
        self.environment.as_ref().map(|env| env.location.as_str())
    }

    /// View of this shot restricted to one segment's text and duration.
    pub fn for_segment(&self, segment: &Segment) -> Shot {
        let mut view = self.clone();
        view.action = segment.action.clone();
        view.duration = Some(segment.duration);
        view.audio.narration = segment.narration.clone();
        if segment.index > 0 {
            view.audio.dialogue = None;
        }
        view
    }

    /// Standalone shot built from a segment, used when a failed segment is
    /// split again into smaller pieces.
    pub fn from_segment(segment: &Segment) -> Shot {
        let mut shot = Shot::new(segment.id.clone(), segment.action.clone());
        shot.duration = Some(segment.duration);
        shot.audio.narration = segment.narration.clone();
        shot
    }
}

// ---------------------------------------------------------------------------
// Per-shot specs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CharacterSpec {
    /// Free-form emotion label; unknown labels become neutral.
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default = "default_intensity")]
    pub emotion_intensity: f64,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub posture: Option<String>,
    #[serde(default)]
    pub gaze_target: Option<String>,
    #[serde(default)]
    pub speaking: Option<bool>,
    #[serde(default)]
    pub position: Option<Vec3>,
    #[serde(default)]
    pub visual_anchor: Option<String>,
}

impl CharacterSpec {
    pub fn with_emotion(emotion: impl Into<String>, intensity: f64) -> Self {
        Self {
            emotion: Some(emotion.into()),
            emotion_intensity: intensity,
            ..Default::default()
        }
    }

    pub fn emotion(&self) -> Option<Emotion> {
        self.emotion.as_deref().map(Emotion::parse_lenient)
    }

    /// Everything except the emotion, applied before generation.
    pub fn staging_update(&self) -> EntityUpdate {
        EntityUpdate {
            position: self.position,
            visual_anchor: self.visual_anchor.clone(),
            action: self.action.clone(),
            posture: self.posture.clone(),
            gaze_target: self.gaze_target.as_deref().map(GazeTarget::parse),
            speaking: self.speaking,
            ..Default::default()
        }
    }

    /// The emotion transition, applied when the shot is committed.
    pub fn emotion_update(&self) -> Option<EntityUpdate> {
        self.emotion()
            .map(|emotion| EntityUpdate::emotion(emotion, self.emotion_intensity))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraSpec {
    #[serde(default)]
    pub shot_type: Option<String>,
    #[serde(default)]
    pub motion: Option<String>,
    #[serde(default)]
    pub motion_speed: Option<f64>,
    #[serde(default)]
    pub lens: Option<String>,
    #[serde(default)]
    pub aperture: Option<String>,
    #[serde(default)]
    pub focal_length: Option<f64>,
    #[serde(default)]
    pub focus_distance: Option<f64>,
    #[serde(default)]
    pub depth_of_field: Option<String>,
    #[serde(default)]
    pub framing: Option<String>,
    #[serde(default)]
    pub position: Option<Vec3>,
    /// Entity id the camera should track.
    #[serde(default)]
    pub target: Option<EntityId>,
}

impl CameraSpec {
    pub fn to_update(&self) -> CameraUpdate {
        let motion = self.motion.as_deref().and_then(|label| {
            let parsed = CameraMotion::from_label(label);
            if parsed.is_none() {
                tracing::warn!(label, "Unrecognised camera motion, keeping current motion");
            }
            parsed
        });
        CameraUpdate {
            position: self.position,
            target: self.target.clone().map(CameraTarget::Entity),
            lens: self.lens.clone(),
            aperture: self.aperture.clone(),
            focal_length: self.focal_length,
            focus_distance: self.focus_distance,
            depth_of_field: self.depth_of_field.as_deref().and_then(DepthOfField::from_label),
            motion,
            motion_speed: self.motion_speed,
            framing: self.framing.clone(),
            shot_type: self.shot_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LightingSpec {
    #[serde(default)]
    pub time_of_day: Option<String>,
    #[serde(default)]
    pub ambient_color: Option<Rgb>,
    #[serde(default)]
    pub ambient_intensity: Option<f64>,
    #[serde(default)]
    pub key_color: Option<Rgb>,
    #[serde(default)]
    pub key_intensity: Option<f64>,
    #[serde(default)]
    pub fill_intensity: Option<f64>,
    #[serde(default)]
    pub rim_intensity: Option<f64>,
    #[serde(default)]
    pub fog_density: Option<f64>,
    #[serde(default)]
    pub color_temperature: Option<f64>,
    #[serde(default)]
    pub saturation: Option<f64>,
    #[serde(default)]
    pub contrast: Option<f64>,
}

impl LightingSpec {
    /// Target lighting: declared fields over the `current` lighting.
    pub fn to_target(&self, current: &LightingState) -> LightingState {
        LightingState {
            time_of_day: self
                .time_of_day
                .clone()
                .unwrap_or_else(|| current.time_of_day.clone()),
            ambient_color: self.ambient_color.unwrap_or(current.ambient_color),
            ambient_intensity: self.ambient_intensity.unwrap_or(current.ambient_intensity),
            key_color: self.key_color.unwrap_or(current.key_color),
            key_intensity: self.key_intensity.unwrap_or(current.key_intensity),
            fill_intensity: self.fill_intensity.unwrap_or(current.fill_intensity),
            rim_intensity: self.rim_intensity.unwrap_or(current.rim_intensity),
            fog_density: self.fog_density.unwrap_or(current.fog_density),
            color_temperature: self.color_temperature.unwrap_or(current.color_temperature),
            saturation: self.saturation.unwrap_or(current.saturation),
            contrast: self.contrast.unwrap_or(current.contrast),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    pub location: String,
    #[serde(default)]
    pub weather: Option<String>,
    #[serde(default)]
    pub time_of_day: Option<String>,
}

impl EnvironmentSpec {
    pub fn to_state(&self) -> EnvironmentState {
        EnvironmentState {
            location: self.location.clone(),
            weather: self.weather.clone(),
            time_of_day: self.time_of_day.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioSpec {
    #[serde(default)]
    pub narration: Option<String>,
    /// `"Name: line"`; the name prefix is optional.
    #[serde(default)]
    pub dialogue: Option<String>,
    #[serde(default)]
    pub dialogue_emotion: Option<String>,
    /// Seconds of silence before the audio starts.
    #[serde(default)]
    pub audio_delay: f64,
    #[serde(default)]
    pub music_cue: Option<String>,
    #[serde(default)]
    pub sound_effects: Vec<String>,
}

impl AudioSpec {
    pub fn has_speech(&self) -> bool {
        self.narration.as_deref().is_some_and(|t| !t.trim().is_empty())
            || self.dialogue.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    /// Speaker label of the dialogue, taken from a `"Name:"` prefix.
    pub fn speaker(&self) -> Option<&str> {
        let (name, _) = self.dialogue.as_deref()?.split_once(':')?;
        let name = name.trim();
        (!name.is_empty() && !name.contains(char::is_whitespace)).then_some(name)
    }

    /// Dialogue text with any speaker prefix removed.
    pub fn spoken_dialogue(&self) -> Option<&str> {
        let dialogue = self.dialogue.as_deref()?;
        let text = match self.speaker() {
            Some(_) => dialogue.split_once(':').map_or(dialogue, |(_, line)| line),
            None => dialogue,
        };
        Some(text.trim())
    }
}
