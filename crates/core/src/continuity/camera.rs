//! The single production camera and its partial updates.

use serde::{Deserialize, Serialize};

use crate::continuity::entity::Vec3;
use crate::types::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthOfField {
    Shallow,
    #[default]
    Medium,
    Deep,
}

impl DepthOfField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shallow => "shallow",
            Self::Medium => "medium",
            Self::Deep => "deep",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "shallow" => Some(Self::Shallow),
            "medium" => Some(Self::Medium),
            "deep" => Some(Self::Deep),
            _ => None,
        }
    }
}

/// Camera movement for the current shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraMotion {
    #[default]
    Static,
    Pan,
    Tilt,
    Dolly,
    Truck,
    Crane,
    Orbit,
    Handheld,
    Zoom,
}

impl CameraMotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Pan => "pan",
            Self::Tilt => "tilt",
            Self::Dolly => "dolly",
            Self::Truck => "truck",
            Self::Crane => "crane",
            Self::Orbit => "orbit",
            Self::Handheld => "handheld",
            Self::Zoom => "zoom",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        let motion = match label.as_str() {
            "static" => Self::Static,
            "pan" => Self::Pan,
            "tilt" => Self::Tilt,
            "dolly" | "dolly_in" | "dolly_out" => Self::Dolly,
            "truck" => Self::Truck,
            "crane" => Self::Crane,
            "orbit" => Self::Orbit,
            "handheld" => Self::Handheld,
            "zoom" => Self::Zoom,
            _ => return None,
        };
        Some(motion)
    }
}

/// What the camera is aimed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum CameraTarget {
    Entity(EntityId),
    Point(Vec3),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    pub position: Vec3,
    pub target: Option<CameraTarget>,
    pub lens: String,
    pub aperture: String,
    /// Focal length in millimetres.
    pub focal_length: f64,
    pub focus_distance: f64,
    pub depth_of_field: DepthOfField,
    pub motion: CameraMotion,
    pub motion_speed: f64,
    pub framing: String,
    pub shot_type: String,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1.6, 5.0),
            target: None,
            lens: "35mm".to_string(),
            aperture: "f/2.8".to_string(),
            focal_length: 35.0,
            focus_distance: 5.0,
            depth_of_field: DepthOfField::Medium,
            motion: CameraMotion::Static,
            motion_speed: 1.0,
            framing: "center".to_string(),
            shot_type: "medium".to_string(),
        }
    }
}

/// Partial camera update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraUpdate {
    pub position: Option<Vec3>,
    pub target: Option<CameraTarget>,
    pub lens: Option<String>,
    pub aperture: Option<String>,
    pub focal_length: Option<f64>,
    pub focus_distance: Option<f64>,
    pub depth_of_field: Option<DepthOfField>,
    pub motion: Option<CameraMotion>,
    pub motion_speed: Option<f64>,
    pub framing: Option<String>,
    pub shot_type: Option<String>,
}

impl CameraUpdate {
    pub fn is_empty(&self) -> bool {
        *self == CameraUpdate::default()
    }

    pub(crate) fn apply(self, camera: &mut CameraState) {
        if let Some(v) = self.position {
            camera.position = v;
        }
        if let Some(v) = self.target {
            camera.target = Some(v);
        }
        if let Some(v) = self.lens {
            camera.lens = v;
        }
        if let Some(v) = self.aperture {
            camera.aperture = v;
        }
        if let Some(v) = self.focal_length {
            camera.focal_length = v;
        }
        if let Some(v) = self.focus_distance {
            camera.focus_distance = v;
        }
        if let Some(v) = self.depth_of_field {
            camera.depth_of_field = v;
        }
        if let Some(v) = self.motion {
            camera.motion = v;
        }
        if let Some(v) = self.motion_speed {
            camera.motion_speed = v;
        }
        if let Some(v) = self.framing {
            camera.framing = v;
        }
        if let Some(v) = self.shot_type {
            camera.shot_type = v;
        }
    }
}
