//! Scene lighting and gradual lighting evolution between shots.

use serde::{Deserialize, Serialize};

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb { r: 255, g: 255, b: 255 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Per-channel interpolation, rounded to the nearest integer.
    pub fn lerp(&self, other: &Rgb, t: f64) -> Rgb {
        let channel = |a: u8, b: u8| -> u8 {
            (a as f64 + (b as f64 - a as f64) * t).round().clamp(0.0, 255.0) as u8
        };
        Rgb {
            r: channel(self.r, other.r),
            g: channel(self.g, other.g),
            b: channel(self.b, other.b),
        }
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightingState {
    pub time_of_day: String,
    pub ambient_color: Rgb,
    pub ambient_intensity: f64,
    pub key_color: Rgb,
    pub key_intensity: f64,
    pub fill_intensity: f64,
    pub rim_intensity: f64,
    pub fog_density: f64,
    /// Kelvin.
    pub color_temperature: f64,
    pub saturation: f64,
    pub contrast: f64,
}

impl Default for LightingState {
    fn default() -> Self {
        Self {
            time_of_day: "day".to_string(),
            ambient_color: Rgb::WHITE,
            ambient_intensity: 0.3,
            key_color: Rgb::WHITE,
            key_intensity: 1.0,
            fill_intensity: 0.5,
            rim_intensity: 0.3,
            fog_density: 0.0,
            color_temperature: 6500.0,
            saturation: 1.0,
            contrast: 1.0,
        }
    }
}

impl LightingState {
    /// Blend towards `target` by `progress`.
    ///
    /// Every numeric field is interpolated. `time_of_day` is categorical and
    /// only switches once the blend is complete. Callers validate `progress`.
    pub fn evolve(&self, target: &LightingState, progress: f64) -> LightingState {
        let t = progress.clamp(0.0, 1.0);
        LightingState {
            time_of_day: if t >= 1.0 {
                target.time_of_day.clone()
            } else {
                self.time_of_day.clone()
            },
            ambient_color: self.ambient_color.lerp(&target.ambient_color, t),
            ambient_intensity: lerp(self.ambient_intensity, target.ambient_intensity, t),
            key_color: self.key_color.lerp(&target.key_color, t),
            key_intensity: lerp(self.key_intensity, target.key_intensity, t),
            fill_intensity: lerp(self.fill_intensity, target.fill_intensity, t),
            rim_intensity: lerp(self.rim_intensity, target.rim_intensity, t),
            fog_density: lerp(self.fog_density, target.fog_density, t),
            color_temperature: lerp(self.color_temperature, target.color_temperature, t),
            saturation: lerp(self.saturation, target.saturation, t),
            contrast: lerp(self.contrast, target.contrast, t),
        }
    }
}
