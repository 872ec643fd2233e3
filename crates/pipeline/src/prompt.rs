//! Prompt compilation seam.
//!
//! The continuity context is the only channel through which store state
//! reaches a prompt.

use montage_core::continuity::ContinuityContext;
use montage_core::shot_plan::Shot;

pub trait PromptCompiler: Send + Sync {
    /// Pure: the same shot and context always give the same prompt.
    fn compile(&self, shot: &Shot, context: &ContinuityContext) -> String;
}

/// Plain-text compiler: action, camera, on-screen characters, open
/// conflicts and dialogue, in that order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextPromptCompiler;

impl PromptCompiler for ContextPromptCompiler {
    fn compile(&self, shot: &Shot, context: &ContinuityContext) -> String {
        let mut parts = vec![shot.action.trim().to_string()];

        if let Some(camera) = &shot.camera {
            let framing: Vec<&str> = [camera.shot_type.as_deref(), camera.motion.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            if !framing.is_empty() {
                parts.push(format!("Camera: {}.", framing.join(", ")));
            }
        }

        for (id, spec) in &shot.characters {
            let arc = context.arc(id);
            let emotion = spec
                .emotion()
                .or(arc.map(|a| a.emotion))
                .map(|e| e.as_str())
                .unwrap_or("neutral");
            let action = spec
                .action
                .as_deref()
                .or(arc.map(|a| a.action.as_str()))
                .unwrap_or("idle");
            parts.push(format!("{id} is {emotion}, {action}."));
        }

        for conflict in &context.active_conflicts {
            let mood = if conflict.tension < 0.0 { "hostility" } else { "closeness" };
            parts.push(format!(
                "Visible {mood} between {} and {}.",
                conflict.entity_a, conflict.entity_b
            ));
        }

        if let Some(line) = shot.audio.spoken_dialogue().filter(|l| !l.is_empty()) {
            parts.push(format!("Dialogue: \"{line}\""));
        }

        parts.join(" ")
    }
}
