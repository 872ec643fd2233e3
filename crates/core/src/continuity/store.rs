//! The authoritative continuity model for one production.
//!
//! [`ContinuityStore`] owns every entity, the camera, the lighting, the
//! pairwise relationships and the append-only snapshot history. It is a
//! plain owned value; callers that share it across tasks wrap it in a lock.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;

use crate::continuity::camera::{CameraState, CameraTarget, CameraUpdate};
use crate::continuity::context::{
    CharacterArc, ConflictSummary, ContinuityContext, LightingSample, ARC_TRANSITION_COUNT,
    AUDIO_CUE_WINDOW_FRAMES,
};
use crate::continuity::entity::{Entity, EntityUpdate, GazeTarget};
use crate::continuity::lighting::LightingState;
use crate::continuity::relationship::{ConflictRelationship, PairKey};
use crate::continuity::snapshot::{AudioCue, EnvironmentState, Snapshot};
use crate::error::CoreError;
use crate::threshold_validation::{validate_signed_unit_range, validate_unit_range};
use crate::types::{EntityId, FrameNumber};

#[derive(Debug, Clone, Default)]
pub struct ContinuityStore {
    frame_number: FrameNumber,
    entities: BTreeMap<EntityId, Entity>,
    camera: CameraState,
    lighting: LightingState,
    relationships: BTreeMap<PairKey, ConflictRelationship>,
    environment: Option<EnvironmentState>,
    active_speaker: Option<EntityId>,
    last_dialogue: Option<String>,
    audio_cues: Vec<AudioCue>,
    history: Vec<Snapshot>,
}

impl ContinuityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from an audited snapshot.
    ///
    /// The restored store sits at the snapshot's frame with an empty history.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let relationships = snapshot
            .conflicts
            .iter()
            .map(|rel| (rel.key(), rel.clone()))
            .collect();
        Self {
            frame_number: snapshot.frame_number,
            entities: snapshot.entities.clone(),
            camera: snapshot.camera.clone(),
            lighting: snapshot.lighting.clone(),
            relationships,
            environment: snapshot.environment.clone(),
            active_speaker: snapshot.active_speaker.clone(),
            last_dialogue: snapshot.last_dialogue.clone(),
            audio_cues: snapshot.recent_audio_cues.clone(),
            history: Vec::new(),
        }
    }

    pub fn frame_number(&self) -> FrameNumber {
        self.frame_number
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    pub fn add_entity(&mut self, entity: Entity) -> Result<(), CoreError> {
        if self.entities.contains_key(&entity.id) {
            return Err(CoreError::Conflict(format!(
                "Entity '{}' already exists",
                entity.id
            )));
        }
        tracing::debug!(entity_id = %entity.id, kind = entity.kind.as_str(), "Entity added");
        self.entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    pub fn get_entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains_entity(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Remove an entity together with every relationship that involves it.
    /// Its children are detached rather than removed.
    pub fn remove_entity(&mut self, id: &str) -> bool {
        let removed = self.entities.remove(id).is_some();
        if removed {
            self.relationships.retain(|_, rel| !rel.involves(id));
            for entity in self.entities.values_mut() {
                if entity.parent.as_deref() == Some(id) {
                    entity.parent = None;
                }
                entity.children.retain(|child| child != id);
            }
            if self.active_speaker.as_deref() == Some(id) {
                self.active_speaker = None;
            }
        }
        removed
    }

    pub fn characters(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(|e| e.is_character())
    }

    /// Attach `child` under `parent`, detaching it from any previous parent.
    pub fn link_entities(&mut self, parent: &str, child: &str) -> Result<(), CoreError> {
        for id in [parent, child] {
            self.require_entity(id)?;
        }
        let mut ancestor = Some(parent);
        while let Some(id) = ancestor {
            if id == child {
                return Err(CoreError::Validation(format!(
                    "Linking '{child}' under '{parent}' would create a cycle"
                )));
            }
            ancestor = self.entities.get(id).and_then(|e| e.parent.as_deref());
        }

        let previous = self
            .entities
            .get_mut(child)
            .and_then(|e| e.parent.replace(parent.to_string()));
        if let Some(previous) = previous {
            if let Some(entity) = self.entities.get_mut(&previous) {
                entity.children.retain(|c| c != child);
            }
        }
        if let Some(entity) = self.entities.get_mut(parent) {
            entity.children.push(child.to_string());
        }
        tracing::debug!(parent, child, "Entities linked");
        Ok(())
    }

    fn require_entity(&self, id: &str) -> Result<(), CoreError> {
        if self.entities.contains_key(id) {
            Ok(())
        } else {
            Err(CoreError::UnknownEntity(id.to_string()))
        }
    }

    /// Apply a partial update. Unknown ids, including a gaze target that
    /// names a missing entity, fail with `UnknownEntity`.
    pub fn update_entity(&mut self, id: &str, update: EntityUpdate) -> Result<(), CoreError> {
        if let Some(GazeTarget::Entity(target)) = &update.gaze_target {
            self.require_entity(target)?;
        }
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| CoreError::UnknownEntity(id.to_string()))?;
        update.apply(entity)
    }

    // -----------------------------------------------------------------------
    // Camera & lighting
    // -----------------------------------------------------------------------

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    pub fn set_camera(&mut self, camera: CameraState) {
        self.camera = camera;
    }

    /// A target entity must exist in the store.
    pub fn update_camera(&mut self, update: CameraUpdate) -> Result<(), CoreError> {
        if let Some(CameraTarget::Entity(target)) = &update.target {
            self.require_entity(target)?;
        }
        update.apply(&mut self.camera);
        Ok(())
    }

    pub fn lighting(&self) -> &LightingState {
        &self.lighting
    }

    pub fn set_lighting(&mut self, lighting: LightingState) {
        self.lighting = lighting;
    }

    pub fn evolve_lighting(
        &mut self,
        target: &LightingState,
        progress: f64,
    ) -> Result<(), CoreError> {
        validate_unit_range(progress, "lighting progress")?;
        self.lighting = self.lighting.evolve(target, progress);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Relationships
    // -----------------------------------------------------------------------

    /// Create or update the relationship between `a` and `b`.
    ///
    /// Every call appends a tension change, including the creating one.
    pub fn set_relationship(
        &mut self,
        a: &str,
        b: &str,
        tension: f64,
        relationship_type: impl Into<String>,
    ) -> Result<(), CoreError> {
        if a == b {
            return Err(CoreError::Validation(format!(
                "Entity '{a}' cannot have a relationship with itself"
            )));
        }
        validate_signed_unit_range(tension, "tension")?;
        for id in [a, b] {
            self.require_entity(id)?;
        }

        let key = PairKey::new(a, b);
        let relationship_type = relationship_type.into();
        let frame = self.frame_number;
        match self.relationships.get_mut(&key) {
            Some(rel) => rel.update(tension, relationship_type, frame),
            None => {
                let rel = ConflictRelationship::new(&key, tension, relationship_type, frame);
                self.relationships.insert(key, rel);
            }
        }
        Ok(())
    }

    pub fn relationship(&self, a: &str, b: &str) -> Option<&ConflictRelationship> {
        self.relationships.get(&PairKey::new(a, b))
    }

    /// Entities involved in a relationship with |tension| at or above
    /// `threshold`, sorted by id.
    pub fn dramatic_peaks(&self, threshold: f64) -> Vec<EntityId> {
        let ids: BTreeSet<&EntityId> = self
            .relationships
            .values()
            .filter(|rel| rel.tension.abs() >= threshold)
            .flat_map(|rel| [&rel.entity_a, &rel.entity_b])
            .collect();
        ids.into_iter().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Environment & audio
    // -----------------------------------------------------------------------

    pub fn environment(&self) -> Option<&EnvironmentState> {
        self.environment.as_ref()
    }

    pub fn set_environment(&mut self, environment: EnvironmentState) {
        self.environment = Some(environment);
    }

    /// Mark `speaker` as the active speaker and every other character as
    /// silent. `None` clears the speaker.
    pub fn set_speaker(
        &mut self,
        speaker: Option<&str>,
        dialogue: Option<String>,
    ) -> Result<(), CoreError> {
        if let Some(id) = speaker {
            self.require_entity(id)?;
        }
        for entity in self.entities.values_mut() {
            if let Some(state) = entity.character.as_mut() {
                state.speaking = speaker == Some(entity.id.as_str());
            }
        }
        self.active_speaker = speaker.map(str::to_string);
        if dialogue.is_some() {
            self.last_dialogue = dialogue;
        }
        Ok(())
    }

    pub fn add_audio_cue(&mut self, kind: impl Into<String>, detail: impl Into<String>) {
        self.audio_cues.push(AudioCue {
            frame: self.frame_number,
            kind: kind.into(),
            detail: detail.into(),
        });
    }

    fn recent_audio_cues(&self) -> Vec<AudioCue> {
        self.audio_cues
            .iter()
            .filter(|cue| cue.frame + AUDIO_CUE_WINDOW_FRAMES >= self.frame_number)
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Timeline
    // -----------------------------------------------------------------------

    /// Capture a snapshot of the current state, then move the frame counter
    /// forward by `frames`. The snapshot carries the pre-advance frame.
    /// Audio cues that fall out of the recent window are dropped.
    pub fn advance_frame(&mut self, frames: FrameNumber) -> &Snapshot {
        let snapshot = Snapshot {
            frame_number: self.frame_number,
            captured_at: Utc::now(),
            entities: self.entities.clone(),
            camera: self.camera.clone(),
            lighting: self.lighting.clone(),
            conflicts: self.relationships.values().cloned().collect(),
            environment: self.environment.clone(),
            active_speaker: self.active_speaker.clone(),
            last_dialogue: self.last_dialogue.clone(),
            recent_audio_cues: self.recent_audio_cues(),
        };
        self.history.push(snapshot);
        self.frame_number += frames;
        let frame_number = self.frame_number;
        self.audio_cues
            .retain(|cue| cue.frame + AUDIO_CUE_WINDOW_FRAMES >= frame_number);
        tracing::debug!(
            frame_number = self.frame_number,
            snapshots = self.history.len(),
            "Frame advanced",
        );
        &self.history[self.history.len() - 1]
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.history
    }

    pub fn latest_snapshot(&self) -> Option<&Snapshot> {
        self.history.last()
    }

    /// Summarise the current state plus the trajectory over the last
    /// `lookback` snapshots.
    pub fn continuity_context(&self, lookback: usize) -> ContinuityContext {
        let start = self.history.len().saturating_sub(lookback);
        let window = &self.history[start..];

        let character_arcs = self
            .characters()
            .filter_map(|entity| {
                let state = entity.character.as_ref()?;
                Some((
                    entity.id.clone(),
                    CharacterArc {
                        emotion: state.emotion,
                        intensity: state.intensity,
                        recent_transitions: state.recent_transitions(ARC_TRANSITION_COUNT).to_vec(),
                        action: state.action.clone(),
                        position: entity.transform.position,
                    },
                ))
            })
            .collect();

        let active_conflicts = self
            .relationships
            .values()
            .filter(|rel| rel.is_active_conflict())
            .map(|rel| ConflictSummary {
                entity_a: rel.entity_a.clone(),
                entity_b: rel.entity_b.clone(),
                tension: rel.tension,
                relationship_type: rel.relationship_type.clone(),
            })
            .collect();

        ContinuityContext {
            frame_number: self.frame_number,
            character_arcs,
            camera_trajectory: window.iter().map(|s| s.camera.position).collect(),
            lighting_series: window
                .iter()
                .map(|s| LightingSample {
                    frame: s.frame_number,
                    ambient_intensity: s.lighting.ambient_intensity,
                    key_intensity: s.lighting.key_intensity,
                    saturation: s.lighting.saturation,
                })
                .collect(),
            active_conflicts,
            last_speaker: self.active_speaker.clone(),
            last_dialogue: self.last_dialogue.clone(),
            recent_audio_cues: self.recent_audio_cues(),
        }
    }
}
