//! Dramatic tension between pairs of entities.

use serde::{Deserialize, Serialize};

use crate::types::{EntityId, FrameNumber};

/// Relationships with |tension| above this are reported as active conflicts.
pub const ACTIVE_CONFLICT_THRESHOLD: f64 = 0.3;

/// Default threshold for [`crate::continuity::ContinuityStore::dramatic_peaks`].
pub const DEFAULT_DRAMATIC_PEAK_THRESHOLD: f64 = 0.7;

/// Order-independent key for a pair of entities.
///
/// `(a, b)` and `(b, a)` produce the same key, so at most one relationship
/// exists per unordered pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey(pub EntityId, pub EntityId);

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            PairKey(a.to_string(), b.to_string())
        } else {
            PairKey(b.to_string(), a.to_string())
        }
    }
}

/// One recorded tension change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TensionChange {
    pub frame: FrameNumber,
    /// `None` for the entry that created the relationship.
    pub previous: Option<f64>,
    pub tension: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRelationship {
    pub entity_a: EntityId,
    pub entity_b: EntityId,
    /// -1 (hostile) to 1 (allied).
    pub tension: f64,
    pub relationship_type: String,
    pub history: Vec<TensionChange>,
}

impl ConflictRelationship {
    pub(crate) fn new(
        key: &PairKey,
        tension: f64,
        relationship_type: String,
        frame: FrameNumber,
    ) -> Self {
        Self {
            entity_a: key.0.clone(),
            entity_b: key.1.clone(),
            tension,
            relationship_type,
            history: vec![TensionChange {
                frame,
                previous: None,
                tension,
            }],
        }
    }

    pub(crate) fn update(&mut self, tension: f64, relationship_type: String, frame: FrameNumber) {
        self.history.push(TensionChange {
            frame,
            previous: Some(self.tension),
            tension,
        });
        self.tension = tension;
        self.relationship_type = relationship_type;
    }

    pub fn key(&self) -> PairKey {
        PairKey(self.entity_a.clone(), self.entity_b.clone())
    }

    pub fn involves(&self, id: &str) -> bool {
        self.entity_a == id || self.entity_b == id
    }

    pub fn is_active_conflict(&self) -> bool {
        self.tension.abs() > ACTIVE_CONFLICT_THRESHOLD
    }
}
