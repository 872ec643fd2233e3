//! Continuity model: entities, camera, lighting, relationships and the
//! snapshot history that keeps a production consistent across shots.

pub mod camera;
pub mod context;
pub mod entity;
pub mod lighting;
pub mod relationship;
pub mod snapshot;
pub mod store;

pub use camera::{CameraMotion, CameraState, CameraTarget, CameraUpdate, DepthOfField};
pub use context::{ContinuityContext, DEFAULT_CONTEXT_LOOKBACK};
pub use entity::{
    CharacterState, Emotion, EmotionTransition, Entity, EntityKind, EntityUpdate, GazeTarget,
    Transform, Vec3,
};
pub use lighting::{LightingState, Rgb};
pub use relationship::{ConflictRelationship, PairKey, TensionChange};
pub use snapshot::{AudioCue, EnvironmentState, Snapshot};
pub use store::ContinuityStore;
