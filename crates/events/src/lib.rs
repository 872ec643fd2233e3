//! Montage event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`ProductionEvent`]: the envelope for stage changes, progress
//!   reports, committed shots and skipped segments.

pub mod bus;

pub use bus::{EventBus, ProductionEvent, ProductionEventKind, ProductionStage, ProgressReport};
