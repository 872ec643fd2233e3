//! Domain logic for multi-shot video production: the continuity model,
//! shot plans, segmentation and the retry policy. Nothing here performs I/O.

pub mod continuity;
pub mod error;
pub mod retry;
pub mod segmentation;
pub mod shot_plan;
pub mod threshold_validation;
pub mod timing;
pub mod types;
