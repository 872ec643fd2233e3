#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Invalid duration config: {0}")]
    InvalidDurationConfig(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
