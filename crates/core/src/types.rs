/// Identifier of an entity tracked by the continuity store.
pub type EntityId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Frame counter on the production timeline.
pub type FrameNumber = u64;

/// Tolerance used when comparing segment boundaries in seconds.
pub const TIME_EPSILON: f64 = 1e-6;
