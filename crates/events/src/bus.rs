//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`ProductionEvent`]s.
//! It is designed to be shared via `Arc<EventBus>` between the
//! orchestrator and whatever reports progress to a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Coarse phase of a production run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionStage {
    Preparing,
    Generating,
    Finalizing,
    Complete,
    Cancelled,
}

impl ProductionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Generating => "generating",
            Self::Finalizing => "finalizing",
            Self::Complete => "complete",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Progress counters emitted after every finished segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub total_segments: usize,
    /// Segments that were generated or skipped.
    pub completed_segments: usize,
    pub current_stage: ProductionStage,
    pub errors: Vec<String>,
}

impl ProgressReport {
    pub fn new(total_segments: usize) -> Self {
        Self {
            total_segments,
            completed_segments: 0,
            current_stage: ProductionStage::Preparing,
            errors: Vec::new(),
        }
    }

    /// Completion in `[0, 1]`; an empty production counts as complete.
    pub fn fraction(&self) -> f64 {
        if self.total_segments == 0 {
            return 1.0;
        }
        (self.completed_segments as f64 / self.total_segments as f64).min(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ProductionEventKind {
    StageChanged {
        stage: ProductionStage,
    },
    Progress(ProgressReport),
    SegmentSkipped {
        shot_id: String,
        segment_id: String,
        error: String,
    },
    ShotCommitted {
        shot_id: String,
        frame_number: u64,
    },
}

// ---------------------------------------------------------------------------
// ProductionEvent
// ---------------------------------------------------------------------------

/// Something that happened during a production run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionEvent {
    pub production_id: Uuid,
    pub kind: ProductionEventKind,
    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl ProductionEvent {
    pub fn new(production_id: Uuid, kind: ProductionEventKind) -> Self {
        Self {
            production_id,
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn stage(production_id: Uuid, stage: ProductionStage) -> Self {
        Self::new(production_id, ProductionEventKind::StageChanged { stage })
    }

    pub fn progress(production_id: Uuid, report: ProgressReport) -> Self {
        Self::new(production_id, ProductionEventKind::Progress(report))
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`ProductionEvent`].
///
/// # Usage
///
/// ```rust
/// use montage_events::bus::{EventBus, ProductionEvent, ProductionStage};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(ProductionEvent::stage(uuid::Uuid::new_v4(), ProductionStage::Preparing));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<ProductionEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: ProductionEvent) {
        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<ProductionEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
