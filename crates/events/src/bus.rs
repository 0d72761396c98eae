//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`BusEvent`]s. It is
//! shared via `Arc<EventBus>` between the pipeline (publisher) and the
//! notification router or any other observer (subscribers).

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use vigil_core::status::ReportStatus;
use vigil_core::types::{DbId, Timestamp};

use crate::notification::Notification;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A report moved to a new lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleEvent {
    pub report_id: DbId,
    pub status: ReportStatus,
    pub progress: u8,
    pub timestamp: Timestamp,
}

impl LifecycleEvent {
    pub fn new(report_id: DbId, status: ReportStatus) -> Self {
        Self {
            report_id,
            status,
            progress: status.progress(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusEvent {
    Notification(Notification),
    Lifecycle(LifecycleEvent),
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use vigil_events::bus::{EventBus, LifecycleEvent};
/// use vigil_core::status::ReportStatus;
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish_lifecycle(LifecycleEvent::new(1, ReportStatus::Generating));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers and return how many received it.
    ///
    /// With no subscribers the event is dropped and `0` is returned.
    pub fn publish(&self, event: BusEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn publish_lifecycle(&self, event: LifecycleEvent) -> usize {
        self.publish(BusEvent::Lifecycle(event))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
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
