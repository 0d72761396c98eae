//! The notification contract consumed by the pipeline.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::{BusEvent, EventBus};
use crate::error::NotifyError;
use crate::notification::Notification;

/// Accepts notification requests. Delivery outcome never flows back into
/// report state; callers only log a returned error.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Publishes notifications onto the [`EventBus`], where a
/// [`NotificationRouter`](crate::NotificationRouter) delivers them.
pub struct BusNotifier {
    bus: Arc<EventBus>,
}

impl BusNotifier {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl NotificationService for BusNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let receivers = self.bus.publish(BusEvent::Notification(notification.clone()));
        if receivers == 0 {
            return Err(NotifyError::Unavailable(format!(
                "no subscriber for {} notification",
                notification.event
            )));
        }
        tracing::debug!(event = %notification.event, receivers, "Notification published");
        Ok(())
    }
}
