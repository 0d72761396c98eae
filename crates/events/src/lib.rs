//! Vigil notifications and in-process events.
//!
//! - [`Notification`]: the event tag, flattened payload, priority and
//!   optional recipient handed to a [`NotificationService`].
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, carrying notifications and report
//!   lifecycle transitions.
//! - [`BusNotifier`]: the [`NotificationService`] that publishes onto the bus.
//! - [`NotificationRouter`]: bus subscriber delivering notifications through
//!   the external channels in [`delivery`] (email, webhook).

pub mod bus;
pub mod delivery;
pub mod error;
pub mod notification;
pub mod notifier;
pub mod router;

pub use bus::{BusEvent, EventBus, LifecycleEvent};
pub use delivery::email::{EmailConfig, EmailDelivery};
pub use delivery::webhook::WebhookDelivery;
pub use error::NotifyError;
pub use notification::{Notification, NotificationEvent, Priority};
pub use notifier::{BusNotifier, NotificationService};
pub use router::{Delivery, NotificationRouter};
