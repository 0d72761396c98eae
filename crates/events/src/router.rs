//! Notification routing engine.
//!
//! [`NotificationRouter`] subscribes to the event bus and delivers each
//! notification through the configured external channels:
//!
//! - **Email** goes to the notification's recipient, or to the default
//!   recipient when none is set. Low-priority notifications without an
//!   explicit recipient skip email.
//! - **Webhook** receives every notification.
//! - **Critical** notifications go to every configured channel, and by email
//!   to both the explicit and the default recipient.
//!
//! Lifecycle events on the bus are ignored here.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::BusEvent;
use crate::delivery::email::EmailDelivery;
use crate::delivery::webhook::WebhookDelivery;
use crate::error::NotifyError;
use crate::notification::{Notification, Priority};

/// One planned delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Email(String),
    Webhook(String),
}

#[derive(Default)]
pub struct NotificationRouter {
    email: Option<EmailDelivery>,
    default_recipient: Option<String>,
    webhook: Option<(WebhookDelivery, String)>,
}

impl NotificationRouter {
    /// A router with no channels; add them with the `with_*` builders.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email(mut self, delivery: EmailDelivery, default_recipient: Option<String>) -> Self {
        self.email = Some(delivery);
        self.default_recipient = default_recipient.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn with_webhook(mut self, delivery: WebhookDelivery, url: impl Into<String>) -> Self {
        self.webhook = Some((delivery, url.into()));
        self
    }

    pub fn has_channels(&self) -> bool {
        self.email.is_some() || self.webhook.is_some()
    }

    /// Decide where `notification` goes.
    pub fn plan(&self, notification: &Notification) -> Vec<Delivery> {
        let mut deliveries = Vec::new();

        if self.email.is_some() {
            let explicit = notification.recipient.as_ref();
            let fallback = self.default_recipient.as_ref();

            let recipients: Vec<&String> = match notification.priority {
                Priority::Critical => explicit.into_iter().chain(fallback).collect(),
                Priority::Low => explicit.into_iter().collect(),
                Priority::Normal | Priority::High => explicit.or(fallback).into_iter().collect(),
            };

            for recipient in recipients {
                let delivery = Delivery::Email(recipient.clone());
                if !deliveries.contains(&delivery) {
                    deliveries.push(delivery);
                }
            }
        }

        if let Some((_, url)) = &self.webhook {
            deliveries.push(Delivery::Webhook(url.clone()));
        }

        deliveries
    }

    /// Deliver one notification. Returns how many deliveries succeeded;
    /// failures are logged.
    pub async fn route(&self, notification: &Notification) -> usize {
        let mut delivered = 0;

        for delivery in self.plan(notification) {
            let result: Result<(), NotifyError> = match &delivery {
                Delivery::Email(to) => match &self.email {
                    Some(email) => email.deliver(to, notification).await.map_err(Into::into),
                    None => continue,
                },
                Delivery::Webhook(url) => match &self.webhook {
                    Some((webhook, _)) => webhook.deliver(url, notification).await.map_err(Into::into),
                    None => continue,
                },
            };

            match result {
                Ok(()) => delivered += 1,
                Err(e) => tracing::error!(
                    event = %notification.event,
                    delivery = ?delivery,
                    error = %e,
                    "Notification delivery failed"
                ),
            }
        }

        delivered
    }

    /// Run the routing loop until the bus closes or `cancel` fires.
    pub async fn run(self, mut receiver: broadcast::Receiver<BusEvent>, cancel: CancellationToken) {
        tracing::info!(
            email = self.email.is_some(),
            webhook = self.webhook.is_some(),
            "Notification router started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Notification router stopping (cancelled)");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(BusEvent::Notification(notification)) => {
                        self.route(&notification).await;
                    }
                    Ok(BusEvent::Lifecycle(_)) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Notification router lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, notification router shutting down");
                        break;
                    }
                },
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
