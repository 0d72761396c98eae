use crate::delivery::email::EmailError;
use crate::delivery::webhook::WebhookError;

/// Error type for notification dispatch.
///
/// Callers log these and move on; a notification outcome never changes
/// report state.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),
}
