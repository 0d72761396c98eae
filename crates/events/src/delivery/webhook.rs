//! Webhook delivery with exponential-backoff retry.
//!
//! [`WebhookDelivery`] POSTs a JSON-encoded [`Notification`] to an external
//! URL. Failed attempts are retried with backoff (1 s, 2 s, 4 s) before a
//! final attempt.

use std::time::Duration;

use crate::notification::Notification;

/// Retry delays in seconds.
const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

/// JSON body sent to webhook endpoints.
pub fn webhook_payload(notification: &Notification) -> serde_json::Value {
    serde_json::json!({
        "event": notification.event,
        "priority": notification.priority,
        "payload": notification.payload,
        "recipient": notification.recipient,
        "timestamp": notification.timestamp,
    })
}

// ---------------------------------------------------------------------------
// WebhookDelivery
// ---------------------------------------------------------------------------

pub struct WebhookDelivery {
    client: reqwest::Client,
    retry_delays: Vec<Duration>,
}

impl WebhookDelivery {
    /// Create a delivery service with a pre-configured HTTP client.
    pub fn new() -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            retry_delays: RETRY_DELAYS_SECS.iter().map(|s| Duration::from_secs(*s)).collect(),
        })
    }

    /// Replace the backoff schedule.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Deliver a notification to `url`, retrying on failure.
    ///
    /// Returns `Ok(())` on the first successful attempt.
    pub async fn deliver(&self, url: &str, notification: &Notification) -> Result<(), WebhookError> {
        let payload = webhook_payload(notification);

        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            match self.try_send(url, &payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url,
                        error = %e,
                        "Webhook delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        // Final attempt after the last backoff.
        self.try_send(url, &payload).await.map_err(|e| {
            tracing::error!(url, error = %e, "Webhook delivery failed after all retries");
            e
        })
    }

    async fn try_send(&self, url: &str, payload: &serde_json::Value) -> Result<(), WebhookError> {
        let response = self.client.post(url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{NotificationEvent, Priority};
    use assert_matches::assert_matches;

    #[test]
    fn new_builds_client() {
        assert!(WebhookDelivery::new().is_ok());
    }

    #[test]
    fn payload_shape() {
        let n = Notification::new(NotificationEvent::CriticalVulnerabilities)
            .with_field("critical_count", 3);
        let json = webhook_payload(&n);
        assert_eq!(json["event"], "critical_vulnerabilities");
        assert_eq!(json["priority"], serde_json::to_value(Priority::Critical).unwrap());
        assert_eq!(json["payload"]["critical_count"], 3);
    }

    #[test]
    fn webhook_error_display_http_status() {
        let err = WebhookError::HttpStatus(502);
        assert_eq!(err.to_string(), "Webhook returned HTTP 502");
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_without_retry_delays() {
        let delivery = WebhookDelivery::new().unwrap().with_retry_delays(Vec::new());
        let n = Notification::new(NotificationEvent::ReportCompleted);
        let result = delivery.deliver("http://127.0.0.1:1/hook", &n).await;
        assert_matches!(result, Err(WebhookError::Request(_)));
    }
}
