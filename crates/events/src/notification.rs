//! Notification envelope.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use vigil_core::types::Timestamp;

// ---------------------------------------------------------------------------
// Event tags
// ---------------------------------------------------------------------------

pub const EVENT_REPORT_CREATED: &str = "report_created";
pub const EVENT_REPORT_COMPLETED: &str = "report_completed";
pub const EVENT_REPORT_FAILED: &str = "report_failed";
pub const EVENT_CRITICAL_VULNERABILITIES: &str = "critical_vulnerabilities";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    ReportCreated,
    ReportCompleted,
    ReportFailed,
    CriticalVulnerabilities,
}

impl NotificationEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReportCreated => EVENT_REPORT_CREATED,
            Self::ReportCompleted => EVENT_REPORT_COMPLETED,
            Self::ReportFailed => EVENT_REPORT_FAILED,
            Self::CriticalVulnerabilities => EVENT_CRITICAL_VULNERABILITIES,
        }
    }

    /// Priority used when the sender does not pick one.
    pub fn default_priority(self) -> Priority {
        match self {
            Self::ReportCreated => Priority::Low,
            Self::ReportCompleted => Priority::Normal,
            Self::ReportFailed => Priority::High,
            Self::CriticalVulnerabilities => Priority::Critical,
        }
    }
}

impl std::fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// One notification request.
///
/// The payload is flat: every value is a scalar or a short list so that
/// any transport can render it as key/value lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event: NotificationEvent,
    pub payload: BTreeMap<String, serde_json::Value>,
    pub priority: Priority,
    /// Explicit recipient. Channels fall back to their default when unset.
    pub recipient: Option<String>,
    pub timestamp: Timestamp,
}

impl Notification {
    /// Create a notification with the event's default priority and an
    /// empty payload.
    pub fn new(event: NotificationEvent) -> Self {
        Self {
            event,
            payload: BTreeMap::new(),
            priority: event.default_priority(),
            recipient: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the recipient. Blank addresses are ignored.
    pub fn with_recipient(mut self, recipient: Option<impl Into<String>>) -> Self {
        self.recipient = recipient
            .map(Into::into)
            .filter(|r: &String| !r.trim().is_empty());
        self
    }

    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.payload.get(key)
    }

    /// Human-readable subject line.
    pub fn subject(&self) -> String {
        match self.payload.get("title").and_then(|t| t.as_str()) {
            Some(title) => format!("[Vigil] {}: {}", self.event, title),
            None => format!("[Vigil] {}", self.event),
        }
    }
}
