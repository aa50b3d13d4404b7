//! Publisher status reporting.
//!
//! - [`PublisherStatus`] is the snapshot handed to the UI collaborator
//! - [`StatusTracker`] owns the live status and pushes every change to
//!   subscribers through a `watch` channel
//! - [`StatusReport`] is the JSON envelope logged on startup and shutdown

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Publisher lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherState {
    /// No socket; nothing is sent.
    #[default]
    Stopped,
    /// Binding the socket.
    Starting,
    /// Socket bound; frames are sent.
    Running,
    /// A fatal error occurred; a fresh start is required.
    Error,
}

impl std::fmt::Display for PublisherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublisherState::Stopped => write!(f, "stopped"),
            PublisherState::Starting => write!(f, "starting"),
            PublisherState::Running => write!(f, "running"),
            PublisherState::Error => write!(f, "error"),
        }
    }
}

/// Status snapshot for display and serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherStatus {
    /// Current lifecycle state.
    pub state: PublisherState,
    /// Human-readable reason of the most recent failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Frames handed to the OS successfully.
    pub frames_sent: u64,
    /// Sends that failed or timed out.
    pub send_failures: u64,
    /// Frames dropped before sending (e.g. too large).
    pub frames_dropped: u64,
    /// Schedule deadlines dropped after an overrun, plus guard rejections.
    pub ticks_skipped: u64,
    /// Wall-clock time of the last successful send (millis since epoch).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_send_timestamp: Option<i64>,
    /// Bound local address while running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_addr: Option<String>,
    /// Current destination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl PublisherStatus {
    /// Whether the publisher is sending.
    pub fn is_running(&self) -> bool {
        self.state == PublisherState::Running
    }
}

/// Shared, observable publisher status.
///
/// Cloning yields another handle to the same status.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    tx: Arc<watch::Sender<PublisherStatus>>,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTracker {
    /// Create a tracker in the `Stopped` state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PublisherStatus::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current status.
    pub fn status(&self) -> PublisherStatus {
        self.tx.borrow().clone()
    }

    /// Current state.
    pub fn state(&self) -> PublisherState {
        self.tx.borrow().state
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> watch::Receiver<PublisherStatus> {
        self.tx.subscribe()
    }

    /// Move to a new state, keeping the last error.
    pub fn set_state(&self, state: PublisherState) {
        self.tx.send_if_modified(|status| {
            if status.state == state {
                return false;
            }
            status.state = state;
            true
        });
    }

    /// Move to a new state and record why.
    pub fn fail(&self, state: PublisherState, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_modify(|status| {
            status.state = state;
            status.last_error = Some(reason);
        });
    }

    /// Record the socket endpoints, or clear them with `None`.
    pub fn set_endpoints(&self, local_addr: Option<String>, destination: Option<String>) {
        self.tx.send_modify(|status| {
            status.local_addr = local_addr;
            status.destination = destination;
        });
    }

    /// Record the destination only.
    pub fn set_destination(&self, destination: impl Into<String>) {
        let destination = destination.into();
        self.tx.send_modify(|status| status.destination = Some(destination));
    }

    /// Record a successful send.
    pub fn record_sent(&self) {
        let now = chrono::Utc::now().timestamp_millis();
        self.tx.send_modify(|status| {
            status.frames_sent += 1;
            status.last_send_timestamp = Some(now);
        });
    }

    /// Record a failed send.
    pub fn record_send_failure(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_modify(|status| {
            status.send_failures += 1;
            status.last_error = Some(reason);
        });
    }

    /// Record a frame dropped before sending.
    pub fn record_dropped(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_modify(|status| {
            status.frames_dropped += 1;
            status.last_error = Some(reason);
        });
    }

    /// Record skipped ticks.
    pub fn record_skipped(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.tx.send_modify(|status| status.ticks_skipped += count);
    }
}

/// Service status envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    /// Service name (e.g., "sensorcast").
    pub service: String,
    /// Service version.
    pub version: String,
    /// Current status ("running", "stopped", "error", ...).
    pub status: String,
    /// Additional metadata.
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl StatusReport {
    /// Build a report from a publisher status.
    pub fn from_status(
        service: impl Into<String>,
        version: impl Into<String>,
        status: &PublisherStatus,
    ) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            status: status.state.to_string(),
            metadata: serde_json::json!({
                "frames_sent": status.frames_sent,
                "send_failures": status.send_failures,
                "frames_dropped": status.frames_dropped,
                "ticks_skipped": status.ticks_skipped,
                "error": status.last_error,
            }),
        }
    }

    /// Create a report in "offline" state.
    pub fn offline(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            status: "offline".to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Render as a single JSON line.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
