//! Alert side-channel port.

#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::AlertError;

/// Notification raised when a request ends in a system failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub scenario: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    /// Attempt (1-based) on which the failure occurred.
    pub attempt: u32,
}

/// Fire-and-forget notification channel.
///
/// The runner calls `notify` on tokio's blocking pool, off the request path,
/// and waits for outstanding deliveries only once a scenario has finished.
/// Its result is only logged and never influences the outcome of a run.
#[cfg_attr(test, automock)]
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &Alert) -> Result<(), AlertError>;
}
