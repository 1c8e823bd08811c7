//! Port for the operation under test.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OperationError;

/// Result of a completed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Verdict {
    /// The request was accepted.
    Pass,
    /// The request was rejected without raising; counted as a validation failure.
    Fail { reason: String },
}

impl Verdict {
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// The single capability the harness drives.
///
/// The runner never inspects what is validated; it only needs a verdict or a
/// classified [`OperationError`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ValidatedOperation: Send + Sync {
    /// Attempt one request.
    async fn attempt(&self, request_id: &str, payload: &Value) -> Result<Verdict, OperationError>;

    /// Clear any internal counters, for isolation between scenarios.
    fn reset_counters(&self);
}
