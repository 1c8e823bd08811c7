//! Error taxonomy.
//!
//! Every failure surfaced by the operation under test is classified into
//! exactly one [`ErrorKind`]. The kind decides whether the runner retries,
//! how the outcome is counted, and whether the alert side-channel fires.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Machine-readable code attached to per-attempt deadline expiry.
pub const CODE_TIMEOUT: &str = "timeout";
/// Code attached to failures that carried no classification of their own.
pub const CODE_UNCLASSIFIED: &str = "unclassified";
/// Code attached to a panic raised inside the operation.
pub const CODE_PANIC: &str = "panic";

/// The three failure classes the runner distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Input or domain rules were violated. Never retried.
    Validation,
    /// Recoverable condition (timeout, rate limit, transient I/O).
    Transient,
    /// Fatal for the request. Never retried, may raise an alert.
    System,
}

impl ErrorKind {
    /// All kinds, in breakdown order.
    pub const ALL: [ErrorKind; 3] = [ErrorKind::Validation, ErrorKind::Transient, ErrorKind::System];

    /// Whether a failure of this kind may be attempted again.
    pub const fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    /// Whether a failure of this kind is eligible for the alert side-channel.
    pub const fn is_alertable(self) -> bool {
        matches!(self, ErrorKind::System)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Transient => "transient",
            ErrorKind::System => "system",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure raised by a [`ValidatedOperation`](crate::ports::ValidatedOperation).
///
/// Immutable once constructed; the builder-style `with_code` consumes `self`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("validation failed: {message}")]
    Validation { code: Option<String>, message: String },

    #[error("transient failure: {message}")]
    Transient { code: Option<String>, message: String },

    #[error("system failure: {message}")]
    System { code: Option<String>, message: String },
}

impl OperationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            code: None,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            code: None,
            message: message.into(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            code: None,
            message: message.into(),
        }
    }

    /// Deadline expiry of a single attempt.
    pub fn timeout(limit_ms: u64) -> Self {
        Self::transient(format!("attempt exceeded {limit_ms}ms deadline")).with_code(CODE_TIMEOUT)
    }

    /// Coerce a failure that carried no classification into a system error.
    pub fn unclassified(err: impl fmt::Display) -> Self {
        Self::system(err.to_string()).with_code(CODE_UNCLASSIFIED)
    }

    /// Attach a machine-readable code.
    pub fn with_code(self, code: impl Into<String>) -> Self {
        let code = Some(code.into());
        match self {
            Self::Validation { message, .. } => Self::Validation { code, message },
            Self::Transient { message, .. } => Self::Transient { code, message },
            Self::System { message, .. } => Self::System { code, message },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::System { .. } => ErrorKind::System,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Validation { code, .. } | Self::Transient { code, .. } | Self::System { code, .. } => {
                code.as_deref()
            }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. }
            | Self::Transient { message, .. }
            | Self::System { message, .. } => message,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<io::Error> for OperationError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => Self::transient(err.to_string()).with_code(CODE_TIMEOUT),
            io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => Self::transient(err.to_string()).with_code("io"),
            _ => Self::unclassified(err),
        }
    }
}

impl From<anyhow::Error> for OperationError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<OperationError>() {
            Ok(classified) => return classified,
            Err(err) => err,
        };
        match err.downcast::<io::Error>() {
            Ok(io_err) => io_err.into(),
            Err(err) => Self::unclassified(format!("{err:#}")),
        }
    }
}

/// Failure of the alert side-channel. Always swallowed by the runner.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert channel closed")]
    Closed,

    #[error("alert delivery failed: {0}")]
    Delivery(String),
}

/// Capability registry misconfiguration. Fail-fast at setup time.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no binding registered for capability `{capability}`")]
    Unbound { capability: &'static str },

    #[error("factory for capability `{capability}` failed: {reason}")]
    Factory {
        capability: &'static str,
        reason: String,
    },
}

/// Strict configuration loading failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_each_variant_to_its_kind() {
        assert_eq!(OperationError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(OperationError::transient("x").kind(), ErrorKind::Transient);
        assert_eq!(OperationError::system("x").kind(), ErrorKind::System);
    }

    #[test]
    fn should_only_retry_transient_failures() {
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(ErrorKind::Transient.is_retryable());
        assert!(!ErrorKind::System.is_retryable());
        assert!(ErrorKind::System.is_alertable());
        assert!(!ErrorKind::Validation.is_alertable());
    }

    #[test]
    fn should_carry_timeout_code_when_deadline_expires() {
        let err = OperationError::timeout(10);
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(err.code(), Some(CODE_TIMEOUT));
        assert!(err.message().contains("10ms"));
    }

    #[test]
    fn should_keep_message_when_code_attached() {
        let err = OperationError::validation("bad email").with_code("email");
        assert_eq!(err.code(), Some("email"));
        assert_eq!(err.message(), "bad email");
        assert_eq!(err.to_string(), "validation failed: bad email");
    }

    #[test]
    fn should_classify_io_timeouts_as_transient() {
        let err: OperationError = io::Error::new(io::ErrorKind::TimedOut, "slow disk").into();
        assert_eq!(err.kind(), ErrorKind::Transient);

        let err: OperationError = io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert_eq!(err.kind(), ErrorKind::System);
        assert_eq!(err.code(), Some(CODE_UNCLASSIFIED));
    }

    #[test]
    fn should_coerce_unknown_anyhow_errors_to_system() {
        let err: OperationError = anyhow::anyhow!("kaboom").into();
        assert_eq!(err.kind(), ErrorKind::System);
        assert_eq!(err.code(), Some(CODE_UNCLASSIFIED));
    }

    #[test]
    fn should_preserve_classification_wrapped_in_anyhow() {
        let wrapped = anyhow::Error::new(OperationError::transient("rate limited"));
        let err: OperationError = wrapped.into();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn should_serialize_kind_in_lowercase() {
        let json = serde_json::to_string(&ErrorKind::Transient).unwrap();
        assert_eq!(json, "\"transient\"");
    }
}
