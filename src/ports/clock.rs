//! Time source port.

use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;

/// Pluggable time source.
///
/// `monotonic_seconds` is the only reading used for latency and duration
/// measurement; `now` is for timestamps in reports.
#[cfg_attr(test, automock)]
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Seconds elapsed on a monotonic timeline with an arbitrary origin.
    fn monotonic_seconds(&self) -> f64;
}
