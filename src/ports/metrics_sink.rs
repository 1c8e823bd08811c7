//! Metrics sink port.

#[cfg(test)]
use mockall::automock;

use crate::error::ErrorKind;
use crate::result::Summary;

/// Collector of per-request outcomes.
///
/// Latencies are in seconds. Implementations must tolerate concurrent
/// callers; `snapshot` returns a detached, immutable view.
#[cfg_attr(test, automock)]
pub trait MetricsSink: Send + Sync {
    fn record_success(&self, latency: f64);

    fn record_failure(&self, latency: f64, kind: ErrorKind);

    /// Mark the start of the measured window.
    fn start_timing(&self);

    /// Mark the end of the measured window.
    fn stop_timing(&self);

    fn snapshot(&self) -> Summary;

    /// Drop all recorded outcomes and timing marks.
    fn reset(&self);
}
