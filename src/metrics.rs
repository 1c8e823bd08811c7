//! In-memory metrics aggregator.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ErrorKind;
use crate::ports::{Clock, MetricsSink};
use crate::result::Summary;

/// Below this many samples p95 is the maximum observed latency.
pub const P95_MIN_SAMPLES: usize = 20;

/// Quantile count of the percentile split.
const QUANTILES: usize = 20;
/// 1-based cut point of the split taken as p95.
const P95_CUT: usize = 19;

#[derive(Debug, Default)]
struct MetricsState {
    successes: u64,
    failures: u64,
    error_breakdown: BTreeMap<ErrorKind, u64>,
    latencies: Vec<f64>,
    started_at: Option<f64>,
    stopped_at: Option<f64>,
}

/// Outcome accumulator guarded by a single lock.
///
/// One instance serves one scenario run at a time; [`MetricsSink::reset`]
/// clears it between runs.
pub struct InMemoryMetrics {
    clock: Arc<dyn Clock>,
    state: Mutex<MetricsState>,
}

impl InMemoryMetrics {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(MetricsState::default()),
        }
    }

    /// Recorded latencies in arrival order.
    pub fn latencies(&self) -> Vec<f64> {
        self.state.lock().latencies.clone()
    }
}

impl fmt::Debug for InMemoryMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InMemoryMetrics")
            .field("successes", &state.successes)
            .field("failures", &state.failures)
            .field("samples", &state.latencies.len())
            .finish()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_success(&self, latency: f64) {
        let mut state = self.state.lock();
        state.successes += 1;
        state.latencies.push(latency);
    }

    fn record_failure(&self, latency: f64, kind: ErrorKind) {
        let mut state = self.state.lock();
        state.failures += 1;
        *state.error_breakdown.entry(kind).or_insert(0) += 1;
        state.latencies.push(latency);
    }

    fn start_timing(&self) {
        let now = self.clock.monotonic_seconds();
        let mut state = self.state.lock();
        state.started_at = Some(now);
        state.stopped_at = None;
    }

    fn stop_timing(&self) {
        let now = self.clock.monotonic_seconds();
        self.state.lock().stopped_at = Some(now);
    }

    fn snapshot(&self) -> Summary {
        let now = self.clock.monotonic_seconds();
        let state = self.state.lock();

        let total = state.successes + state.failures;
        if total == 0 {
            return Summary {
                duration_seconds: duration(&state, now),
                ..Summary::empty()
            };
        }

        let validation = state
            .error_breakdown
            .get(&ErrorKind::Validation)
            .copied()
            .unwrap_or(0);
        let available = total - validation;
        let availability_success_rate = if available > 0 {
            state.successes as f64 / available as f64
        } else {
            1.0
        };

        let duration_seconds = duration(&state, now);
        let requests_per_second = if duration_seconds > 0.0 {
            total as f64 / duration_seconds
        } else {
            0.0
        };

        Summary {
            total,
            successes: state.successes,
            failures: state.failures,
            success_rate: state.successes as f64 / total as f64,
            availability_success_rate,
            p95_latency: p95(&state.latencies),
            duration_seconds,
            requests_per_second,
            error_breakdown: state.error_breakdown.clone(),
        }
    }

    fn reset(&self) {
        *self.state.lock() = MetricsState::default();
    }
}

/// Length of the timing window. An open window is measured up to `now`.
fn duration(state: &MetricsState, now: f64) -> f64 {
    match state.started_at {
        Some(start) => (state.stopped_at.unwrap_or(now) - start).max(0.0),
        None => 0.0,
    }
}

/// 95th percentile of `samples`.
///
/// Fewer than [`P95_MIN_SAMPLES`] samples yield the maximum. Otherwise the
/// sorted data is split into 20 quantiles with the exclusive method and the
/// 19th cut point is returned.
pub fn p95(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    if samples.len() < P95_MIN_SAMPLES {
        return samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    }

    let mut data = samples.to_vec();
    data.sort_by(|a, b| a.total_cmp(b));

    let len = data.len();
    let m = len + 1;
    let j = (P95_CUT * m / QUANTILES).clamp(1, len - 1);
    let delta = (P95_CUT * m - j * QUANTILES) as f64;
    let n = QUANTILES as f64;
    (data[j - 1] * (n - delta) + data[j] * delta) / n
}
