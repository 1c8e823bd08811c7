//! Clock adapters.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::ports::Clock;

/// Real clock.
///
/// The monotonic reading follows tokio's clock, so a runtime with paused
/// time (`tokio::time::pause`) measures virtual latencies.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic_seconds(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock; time moves only through [`ManualClock::advance`].
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<(DateTime<Utc>, f64)>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new((start, 0.0)),
        }
    }

    /// Move both readings forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.0 += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        state.1 += by.as_secs_f64();
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().0
    }

    fn monotonic_seconds(&self) -> f64 {
        self.state.lock().1
    }
}
