//! Stand-in operations for driving the harness without a real target.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::OperationError;
use crate::ports::{RandomSource, ValidatedOperation, Verdict};

/// One scripted response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Pass,
    /// Return `Verdict::Fail` with this reason.
    Reject(String),
    /// Fail with this classified error.
    Raise(OperationError),
    /// Panic with this message.
    Panic(String),
}

/// Decrements the in-flight gauge even when the attempt is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Deterministic operation driven by a per-attempt script.
///
/// The n-th attempt of a given request id answers with `script[n - 1]`,
/// clamped to the last step, so the outcome does not depend on how
/// concurrent requests interleave. An empty script always passes.
#[derive(Debug)]
pub struct ScriptedValidator {
    script: Vec<Step>,
    latency: Duration,
    total_attempts: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    per_request: Mutex<HashMap<String, u32>>,
}

impl ScriptedValidator {
    pub fn new(script: impl Into<Vec<Step>>) -> Self {
        Self {
            script: script.into(),
            latency: Duration::ZERO,
            total_attempts: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            per_request: Mutex::new(HashMap::new()),
        }
    }

    /// Answer every attempt with the same step.
    pub fn always(step: Step) -> Self {
        Self::new(vec![step])
    }

    pub fn always_pass() -> Self {
        Self::always(Step::Pass)
    }

    /// Simulated service time per attempt.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn total_attempts(&self) -> u64 {
        self.total_attempts.load(Ordering::SeqCst)
    }

    /// Attempts made for one request id since the last reset.
    pub fn attempts_for(&self, request_id: &str) -> u32 {
        self.per_request.lock().get(request_id).copied().unwrap_or(0)
    }

    /// Distinct request ids seen since the last reset.
    pub fn requests_seen(&self) -> usize {
        self.per_request.lock().len()
    }

    /// Highest number of attempts observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn step_for(&self, attempt: u32) -> Step {
        let index = (attempt.max(1) - 1) as usize;
        self.script
            .get(index)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or(Step::Pass)
    }
}

#[async_trait]
impl ValidatedOperation for ScriptedValidator {
    async fn attempt(&self, request_id: &str, _payload: &Value) -> Result<Verdict, OperationError> {
        let attempt = {
            let mut per_request = self.per_request.lock();
            let count = per_request.entry(request_id.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        self.total_attempts.fetch_add(1, Ordering::SeqCst);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.step_for(attempt) {
            Step::Pass => Ok(Verdict::Pass),
            Step::Reject(reason) => Ok(Verdict::Fail { reason }),
            Step::Raise(err) => Err(err),
            Step::Panic(message) => panic!("{message}"),
        }
    }

    fn reset_counters(&self) {
        self.total_attempts.store(0, Ordering::SeqCst);
        self.peak_in_flight.store(0, Ordering::SeqCst);
        self.per_request.lock().clear();
    }
}

/// Latency range and failure mix for [`SimulatedValidator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationProfile {
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub validation_rate: f64,
    pub transient_rate: f64,
    pub system_rate: f64,
}

impl SimulationProfile {
    /// Never fails.
    pub const fn healthy() -> Self {
        Self {
            min_latency_ms: 1,
            max_latency_ms: 3,
            validation_rate: 0.0,
            transient_rate: 0.0,
            system_rate: 0.0,
        }
    }

    /// Occasional bad input and rate limiting.
    pub const fn integration() -> Self {
        Self {
            min_latency_ms: 1,
            max_latency_ms: 3,
            validation_rate: 0.01,
            transient_rate: 0.02,
            system_rate: 0.0,
        }
    }

    /// Wider latency spread and a trickle of fatal errors.
    pub const fn stress() -> Self {
        Self {
            min_latency_ms: 1,
            max_latency_ms: 5,
            validation_rate: 0.01,
            transient_rate: 0.02,
            system_rate: 0.001,
        }
    }
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self::healthy()
    }
}

/// Randomized operation: latency and failures are drawn from a [`RandomSource`].
pub struct SimulatedValidator {
    profile: SimulationProfile,
    random: Arc<dyn RandomSource>,
    attempts: AtomicU64,
}

impl SimulatedValidator {
    pub fn new(profile: SimulationProfile, random: Arc<dyn RandomSource>) -> Self {
        Self {
            profile,
            random,
            attempts: AtomicU64::new(0),
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SimulatedValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedValidator")
            .field("profile", &self.profile)
            .field("attempts", &self.attempts())
            .finish()
    }
}

#[async_trait]
impl ValidatedOperation for SimulatedValidator {
    async fn attempt(&self, _request_id: &str, _payload: &Value) -> Result<Verdict, OperationError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);

        let p = &self.profile;
        let latency_ms = self
            .random
            .int_in_range(p.min_latency_ms as i64, p.max_latency_ms as i64)
            .max(0) as u64;
        if latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        }

        let roll = self.random.uniform01();
        let validation = p.validation_rate;
        let transient = validation + p.transient_rate;
        let system = transient + p.system_rate;
        if roll < validation {
            Err(OperationError::validation("simulated rule violation").with_code("simulated"))
        } else if roll < transient {
            Err(OperationError::transient("simulated rate limit").with_code("rate_limited"))
        } else if roll < system {
            Err(OperationError::system("simulated backend outage").with_code("outage"))
        } else {
            Ok(Verdict::Pass)
        }
    }

    fn reset_counters(&self) {
        self.attempts.store(0, Ordering::Relaxed);
    }
}
