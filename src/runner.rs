//! Bounded-concurrency runner with per-attempt deadlines and retry.
//!
//! Every logical request walks the same state machine:
//!
//! ```text
//! Pending -> Attempting -> Succeeded
//!                       -> RetryWait -> Attempting
//!                       -> FailedValidation | FailedTransient | FailedSystem
//! ```
//!
//! Exactly one outcome is recorded per request, whatever the number of
//! attempts. Per-request failures never abort sibling requests and never
//! surface to the caller.

use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::error::{ErrorKind, OperationError, RegistryError, CODE_PANIC};
use crate::ports::{Alert, AlertSink, Clock, MetricsSink, RandomSource, ValidatedOperation, Verdict};
use crate::registry::Registry;
use crate::result::{Outcome, OutcomeKind, Summary};

/// Builds the payload sent with request `index` of a scenario.
pub type PayloadBuilder = Arc<dyn Fn(&str, usize) -> Value + Send + Sync>;

/// `{"scenario": name, "index": i}`
pub fn default_payload(scenario: &str, index: usize) -> Value {
    json!({ "scenario": scenario, "index": index })
}

/// Drives scenarios against a [`ValidatedOperation`].
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct RunnerEngine {
    config: Arc<RunnerConfig>,
    validator: Arc<dyn ValidatedOperation>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    metrics: Arc<dyn MetricsSink>,
    alerts: Option<Arc<dyn AlertSink>>,
    alert_tasks: Arc<Mutex<JoinSet<()>>>,
    payload: PayloadBuilder,
}

impl RunnerEngine {
    pub fn new(
        config: RunnerConfig,
        validator: Arc<dyn ValidatedOperation>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            validator,
            clock,
            random,
            metrics,
            alerts: None,
            alert_tasks: Arc::new(Mutex::new(JoinSet::new())),
            payload: Arc::new(default_payload),
        }
    }

    /// Resolve every collaborator from `registry`.
    ///
    /// The alert sink is optional; the other four capabilities must be bound.
    pub fn from_registry(registry: &Registry, config: RunnerConfig) -> Result<Self, RegistryError> {
        let engine = Self::new(
            config,
            registry.resolve::<dyn ValidatedOperation>()?,
            registry.resolve::<dyn Clock>()?,
            registry.resolve::<dyn RandomSource>()?,
            registry.resolve::<dyn MetricsSink>()?,
        );
        Ok(match registry.resolve_optional::<dyn AlertSink>()? {
            Some(sink) => engine.with_alerts(sink),
            None => engine,
        })
    }

    /// Attach the alert side-channel.
    pub fn with_alerts(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(sink);
        self
    }

    /// Replace the payload builder.
    pub fn with_payload<F>(mut self, builder: F) -> Self
    where
        F: Fn(&str, usize) -> Value + Send + Sync + 'static,
    {
        self.payload = Arc::new(builder);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn validator(&self) -> &Arc<dyn ValidatedOperation> {
        &self.validator
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run `request_count` requests with at most `max_concurrent` in flight.
    ///
    /// Resets the metrics sink first. Always returns a summary.
    pub async fn run_scenario(&self, name: &str, request_count: usize, max_concurrent: usize) -> Summary {
        self.run_scenario_with_outcomes(name, request_count, max_concurrent)
            .await
            .0
    }

    /// Like [`run_scenario`](Self::run_scenario), also returning one
    /// outcome per request, ordered by request index.
    pub async fn run_scenario_with_outcomes(
        &self,
        name: &str,
        request_count: usize,
        max_concurrent: usize,
    ) -> (Summary, Vec<Outcome>) {
        let max_concurrent = max_concurrent.max(1);
        info!(scenario = name, requests = request_count, max_concurrent, "scenario started");

        self.begin();
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let scenario: Arc<str> = Arc::from(name);
        let mut tasks = JoinSet::new();

        for index in 0..request_count {
            let engine = self.clone();
            let semaphore = semaphore.clone();
            let scenario = scenario.clone();
            tasks.spawn(async move {
                // Held until the request reaches a terminal state, backoff included.
                let _permit = semaphore.acquire_owned().await.ok();
                engine.run_request(&scenario, index).await
            });
        }

        let mut outcomes = Vec::with_capacity(request_count);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(scenario = name, error = %e, "request task did not complete"),
            }
        }
        outcomes.sort_by_key(|o| o.index);

        let summary = self.finish().await;
        info!(
            scenario = name,
            total = summary.total,
            failures = summary.failures,
            p95_ms = summary.p95_ms(),
            "scenario finished"
        );
        (summary, outcomes)
    }

    /// Reset metrics and open the timing window.
    pub(crate) fn begin(&self) {
        self.metrics.reset();
        self.metrics.start_timing();
    }

    /// Close the timing window, derive the summary, then wait for alerts
    /// still being delivered.
    pub(crate) async fn finish(&self) -> Summary {
        self.metrics.stop_timing();
        let summary = self.finalize(self.metrics.snapshot());
        self.drain_alerts().await;
        summary
    }

    /// Wait for every alert handed to the sink so far.
    pub(crate) async fn drain_alerts(&self) {
        let mut pending = std::mem::take(&mut *self.alert_tasks.lock());
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "alert delivery task did not complete");
            }
        }
    }

    fn finalize(&self, summary: Summary) -> Summary {
        if self.config.availability_excludes_validation {
            summary.with_availability_excluding_validation()
        } else {
            summary
        }
    }

    /// [`execute_request`](Self::execute_request), with a panic escaping the
    /// request itself recorded as a system failure.
    pub(crate) async fn run_request(&self, scenario: &str, index: usize) -> Outcome {
        match AssertUnwindSafe(self.execute_request(scenario, index))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let request_id = request_id(scenario, index);
                let message = panic_message(panic.as_ref());
                error!(scenario, request_id = %request_id, panic = %message, "request aborted");
                self.metrics.record_failure(0.0, ErrorKind::System);
                if self.config.retry_policy.should_alert(ErrorKind::System) {
                    let err = OperationError::system(message).with_code(CODE_PANIC);
                    self.raise_alert(scenario, &request_id, &err, 1);
                }
                Outcome {
                    request_id,
                    index,
                    kind: OutcomeKind::SystemFailure,
                    latency: 0.0,
                    attempts: 1,
                }
            }
        }
    }

    /// Drive one logical request to a terminal state and record its outcome.
    pub(crate) async fn execute_request(&self, scenario: &str, index: usize) -> Outcome {
        let request_id = request_id(scenario, index);
        let payload = (self.payload)(scenario, index);
        let policy = &self.config.retry_policy;
        let mut attempt = 1;

        loop {
            let started = self.clock.monotonic_seconds();
            let result = self.classify_attempt(&request_id, &payload).await;
            let latency = (self.clock.monotonic_seconds() - started).max(0.0);

            let kind = match result {
                Ok(Verdict::Pass) => {
                    self.metrics.record_success(latency);
                    OutcomeKind::Success
                }
                Ok(Verdict::Fail { reason }) => {
                    debug!(request_id = %request_id, reason = %reason, "request rejected");
                    self.metrics.record_failure(latency, ErrorKind::Validation);
                    OutcomeKind::ValidationFailure
                }
                Err(err) if policy.should_retry(err.kind(), attempt) => {
                    let delay = policy.backoff_delay(attempt, self.random.as_ref());
                    debug!(
                        request_id = %request_id,
                        attempt,
                        delay_ms = delay.as_secs_f64() * 1000.0,
                        error = %err,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                Err(err) => {
                    let kind = err.kind();
                    self.metrics.record_failure(latency, kind);
                    if kind == ErrorKind::System {
                        warn!(
                            request_id = %request_id,
                            code = err.code().unwrap_or(""),
                            error = %err,
                            "request failed"
                        );
                    } else {
                        debug!(request_id = %request_id, attempt, error = %err, "request failed");
                    }
                    if policy.should_alert(kind) {
                        self.raise_alert(scenario, &request_id, &err, attempt);
                    }
                    OutcomeKind::from_error_kind(kind)
                }
            };

            return Outcome {
                request_id,
                index,
                kind,
                latency,
                attempts: attempt,
            };
        }
    }

    /// The single classification boundary around the operation.
    ///
    /// Deadline expiry becomes a transient `timeout`, a panic becomes a
    /// system failure.
    async fn classify_attempt(&self, request_id: &str, payload: &Value) -> Result<Verdict, OperationError> {
        let limit = self.config.per_attempt_timeout;
        let call = AssertUnwindSafe(self.validator.attempt(request_id, payload)).catch_unwind();

        match tokio::time::timeout(limit, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                Err(OperationError::system(panic_message(panic.as_ref())).with_code(CODE_PANIC))
            }
            Err(_) => Err(OperationError::timeout(limit.as_millis() as u64)),
        }
    }

    /// Fire-and-forget. Delivery runs on the blocking pool so a slow sink
    /// never holds a concurrency slot; errors and panics of the sink are
    /// logged and dropped.
    fn raise_alert(&self, scenario: &str, request_id: &str, err: &OperationError, attempt: u32) {
        let Some(sink) = self.alerts.clone() else {
            return;
        };
        let alert = Alert {
            scenario: scenario.to_string(),
            request_id: request_id.to_string(),
            code: err.code().map(str::to_string),
            message: err.message().to_string(),
            attempt,
        };

        let deliver = move || deliver_alert(sink.as_ref(), &alert);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                self.alert_tasks.lock().spawn_blocking_on(deliver, &handle);
            }
            Err(_) => deliver(),
        }
    }
}

fn deliver_alert(sink: &dyn AlertSink, alert: &Alert) {
    let request_id = alert.request_id.as_str();
    match std::panic::catch_unwind(AssertUnwindSafe(|| sink.notify(alert))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(request_id, error = %e, "alert delivery failed"),
        Err(panic) => warn!(request_id, panic = %panic_message(panic.as_ref()), "alert sink panicked"),
    }
}

impl fmt::Debug for RunnerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerEngine")
            .field("config", &self.config)
            .field("alerts", &self.alerts.is_some())
            .finish_non_exhaustive()
    }
}

pub(crate) fn request_id(scenario: &str, index: usize) -> String {
    format!("{scenario}-{index}")
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "operation panicked".to_string()
    }
}
