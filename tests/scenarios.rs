//! End-to-end runs of the engine and the scenario runner against
//! deterministic doubles, on a paused tokio clock.

use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use slo_stress::adapters::{ChannelAlertSink, FixedRandom, ScriptedValidator, Step, SystemClock};
use slo_stress::ports::{Clock, RandomSource, ValidatedOperation, Verdict};
use slo_stress::{
    Environment, ErrorKind, ErrorPolicy, InMemoryMetrics, JsonReporter, OperationError,
    OutcomeKind, Registry, Reporter, RunnerConfig, RunnerEngine, ScenarioReport, ScenarioRunner,
    ScenarioSpec, Settings, SloViolation, SuiteReport, Tier,
};

fn engine(config: RunnerConfig, validator: Arc<dyn ValidatedOperation>) -> RunnerEngine {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    RunnerEngine::new(
        config,
        validator,
        clock.clone(),
        Arc::new(FixedRandom::new(0.0)),
        Arc::new(InMemoryMetrics::new(clock)),
    )
}

fn quiet(engine: RunnerEngine) -> ScenarioRunner {
    ScenarioRunner::new(engine).reporters(Vec::new())
}

/// Fails validation for index % 4 == 0, system for index % 4 == 1, passes otherwise.
struct ByIndex;

#[async_trait]
impl ValidatedOperation for ByIndex {
    async fn attempt(&self, _request_id: &str, payload: &Value) -> Result<Verdict, OperationError> {
        match payload["index"].as_u64().unwrap_or(0) % 4 {
            0 => Err(OperationError::validation("malformed order")),
            1 => Err(OperationError::system("ledger offline")),
            _ => Ok(Verdict::Pass),
        }
    }

    fn reset_counters(&self) {}
}

// ============================================================================
// Runner engine
// ============================================================================

#[tokio::test(start_paused = true)]
async fn should_succeed_every_request_when_operation_healthy() {
    let validator = Arc::new(ScriptedValidator::always_pass().with_latency(Duration::from_millis(1)));
    let engine = engine(RunnerConfig::new(), validator.clone());

    let summary = engine.run_scenario("smoke", 10, 5).await;

    assert_eq!(summary.total, 10);
    assert_eq!(summary.successes, 10);
    assert_eq!(summary.failures, 0);
    assert_eq!(summary.success_rate, 1.0);
    assert!(summary.p95_latency >= 0.001);
    assert!(summary.requests_per_second > 0.0);
    assert!(validator.peak_in_flight() <= 5);
}

#[tokio::test(start_paused = true)]
async fn should_record_one_failure_when_transient_attempts_exhausted() {
    let validator = Arc::new(ScriptedValidator::always(Step::Raise(OperationError::transient(
        "rate limited",
    ))));
    let config = RunnerConfig::new().retry_policy(ErrorPolicy::new().max_attempts(2).backoff(vec![2, 8]));
    let engine = engine(config, validator.clone());

    let (summary, outcomes) = engine.run_scenario_with_outcomes("flaky", 5, 5).await;

    assert_eq!(summary.failures, 5);
    assert_eq!(summary.failures_of(ErrorKind::Transient), 5);
    assert_eq!(validator.total_attempts(), 10);
    for index in 0..5 {
        assert_eq!(validator.attempts_for(&format!("flaky-{index}")), 2);
    }
    assert!(outcomes
        .iter()
        .all(|o| o.kind == OutcomeKind::TransientFailure && o.attempts == 2));
}

#[tokio::test(start_paused = true)]
async fn should_exclude_validation_failures_from_availability() {
    let validator = Arc::new(ScriptedValidator::always(Step::Raise(OperationError::validation(
        "bad input",
    ))));
    let config = RunnerConfig::new()
        .retry_policy(ErrorPolicy::new().max_attempts(5))
        .availability_excludes_validation(true);
    let engine = engine(config, validator.clone());

    let summary = engine.run_scenario("bad-input", 5, 5).await;

    assert_eq!(summary.failures, 5);
    assert_eq!(summary.failures_of(ErrorKind::Validation), 5);
    assert_eq!(summary.availability_success_rate, 1.0);
    // never retried, whatever the attempt budget
    assert_eq!(validator.total_attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn should_compute_availability_by_configured_rule() {
    let excluding = engine(RunnerConfig::new().availability_excludes_validation(true), Arc::new(ByIndex));
    let summary = excluding.run_scenario("mixed", 8, 4).await;
    assert_eq!(summary.failures_of(ErrorKind::Validation), 2);
    assert_eq!(summary.failures_of(ErrorKind::System), 2);
    assert_eq!(summary.availability_success_rate, 0.75);

    let default_rule = engine(RunnerConfig::new().availability_excludes_validation(false), Arc::new(ByIndex));
    let summary = default_rule.run_scenario("mixed", 8, 4).await;
    assert!((summary.availability_success_rate - 4.0 / 6.0).abs() < 1e-12);
    assert_eq!(summary.success_rate, 0.5);
}

#[tokio::test(start_paused = true)]
async fn should_report_vacuous_health_when_no_requests() {
    let engine = engine(RunnerConfig::new(), Arc::new(ScriptedValidator::always_pass()));
    let summary = engine.run_scenario("empty", 0, 3).await;

    assert_eq!(summary.total, 0);
    assert_eq!(summary.success_rate, 1.0);
    assert_eq!(summary.availability_success_rate, 1.0);
    assert_eq!(summary.p95_latency, 0.0);
    assert_eq!(summary.requests_per_second, 0.0);
}

#[tokio::test(start_paused = true)]
async fn should_reset_metrics_between_runs() {
    let engine = engine(RunnerConfig::new(), Arc::new(ScriptedValidator::always_pass()));
    engine.run_scenario("first", 7, 2).await;
    let summary = engine.run_scenario("second", 3, 2).await;
    assert_eq!(summary.total, 3);
}

#[tokio::test(start_paused = true)]
async fn should_deliver_one_alert_per_system_failure() {
    let validator = Arc::new(ScriptedValidator::always(Step::Raise(
        OperationError::system("disk full").with_code("enospc"),
    )));
    let (sink, mut alerts) = ChannelAlertSink::new();
    let config = RunnerConfig::new().retry_policy(ErrorPolicy::new().alert_on_system_error(true));
    let engine = engine(config, validator).with_alerts(Arc::new(sink));

    let summary = engine.run_scenario("outage", 4, 2).await;
    assert_eq!(summary.failures_of(ErrorKind::System), 4);

    let mut received = Vec::new();
    while let Ok(alert) = alerts.try_recv() {
        received.push(alert.request_id);
    }
    received.sort();
    assert_eq!(received, vec!["outage-0", "outage-1", "outage-2", "outage-3"]);
}

#[tokio::test(start_paused = true)]
async fn should_produce_same_outcomes_for_same_doubles() {
    let run = || async {
        let validator = Arc::new(ScriptedValidator::new(vec![
            Step::Raise(OperationError::transient("busy")),
            Step::Pass,
        ]));
        engine(RunnerConfig::new(), validator)
            .run_scenario_with_outcomes("repeat", 12, 3)
            .await
    };

    let (first, first_outcomes) = run().await;
    let (second, second_outcomes) = run().await;

    assert_eq!(first.total, second.total);
    assert_eq!(first.error_breakdown, second.error_breakdown);
    let shape = |outcomes: &[slo_stress::Outcome]| {
        outcomes
            .iter()
            .map(|o| (o.request_id.clone(), o.kind, o.attempts))
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(&first_outcomes[..]), shape(&second_outcomes[..]));
}

#[test]
fn should_never_exceed_concurrency_bound() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();

    let config = ProptestConfig {
        cases: 24,
        ..ProptestConfig::default()
    };
    proptest!(config, |(requests in 0usize..60, concurrency in 1usize..12, transient in any::<bool>())| {
        let script = if transient {
            vec![Step::Raise(OperationError::transient("busy")), Step::Pass]
        } else {
            vec![Step::Pass]
        };
        let validator = Arc::new(ScriptedValidator::new(script).with_latency(Duration::from_millis(2)));
        let engine = engine(RunnerConfig::new(), validator.clone());

        let summary = runtime.block_on(engine.run_scenario("bounded", requests, concurrency));

        prop_assert!(validator.peak_in_flight() <= concurrency);
        prop_assert_eq!(summary.total, requests as u64);
        prop_assert_eq!(summary.total, summary.successes + summary.failures);
        prop_assert_eq!(validator.requests_seen(), requests);
    });
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn should_fall_back_to_defaults_when_config_missing_or_malformed() {
    let dir = tempfile::tempdir().unwrap();

    let missing = Settings::load(dir.path().join("nope.toml"));
    assert_eq!(missing.retry.backoff_ms, vec![2, 8]);
    assert_eq!(missing.profile, "dev");

    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[stress\nsuccess_rate_min = ").unwrap();
    let malformed = Settings::load(&path);
    assert_eq!(malformed.retry.backoff_ms, vec![2, 8]);
    assert_eq!(malformed.stress.success_rate_min, 0.9);
    assert_eq!(malformed.stress.availability_min, 0.95);
    assert_eq!(malformed.timeouts.per_attempt_ms, 10);

    let config = RunnerConfig::load(&path);
    assert_eq!(config.per_attempt_timeout, Duration::from_millis(10));
}

// ============================================================================
// Scenario runner
// ============================================================================

#[tokio::test(start_paused = true)]
async fn should_return_summary_per_named_scenario() {
    let validator = Arc::new(ScriptedValidator::always_pass());
    let runner = quiet(engine(RunnerConfig::new(), validator.clone()));

    let summaries = runner
        .run_scenarios([
            ("light", ScenarioSpec::new(10, 5)),
            ("serial", ScenarioSpec::new(4, 1)),
        ])
        .await;

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries["light"].successes, 10);
    assert_eq!(summaries["serial"].successes, 4);
    // counters were reset before the last scenario
    assert_eq!(validator.total_attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn should_run_one_request_at_a_time_in_sequential_mode() {
    let validator = Arc::new(ScriptedValidator::always_pass().with_latency(Duration::from_millis(1)));
    let runner = quiet(engine(RunnerConfig::new(), validator.clone()));

    let summary = runner.run_scenario("serial", ScenarioSpec::new(6, 1)).await;

    assert_eq!(summary.total, 6);
    assert_eq!(validator.peak_in_flight(), 1);
    assert_eq!(validator.requests_seen(), 6);
}

#[tokio::test(start_paused = true)]
async fn should_retry_in_sequential_mode() {
    let validator = Arc::new(ScriptedValidator::always(Step::Raise(OperationError::transient(
        "busy",
    ))));
    let config = RunnerConfig::new().retry_policy(ErrorPolicy::new().max_attempts(3));
    let runner = quiet(engine(config, validator.clone()));

    let summary = runner.run_scenario("serial", ScenarioSpec::new(2, 1)).await;

    assert_eq!(summary.failures_of(ErrorKind::Transient), 2);
    assert_eq!(validator.attempts_for("serial-0"), 3);
    assert_eq!(validator.attempts_for("serial-1"), 3);
}

#[tokio::test(start_paused = true)]
async fn should_pause_between_scenarios() {
    let runner = quiet(engine(RunnerConfig::new(), Arc::new(ScriptedValidator::always_pass())))
        .pause(Duration::from_millis(250));

    let started = tokio::time::Instant::now();
    runner
        .run_scenarios([
            ("a", ScenarioSpec::new(1, 1)),
            ("b", ScenarioSpec::new(1, 1)),
            ("c", ScenarioSpec::new(1, 1)),
        ])
        .await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_millis(750));
}

#[tokio::test(start_paused = true)]
async fn should_gate_scenarios_against_tier_thresholds() {
    let validator = Arc::new(ScriptedValidator::always_pass().with_latency(Duration::from_millis(60)));
    let config = RunnerConfig::new().per_attempt_timeout(Duration::from_millis(500));
    let runner = quiet(engine(config, validator));

    let report = runner
        .run_suite([
            ("light", ScenarioSpec::new(5, 5)),
            ("pinned", ScenarioSpec::new(5, 5).tier(Tier::Medium)),
        ])
        .await;

    assert!(!report.passed());
    let light = &report.scenarios["light"];
    assert_eq!(light.tier, Tier::Light);
    assert!(matches!(
        light.verdict.violations.as_slice(),
        [SloViolation::P95Latency { max_ms: 50, .. }]
    ));
    assert!(report.scenarios["pinned"].verdict.passed);
    assert_eq!(report.failures().len(), 1);
}

#[derive(Default)]
struct Events(Mutex<Vec<String>>);

struct Recorder(Arc<Events>);

impl Reporter for Recorder {
    fn suite_start(&self, suite: &str, config: &RunnerConfig) {
        self.0 .0.lock().push(format!("suite_start:{suite}:{}", config.profile));
    }

    fn scenario_start(&self, name: &str, spec: &ScenarioSpec) {
        self.0 .0.lock().push(format!("scenario_start:{name}:{spec}"));
    }

    fn scenario_end(&self, name: &str, report: &ScenarioReport) {
        self.0 .0.lock().push(format!("scenario_end:{name}:{}", report.summary.total));
    }

    fn suite_end(&self, report: &SuiteReport) {
        self.0 .0.lock().push(format!("suite_end:{}", report.scenarios.len()));
    }
}

#[tokio::test(start_paused = true)]
async fn should_notify_reporters_in_order() {
    let events = Arc::new(Events::default());
    let runner = ScenarioRunner::new(engine(
        RunnerConfig::new().profile("ci"),
        Arc::new(ScriptedValidator::always_pass()),
    ))
    .suite("nightly")
    .reporters(vec![Box::new(Recorder(events.clone()))]);

    runner
        .run_suite([("a", ScenarioSpec::new(2, 2)), ("b", ScenarioSpec::new(3, 1))])
        .await;

    assert_eq!(
        *events.0.lock(),
        vec![
            "suite_start:nightly:ci",
            "scenario_start:a:2:2",
            "scenario_end:a:2",
            "scenario_start:b:3:1",
            "scenario_end:b:3",
            "suite_end:2",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn should_write_loadable_suite_report() {
    let dir = tempfile::tempdir().unwrap();
    let runner = quiet(engine(
        RunnerConfig::new().profile("ci"),
        Arc::new(ScriptedValidator::always_pass()),
    ))
    .suite("nightly")
    .add_reporter(Box::new(JsonReporter::new(dir.path())));

    let report = runner.run_suite([("smoke", ScenarioSpec::new(10, 5))]).await;

    let loaded = SuiteReport::load(dir.path().join("nightly.json")).unwrap();
    assert_eq!(loaded, report);
    assert_eq!(loaded.profile, "ci");
    assert!(loaded.passed());
}

// ============================================================================
// Registry presets
// ============================================================================

#[tokio::test(start_paused = true)]
async fn should_run_integration_preset_with_overridden_randomness() {
    let registry = Registry::for_environment(Environment::Integration);
    // above every failure rate: all requests pass
    registry.bind_singleton::<dyn RandomSource>(Arc::new(FixedRandom::new(0.99)));

    let engine = RunnerEngine::from_registry(&registry, RunnerConfig::new()).unwrap();
    let summary = engine.run_scenario("preset", 20, 4).await;

    assert_eq!(summary.successes, 20);
    assert!(summary.p95_ms() >= 3.0);
}

#[tokio::test(start_paused = true)]
async fn should_swap_operation_through_registry() {
    let registry = Registry::for_environment(Environment::Unit);
    registry.bind::<dyn ValidatedOperation, _>(|_| {
        Arc::new(ScriptedValidator::always(Step::Reject("frozen account".into())))
    });

    let engine = RunnerEngine::from_registry(&registry, RunnerConfig::new()).unwrap();
    let summary = engine.run_scenario("swapped", 3, 3).await;

    assert_eq!(summary.failures_of(ErrorKind::Validation), 3);
    assert_eq!(summary.success_rate, 0.0);
}
