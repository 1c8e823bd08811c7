//! # slo-stress
//!
//! A concurrent stress harness that drives a validated operation under a
//! bounded number of in-flight requests, retries transient failures with
//! backoff and jitter, and gates the resulting statistics against SLO
//! thresholds.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slo_stress::{Environment, Registry, RunnerConfig, RunnerEngine, ScenarioRunner, ScenarioSpec};
//!
//! # async fn run() -> Result<(), slo_stress::RegistryError> {
//! let registry = Registry::for_environment(Environment::Unit);
//! let engine = RunnerEngine::from_registry(&registry, RunnerConfig::load("stress.toml"))?;
//!
//! // One scenario, raw
//! let summary = engine.run_scenario("smoke", 10, 5).await;
//! assert_eq!(summary.total, summary.successes + summary.failures);
//!
//! // A named set, each scenario isolated and gated
//! let report = ScenarioRunner::new(engine)
//!     .suite("nightly")
//!     .run_suite([("burst", ScenarioSpec::new(500, 50)), ("serial", ScenarioSpec::new(20, 1))])
//!     .await;
//! assert!(report.passed());
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure classes
//!
//! | Kind       | Retried        | Alerts             |
//! |------------|----------------|--------------------|
//! | validation | never          | never              |
//! | transient  | up to N times  | never              |
//! | system     | never          | when enabled       |

pub mod adapters;
pub mod ports;

mod config;
mod error;
mod metrics;
mod policy;
mod registry;
mod report;
mod result;
mod runner;
mod scenario;

pub use config::{
    AlertingSettings, RetrySettings, RunnerConfig, Settings, SloSettings, StressSettings,
    StressThresholds, Tier, TierThresholds, TimeoutSettings, ENV_PREFIX,
};
pub use error::{
    AlertError, ConfigError, ErrorKind, OperationError, RegistryError, CODE_PANIC, CODE_TIMEOUT,
    CODE_UNCLASSIFIED,
};
pub use metrics::{p95, InMemoryMetrics, P95_MIN_SAMPLES};
pub use policy::{ErrorPolicy, DEFAULT_BACKOFF_MS};
pub use registry::{Environment, Registry, UNIT_SEED};
pub use report::{ConsoleReporter, JsonReporter, MultiReporter, Reporter};
pub use result::{
    Outcome, OutcomeKind, ScenarioReport, SloVerdict, SloViolation, SuiteReport, Summary,
};
pub use runner::{default_payload, PayloadBuilder, RunnerEngine};
pub use scenario::{ScenarioRunner, ScenarioSpec, DEFAULT_PAUSE};
