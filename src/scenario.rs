//! Named scenario sets run one after another, each in isolation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Tier;
use crate::report::{ConsoleReporter, Reporter};
use crate::result::{ScenarioReport, SuiteReport, Summary};
use crate::runner::RunnerEngine;

/// Pause between two scenarios of a set.
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(100);

/// Load shape of one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub request_count: usize,
    pub max_concurrent: usize,
    /// Tier the scenario is gated against; derived from concurrency when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
}

impl ScenarioSpec {
    pub fn new(request_count: usize, max_concurrent: usize) -> Self {
        Self {
            request_count,
            max_concurrent,
            tier: None,
        }
    }

    /// Pin the tier instead of deriving it from concurrency.
    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn effective_tier(&self) -> Tier {
        self.tier
            .unwrap_or_else(|| Tier::for_concurrency(self.max_concurrent))
    }

    pub fn is_sequential(&self) -> bool {
        self.max_concurrent <= 1
    }
}

impl fmt::Display for ScenarioSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.request_count, self.max_concurrent)
    }
}

/// Parses `N:C`, or `N:C:tier`.
impl FromStr for ScenarioSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let count = parts
            .next()
            .and_then(|p| p.trim().parse::<usize>().ok())
            .ok_or_else(|| format!("invalid request count in `{s}`"))?;
        let concurrent = parts
            .next()
            .and_then(|p| p.trim().parse::<usize>().ok())
            .ok_or_else(|| format!("invalid concurrency in `{s}`"))?;
        let mut spec = ScenarioSpec::new(count, concurrent);
        if let Some(tier) = parts.next() {
            spec = spec.tier(tier.trim().parse()?);
        }
        if parts.next().is_some() {
            return Err(format!("too many fields in `{s}`"));
        }
        Ok(spec)
    }
}

/// Runs named scenarios sequentially on top of a [`RunnerEngine`].
///
/// Each scenario starts with fresh metrics and fresh operation counters.
/// Scenarios with `max_concurrent <= 1` take a plain sequential path.
pub struct ScenarioRunner {
    engine: RunnerEngine,
    pause: Duration,
    reporters: Vec<Box<dyn Reporter>>,
    suite: String,
}

impl ScenarioRunner {
    pub fn new(engine: RunnerEngine) -> Self {
        Self {
            engine,
            pause: DEFAULT_PAUSE,
            reporters: vec![Box::new(ConsoleReporter::new())],
            suite: "stress".to_string(),
        }
    }

    /// Set the pause between scenarios.
    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Replace reporters with a custom set.
    pub fn reporters(mut self, reporters: Vec<Box<dyn Reporter>>) -> Self {
        self.reporters = reporters;
        self
    }

    /// Add an additional reporter.
    pub fn add_reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    /// Set the suite name carried into reports.
    pub fn suite(mut self, suite: impl Into<String>) -> Self {
        self.suite = suite.into();
        self
    }

    pub fn engine(&self) -> &RunnerEngine {
        &self.engine
    }

    /// Run a single scenario in isolation.
    pub async fn run_scenario(&self, name: &str, spec: ScenarioSpec) -> Summary {
        self.engine.validator().reset_counters();
        if spec.is_sequential() {
            self.run_sequential(name, spec.request_count).await
        } else {
            self.engine
                .run_scenario(name, spec.request_count, spec.max_concurrent)
                .await
        }
    }

    /// One request at a time, no semaphore.
    async fn run_sequential(&self, name: &str, request_count: usize) -> Summary {
        info!(scenario = name, requests = request_count, "sequential scenario started");
        self.engine.begin();
        for index in 0..request_count {
            self.engine.run_request(name, index).await;
        }
        let summary = self.engine.finish().await;
        info!(scenario = name, total = summary.total, failures = summary.failures, "sequential scenario finished");
        summary
    }

    /// Run every scenario and return its summary by name.
    pub async fn run_scenarios<I, S>(&self, scenarios: I) -> BTreeMap<String, Summary>
    where
        I: IntoIterator<Item = (S, ScenarioSpec)>,
        S: Into<String>,
    {
        self.run_suite(scenarios).await.summaries()
    }

    /// Run every scenario, gate each against its SLO, and report.
    pub async fn run_suite<I, S>(&self, scenarios: I) -> SuiteReport
    where
        I: IntoIterator<Item = (S, ScenarioSpec)>,
        S: Into<String>,
    {
        let config = self.engine.config();
        let clock = self.engine.clock().clone();
        let started_at = clock.now();
        let started = clock.monotonic_seconds();

        self.engine.validator().reset_counters();
        for r in &self.reporters {
            r.suite_start(&self.suite, config);
        }

        let mut reports = BTreeMap::new();
        for (position, (name, spec)) in scenarios.into_iter().enumerate() {
            let name: String = name.into();
            if position > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }

            for r in &self.reporters {
                r.scenario_start(&name, &spec);
            }

            let summary = self.run_scenario(&name, spec).await;
            let tier = spec.effective_tier();
            let verdict = summary.evaluate(&config.stress_thresholds, tier);
            if !verdict.passed {
                for violation in &verdict.violations {
                    warn!(scenario = %name, %violation, "SLO violated");
                }
            }

            let report = ScenarioReport {
                spec,
                tier,
                summary,
                verdict,
            };
            for r in &self.reporters {
                r.scenario_end(&name, &report);
            }
            reports.insert(name, report);
        }

        let elapsed = (clock.monotonic_seconds() - started).max(0.0);
        let report = SuiteReport {
            suite: self.suite.clone(),
            profile: config.profile.clone(),
            started_at,
            total_duration: Duration::from_secs_f64(elapsed),
            scenarios: reports,
        };
        for r in &self.reporters {
            r.suite_end(&report);
        }
        report
    }
}

impl fmt::Debug for ScenarioRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioRunner")
            .field("engine", &self.engine)
            .field("pause", &self.pause)
            .field("reporters", &self.reporters.len())
            .field("suite", &self.suite)
            .finish()
    }
}
