//! Result types: per-request outcomes, scenario summaries and suite reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::config::{StressThresholds, Tier};
use crate::error::ErrorKind;
use crate::scenario::ScenarioSpec;

/// Terminal state of one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    ValidationFailure,
    TransientFailure,
    SystemFailure,
}

impl OutcomeKind {
    pub fn from_error_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Validation => OutcomeKind::ValidationFailure,
            ErrorKind::Transient => OutcomeKind::TransientFailure,
            ErrorKind::System => OutcomeKind::SystemFailure,
        }
    }

    /// The error kind counted for this outcome, `None` on success.
    pub fn error_kind(self) -> Option<ErrorKind> {
        match self {
            OutcomeKind::Success => None,
            OutcomeKind::ValidationFailure => Some(ErrorKind::Validation),
            OutcomeKind::TransientFailure => Some(ErrorKind::Transient),
            OutcomeKind::SystemFailure => Some(ErrorKind::System),
        }
    }
}

/// Exactly one record per logical request, however many attempts it took.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub request_id: String,
    /// Position of the request within its scenario.
    pub index: usize,
    pub kind: OutcomeKind,
    /// Latency of the final attempt, in seconds.
    pub latency: f64,
    /// Attempts consumed, at least 1.
    pub attempts: u32,
}

/// Point-in-time statistics of one scenario run.
///
/// Latencies are in seconds. Invariant: `total == successes + failures`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub availability_success_rate: f64,
    pub p95_latency: f64,
    pub duration_seconds: f64,
    pub requests_per_second: f64,
    #[serde(default)]
    pub error_breakdown: BTreeMap<ErrorKind, u64>,
}

impl Summary {
    /// Summary of a run with no requests: vacuously healthy.
    pub fn empty() -> Self {
        Self {
            total: 0,
            successes: 0,
            failures: 0,
            success_rate: 1.0,
            availability_success_rate: 1.0,
            p95_latency: 0.0,
            duration_seconds: 0.0,
            requests_per_second: 0.0,
            error_breakdown: BTreeMap::new(),
        }
    }

    /// Failures counted under `kind`.
    pub fn failures_of(&self, kind: ErrorKind) -> u64 {
        self.error_breakdown.get(&kind).copied().unwrap_or(0)
    }

    pub fn p95_ms(&self) -> f64 {
        self.p95_latency * 1000.0
    }

    /// Recompute availability as `(total - transient - system) / total`,
    /// so that validation failures do not count against it.
    pub fn with_availability_excluding_validation(mut self) -> Self {
        self.availability_success_rate = if self.total == 0 {
            1.0
        } else {
            let unavailable =
                self.failures_of(ErrorKind::Transient) + self.failures_of(ErrorKind::System);
            self.total.saturating_sub(unavailable) as f64 / self.total as f64
        };
        self
    }

    /// Compare against SLO thresholds for the given tier.
    pub fn evaluate(&self, thresholds: &StressThresholds, tier: Tier) -> SloVerdict {
        let mut violations = Vec::new();

        if self.success_rate < thresholds.success_rate_min {
            violations.push(SloViolation::SuccessRate {
                actual: self.success_rate,
                min: thresholds.success_rate_min,
            });
        }
        if self.availability_success_rate < thresholds.availability_min {
            violations.push(SloViolation::Availability {
                actual: self.availability_success_rate,
                min: thresholds.availability_min,
            });
        }
        let p95_limit = thresholds.p95_ms_by_tier.for_tier(tier);
        if self.p95_ms() > p95_limit as f64 {
            violations.push(SloViolation::P95Latency {
                tier,
                actual_ms: self.p95_ms(),
                max_ms: p95_limit,
            });
        }

        SloVerdict {
            passed: violations.is_empty(),
            violations,
        }
    }
}

impl Default for Summary {
    fn default() -> Self {
        Self::empty()
    }
}

/// One threshold a summary failed to meet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "slo", rename_all = "snake_case")]
pub enum SloViolation {
    SuccessRate { actual: f64, min: f64 },
    Availability { actual: f64, min: f64 },
    P95Latency { tier: Tier, actual_ms: f64, max_ms: u64 },
}

impl fmt::Display for SloViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SloViolation::SuccessRate { actual, min } => {
                write!(f, "success rate {actual:.4} below {min:.4}")
            }
            SloViolation::Availability { actual, min } => {
                write!(f, "availability {actual:.4} below {min:.4}")
            }
            SloViolation::P95Latency {
                tier,
                actual_ms,
                max_ms,
            } => write!(f, "p95 {actual_ms:.2}ms above {max_ms}ms ({tier} tier)"),
        }
    }
}

/// Outcome of gating a summary against its thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloVerdict {
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<SloViolation>,
}

/// Result of one scenario within a suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub spec: ScenarioSpec,
    pub tier: Tier,
    pub summary: Summary,
    pub verdict: SloVerdict,
}

/// Results for an entire named set of scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite: String,
    pub profile: String,
    pub started_at: DateTime<Utc>,
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    pub scenarios: BTreeMap<String, ScenarioReport>,
}

impl SuiteReport {
    /// Load a suite report from a JSON file.
    pub fn load(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Whether every scenario met its SLO.
    pub fn passed(&self) -> bool {
        self.scenarios.values().all(|s| s.verdict.passed)
    }

    /// Scenarios that violated their SLO, with the violations.
    pub fn failures(&self) -> Vec<(&str, &[SloViolation])> {
        self.scenarios
            .iter()
            .filter(|(_, s)| !s.verdict.passed)
            .map(|(name, s)| (name.as_str(), s.verdict.violations.as_slice()))
            .collect()
    }

    /// Summaries keyed by scenario name.
    pub fn summaries(&self) -> BTreeMap<String, Summary> {
        self.scenarios
            .iter()
            .map(|(name, s)| (name.clone(), s.summary.clone()))
            .collect()
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_nanos().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let nanos = u128::deserialize(d)?;
        Ok(Duration::from_nanos(nanos as u64))
    }
}
