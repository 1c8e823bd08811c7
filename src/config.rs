//! Configuration for the stress runner.
//!
//! [`Settings`] mirrors the on-disk shape; [`RunnerConfig`] is the immutable
//! view the runner works with for the duration of a scenario.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::policy::{ErrorPolicy, DEFAULT_BACKOFF_MS};

/// Prefix of environment overrides, e.g. `STRESS__RETRY__JITTER_MS=3`.
pub const ENV_PREFIX: &str = "STRESS";
const ENV_SEPARATOR: &str = "__";

/// Load class a scenario is judged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Light,
    Medium,
    Heavy,
    Extreme,
}

impl Tier {
    /// Classify a scenario by its concurrency level.
    pub fn for_concurrency(max_concurrent: usize) -> Self {
        match max_concurrent {
            0..=10 => Tier::Light,
            11..=50 => Tier::Medium,
            51..=100 => Tier::Heavy,
            _ => Tier::Extreme,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Tier::Light => "light",
            Tier::Medium => "medium",
            Tier::Heavy => "heavy",
            Tier::Extreme => "extreme",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Tier::Light),
            "medium" => Ok(Tier::Medium),
            "heavy" => Ok(Tier::Heavy),
            "extreme" => Ok(Tier::Extreme),
            other => Err(format!("unknown tier `{other}`")),
        }
    }
}

/// p95 latency ceilings in milliseconds, one per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub light: u64,
    pub medium: u64,
    pub heavy: u64,
    pub extreme: u64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            light: 50,
            medium: 100,
            heavy: 250,
            extreme: 500,
        }
    }
}

impl TierThresholds {
    pub fn for_tier(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Light => self.light,
            Tier::Medium => self.medium,
            Tier::Heavy => self.heavy,
            Tier::Extreme => self.extreme,
        }
    }
}

/// SLO thresholds a [`Summary`](crate::Summary) is gated against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StressThresholds {
    pub success_rate_min: f64,
    pub availability_min: f64,
    pub p95_ms_by_tier: TierThresholds,
}

impl Default for StressThresholds {
    fn default() -> Self {
        Self {
            success_rate_min: 0.9,
            availability_min: 0.95,
            p95_ms_by_tier: TierThresholds::default(),
        }
    }
}

// ============================================================================
// File shape
// ============================================================================

/// `stress.slo` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SloSettings {
    pub availability_excludes_validation: bool,
}

impl Default for SloSettings {
    fn default() -> Self {
        Self {
            availability_excludes_validation: true,
        }
    }
}

/// `stress` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressSettings {
    pub success_rate_min: f64,
    pub availability_min: f64,
    pub p95_ms_by_tier: TierThresholds,
    pub slo: SloSettings,
}

impl Default for StressSettings {
    fn default() -> Self {
        let thresholds = StressThresholds::default();
        Self {
            success_rate_min: thresholds.success_rate_min,
            availability_min: thresholds.availability_min,
            p95_ms_by_tier: thresholds.p95_ms_by_tier,
            slo: SloSettings::default(),
        }
    }
}

/// `retry` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub transient_max_attempts: u32,
    pub backoff_ms: Vec<u64>,
    pub jitter_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = ErrorPolicy::default();
        Self {
            transient_max_attempts: policy.transient_max_attempts,
            backoff_ms: DEFAULT_BACKOFF_MS.to_vec(),
            jitter_ms: policy.jitter_ms,
        }
    }
}

/// `timeouts` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub per_attempt_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self { per_attempt_ms: 10 }
    }
}

/// `alerting` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingSettings {
    pub on_system_error: bool,
}

/// Configuration as loaded from file and environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub profile: String,
    pub stress: StressSettings,
    pub retry: RetrySettings,
    pub timeouts: TimeoutSettings,
    pub alerting: AlertingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profile: "dev".to_string(),
            stress: StressSettings::default(),
            retry: RetrySettings::default(),
            timeouts: TimeoutSettings::default(),
            alerting: AlertingSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings, never failing.
    ///
    /// Malformed environment overrides are dropped and the file is used on
    /// its own. A missing, unreadable or malformed file logs a warning and
    /// yields [`Settings::default`].
    pub fn load(path: impl AsRef<Path>) -> Self {
        Self::load_with(path.as_ref(), None)
    }

    fn load_with(path: &Path, env_source: Option<HashMap<String, String>>) -> Self {
        let err = match Self::build(Some(path), env_source) {
            Ok(settings) => return settings,
            Err(e) => e,
        };
        match Self::build_from(Some(path), None) {
            Ok(settings) => {
                warn!(path = %path.display(), error = %err, "ignoring malformed environment overrides");
                settings
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "falling back to default configuration");
                Self::default()
            }
        }
    }

    /// Strict variant of [`Settings::load`].
    ///
    /// A missing file is not an error; unparseable content is.
    pub fn try_load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::build(Some(path.as_ref()), None)
    }

    /// Defaults overlaid with environment overrides only.
    pub fn from_env() -> Self {
        match Self::build(None, None) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "ignoring malformed environment overrides");
                Self::default()
            }
        }
    }

    /// File (if any) layered under `STRESS__*` overrides. `env_source`
    /// replaces the process environment when given.
    fn build(
        path: Option<&Path>,
        env_source: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let env = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(env_source);
        Self::build_from(path, Some(env))
    }

    fn build_from(path: Option<&Path>, env: Option<config::Environment>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        if let Some(env) = env {
            builder = builder.add_source(env);
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        let settings = settings.sanitized();
        debug!(profile = %settings.profile, "configuration loaded");
        Ok(settings)
    }

    /// Clamp values into their valid ranges.
    fn sanitized(mut self) -> Self {
        self.retry.transient_max_attempts = self.retry.transient_max_attempts.max(1);
        self.stress.success_rate_min = clamp_rate(self.stress.success_rate_min);
        self.stress.availability_min = clamp_rate(self.stress.availability_min);
        if self.profile.trim().is_empty() {
            self.profile = Settings::default().profile;
        }
        self
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

// ============================================================================
// Runner view
// ============================================================================

/// Immutable configuration of one runner.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Label carried into reports.
    pub profile: String,
    /// Deadline of a single attempt.
    pub per_attempt_timeout: Duration,
    pub retry_policy: ErrorPolicy,
    /// Report availability as `(total - transient - system) / total`.
    pub availability_excludes_validation: bool,
    pub stress_thresholds: StressThresholds,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for RunnerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            profile: settings.profile.clone(),
            per_attempt_timeout: Duration::from_millis(settings.timeouts.per_attempt_ms),
            retry_policy: ErrorPolicy {
                transient_max_attempts: settings.retry.transient_max_attempts.max(1),
                backoff_ms: settings.retry.backoff_ms.clone(),
                jitter_ms: settings.retry.jitter_ms,
                alert_on_system_error: settings.alerting.on_system_error,
            },
            availability_excludes_validation: settings.stress.slo.availability_excludes_validation,
            stress_thresholds: StressThresholds {
                success_rate_min: settings.stress.success_rate_min,
                availability_min: settings.stress.availability_min,
                p95_ms_by_tier: settings.stress.p95_ms_by_tier,
            },
        }
    }
}

impl From<Settings> for RunnerConfig {
    fn from(settings: Settings) -> Self {
        Self::from(&settings)
    }
}

impl RunnerConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a file (leniently) and derive the runner view.
    pub fn load(path: impl AsRef<Path>) -> Self {
        Self::from(&Settings::load(path))
    }

    /// Set the profile label.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Set the per-attempt deadline.
    pub fn per_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = timeout;
        self
    }

    /// Replace the retry policy.
    pub fn retry_policy(mut self, policy: ErrorPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Toggle the validation-excluding availability figure.
    pub fn availability_excludes_validation(mut self, excludes: bool) -> Self {
        self.availability_excludes_validation = excludes;
        self
    }

    /// Replace the SLO thresholds.
    pub fn thresholds(mut self, thresholds: StressThresholds) -> Self {
        self.stress_thresholds = thresholds;
        self
    }
}
