//! Pluggable reporters for scenario output.
//!
//! All reporters implement the `Reporter` trait and are designed to be:
//! - Non-panicking: errors are logged but never propagate
//! - Atomic: output is written in complete lines to avoid interleaving

use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::RunnerConfig;
use crate::result::{ScenarioReport, SuiteReport};
use crate::scenario::ScenarioSpec;

/// Trait for scenario result reporters.
pub trait Reporter: Send + Sync {
    /// Called when a suite starts.
    fn suite_start(&self, _suite: &str, _config: &RunnerConfig) {}

    /// Called when a scenario starts.
    /// Note: Reporters should NOT print partial output here to ensure atomicity.
    fn scenario_start(&self, _name: &str, _spec: &ScenarioSpec) {}

    /// Called when a scenario completes.
    fn scenario_end(&self, _name: &str, _report: &ScenarioReport) {}

    /// Called when a suite completes.
    fn suite_end(&self, _report: &SuiteReport) {}
}

/// Fixed width for scenario name column in console output.
const NAME_WIDTH: usize = 24;
/// Fixed width for numeric columns in console output.
const COLUMN_WIDTH: usize = 10;

const RULE: &str = "------------------------------------------------------------------------------------------------";

/// Console reporter that prints a fixed-width table to stdout.
///
/// Each scenario is printed as a single complete line in `scenario_end`.
pub struct ConsoleReporter {
    show_breakdown: bool,
    output_lock: Mutex<()>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            show_breakdown: false,
            output_lock: Mutex::new(()),
        }
    }

    /// Print the per-kind failure counts and violations under each row.
    pub fn show_breakdown(mut self, show: bool) -> Self {
        self.show_breakdown = show;
        self
    }

    fn header() -> String {
        format!(
            "  {:<name$} {:>col$} {:>col$} {:>col$} {:>col$} {:>col$} {:>col$}  {}",
            "scenario",
            "requests",
            "tier",
            "success",
            "avail",
            "p95",
            "req/s",
            "slo",
            name = NAME_WIDTH,
            col = COLUMN_WIDTH
        )
    }

    fn format_row(name: &str, report: &ScenarioReport) -> String {
        let s = &report.summary;
        format!(
            "  {:<name$} {:>col$} {:>col$} {:>col$} {:>col$} {:>col$} {:>col$}  {}",
            name,
            format!("{}/{}", s.total, report.spec.max_concurrent.max(1)),
            report.tier.as_str(),
            format_rate(s.success_rate),
            format_rate(s.availability_success_rate),
            format_millis(s.p95_ms()),
            format!("{:.1}", s.requests_per_second),
            if report.verdict.passed { "PASS" } else { "FAIL" },
            name = NAME_WIDTH,
            col = COLUMN_WIDTH
        )
    }

    fn write_stdout(&self, message: &str) {
        let _guard = self.output_lock.lock();
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", message) {
            warn!(error = %e, "failed to write to stdout");
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn suite_start(&self, suite: &str, config: &RunnerConfig) {
        let header = format!(
            "{RULE}\n\
             Stress Suite: {}\n\
             Profile: {}, Attempts: {}, Timeout: {}ms\n\
             {RULE}\n\
             {}",
            suite,
            config.profile,
            config.retry_policy.attempts(),
            config.per_attempt_timeout.as_millis(),
            Self::header()
        );
        self.write_stdout(&header);
    }

    fn scenario_end(&self, name: &str, report: &ScenarioReport) {
        let mut line = Self::format_row(name, report);

        if self.show_breakdown {
            if !report.summary.error_breakdown.is_empty() {
                let kinds: Vec<_> = report
                    .summary
                    .error_breakdown
                    .iter()
                    .map(|(kind, count)| format!("{kind}={count}"))
                    .collect();
                line.push_str(&format!("\n      failures: [{}]", kinds.join(", ")));
            }
            for violation in &report.verdict.violations {
                line.push_str(&format!("\n      violated: {violation}"));
            }
        }

        self.write_stdout(&line);
    }

    fn suite_end(&self, report: &SuiteReport) {
        let failed = report.failures().len();
        let footer = format!(
            "{RULE}\n\
             Completed {} scenarios in {:.2}s, {} violated SLO\n\
             {RULE}",
            report.scenarios.len(),
            report.total_duration.as_secs_f64(),
            failed
        );
        self.write_stdout(&footer);
    }
}

fn format_rate(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

fn format_millis(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else {
        format!("{:.2}ms", ms)
    }
}

/// JSON reporter that writes the suite report to `<output_dir>/<suite>.json`.
pub struct JsonReporter {
    output_dir: PathBuf,
}

impl JsonReporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Path the report of `suite` is written to.
    pub fn path_for(&self, suite: &str) -> PathBuf {
        let sanitized = suite.replace(['/', '\\'], "_");
        self.output_dir.join(format!("{sanitized}.json"))
    }
}

impl Reporter for JsonReporter {
    fn suite_end(&self, report: &SuiteReport) {
        let path = self.path_for(&report.suite);
        match write_json(&self.output_dir, &path, report) {
            Ok(()) => info!(path = %path.display(), "results written"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write results"),
        }
    }
}

fn write_json(output_dir: &Path, path: &Path, report: &SuiteReport) -> std::io::Result<()> {
    std::fs::create_dir_all(output_dir)?;
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

/// Combines multiple reporters.
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Box<dyn Reporter>>) -> Self {
        Self { reporters }
    }
}

impl Reporter for MultiReporter {
    fn suite_start(&self, suite: &str, config: &RunnerConfig) {
        for r in &self.reporters {
            r.suite_start(suite, config);
        }
    }

    fn scenario_start(&self, name: &str, spec: &ScenarioSpec) {
        for r in &self.reporters {
            r.scenario_start(name, spec);
        }
    }

    fn scenario_end(&self, name: &str, report: &ScenarioReport) {
        for r in &self.reporters {
            r.scenario_end(name, report);
        }
    }

    fn suite_end(&self, report: &SuiteReport) {
        for r in &self.reporters {
            r.suite_end(report);
        }
    }
}
