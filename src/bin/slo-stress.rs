//! slo-stress: run named load scenarios and gate them against SLO thresholds.
//!
//! Exit status is non-zero when any scenario violates its thresholds.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use slo_stress::{
    ConsoleReporter, Environment, JsonReporter, Registry, Reporter, RunnerConfig, RunnerEngine,
    ScenarioRunner, ScenarioSpec, Settings,
};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "slo-stress",
    about = "Run load scenarios and check them against SLO thresholds",
    long_about = "
slo-stress drives a validated operation through one or more named scenarios,
each with a fixed request count and concurrency bound, and compares the
resulting success rate, availability and p95 latency against the configured
thresholds.

Example:
    slo-stress                                   # smoke=10:5 on the unit preset
    slo-stress --scenario burst=500:50 --scenario soak=2000:100:heavy
    slo-stress --environment stress --config stress.toml --output-dir target/stress
"
)]
struct Cli {
    // ========================================================================
    // Scenario Selection
    // ========================================================================
    /// Scenario as `name=N:C` or `name=N:C:tier` (repeatable)
    #[arg(long = "scenario", value_parser = parse_scenario, default_value = "smoke=10:5")]
    scenarios: Vec<(String, ScenarioSpec)>,

    /// Binding preset: unit, integration or stress
    #[arg(long, default_value = "unit")]
    environment: Environment,

    /// Suite name used in reports
    #[arg(long, default_value = "stress")]
    suite: String,

    /// Pause between scenarios in milliseconds
    #[arg(long, default_value_t = 100)]
    pause_ms: u64,

    // ========================================================================
    // Configuration
    // ========================================================================
    /// Configuration file (TOML, YAML or JSON). Falls back to defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    // ========================================================================
    // Output Control
    // ========================================================================
    /// Output directory for JSON results
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Print failure breakdown and violations under each scenario
    #[arg(long)]
    breakdown: bool,

    /// Verbose logging
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Quiet mode (only errors are logged)
    #[arg(long, short = 'q')]
    quiet: bool,
}

fn parse_scenario(raw: &str) -> Result<(String, ScenarioSpec), String> {
    let (name, spec) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected `name=N:C`, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing scenario name in `{raw}`"));
    }
    Ok((name.to_string(), spec.parse()?))
}

fn init_tracing(cli: &Cli) {
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let settings = match &cli.config {
        Some(path) => Settings::load(path),
        None => Settings::from_env(),
    };
    let config = RunnerConfig::from(&settings);

    let registry = Registry::for_environment(cli.environment);
    let engine = RunnerEngine::from_registry(&registry, config)
        .context("failed to assemble runner from registry")?;

    let mut reporters: Vec<Box<dyn Reporter>> =
        vec![Box::new(ConsoleReporter::new().show_breakdown(cli.breakdown))];
    if let Some(dir) = &cli.output_dir {
        reporters.push(Box::new(JsonReporter::new(dir.clone())));
    }

    let runner = ScenarioRunner::new(engine)
        .suite(cli.suite.clone())
        .pause(Duration::from_millis(cli.pause_ms))
        .reporters(reporters);

    let report = runner.run_suite(cli.scenarios.clone()).await;

    let failures = report.failures();
    if !failures.is_empty() {
        for (name, violations) in &failures {
            for violation in violations.iter() {
                tracing::error!(scenario = %name, %violation, "SLO violated");
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
