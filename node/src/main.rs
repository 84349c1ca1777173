// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # PoolVault Node
//!
//! Entry point for the `poolvault-node` binary. Parses CLI arguments,
//! initializes logging and metrics, executes a vault scenario against an
//! in-memory deployment, and prints the JSON report on stdout.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — execute a scenario file
//! - `demo`    — execute the built-in two-depositor scenario
//! - `version` — print build version information

mod cli;
mod logging;
mod metrics;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;

use cli::{Commands, OutputArgs, PoolVaultCli};
use logging::LogFormat;
use metrics::VaultMetrics;
use scenario::{Scenario, ScenarioRunner};

fn main() -> Result<()> {
    let cli = PoolVaultCli::parse();

    match cli.command {
        Commands::Run(args) => {
            init(&args.output)?;
            let scenario = Scenario::load(&args.scenario)?;
            tracing::info!(
                path = %args.scenario.display(),
                steps = scenario.steps.len(),
                "scenario loaded"
            );
            execute(&scenario, &args.output)
        }
        Commands::Demo(output) => {
            init(&output)?;
            execute(&Scenario::demo(), &output)
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn init(output: &OutputArgs) -> Result<()> {
    logging::init_logging(&output.log_level, LogFormat::from_str_lossy(&output.log_format))
}

/// Runs the scenario, writes the report to stdout and, if requested, the
/// metrics to a file.
fn execute(scenario: &Scenario, output: &OutputArgs) -> Result<()> {
    let metrics = Arc::new(VaultMetrics::new().context("failed to register metrics")?);

    let mut runner = ScenarioRunner::new(scenario, Some(metrics.clone()))?;
    let report = runner.run(scenario);

    // Metrics are written even when a step aborted the run.
    if let Some(path) = &output.metrics_file {
        let text = metrics.encode().context("failed to encode metrics")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write metrics to {}", path.display()))?;
        tracing::info!(path = %path.display(), "metrics written");
    }

    let report = report?;
    tracing::info!(
        controller = %report.controller,
        steps = report.steps.len(),
        vaults = report.vaults.len(),
        events = report.events.len(),
        "scenario complete"
    );

    let json = if output.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{json}").context("failed to write report")?;
    Ok(())
}

/// Prints version and build information to stdout.
fn print_version() {
    println!("poolvault-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol version: {}", poolvault_protocol::config::PROTOCOL_VERSION);
    println!("rust edition: 2021");
    println!("license: MIT");
}
