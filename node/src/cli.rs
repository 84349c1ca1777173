//! # CLI Interface
//!
//! Defines the command-line argument structure for `poolvault-node` using
//! `clap` derive. Supports three subcommands: `run`, `demo`, and `version`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// PoolVault operator tool.
///
/// Runs vault scenarios against an in-memory deployment (controller plus
/// asset ledger), printing a JSON report of every step, the final vault
/// books and the emitted events.
#[derive(Parser, Debug)]
#[command(
    name = "poolvault-node",
    about = "PoolVault scenario runner",
    version,
    propagate_version = true
)]
pub struct PoolVaultCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the PoolVault binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a scenario file.
    Run(RunArgs),
    /// Execute the built-in two-depositor scenario (90% pool, 90% dilution).
    Demo(OutputArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the scenario file (JSON).
    #[arg(long, short = 's', env = "POOLVAULT_SCENARIO")]
    pub scenario: PathBuf,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Logging and reporting options shared by `run` and `demo`.
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Default log filter when `RUST_LOG` is not set.
    #[arg(
        long,
        env = "POOLVAULT_LOG_LEVEL",
        default_value = "poolvault_node=info,poolvault_contracts=info,poolvault_protocol=info"
    )]
    pub log_level: String,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "POOLVAULT_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Write Prometheus text-format metrics to this file after the run.
    #[arg(long, env = "POOLVAULT_METRICS_FILE")]
    pub metrics_file: Option<PathBuf>,

    /// Pretty-print the JSON report.
    #[arg(long, default_value_t = false)]
    pub pretty: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        PoolVaultCli::command().debug_assert();
    }

    #[test]
    fn run_parses_scenario_and_output_flags() {
        let cli = PoolVaultCli::try_parse_from([
            "poolvault-node",
            "run",
            "--scenario",
            "s.json",
            "--log-format",
            "json",
            "--pretty",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.scenario, PathBuf::from("s.json"));
                assert_eq!(args.output.log_format, "json");
                assert!(args.output.pretty);
                assert!(args.output.metrics_file.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
