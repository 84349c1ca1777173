//! # Operator Logging
//!
//! Every vault state change is already narrated by `tracing` in the library
//! crates (`deposit`, `redeem`, `reserve claimed`, rejected calls at `warn`).
//! This module only decides where those lines go and how they look.
//!
//! Logs always go to stderr. Stdout carries the JSON scenario report, so
//! `poolvault-node run -s file.json > report.json` yields a clean document
//! whatever the log level.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Colored multi-field lines for a terminal.
    Pretty,
    /// One JSON object per line with event fields (`vault`, `amount`,
    /// `shares`, ...) at the top level, for `jq` or a log shipper.
    Json,
}

impl LogFormat {
    /// `"json"` (any case) selects [`LogFormat::Json`]; anything else falls
    /// back to [`LogFormat::Pretty`] rather than failing the run.
    pub fn from_str_lossy(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// `RUST_LOG` if set and non-empty, otherwise `default_directives`
/// (normally `--log-level` / `POOLVAULT_LOG_LEVEL`).
fn filter(default_directives: &str) -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(default_directives),
    }
}

/// Installs the global subscriber for a scenario run.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(default_directives: &str, format: LogFormat) -> Result<()> {
    let env_filter = filter(default_directives);
    let directives = env_filter.to_string();

    let installed = match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))?;

    tracing::debug!(?format, %directives, "logging ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_is_lenient() {
        assert_eq!(LogFormat::from_str_lossy("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str_lossy("yaml"), LogFormat::Pretty);
    }

    #[test]
    fn default_directives_are_kept() {
        // Only meaningful when the test runner has no RUST_LOG of its own.
        if std::env::var("RUST_LOG").is_err() {
            let f = filter("poolvault_contracts=debug");
            assert!(f.to_string().contains("poolvault_contracts=debug"));
        }
    }

    #[test]
    fn second_install_is_an_error_not_a_panic() {
        // Whichever call comes first in this process may win; the second
        // must report failure instead of panicking.
        let first = init_logging("warn", LogFormat::Pretty);
        let second = init_logging("warn", LogFormat::Json);
        assert!(first.is_err() || second.is_err());
    }
}
