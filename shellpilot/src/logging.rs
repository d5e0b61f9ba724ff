//! Diagnostic tracing for the agent.
//!
//! Tracing goes to stderr (and optionally a log file). Per-iteration progress
//! shown to the user is printed by the CLI from loop events instead.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub fn default_level(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    }
}

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, falling back to `default_level`. Output: compact stderr,
/// plus plain-text lines appended to `log_file` when given.
///
/// # Example
/// ```bash
/// RUST_LOG=shellpilot=debug shellpilot run "list files"
/// ```
pub fn init(default_level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_wins_over_verbose() {
        assert_eq!(default_level(true, true), "error");
        assert_eq!(default_level(true, false), "debug");
        assert_eq!(default_level(false, false), "warn");
    }
}
