//! Command executor abstraction.
//!
//! The [`Executor`] trait decouples the agent loop from process spawning.
//! [`ShellExecutor`] runs commands under a shell; tests use recording
//! executors that return canned outcomes without spawning anything.

use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_combined_with_timeout;

/// Parameters for one command execution.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Shell text, passed to the interpreter as a single expression.
    pub command: String,
    /// Working directory for the subprocess.
    pub workdir: PathBuf,
    /// Hard wall-clock limit; the process group is killed when it elapses.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// What came back from running (or simulating) a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Combined stdout + stderr.
    pub output: String,
    /// Set for non-zero exit, signal termination, or timeout.
    pub error: Option<String>,
    pub duration: Duration,
}

/// Abstraction over command execution backends.
pub trait Executor {
    /// Run the request. `Err` is reserved for failures to run at all (spawn,
    /// pipe setup); a command that ran and failed is an `Ok` with `error` set.
    fn exec(&self, request: &ExecRequest) -> Result<ExecOutcome>;
}

/// Executor that runs commands as `<shell> -c <command>`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    fn command(&self, request: &ExecRequest) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C");
            c
        } else {
            let mut c = Command::new(&self.shell);
            c.arg("-c");
            c
        };
        cmd.arg(&request.command).current_dir(&request.workdir);
        cmd
    }
}

impl Executor for ShellExecutor {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn exec(&self, request: &ExecRequest) -> Result<ExecOutcome> {
        info!(command = %request.command, workdir = %request.workdir.display(), "executing command");
        let start = Instant::now();
        let output = run_combined_with_timeout(
            self.command(request),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run {} -c", self.shell))?;
        let duration = start.elapsed();

        let error = if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "command timed out");
            Some(format!(
                "command timed out after {}s",
                request.timeout.as_secs()
            ))
        } else if output.status.success() {
            None
        } else {
            warn!(exit_code = ?output.status.code(), "command failed");
            Some(match output.status.code() {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            })
        };

        debug!(duration_ms = duration.as_millis() as u64, "command completed");
        Ok(ExecOutcome {
            output: output.text(),
            error,
            duration,
        })
    }
}

/// Synthetic output recorded for a simulated command.
pub fn dry_run_output(command: &str) -> String {
    format!("[DRY RUN] Command: {command}")
}

/// Execute `request`, or simulate it without spawning anything when `dry_run` is set.
pub fn execute<E: Executor + ?Sized>(
    executor: &E,
    request: &ExecRequest,
    dry_run: bool,
) -> Result<ExecOutcome> {
    if dry_run {
        info!(command = %request.command, "dry run, command not executed");
        return Ok(ExecOutcome {
            output: dry_run_output(&request.command),
            error: None,
            duration: Duration::ZERO,
        });
    }
    executor.exec(request)
}
