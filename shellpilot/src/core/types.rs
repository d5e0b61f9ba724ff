//! Shared deterministic types for the agent loop.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Sentinel command text that signals task completion.
pub const TASK_COMPLETE: &str = "TASK_COMPLETE";

/// One executed (or rejected) loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Iteration number that produced this step (1-indexed).
    pub seq: u32,
    pub timestamp: DateTime<Utc>,
    /// Rationale the completion service gave for the command.
    pub thought: String,
    /// Literal shell text.
    pub command: String,
    /// Combined stdout + stderr.
    pub output: String,
    /// Empty when the command succeeded.
    pub error: String,
    pub success: bool,
    pub duration: Duration,
}

impl Step {
    /// Step for a command that ran (or was simulated) and may have failed.
    pub fn executed(
        seq: u32,
        thought: &str,
        command: &str,
        output: String,
        error: Option<String>,
        duration: Duration,
    ) -> Self {
        let error = error.unwrap_or_default();
        Self {
            seq,
            timestamp: Utc::now(),
            thought: thought.to_string(),
            command: command.to_string(),
            output,
            success: error.is_empty(),
            error,
            duration,
        }
    }

    /// Step for a command that was never executed because validation rejected it.
    pub fn rejected(seq: u32, thought: &str, command: &str, reason: String) -> Self {
        Self {
            seq,
            timestamp: Utc::now(),
            thought: thought.to_string(),
            command: command.to_string(),
            output: String::new(),
            error: reason,
            success: false,
            duration: Duration::ZERO,
        }
    }
}

/// Structured reply extracted from one completion-service response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentReply {
    /// The completion service reports the task finished.
    pub completed: bool,
    /// Shell text to run. `None` when the reply carried no command field.
    pub command: Option<String>,
    pub thought: String,
    /// Longer-range strategy, carried forward into later prompts.
    pub plan: Option<String>,
    /// Summary of what has been accomplished so far.
    pub progress: Option<String>,
}

impl AgentReply {
    /// Command to execute, or `None` when there is nothing actionable.
    ///
    /// Completed replies never yield a command, even if one was present.
    pub fn actionable_command(&self) -> Option<&str> {
        if self.completed {
            return None;
        }
        self.command
            .as_deref()
            .map(str::trim)
            .filter(|cmd| !cmd.is_empty())
    }
}
