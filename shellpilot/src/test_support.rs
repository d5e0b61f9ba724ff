//! Scripted collaborators for exercising the agent loop without a network or a shell.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::io::completion::{Completion, CompletionError};
use crate::io::config::AgentConfig;
use crate::io::executor::{ExecOutcome, ExecRequest, Executor};
use crate::looping::RunConfig;

/// Completion backend that replays queued replies and records every prompt.
///
/// Once the queue is empty it keeps returning `repeat` if set, otherwise it
/// fails like a backend that went away.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, CompletionError>>>,
    repeat: Option<String>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<Result<String, CompletionError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            repeat: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn from_texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    /// Answer every request with the same text.
    pub fn repeating(text: &str) -> Self {
        Self {
            repeat: Some(text.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().expect("prompts lock").len()
    }

    pub fn user_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .iter()
            .map(|(_, user)| user.clone())
            .collect()
    }

    pub fn system_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .iter()
            .map(|(system, _)| system.clone())
            .collect()
    }
}

impl Completion for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push((system.to_string(), user.to_string()));
        match self.replies.lock().expect("replies lock").pop_front() {
            Some(reply) => reply,
            None => self
                .repeat
                .clone()
                .ok_or_else(|| CompletionError::Backend("script exhausted".to_string())),
        }
    }
}

enum Behavior {
    Succeed,
    FailToStart(String),
}

/// Executor that records requests and returns canned outcomes without spawning.
pub struct RecordingExecutor {
    behavior: Behavior,
    requests: Mutex<Vec<ExecRequest>>,
}

impl RecordingExecutor {
    /// Every command succeeds with output `ran: <command>`.
    pub fn succeeding() -> Self {
        Self {
            behavior: Behavior::Succeed,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every command fails before it could run.
    pub fn failing_to_start(message: &str) -> Self {
        Self {
            behavior: Behavior::FailToStart(message.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .map(|r| r.command.clone())
            .collect()
    }

    pub fn spawn_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

impl Executor for RecordingExecutor {
    fn exec(&self, request: &ExecRequest) -> Result<ExecOutcome> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        match &self.behavior {
            Behavior::Succeed => Ok(ExecOutcome {
                output: format!("ran: {}", request.command),
                error: None,
                duration: Duration::from_millis(1),
            }),
            Behavior::FailToStart(message) => Err(anyhow!("{message}")),
        }
    }
}

/// Scratch working directory for a run.
pub struct TestWorkspace {
    temp: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp: tempfile::tempdir()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Default run settings rooted in this workspace.
    pub fn run_config(&self, task: &str, max_iterations: u32) -> RunConfig {
        let mut cfg = AgentConfig::default();
        cfg.run.max_commands = max_iterations;
        RunConfig::new(task, &cfg, self.root().to_path_buf())
    }
}
