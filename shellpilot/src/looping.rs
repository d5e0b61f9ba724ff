//! Task loop: ask, parse, validate, execute, record, repeat.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::core::history::History;
use crate::core::parser::{ParseError, parse_reply};
use crate::core::safety::SafetyPolicy;
use crate::core::types::{AgentReply, Step};
use crate::io::completion::Completion;
use crate::io::config::AgentConfig;
use crate::io::environment::probe_environment;
use crate::io::executor::{ExecRequest, Executor, ShellExecutor, execute};
use crate::io::prompt::PromptBuilder;

/// Immutable settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub task: String,
    pub max_iterations: u32,
    pub dry_run: bool,
    pub verbose: bool,
    pub quiet: bool,
    /// Leading tokens exempt from the dangerous-pattern blocklist.
    pub allowed_commands: Vec<String>,
    pub history_capacity: usize,
    pub repetition_window: usize,
    pub command_timeout: Duration,
    pub output_limit_bytes: usize,
    /// Every command runs here; there is no persistent shell state.
    pub workdir: PathBuf,
    pub shell: String,
}

impl RunConfig {
    pub fn new(task: &str, cfg: &AgentConfig, workdir: PathBuf) -> Self {
        Self {
            task: task.trim().to_string(),
            max_iterations: cfg.run.max_commands,
            dry_run: cfg.run.dry_run,
            verbose: cfg.run.verbose,
            quiet: cfg.run.quiet,
            allowed_commands: cfg.run.allowed_commands.clone(),
            history_capacity: cfg.limits.history_capacity,
            repetition_window: cfg.limits.repetition_window,
            command_timeout: Duration::from_secs(cfg.limits.command_timeout_secs),
            output_limit_bytes: cfg.limits.output_limit_bytes,
            workdir,
            shell: cfg.limits.shell.clone(),
        }
    }
}

/// Progress reported to the caller while the loop runs.
#[derive(Debug)]
pub enum LoopEvent<'a> {
    IterationStarted {
        iteration: u32,
        max_iterations: u32,
    },
    /// The completion text could not be turned into a reply; the tick is skipped.
    ParseFailed {
        iteration: u32,
        error: &'a ParseError,
    },
    Reply {
        iteration: u32,
        reply: &'a AgentReply,
    },
    /// The reply carried an empty command; the tick is skipped.
    EmptyCommand { iteration: u32 },
    StepRecorded { step: &'a Step },
    Finished { iterations: u32, stop: &'a LoopStop },
}

/// Reason why the loop stopped without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The completion service reported the task finished.
    Done { progress: Option<String> },
    /// The iteration budget ran out.
    Exhausted { max_iterations: u32 },
}

/// Summary of a run.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Iterations consumed, including skipped ticks.
    pub iterations: u32,
    pub stop: LoopStop,
    pub history: History,
}

impl LoopOutcome {
    /// Turn an exhausted run into a [`BudgetExhaustedError`].
    pub fn into_result(self) -> Result<Self> {
        match self.stop {
            LoopStop::Exhausted { max_iterations } => {
                Err(BudgetExhaustedError { max_iterations }.into())
            }
            LoopStop::Done { .. } => Ok(self),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("reached maximum number of commands ({max_iterations})")]
pub struct BudgetExhaustedError {
    pub max_iterations: u32,
}

/// Run the task against the real shell in `config.workdir`.
///
/// Probes the environment once, then drives [`run_task`].
pub fn run<C: Completion + ?Sized, F: FnMut(&LoopEvent<'_>)>(
    config: &RunConfig,
    completion: &C,
    on_event: F,
) -> Result<LoopOutcome> {
    let facts = probe_environment(&config.workdir);
    let prompts = PromptBuilder::new(&config.task, &facts, config.history_capacity)?;
    let executor = ShellExecutor::new(config.shell.clone());
    run_task(completion, &executor, &prompts, config, on_event)
}

/// Drive the loop until the reply says the task is complete or the budget runs out.
///
/// Only a completion failure ends the run with an error. Parse failures and
/// empty commands skip the tick; rejected and failed commands are recorded
/// as failed steps. Every tick counts against the budget.
pub fn run_task<C, E, F>(
    completion: &C,
    executor: &E,
    prompts: &PromptBuilder,
    config: &RunConfig,
    mut on_event: F,
) -> Result<LoopOutcome>
where
    C: Completion + ?Sized,
    E: Executor + ?Sized,
    F: FnMut(&LoopEvent<'_>),
{
    let policy = SafetyPolicy::new(config.allowed_commands.clone(), config.repetition_window);
    let mut history = History::new(config.history_capacity);
    let mut plan: Option<String> = None;
    let mut progress: Option<String> = None;
    info!(
        backend = completion.name(),
        max_iterations = config.max_iterations,
        dry_run = config.dry_run,
        "starting task"
    );

    let mut iteration = 0u32;
    loop {
        iteration += 1;
        if iteration > config.max_iterations {
            let stop = LoopStop::Exhausted {
                max_iterations: config.max_iterations,
            };
            warn!(max_iterations = config.max_iterations, "iteration budget exhausted");
            return Ok(finish(config.max_iterations, stop, history, &mut on_event));
        }
        on_event(&LoopEvent::IterationStarted {
            iteration,
            max_iterations: config.max_iterations,
        });

        let user = prompts.user_prompt(&history, plan.as_deref())?;
        let raw = match completion.complete(prompts.system_prompt(), &user) {
            Ok(raw) => raw,
            Err(err) => {
                error!(iteration, err = %err, "completion request failed");
                return Err(err).with_context(|| {
                    format!("{} completion failed on iteration {iteration}", completion.name())
                });
            }
        };

        let reply = match parse_reply(&raw) {
            Ok(reply) => reply,
            Err(err) => {
                warn!(iteration, err = %err, "skipping unparseable reply");
                on_event(&LoopEvent::ParseFailed {
                    iteration,
                    error: &err,
                });
                continue;
            }
        };
        if let Some(p) = non_empty(reply.plan.as_deref()) {
            plan = Some(p);
        }
        if let Some(p) = non_empty(reply.progress.as_deref()) {
            progress = Some(p);
        }
        info!(iteration, thought = %reply.thought, completed = reply.completed, "reply received");
        on_event(&LoopEvent::Reply {
            iteration,
            reply: &reply,
        });

        if reply.completed {
            let stop = LoopStop::Done { progress };
            return Ok(finish(iteration, stop, history, &mut on_event));
        }
        let Some(command) = reply.actionable_command() else {
            info!(iteration, "reply has an empty command, skipping");
            on_event(&LoopEvent::EmptyCommand { iteration });
            continue;
        };

        let step = match policy.validate(command, &history) {
            Err(rejection) => {
                warn!(iteration, command, reason = %rejection, "command rejected");
                Step::rejected(iteration, &reply.thought, command, rejection.to_string())
            }
            Ok(()) => {
                let request = ExecRequest {
                    command: command.to_string(),
                    workdir: config.workdir.clone(),
                    timeout: config.command_timeout,
                    output_limit_bytes: config.output_limit_bytes,
                };
                match execute(executor, &request, config.dry_run) {
                    Ok(outcome) => Step::executed(
                        iteration,
                        &reply.thought,
                        command,
                        outcome.output,
                        outcome.error,
                        outcome.duration,
                    ),
                    Err(err) => {
                        error!(iteration, command, err = %err, "command could not be started");
                        Step::executed(
                            iteration,
                            &reply.thought,
                            command,
                            String::new(),
                            Some(format!("{err:#}")),
                            Duration::ZERO,
                        )
                    }
                }
            }
        };
        info!(
            iteration,
            command = %step.command,
            success = step.success,
            error = %step.error,
            "step recorded"
        );
        on_event(&LoopEvent::StepRecorded { step: &step });
        history.append(step)?;
    }
}

fn finish<F: FnMut(&LoopEvent<'_>)>(
    iterations: u32,
    stop: LoopStop,
    history: History,
    on_event: &mut F,
) -> LoopOutcome {
    info!(iterations, stop = ?stop, "task loop finished");
    on_event(&LoopEvent::Finished {
        iterations,
        stop: &stop,
    });
    LoopOutcome {
        iterations,
        stop,
        history,
    }
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
