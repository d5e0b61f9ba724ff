//! Autonomous shell-command agent.
//!
//! `shellpilot run <TASK>` asks the configured completion service for one
//! shell command at a time, runs it in the working directory, and feeds the
//! result back until the task is reported complete.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use shellpilot::exit_codes;
use shellpilot::io::completion::build_completion;
use shellpilot::io::config::{
    AgentConfig, Provider, RunOverrides, default_config_path, load_config, write_config,
};
use shellpilot::logging;
use shellpilot::looping::{self, LoopEvent, LoopOutcome, LoopStop, RunConfig};

/// Steps shown after a failed run.
const FAILURE_TAIL_STEPS: usize = 3;

#[derive(Parser)]
#[command(
    name = "shellpilot",
    version,
    about = "Autonomous shell-command agent driven by a text-completion service"
)]
struct Cli {
    /// Config file (defaults to ~/.shellpilot.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the effective configuration with secrets redacted.
    Config,
    /// Run the agent on a task.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Maximum number of iterations.
    #[arg(short = 'm', long = "max-commands", value_name = "N")]
    max_commands: Option<u32>,

    /// Simulate commands instead of executing them.
    #[arg(short, long)]
    dry_run: bool,

    /// Show plans, progress and debug diagnostics.
    #[arg(short, long)]
    verbose: bool,

    /// Print only the final result.
    #[arg(short, long)]
    quiet: bool,

    /// Completion backend (overrides the config file).
    #[arg(short, long, value_enum)]
    provider: Option<Provider>,

    /// Exempt commands starting with CMD from the dangerous-pattern blocklist.
    #[arg(long = "allow", value_name = "CMD")]
    allow: Vec<String>,

    /// Directory commands run in (defaults to the current directory).
    #[arg(long, value_name = "DIR")]
    workdir: Option<PathBuf>,

    /// Task description.
    #[arg(required = true, value_name = "TASK")]
    task: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn dispatch(cli: Cli) -> Result<i32> {
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    match cli.command {
        Command::Init { force } => cmd_init(&config_path, force),
        Command::Config => cmd_config(&config_path),
        Command::Run(args) => cmd_run(&config_path, args),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    write_config(path, &AgentConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_config(path: &Path) -> Result<i32> {
    let cfg = load_config(path)?;
    let rendered = toml::to_string_pretty(&cfg.redacted()).context("serialize config toml")?;
    println!("# {}", path.display());
    print!("{rendered}");
    Ok(exit_codes::OK)
}

fn cmd_run(path: &Path, args: RunArgs) -> Result<i32> {
    let overrides = RunOverrides {
        provider: args.provider,
        max_commands: args.max_commands,
        dry_run: args.dry_run,
        verbose: args.verbose,
        quiet: args.quiet,
        allowed_commands: args.allow,
    };
    let cfg = overrides.apply(load_config(path)?)?;
    logging::init(
        logging::default_level(cfg.run.verbose, cfg.run.quiet),
        cfg.run.log_file.as_deref(),
    )?;

    let task = args.task.join(" ");
    if task.trim().is_empty() {
        bail!("task must not be empty");
    }
    let workdir = resolve_workdir(args.workdir)?;
    let completion = build_completion(&cfg)?;
    let config = RunConfig::new(&task, &cfg, workdir);

    if !config.quiet {
        println!("Task: {}", config.task);
        println!(
            "Provider: {} | max commands: {} | dry run: {}",
            cfg.provider.as_str(),
            config.max_iterations,
            config.dry_run
        );
        println!("Working directory: {}", config.workdir.display());
    }

    let (quiet, verbose) = (config.quiet, config.verbose);
    match looping::run(&config, completion.as_ref(), |event| {
        if !quiet {
            print_event(event, verbose);
        }
    }) {
        Ok(outcome) => Ok(report(outcome)),
        Err(err) => {
            eprintln!("run failed: {err:#}");
            Ok(exit_codes::FAILED)
        }
    }
}

fn resolve_workdir(requested: Option<PathBuf>) -> Result<PathBuf> {
    let dir = match requested {
        Some(dir) => dir,
        None => std::env::current_dir().context("read current directory")?,
    };
    let dir = fs::canonicalize(&dir).with_context(|| format!("resolve {}", dir.display()))?;
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    Ok(dir)
}

fn print_event(event: &LoopEvent<'_>, verbose: bool) {
    match event {
        LoopEvent::IterationStarted {
            iteration,
            max_iterations,
        } => println!("\n[{iteration}/{max_iterations}]"),
        LoopEvent::ParseFailed { error, .. } => println!("Could not parse reply: {error}"),
        LoopEvent::Reply { reply, .. } => {
            if !reply.thought.is_empty() {
                println!("Thought: {}", reply.thought);
            }
            if verbose {
                if let Some(plan) = &reply.plan {
                    println!("Plan: {plan}");
                }
                if let Some(progress) = &reply.progress {
                    println!("Progress: {progress}");
                }
            }
        }
        LoopEvent::EmptyCommand { .. } => println!("Reply had no command, skipping"),
        LoopEvent::StepRecorded { step } => {
            println!("$ {}", step.command);
            let output = step.output.trim_end();
            if !output.is_empty() {
                println!("{output}");
            }
            if !step.error.is_empty() {
                println!("Error: {}", step.error);
            }
        }
        LoopEvent::Finished { .. } => {}
    }
}

fn report(outcome: LoopOutcome) -> i32 {
    if let LoopStop::Done { progress } = &outcome.stop {
        println!("\nTask completed in {} iterations.", outcome.iterations);
        if let Some(progress) = progress {
            println!("{progress}");
        }
        return exit_codes::OK;
    }
    let tail = outcome.history.render_tail(FAILURE_TAIL_STEPS);
    if let Err(err) = outcome.into_result() {
        eprintln!("\nerror: {err}");
    }
    eprintln!("{tail}");
    exit_codes::EXHAUSTED
}
