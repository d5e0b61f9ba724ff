//! Prompt builder for the completion service.
//!
//! The system prompt is rendered once per run from the task and the
//! environment probe. The user prompt is rendered every iteration from the
//! task, the latest plan, and the rendered step history.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::history::History;
use crate::core::types::TASK_COMPLETE;
use crate::io::environment::EnvironmentFacts;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const USER_TEMPLATE: &str = include_str!("prompts/user.md");

/// Renders prompts for one run.
#[derive(Debug)]
pub struct PromptBuilder {
    env: Environment<'static>,
    task: String,
    system: String,
}

impl PromptBuilder {
    /// Create a builder and render the system prompt up front.
    pub fn new(task: &str, facts: &EnvironmentFacts, history_capacity: usize) -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("system", SYSTEM_TEMPLATE)
            .context("load system prompt template")?;
        env.add_template("user", USER_TEMPLATE)
            .context("load user prompt template")?;

        let task = task.trim().to_string();
        let system = env
            .get_template("system")?
            .render(context! {
                task => &task,
                workdir => facts.workdir.display().to_string(),
                git => &facts.git,
                markers => &facts.project_markers,
                history_capacity => history_capacity,
                sentinel => TASK_COMPLETE,
            })
            .context("render system prompt")?;

        Ok(Self { env, task, system })
    }

    /// System instructions, identical for every iteration of the run.
    pub fn system_prompt(&self) -> &str {
        &self.system
    }

    /// Per-iteration content: task, current plan (if any), and history.
    pub fn user_prompt(&self, history: &History, plan: Option<&str>) -> Result<String> {
        let rendered = self
            .env
            .get_template("user")?
            .render(context! {
                task => &self.task,
                plan => plan.map(str::trim).filter(|p| !p.is_empty()),
                history => history.render().trim_end(),
            })
            .context("render user prompt")?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Step;
    use crate::io::environment::GitFacts;
    use std::path::PathBuf;
    use std::time::Duration;

    fn facts() -> EnvironmentFacts {
        EnvironmentFacts {
            workdir: PathBuf::from("/work/project"),
            git: Some(GitFacts {
                branch: Some("main".to_string()),
                changes: vec![" M src/lib.rs".to_string()],
                changes_omitted: 2,
            }),
            project_markers: vec!["Cargo.toml".to_string(), "Makefile".to_string()],
        }
    }

    #[test]
    fn system_prompt_includes_task_environment_and_contract() {
        let builder = PromptBuilder::new("  build the thing ", &facts(), 15).expect("builder");
        let system = builder.system_prompt();

        assert!(system.contains("TASK: build the thing\n"));
        assert!(system.contains("WORKING DIRECTORY: /work/project"));
        assert!(system.contains("- branch: main"));
        assert!(system.contains("  M src/lib.rs"));
        assert!(system.contains("... and 2 more"));
        assert!(system.contains("PROJECT FILES: Cargo.toml, Makefile"));
        assert!(system.contains("\"command\": \"TASK_COMPLETE\""));
        assert!(system.contains("Only the last 15 commands"));
        assert!(!system.contains("{{"));
    }

    #[test]
    fn system_prompt_without_repository_omits_git_section() {
        let facts = EnvironmentFacts {
            workdir: PathBuf::from("/tmp/x"),
            ..EnvironmentFacts::default()
        };
        let builder = PromptBuilder::new("task", &facts, 10).expect("builder");
        assert!(!builder.system_prompt().contains("GIT REPOSITORY"));
        assert!(!builder.system_prompt().contains("PROJECT FILES"));
    }

    #[test]
    fn detached_head_is_reported() {
        let mut facts = facts();
        facts.git = Some(GitFacts::default());
        let builder = PromptBuilder::new("task", &facts, 10).expect("builder");
        assert!(builder.system_prompt().contains("(detached HEAD)"));
        assert!(builder.system_prompt().contains("working tree clean"));
    }

    #[test]
    fn user_prompt_orders_task_plan_history_question() {
        let builder = PromptBuilder::new("list files", &facts(), 10).expect("builder");
        let mut history = History::new(10);
        history
            .append(Step::executed(
                1,
                "explore",
                "ls -la",
                "a.txt\n".to_string(),
                None,
                Duration::from_millis(3),
            ))
            .expect("append");

        let user = builder
            .user_prompt(&history, Some("1. look around"))
            .expect("render");
        let task = user.find("TASK: list files").expect("task");
        let plan = user.find("CURRENT PLAN:\n1. look around").expect("plan");
        let steps = user.find("Command: ls -la").expect("history");
        let question = user.find("What should I do next?").expect("question");
        assert!(task < plan && plan < steps && steps < question);
    }

    #[test]
    fn user_prompt_without_plan_or_history() {
        let builder = PromptBuilder::new("list files", &facts(), 10).expect("builder");
        let user = builder
            .user_prompt(&History::new(10), Some("   "))
            .expect("render");
        assert!(!user.contains("CURRENT PLAN"));
        assert!(user.contains("No previous commands executed."));
    }
}
