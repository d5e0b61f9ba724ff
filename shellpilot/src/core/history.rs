//! Bounded step history: the agent's only memory of its own past actions.

use std::collections::VecDeque;

use anyhow::{Result, bail};

use crate::core::types::Step;

const EMPTY_HISTORY: &str = "No previous commands executed.";

/// Ordered FIFO of the most recent steps, capped at `capacity`.
#[derive(Debug, Clone)]
pub struct History {
    steps: VecDeque<Step>,
    capacity: usize,
    last_seq: Option<u32>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            steps: VecDeque::with_capacity(capacity + 1),
            capacity,
            last_seq: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Append a step, evicting the oldest entry once capacity is exceeded.
    ///
    /// Sequence numbers must strictly increase for the life of the history,
    /// including across evictions.
    pub fn append(&mut self, step: Step) -> Result<()> {
        if let Some(last) = self.last_seq
            && step.seq <= last
        {
            bail!(
                "step sequence must increase: got {} after {}",
                step.seq,
                last
            );
        }
        self.last_seq = Some(step.seq);
        self.steps.push_back(step);
        while self.steps.len() > self.capacity {
            self.steps.pop_front();
        }
        Ok(())
    }

    /// Read-only view of the retained steps, oldest first.
    pub fn snapshot(&self) -> impl DoubleEndedIterator<Item = &Step> + ExactSizeIterator {
        self.steps.iter()
    }

    /// Commands of the last `window` steps, oldest first.
    pub fn recent_commands(&self, window: usize) -> impl Iterator<Item = &str> {
        let skip = self.steps.len().saturating_sub(window);
        self.steps.iter().skip(skip).map(|step| step.command.as_str())
    }

    /// Render the history for prompt context, oldest to newest.
    pub fn render(&self) -> String {
        render_steps(self.steps.iter())
    }

    /// Render only the last `count` steps (used for failure summaries).
    pub fn render_tail(&self, count: usize) -> String {
        let skip = self.steps.len().saturating_sub(count);
        render_steps(self.steps.iter().skip(skip))
    }
}

fn render_steps<'a>(steps: impl Iterator<Item = &'a Step>) -> String {
    let mut buf = String::new();
    for step in steps {
        if buf.is_empty() {
            buf.push_str("Previous command history:\n");
        }
        buf.push_str(&format!("\nStep {}:\n", step.seq));
        buf.push_str(&format!("Thought: {}\n", step.thought));
        buf.push_str(&format!("Command: {}\n", step.command));
        if !step.output.is_empty() {
            buf.push_str(&format!("Output: {}\n", step.output));
        }
        if !step.error.is_empty() {
            buf.push_str(&format!("Error: {}\n", step.error));
        }
        buf.push_str(&format!("Success: {}\n", step.success));
    }
    if buf.is_empty() {
        return EMPTY_HISTORY.to_string();
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn step(seq: u32, command: &str) -> Step {
        Step::executed(
            seq,
            "thinking",
            command,
            String::new(),
            None,
            Duration::ZERO,
        )
    }

    #[test]
    fn append_evicts_oldest_beyond_capacity() {
        let mut history = History::new(3);
        for seq in 1..=5 {
            history.append(step(seq, &format!("echo {seq}"))).expect("append");
            assert!(history.len() <= 3);
        }
        let seqs: Vec<u32> = history.snapshot().map(|s| s.seq).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[test]
    fn append_rejects_non_increasing_sequence() {
        let mut history = History::new(3);
        history.append(step(2, "ls")).expect("append");
        let err = history.append(step(2, "pwd")).unwrap_err();
        assert!(err.to_string().contains("must increase"));
        assert!(history.append(step(1, "pwd")).is_err());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn sequence_check_survives_eviction() {
        let mut history = History::new(1);
        history.append(step(4, "a")).expect("append");
        history.append(step(5, "b")).expect("append");
        assert!(history.append(step(4, "c")).is_err());
    }

    #[test]
    fn recent_commands_respects_window() {
        let mut history = History::new(10);
        for (seq, cmd) in ["a", "b", "c", "d"].iter().enumerate() {
            history.append(step(seq as u32 + 1, cmd)).expect("append");
        }
        let recent: Vec<&str> = history.recent_commands(3).collect();
        assert_eq!(recent, vec!["b", "c", "d"]);
        let all: Vec<&str> = history.recent_commands(10).collect();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn empty_history_renders_placeholder() {
        assert_eq!(History::new(5).render(), EMPTY_HISTORY);
    }

    #[test]
    fn render_reproduces_step_fields_verbatim() {
        let mut history = History::new(5);
        history
            .append(Step::executed(
                7,
                "look around",
                "ls -la",
                "total 0\nfile.txt".to_string(),
                Some("exit status 2".to_string()),
                Duration::from_millis(5),
            ))
            .expect("append");

        let rendered = history.render();
        assert!(rendered.starts_with("Previous command history:\n"));
        assert!(rendered.contains("Step 7:\n"));
        assert!(rendered.contains("Thought: look around\n"));
        assert!(rendered.contains("Command: ls -la\n"));
        assert!(rendered.contains("Output: total 0\nfile.txt\n"));
        assert!(rendered.contains("Error: exit status 2\n"));
        assert!(rendered.contains("Success: false\n"));
    }

    #[test]
    fn render_omits_empty_output_and_error() {
        let mut history = History::new(5);
        history.append(step(1, "true")).expect("append");
        let rendered = history.render();
        assert!(!rendered.contains("Output:"));
        assert!(!rendered.contains("Error:"));
        assert!(rendered.contains("Success: true"));
    }

    #[test]
    fn render_tail_limits_steps() {
        let mut history = History::new(5);
        for seq in 1..=4 {
            history.append(step(seq, &format!("cmd{seq}"))).expect("append");
        }
        let tail = history.render_tail(2);
        assert!(!tail.contains("cmd2"));
        assert!(tail.contains("cmd3"));
        assert!(tail.contains("cmd4"));
    }
}
