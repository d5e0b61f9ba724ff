//! Textual safety checks applied to every proposed command before execution.
//!
//! This is a best-effort filter that catches common mistakes and obviously
//! destructive commands. It is not a sandbox.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::history::History;

/// Substrings that block a command unless its leading token is allow-listed.
pub const BLOCKED_PATTERNS: &[&str] = &[
    "rm -rf /",
    "sudo rm",
    "mkfs",
    "dd if=",
    ":(){ :|:& };:",
    "chmod -R 777 /",
    "chown -R",
    "> /dev/",
    "curl",
    "wget",
    "sudo",
    "su -",
    "passwd",
    "useradd",
    "userdel",
];

static CD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*cd(\s|;|&|$)").expect("cd pattern is valid")
});
static MKDIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*mkdir(\s|$)").expect("mkdir pattern is valid")
});
static ECHO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[\s;&|(])echo\s").expect("echo pattern is valid"));

/// Why a command was refused. The message is fed back to the completion service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error(
        "cd commands don't work in this environment (each command runs in a fresh shell) - use full or relative paths instead"
    )]
    ChangeDirectory,

    #[error("use 'mkdir -p' so the command succeeds when the directory already exists")]
    NonIdempotentMkdir,

    #[error("use 'cat > file << 'EOF'' instead of echo with \\n escapes for multi-line files")]
    EchoNewlineEscapes,

    #[error("command was already tried in the last {window} steps - avoid repetition")]
    Repeated { window: usize },

    #[error("dangerous command blocked: matches '{pattern}'")]
    Blocked { pattern: String },
}

/// Validation policy for one run.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    allowed_commands: Vec<String>,
    repetition_window: usize,
}

impl SafetyPolicy {
    pub fn new(allowed_commands: Vec<String>, repetition_window: usize) -> Self {
        Self {
            allowed_commands,
            repetition_window,
        }
    }

    /// Check `command` against the structural rules, recent history, and the
    /// blocklist, stopping at the first violation.
    ///
    /// The allow-list only lifts the blocklist; structural and repetition
    /// checks always apply.
    pub fn validate(&self, command: &str, history: &History) -> Result<(), Rejection> {
        if CD_RE.is_match(command) {
            return Err(Rejection::ChangeDirectory);
        }
        if MKDIR_RE.is_match(command) && !requests_parents(command) {
            return Err(Rejection::NonIdempotentMkdir);
        }
        if ECHO_RE.is_match(command) && command.contains("\\n") {
            return Err(Rejection::EchoNewlineEscapes);
        }
        if history
            .recent_commands(self.repetition_window)
            .any(|previous| previous == command)
        {
            return Err(Rejection::Repeated {
                window: self.repetition_window,
            });
        }
        if let Some(pattern) = BLOCKED_PATTERNS.iter().find(|p| command.contains(*p)) {
            let allowed = leading_token(command)
                .is_some_and(|token| self.allowed_commands.iter().any(|a| a == &token));
            if !allowed {
                return Err(Rejection::Blocked {
                    pattern: (*pattern).to_string(),
                });
            }
        }
        Ok(())
    }
}

/// First word of the command, honoring shell quoting when it parses.
pub fn leading_token(command: &str) -> Option<String> {
    match shell_words::split(command) {
        Ok(words) => words.into_iter().next(),
        Err(_) => command.split_whitespace().next().map(str::to_string),
    }
}

/// True when the `mkdir` invocation asks for `-p` / `--parents`.
fn requests_parents(command: &str) -> bool {
    let first_segment = command
        .split(['&', ';', '|', '\n'])
        .next()
        .unwrap_or(command);
    first_segment.split_whitespace().skip(1).any(|arg| {
        arg == "--parents"
            || (arg.starts_with('-') && !arg.starts_with("--") && arg[1..].contains('p'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Step;
    use std::time::Duration;

    fn policy() -> SafetyPolicy {
        SafetyPolicy::new(Vec::new(), 3)
    }

    fn history_with(commands: &[&str]) -> History {
        let mut history = History::new(10);
        for (idx, cmd) in commands.iter().enumerate() {
            history
                .append(Step::executed(
                    idx as u32 + 1,
                    "t",
                    cmd,
                    String::new(),
                    None,
                    Duration::ZERO,
                ))
                .expect("append");
        }
        history
    }

    #[test]
    fn rejects_leading_cd() {
        let empty = History::new(5);
        for cmd in ["cd /tmp", "  cd src && make", "cd", "cd;ls"] {
            assert_eq!(
                policy().validate(cmd, &empty),
                Err(Rejection::ChangeDirectory),
                "{cmd}"
            );
        }
    }

    #[test]
    fn cd_rejection_ignores_allow_list() {
        let policy = SafetyPolicy::new(vec!["cd".to_string()], 3);
        assert_eq!(
            policy.validate("cd /tmp", &History::new(5)),
            Err(Rejection::ChangeDirectory)
        );
    }

    #[test]
    fn commands_starting_with_cd_prefix_word_are_fine() {
        assert_eq!(policy().validate("cdk deploy", &History::new(5)), Ok(()));
    }

    #[test]
    fn mkdir_requires_parents_flag() {
        let empty = History::new(5);
        assert_eq!(
            policy().validate("mkdir build", &empty),
            Err(Rejection::NonIdempotentMkdir)
        );
        assert_eq!(policy().validate("mkdir -p build/out", &empty), Ok(()));
        assert_eq!(policy().validate("mkdir -pv build", &empty), Ok(()));
        assert_eq!(policy().validate("mkdir --parents build", &empty), Ok(()));
        assert_eq!(
            policy().validate("mkdir build && ls -p", &empty),
            Err(Rejection::NonIdempotentMkdir)
        );
    }

    #[test]
    fn echo_with_newline_escapes_is_rejected() {
        let empty = History::new(5);
        assert_eq!(
            policy().validate(r"echo 'line1\nline2' > file.txt", &empty),
            Err(Rejection::EchoNewlineEscapes)
        );
        assert_eq!(policy().validate("echo hello > file.txt", &empty), Ok(()));
        assert_eq!(policy().validate(r"printf 'a\nb' > f", &empty), Ok(()));
    }

    #[test]
    fn repeated_command_within_window_is_rejected() {
        let history = history_with(&["ls -la", "pwd"]);
        assert_eq!(
            policy().validate("ls -la", &history),
            Err(Rejection::Repeated { window: 3 })
        );
    }

    #[test]
    fn repeated_command_outside_window_is_allowed() {
        let history = history_with(&["ls -la", "pwd", "whoami", "date"]);
        assert_eq!(policy().validate("ls -la", &history), Ok(()));
    }

    #[test]
    fn blocklist_rejects_dangerous_patterns() {
        let empty = History::new(5);
        assert_eq!(
            policy().validate("sudo apt install jq", &empty),
            Err(Rejection::Blocked {
                pattern: "sudo".to_string()
            })
        );
        assert!(matches!(
            policy().validate("curl https://example.com", &empty),
            Err(Rejection::Blocked { .. })
        ));
        assert!(matches!(
            policy().validate("rm -rf /", &empty),
            Err(Rejection::Blocked { .. })
        ));
    }

    #[test]
    fn allow_list_overrides_blocklist_by_leading_token() {
        let policy = SafetyPolicy::new(vec!["curl".to_string()], 3);
        let empty = History::new(5);
        assert_eq!(policy.validate("curl -s https://example.com", &empty), Ok(()));
        assert!(matches!(
            policy.validate("wget https://example.com", &empty),
            Err(Rejection::Blocked { .. })
        ));
    }

    #[test]
    fn rm_rf_build_is_not_blocked() {
        assert_eq!(policy().validate("rm -rf build", &History::new(5)), Ok(()));
    }

    #[test]
    fn leading_token_handles_quotes_and_fallback() {
        assert_eq!(leading_token("'my tool' --x"), Some("my tool".to_string()));
        assert_eq!(leading_token("echo \"unterminated"), Some("echo".to_string()));
        assert_eq!(leading_token("   "), None);
    }
}
