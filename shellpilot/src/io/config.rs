//! Agent configuration stored in `~/.shellpilot.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = ".shellpilot.toml";
const REDACTED: &str = "<redacted>";

/// Completion backend used for a run.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Openai,
    Deepseek,
    Claude,
    Gemini,
    Ollama,
    Yandex,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Openai => "openai",
            Provider::Deepseek => "deepseek",
            Provider::Claude => "claude",
            Provider::Gemini => "gemini",
            Provider::Ollama => "ollama",
            Provider::Yandex => "yandex",
        }
    }
}

/// Agent configuration (TOML).
///
/// Intended to be edited by humans. Missing fields take defaults, and
/// command-line flags override the file through [`RunOverrides`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AgentConfig {
    pub provider: Provider,
    pub run: RunSection,
    pub limits: LimitsSection,
    pub completion: CompletionSection,
    pub openai: ApiBackend,
    pub deepseek: ApiBackend,
    pub claude: ApiBackend,
    pub gemini: ApiBackend,
    pub ollama: OllamaBackend,
    pub yandex: YandexBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunSection {
    /// Iteration budget before the run is declared exhausted.
    pub max_commands: u32,
    pub dry_run: bool,
    pub verbose: bool,
    pub quiet: bool,
    /// Also append diagnostics to this file.
    pub log_file: Option<PathBuf>,
    /// Leading tokens exempt from the dangerous-pattern blocklist.
    pub allowed_commands: Vec<String>,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            max_commands: 20,
            dry_run: false,
            verbose: false,
            quiet: false,
            log_file: None,
            allowed_commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsSection {
    /// Steps kept in history (and therefore in every prompt).
    pub history_capacity: usize,
    /// Recent steps checked for exact command repeats.
    pub repetition_window: usize,
    /// Wall-clock limit per command, in seconds.
    pub command_timeout_secs: u64,
    /// Truncate captured command output beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Interpreter invoked as `<shell> -c <command>`.
    pub shell: String,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            history_capacity: 15,
            repetition_window: 3,
            command_timeout_secs: 30,
            output_limit_bytes: 100_000,
            shell: "bash".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompletionSection {
    /// Upper bound for a single completion request, in seconds.
    pub request_timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: 120,
            max_tokens: 4000,
            temperature: 0.7,
        }
    }
}

/// Settings for a key-authenticated HTTP backend. Unset fields use the
/// backend's built-in defaults; a missing key falls back to the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiBackend {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OllamaBackend {
    pub base_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct YandexBackend {
    pub folder_id: Option<String>,
    pub iam_token: Option<String>,
    /// Model path appended to `gpt://<folder_id>/`.
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.run.max_commands == 0 {
            return Err(anyhow!("run.max_commands must be > 0"));
        }
        if self.limits.history_capacity == 0 {
            return Err(anyhow!("limits.history_capacity must be > 0"));
        }
        if self.limits.repetition_window > self.limits.history_capacity {
            return Err(anyhow!(
                "limits.repetition_window ({}) must not exceed limits.history_capacity ({})",
                self.limits.repetition_window,
                self.limits.history_capacity
            ));
        }
        if self.limits.command_timeout_secs == 0 {
            return Err(anyhow!("limits.command_timeout_secs must be > 0"));
        }
        if self.limits.output_limit_bytes == 0 {
            return Err(anyhow!("limits.output_limit_bytes must be > 0"));
        }
        if self.limits.shell.trim().is_empty() {
            return Err(anyhow!("limits.shell must not be empty"));
        }
        if self.completion.request_timeout_secs == 0 {
            return Err(anyhow!("completion.request_timeout_secs must be > 0"));
        }
        Ok(())
    }

    /// Copy of the config with every credential replaced, safe to print.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        for backend in [
            &mut cfg.openai,
            &mut cfg.deepseek,
            &mut cfg.claude,
            &mut cfg.gemini,
        ] {
            if backend.api_key.is_some() {
                backend.api_key = Some(REDACTED.to_string());
            }
        }
        if cfg.yandex.iam_token.is_some() {
            cfg.yandex.iam_token = Some(REDACTED.to_string());
        }
        cfg
    }
}

/// Command-line overrides layered on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub provider: Option<Provider>,
    pub max_commands: Option<u32>,
    pub dry_run: bool,
    pub verbose: bool,
    pub quiet: bool,
    pub allowed_commands: Vec<String>,
}

impl RunOverrides {
    /// Apply overrides to `base`. Boolean flags can only switch a setting on.
    pub fn apply(&self, mut base: AgentConfig) -> Result<AgentConfig> {
        if let Some(provider) = self.provider {
            base.provider = provider;
        }
        if let Some(max_commands) = self.max_commands {
            base.run.max_commands = max_commands;
        }
        base.run.dry_run |= self.dry_run;
        base.run.verbose |= self.verbose;
        base.run.quiet |= self.quiet;
        for allowed in &self.allowed_commands {
            if !base.run.allowed_commands.contains(allowed) {
                base.run.allowed_commands.push(allowed.clone());
            }
        }
        base.validate()?;
        Ok(base)
    }
}

/// Default config location: `~/.shellpilot.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
    Ok(home.join(CONFIG_FILE_NAME))
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
        assert_eq!(cfg.run.max_commands, 20);
        assert_eq!(cfg.limits.command_timeout_secs, 30);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut cfg = AgentConfig::default();
        cfg.provider = Provider::Claude;
        cfg.claude.api_key = Some("sk-test".to_string());
        cfg.run.allowed_commands = vec!["curl".to_string()];
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "provider = \"ollama\"\n\n[limits]\nhistory_capacity = 10\n\n[ollama]\nmodel = \"llama3\"\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.provider, Provider::Ollama);
        assert_eq!(cfg.limits.history_capacity, 10);
        assert_eq!(cfg.limits.repetition_window, 3);
        assert_eq!(cfg.ollama.model.as_deref(), Some("llama3"));
        assert_eq!(cfg.run.max_commands, 20);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "provider = \"bard\"\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parse"));
    }

    #[test]
    fn validate_rejects_window_larger_than_capacity() {
        let mut cfg = AgentConfig::default();
        cfg.limits.history_capacity = 2;
        cfg.limits.repetition_window = 5;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("repetition_window"));
    }

    #[test]
    fn validate_rejects_zero_budget() {
        let mut cfg = AgentConfig::default();
        cfg.run.max_commands = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overrides_apply_on_top_of_file() {
        let mut base = AgentConfig::default();
        base.run.allowed_commands = vec!["curl".to_string()];
        let overrides = RunOverrides {
            provider: Some(Provider::Gemini),
            max_commands: Some(5),
            dry_run: true,
            verbose: false,
            quiet: true,
            allowed_commands: vec!["curl".to_string(), "wget".to_string()],
        };
        let merged = overrides.apply(base).expect("apply");
        assert_eq!(merged.provider, Provider::Gemini);
        assert_eq!(merged.run.max_commands, 5);
        assert!(merged.run.dry_run);
        assert!(!merged.run.verbose);
        assert!(merged.run.quiet);
        assert_eq!(merged.run.allowed_commands, vec!["curl", "wget"]);
    }

    #[test]
    fn overrides_are_validated() {
        let overrides = RunOverrides {
            max_commands: Some(0),
            ..RunOverrides::default()
        };
        assert!(overrides.apply(AgentConfig::default()).is_err());
    }

    #[test]
    fn redacted_hides_credentials() {
        let mut cfg = AgentConfig::default();
        cfg.openai.api_key = Some("sk-secret".to_string());
        cfg.yandex.iam_token = Some("t1.secret".to_string());
        let shown = toml::to_string_pretty(&cfg.redacted()).expect("serialize");
        assert!(!shown.contains("secret"));
        assert!(shown.contains(REDACTED));
        assert_eq!(cfg.gemini.api_key, None);
    }
}
