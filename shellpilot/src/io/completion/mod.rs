//! Completion port and its HTTP backends.
//!
//! The agent loop only sees [`Completion`]: system text and user text in,
//! assistant text out. Each backend translates that into its own JSON
//! envelope. Backends never retry; any failure is reported once and the loop
//! treats it as fatal.

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod yandex;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::io::config::{AgentConfig, ApiBackend, Provider};

/// A service that answers "what should I do next".
pub trait Completion: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    /// Send one request and return the assistant text.
    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError>;
}

/// Errors from a completion backend.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("missing API key: {0}")]
    MissingApiKey(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("backend reported an error: {0}")]
    Backend(String),
}

/// Generation parameters shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Build the backend selected by `cfg.provider`.
///
/// Fails before any request is made when credentials are missing.
pub fn build_completion(cfg: &AgentConfig) -> Result<Box<dyn Completion>> {
    let timeout = Duration::from_secs(cfg.completion.request_timeout_secs);
    let client = http_client(timeout)?;
    let sampling = Sampling {
        max_tokens: cfg.completion.max_tokens,
        temperature: cfg.completion.temperature,
    };

    let completion: Box<dyn Completion> = match cfg.provider {
        Provider::Openai => Box::new(openai::OpenAiCompatible::new(
            client,
            "openai",
            resolve_key(&cfg.openai, "OPENAI_API_KEY")?,
            cfg.openai.model.as_deref().unwrap_or(openai::OPENAI_MODEL),
            cfg.openai.base_url.as_deref().unwrap_or(openai::OPENAI_BASE_URL),
            sampling,
        )),
        Provider::Deepseek => Box::new(openai::OpenAiCompatible::new(
            client,
            "deepseek",
            resolve_key(&cfg.deepseek, "DEEPSEEK_API_KEY")?,
            cfg.deepseek.model.as_deref().unwrap_or(openai::DEEPSEEK_MODEL),
            cfg.deepseek
                .base_url
                .as_deref()
                .unwrap_or(openai::DEEPSEEK_BASE_URL),
            sampling,
        )),
        Provider::Claude => Box::new(anthropic::Anthropic::new(
            client,
            resolve_key(&cfg.claude, "ANTHROPIC_API_KEY")?,
            cfg.claude.model.as_deref().unwrap_or(anthropic::DEFAULT_MODEL),
            cfg.claude.base_url.as_deref().unwrap_or(anthropic::DEFAULT_BASE_URL),
            sampling,
        )),
        Provider::Gemini => Box::new(gemini::Gemini::new(
            client,
            resolve_key(&cfg.gemini, "GEMINI_API_KEY")?,
            cfg.gemini.model.as_deref().unwrap_or(gemini::DEFAULT_MODEL),
            cfg.gemini.base_url.as_deref().unwrap_or(gemini::DEFAULT_BASE_URL),
            sampling,
        )),
        Provider::Ollama => Box::new(ollama::Ollama::new(
            client,
            cfg.ollama.model.as_deref().unwrap_or(ollama::DEFAULT_MODEL),
            cfg.ollama.base_url.as_deref().unwrap_or(ollama::DEFAULT_BASE_URL),
            sampling,
        )),
        Provider::Yandex => {
            let folder_id = configured_or_env(cfg.yandex.folder_id.as_deref(), "YANDEX_FOLDER_ID")
                .ok_or_else(|| CompletionError::MissingApiKey("YANDEX_FOLDER_ID".into()))?;
            let iam_token = configured_or_env(cfg.yandex.iam_token.as_deref(), "YANDEX_IAM_TOKEN")
                .ok_or_else(|| CompletionError::MissingApiKey("YANDEX_IAM_TOKEN".into()))?;
            Box::new(yandex::Yandex::new(
                client,
                folder_id,
                iam_token,
                cfg.yandex.model.as_deref().unwrap_or(yandex::DEFAULT_MODEL),
                cfg.yandex.base_url.as_deref().unwrap_or(yandex::DEFAULT_ENDPOINT),
                sampling,
            ))
        }
    };
    info!(
        provider = cfg.provider.as_str(),
        timeout_secs = timeout.as_secs(),
        "completion backend ready"
    );
    Ok(completion)
}

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("build HTTP client")
}

/// Key from the config file, falling back to `env_var`.
fn resolve_key(backend: &ApiBackend, env_var: &str) -> Result<String, CompletionError> {
    configured_or_env(backend.api_key.as_deref(), env_var)
        .ok_or_else(|| CompletionError::MissingApiKey(env_var.to_string()))
}

fn configured_or_env(configured: Option<&str>, env_var: &str) -> Option<String> {
    configured
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| {
            std::env::var(env_var)
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
}

/// Send a JSON body and return the response text, mapping HTTP status
/// codes of 400 and above to [`CompletionError::Api`].
/// POST `body` and return the response text.
///
/// Transport errors drop the request URL, which may carry credentials.
fn send_json(request: RequestBuilder, body: &impl Serialize) -> Result<String, CompletionError> {
    let resp = request
        .header("content-type", "application/json")
        .json(body)
        .send()
        .map_err(|e| CompletionError::Http(e.without_url()))?;
    let status = resp.status().as_u16();
    let text = resp
        .text()
        .map_err(|e| CompletionError::Http(e.without_url()))?;
    if status >= 400 {
        warn!(status, "completion request rejected");
        return Err(CompletionError::Api { status, body: text });
    }
    debug!(status, bytes = text.len(), "completion response received");
    Ok(text)
}

fn decode<'a, T: serde::Deserialize<'a>>(text: &'a str) -> Result<T, CompletionError> {
    serde_json::from_str(text).map_err(|e| CompletionError::Parse(format!("{e}: {text}")))
}

/// Join URL segments without doubling the slash.
fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(
            join_url("https://api.openai.com/v1/", "/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(join_url("http://h:1", "api/generate"), "http://h:1/api/generate");
    }

    #[test]
    fn configured_key_wins_and_blank_is_ignored() {
        assert_eq!(
            configured_or_env(Some(" sk-file "), "SHELLPILOT_TEST_UNSET_VAR"),
            Some("sk-file".to_string())
        );
        assert_eq!(configured_or_env(Some("  "), "SHELLPILOT_TEST_UNSET_VAR"), None);
        assert_eq!(configured_or_env(None, "SHELLPILOT_TEST_UNSET_VAR"), None);
    }

    #[test]
    fn missing_key_names_the_variable() {
        let err = resolve_key(&ApiBackend::default(), "SHELLPILOT_TEST_UNSET_VAR").unwrap_err();
        assert!(matches!(err, CompletionError::MissingApiKey(ref var) if var == "SHELLPILOT_TEST_UNSET_VAR"));
    }

    #[test]
    fn builds_backends_from_config() {
        let mut cfg = AgentConfig::default();
        cfg.openai.api_key = Some("sk-test".to_string());
        assert_eq!(build_completion(&cfg).expect("openai").name(), "openai");

        cfg.provider = Provider::Ollama;
        assert_eq!(build_completion(&cfg).expect("ollama").name(), "ollama");

        cfg.provider = Provider::Yandex;
        cfg.yandex.folder_id = Some("b1g".to_string());
        cfg.yandex.iam_token = Some("t1".to_string());
        assert_eq!(build_completion(&cfg).expect("yandex").name(), "yandex");
    }

    #[test]
    fn transport_errors_omit_the_request_url() {
        let client = http_client(Duration::from_secs(5)).expect("client");
        let request = client.post("http://127.0.0.1:9/v1/chat?token=hidden-token");
        let err = send_json(request, &serde_json::json!({})).unwrap_err();
        let CompletionError::Http(inner) = &err else {
            panic!("expected transport error, got {err:?}");
        };
        assert!(inner.url().is_none());
        assert!(!err.to_string().contains("hidden-token"), "{err}");
    }

    #[test]
    fn decode_failure_includes_body() {
        let err = decode::<serde_json::Value>("not json").unwrap_err();
        assert!(err.to_string().contains("not json"));
    }
}
