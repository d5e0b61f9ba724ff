//! Local Ollama server (`/api/generate`).

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{Completion, CompletionError, Sampling, decode, join_url, send_json};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3";

pub struct Ollama {
    client: Client,
    model: String,
    url: String,
    sampling: Sampling,
}

impl Ollama {
    pub fn new(client: Client, model: &str, base_url: &str, sampling: Sampling) -> Self {
        Self {
            client,
            model: model.to_string(),
            url: join_url(base_url, "api/generate"),
            sampling,
        }
    }
}

impl Completion for Ollama {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip_all, fields(model = %self.model))]
    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let prompt = fold_prompt(system, user);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            stream: false,
            options: Options {
                temperature: self.sampling.temperature,
                num_predict: self.sampling.max_tokens,
            },
        };
        parse_response(&send_json(self.client.post(&self.url), &body)?)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
    error: Option<String>,
}

/// Ollama's generate endpoint takes a single prompt string.
fn fold_prompt(system: &str, user: &str) -> String {
    format!("System: {system}\n\nUser: {user}\n\nAssistant:")
}

fn parse_response(text: &str) -> Result<String, CompletionError> {
    let parsed: GenerateResponse = decode(text)?;
    if let Some(err) = parsed.error {
        return Err(CompletionError::Backend(err));
    }
    parsed
        .response
        .ok_or_else(|| CompletionError::Parse("no response field".into()))
}
