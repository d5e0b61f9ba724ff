//! OpenAI-compatible chat completions (OpenAI, DeepSeek).

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{Completion, CompletionError, Sampling, decode, join_url, send_json};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const DEEPSEEK_MODEL: &str = "deepseek-chat";

pub struct OpenAiCompatible {
    client: Client,
    name: &'static str,
    api_key: String,
    model: String,
    url: String,
    sampling: Sampling,
}

impl OpenAiCompatible {
    pub fn new(
        client: Client,
        name: &'static str,
        api_key: String,
        model: &str,
        base_url: &str,
        sampling: Sampling,
    ) -> Self {
        Self {
            client,
            name,
            api_key,
            model: model.to_string(),
            url: join_url(base_url, "chat/completions"),
            sampling,
        }
    }
}

impl Completion for OpenAiCompatible {
    fn name(&self) -> &str {
        self.name
    }

    #[instrument(skip_all, fields(backend = self.name, model = %self.model))]
    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let body = build_request(&self.model, system, user, self.sampling);
        let request = self.client.post(&self.url).bearer_auth(&self.api_key);
        parse_response(&send_json(request, &body)?)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

fn build_request<'a>(model: &'a str, system: &'a str, user: &'a str, sampling: Sampling) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: system,
            },
            ChatMessage {
                role: "user",
                content: user,
            },
        ],
        max_tokens: sampling.max_tokens,
        temperature: sampling.temperature,
    }
}

fn parse_response(text: &str) -> Result<String, CompletionError> {
    let parsed: ChatResponse = decode(text)?;
    if let Some(err) = parsed.error {
        return Err(CompletionError::Backend(err.message));
    }
    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| CompletionError::Parse("no choices in response".into()))
}
