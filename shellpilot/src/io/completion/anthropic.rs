//! Anthropic messages API.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{Completion, CompletionError, Sampling, decode, join_url, send_json};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct Anthropic {
    client: Client,
    api_key: String,
    model: String,
    url: String,
    sampling: Sampling,
}

impl Anthropic {
    pub fn new(
        client: Client,
        api_key: String,
        model: &str,
        base_url: &str,
        sampling: Sampling,
    ) -> Self {
        Self {
            client,
            api_key,
            model: model.to_string(),
            url: join_url(base_url, "messages"),
            sampling,
        }
    }
}

impl Completion for Anthropic {
    fn name(&self) -> &str {
        "claude"
    }

    #[instrument(skip_all, fields(model = %self.model))]
    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.sampling.max_tokens,
            temperature: self.sampling.temperature,
            system,
            messages: vec![UserMessage {
                role: "user",
                content: user,
            }],
        };
        let request = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        parse_response(&send_json(request, &body)?)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<UserMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    r#type: String,
    text: Option<String>,
}

fn parse_response(text: &str) -> Result<String, CompletionError> {
    let parsed: MessagesResponse = decode(text)?;
    let parts: Vec<String> = parsed
        .content
        .into_iter()
        .filter(|block| block.r#type == "text")
        .filter_map(|block| block.text)
        .collect();
    if parts.is_empty() {
        return Err(CompletionError::Parse("no text content in response".into()));
    }
    Ok(parts.join(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_text_blocks_and_skips_others() {
        let text = r#"{"content":[{"type":"text","text":"{\"thought\":"},{"type":"thinking","thinking":"x"},{"type":"text","text":"\"ok\"}"}],"stop_reason":"end_turn"}"#;
        assert_eq!(parse_response(text).expect("parse"), r#"{"thought":"ok"}"#);
    }

    #[test]
    fn no_text_is_a_parse_error() {
        assert!(matches!(
            parse_response(r#"{"content":[]}"#),
            Err(CompletionError::Parse(_))
        ));
    }

    #[test]
    fn system_is_a_top_level_field() {
        let body = MessagesRequest {
            model: DEFAULT_MODEL,
            max_tokens: 4000,
            temperature: 0.7,
            system: "sys",
            messages: vec![UserMessage {
                role: "user",
                content: "usr",
            }],
        };
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["system"], "sys");
        assert_eq!(value["messages"].as_array().map(Vec::len), Some(1));
        assert_eq!(value["messages"][0]["content"], "usr");
    }
}
