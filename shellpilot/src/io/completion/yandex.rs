//! Yandex foundation models completion API.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{Completion, CompletionError, Sampling, decode, send_json};

pub const DEFAULT_ENDPOINT: &str =
    "https://llm.api.cloud.yandex.net/foundationModels/v1/completion";
pub const DEFAULT_MODEL: &str = "yandexgpt/rc";

pub struct Yandex {
    client: Client,
    folder_id: String,
    iam_token: String,
    model_uri: String,
    endpoint: String,
    sampling: Sampling,
}

impl Yandex {
    pub fn new(
        client: Client,
        folder_id: String,
        iam_token: String,
        model: &str,
        endpoint: &str,
        sampling: Sampling,
    ) -> Self {
        Self {
            client,
            model_uri: model_uri(&folder_id, model),
            folder_id,
            iam_token,
            endpoint: endpoint.to_string(),
            sampling,
        }
    }
}

impl Completion for Yandex {
    fn name(&self) -> &str {
        "yandex"
    }

    #[instrument(skip_all, fields(model_uri = %self.model_uri))]
    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let body = build_request(&self.model_uri, system, user, self.sampling);
        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.iam_token)
            .header("x-folder-id", &self.folder_id);
        parse_response(&send_json(request, &body)?)
    }
}

fn model_uri(folder_id: &str, model: &str) -> String {
    format!("gpt://{folder_id}/{model}")
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest<'a> {
    model_uri: &'a str,
    completion_options: CompletionOptions,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionOptions {
    stream: bool,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    result: Option<CompletionResult>,
}

#[derive(Debug, Deserialize)]
struct CompletionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    message: AlternativeMessage,
}

#[derive(Debug, Deserialize)]
struct AlternativeMessage {
    text: String,
}

fn build_request<'a>(
    model_uri: &'a str,
    system: &'a str,
    user: &'a str,
    sampling: Sampling,
) -> CompletionRequest<'a> {
    CompletionRequest {
        model_uri,
        completion_options: CompletionOptions {
            stream: false,
            max_tokens: sampling.max_tokens,
            temperature: sampling.temperature,
        },
        messages: vec![
            Message {
                role: "system",
                text: system,
            },
            Message {
                role: "user",
                text: user,
            },
        ],
    }
}

fn parse_response(text: &str) -> Result<String, CompletionError> {
    let parsed: CompletionResponse = decode(text)?;
    parsed
        .result
        .and_then(|result| result.alternatives.into_iter().next())
        .map(|alt| alt.message.text)
        .ok_or_else(|| CompletionError::Parse("no alternatives in response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_uri_embeds_folder() {
        assert_eq!(model_uri("b1gfolder", DEFAULT_MODEL), "gpt://b1gfolder/yandexgpt/rc");
    }

    #[test]
    fn request_uses_text_messages() {
        let sampling = Sampling {
            max_tokens: 2000,
            temperature: 0.5,
        };
        let value = serde_json::to_value(build_request("gpt://f/yandexgpt/rc", "sys", "usr", sampling))
            .expect("serialize");
        assert_eq!(value["modelUri"], "gpt://f/yandexgpt/rc");
        assert_eq!(value["completionOptions"]["maxTokens"], 2000);
        assert_eq!(value["messages"][0]["text"], "sys");
        assert_eq!(value["messages"][1]["role"], "user");
    }

    #[test]
    fn reads_first_alternative() {
        let text = r#"{"result":{"alternatives":[{"message":{"role":"assistant","text":"hi"},"status":"ALTERNATIVE_STATUS_FINAL"}],"modelVersion":"x"}}"#;
        assert_eq!(parse_response(text).expect("parse"), "hi");
    }

    #[test]
    fn empty_alternatives_is_a_parse_error() {
        assert!(matches!(
            parse_response(r#"{"result":{"alternatives":[]}}"#),
            Err(CompletionError::Parse(_))
        ));
    }
}
