//! Google Gemini `generateContent`.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{Completion, CompletionError, Sampling, decode, join_url, send_json};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub struct Gemini {
    client: Client,
    api_key: String,
    model: String,
    url: String,
    sampling: Sampling,
}

impl Gemini {
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
            url: join_url(base_url, &format!("models/{model}:generateContent")),
            sampling,
        }
    }
}

impl Completion for Gemini {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip_all, fields(model = %self.model))]
    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let body = build_request(system, user, self.sampling);
        let request = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key);
        parse_response(&send_json(request, &body)?)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

fn build_request<'a>(system: &'a str, user: &'a str, sampling: Sampling) -> GenerateRequest<'a> {
    GenerateRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part { text: system }],
        },
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part { text: user }],
        }],
        generation_config: GenerationConfig {
            max_output_tokens: sampling.max_tokens,
            temperature: sampling.temperature,
        },
    }
}

fn parse_response(text: &str) -> Result<String, CompletionError> {
    let parsed: GenerateResponse = decode(text)?;
    let content = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .ok_or_else(|| CompletionError::Parse("no candidates in response".into()))?;
    Ok(content
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect::<Vec<_>>()
        .join(""))
}
