//! Tolerant extraction of a structured reply from raw assistant text.
//!
//! Completion services wrap their JSON in code fences, prepend explanations,
//! or append commentary. The parser strips a leading fence, then locates the
//! first `{` and its matching `}` by depth counting. Braces inside quoted
//! string values are counted too, so a reply such as `{"command":"echo }"}`
//! mis-locates the closing boundary and fails to decode. That limitation is
//! kept on purpose: the scanner only has to handle what services actually
//! emit, and a decode failure is recoverable.

use serde::Deserialize;
use tracing::debug;

use crate::core::types::{AgentReply, TASK_COMPLETE};

const FENCE: &str = "```";
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("no JSON object found in response")]
    NoObject,

    #[error("failed to decode JSON object: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("reply is not complete and has no command field")]
    MissingCommand,
}

#[derive(Debug, Deserialize)]
struct RawReply {
    #[serde(default, alias = "done", alias = "complete")]
    completed: Option<bool>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    thought: Option<String>,
    #[serde(default)]
    plan: Option<String>,
    #[serde(default)]
    progress: Option<String>,
}

/// Parse raw completion text into an [`AgentReply`].
pub fn parse_reply(raw: &str) -> Result<AgentReply, ParseError> {
    let result = parse_inner(raw);
    if let Err(err) = &result {
        debug!(err = %err, raw = %preview(raw), "failed to parse reply");
    }
    result
}

fn parse_inner(raw: &str) -> Result<AgentReply, ParseError> {
    let text = strip_fence(raw.trim());
    let object = extract_object(text).ok_or(ParseError::NoObject)?;
    let parsed: RawReply = serde_json::from_str(object)?;

    let command = parsed.command.map(|cmd| cmd.trim().to_string());
    let completed =
        parsed.completed.unwrap_or(false) || command.as_deref() == Some(TASK_COMPLETE);
    if !completed && command.is_none() {
        return Err(ParseError::MissingCommand);
    }

    Ok(AgentReply {
        completed,
        command,
        thought: parsed.thought.unwrap_or_default().trim().to_string(),
        plan: non_empty(parsed.plan),
        progress: non_empty(parsed.progress),
    })
}

/// Drop a leading code fence (with its language tag) and the last closing fence.
///
/// Text that does not start with a fence is returned unchanged. The fence
/// may sit on its own line or share a line with the object.
fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix(FENCE) else {
        return text;
    };
    let body = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    match body.rfind(FENCE) {
        Some(end) => &body[..end],
        None => body,
    }
}

/// Slice from the first `{` to the `}` that brings brace depth back to zero.
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn preview(raw: &str) -> String {
    let mut chars = raw.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
