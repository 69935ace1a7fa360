//! Wire types for the OpenAI-compatible chat completion endpoint.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single role/content pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Request body sent upstream.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Parsed upstream success.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    pub finish_reason: Option<String>,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawCompletion {
    #[serde(default)]
    choices: Vec<RawChoice>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Debug, Deserialize)]
struct RawChoice {
    message: Option<RawMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
}

impl ChatCompletion {
    /// Parse a 2xx response body.
    pub fn from_body(body: &str) -> Result<Self, UpstreamError> {
        let raw: RawCompletion = serde_json::from_str(body)
            .map_err(|e| UpstreamError::InvalidBody(e.to_string()))?;

        let choice = raw
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::InvalidBody("response has no choices".to_string()))?;
        let message = choice
            .message
            .ok_or_else(|| UpstreamError::InvalidBody("first choice has no message".to_string()))?;

        let (prompt_tokens, completion_tokens) = match raw.usage {
            Some(u) => (u.prompt_tokens, u.completion_tokens),
            None => (None, None),
        };

        Ok(Self {
            content: message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
            prompt_tokens,
            completion_tokens,
        })
    }
}

/// Outcome of one failed upstream attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Upstream answered with a non-success status.
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The request did not complete within the call timeout.
    #[error("upstream request timed out")]
    Timeout,

    /// Connection or protocol failure before a status was received.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// Success status, but the body is not a chat completion.
    #[error("invalid upstream response body: {0}")]
    InvalidBody(String),
}

impl UpstreamError {
    /// HTTP status carried by the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Upstream body carried by the failure, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            UpstreamError::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}
