//! Per-call context and model resolution.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{RelayError, RelayResult};
use crate::upstream::ChatMessage;

/// One normalized call, alive only for the duration of a dispatch.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Upstream model name.
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Caller's requested output tokens, unvalidated.
    pub max_tokens: Option<i64>,
    pub deadline: Instant,
}

impl CallContext {
    /// Create a context whose deadline is `timeout` from now.
    pub fn new(
        model: impl Into<String>,
        messages: Vec<ChatMessage>,
        max_tokens: Option<i64>,
        timeout: Duration,
    ) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens,
            deadline: Instant::now() + timeout,
        }
    }
}

/// Caller-facing model names mapped to upstream names.
#[derive(Debug, Clone, Default)]
pub struct ModelMap {
    aliases: BTreeMap<String, String>,
}

impl ModelMap {
    pub fn new(aliases: BTreeMap<String, String>) -> Self {
        Self { aliases }
    }

    /// Map a caller's model name to the upstream name.
    ///
    /// An empty map passes every name through. Otherwise the name must be a
    /// known alias or one of the upstream names it maps to.
    pub fn resolve(&self, requested: &str) -> RelayResult<String> {
        if self.aliases.is_empty() {
            return Ok(requested.to_string());
        }
        if let Some(target) = self.aliases.get(requested) {
            return Ok(target.clone());
        }
        if self.aliases.values().any(|v| v == requested) {
            return Ok(requested.to_string());
        }
        Err(RelayError::ModelNotFound(requested.to_string()))
    }

    /// Caller-facing names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.aliases.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
