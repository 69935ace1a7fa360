//! Ollama-style caller dialect.
//!
//! # Responsibilities
//! - Parse `/api/chat` and `/api/generate` bodies into a CallContext
//! - Resolve the model before any credential is touched
//! - Render the dispatch outcome with synthesized eval metrics
//!
//! # Design Decisions
//! - Responses are never streamed; `stream: true` still gets one JSON body
//! - `options.num_predict` is the caller's requested output-token limit

use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::Instrument;

use crate::dispatch::{CallContext, DispatchOutcome};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::upstream::ChatMessage;
use crate::usage::estimate_tokens;

/// Generation options the relay honours.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateOptions {
    #[serde(default)]
    pub num_predict: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub options: Option<GenerateOptions>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub model: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub options: Option<GenerateOptions>,
}

/// Timing and count fields shared by both responses.
#[derive(Debug, Serialize)]
pub struct EvalStats {
    pub done: bool,
    pub done_reason: String,
    pub total_duration: u64,
    pub load_duration: u64,
    pub prompt_eval_count: u64,
    pub prompt_eval_duration: u64,
    pub eval_count: u64,
    pub eval_duration: u64,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub model: String,
    pub created_at: String,
    pub message: ChatMessage,
    #[serde(flatten)]
    pub stats: EvalStats,
}

#[derive(Debug, Serialize)]
pub struct GenerateReply {
    pub model: String,
    pub created_at: String,
    pub response: String,
    #[serde(flatten)]
    pub stats: EvalStats,
}

/// `POST /api/chat`
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    let start = Instant::now();
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => return reject("chat", rejection, start),
    };
    if body.stream == Some(true) {
        tracing::debug!("Streaming requested; answering with a single response");
    }

    let max_tokens = body.options.and_then(|o| o.num_predict);
    let result = run(&state, &headers, &body.model, body.messages, max_tokens).await;

    let response = match result {
        Ok((outcome, prompt_tokens)) => {
            let stats = eval_stats(&outcome, prompt_tokens);
            Json(ChatReply {
                model: body.model,
                created_at: timestamp(),
                message: ChatMessage::new("assistant", outcome.completion.content),
                stats,
            })
            .into_response()
        }
        Err(err) => err.into_response(),
    };
    metrics::record_request("chat", response.status().as_u16(), start);
    response
}

/// `POST /api/generate`
pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<GenerateBody>, JsonRejection>,
) -> Response {
    let start = Instant::now();
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => return reject("generate", rejection, start),
    };
    if body.stream == Some(true) {
        tracing::debug!("Streaming requested; answering with a single response");
    }

    let mut messages = Vec::with_capacity(2);
    if let Some(system) = body.system.filter(|s| !s.is_empty()) {
        messages.push(ChatMessage::new("system", system));
    }
    messages.push(ChatMessage::new("user", body.prompt));

    let max_tokens = body.options.and_then(|o| o.num_predict);
    let result = run(&state, &headers, &body.model, messages, max_tokens).await;

    let response = match result {
        Ok((outcome, prompt_tokens)) => {
            let stats = eval_stats(&outcome, prompt_tokens);
            Json(GenerateReply {
                model: body.model,
                created_at: timestamp(),
                response: outcome.completion.content,
                stats,
            })
            .into_response()
        }
        Err(err) => err.into_response(),
    };
    metrics::record_request("generate", response.status().as_u16(), start);
    response
}

/// `GET /api/tags`
pub async fn tags(State(state): State<AppState>) -> impl IntoResponse {
    let modified_at = timestamp();
    let models: Vec<_> = state
        .dispatcher
        .models()
        .names()
        .map(|name| {
            json!({
                "name": name,
                "model": name,
                "modified_at": modified_at,
                "size": 0,
                "digest": "",
                "details": {},
            })
        })
        .collect();
    Json(json!({ "models": models }))
}

/// `GET /api/version`
pub async fn version() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "version": env!("CARGO_PKG_VERSION") })))
}

/// Resolve the model, dispatch, and return the outcome with a prompt token count.
async fn run(
    state: &AppState,
    headers: &HeaderMap,
    model: &str,
    messages: Vec<ChatMessage>,
    max_tokens: Option<i64>,
) -> Result<(DispatchOutcome, u64), ApiError> {
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let span = tracing::info_span!("request", request_id = %request_id, model = %model);

    async move {
        let upstream_model = state.dispatcher.resolve_model(model)?;
        let estimated_prompt: u64 = messages.iter().map(|m| estimate_tokens(&m.content)).sum();

        let ctx = CallContext::new(
            upstream_model,
            messages,
            max_tokens,
            state.dispatcher.settings().call_timeout,
        );
        let outcome = state.dispatcher.dispatch(ctx).await?;
        let prompt_tokens = outcome.completion.prompt_tokens.unwrap_or(estimated_prompt);
        Ok((outcome, prompt_tokens))
    }
    .instrument(span)
    .await
}

/// Render an unparsable body with the usual error shape.
fn reject(route: &'static str, rejection: JsonRejection, start: Instant) -> Response {
    tracing::debug!(route, error = %rejection.body_text(), "Rejected request body");
    let response = ApiError::from(rejection).into_response();
    metrics::record_request(route, response.status().as_u16(), start);
    response
}

fn eval_stats(outcome: &DispatchOutcome, prompt_tokens: u64) -> EvalStats {
    EvalStats {
        done: true,
        done_reason: outcome
            .completion
            .finish_reason
            .clone()
            .unwrap_or_else(|| "stop".to_string()),
        total_duration: outcome.elapsed.as_nanos() as u64,
        load_duration: 0,
        prompt_eval_count: prompt_tokens,
        prompt_eval_duration: 0,
        eval_count: outcome.usage.completion_tokens,
        eval_duration: outcome.usage.elapsed.as_nanos() as u64,
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
