//! Admission-controlled dispatch of one upstream call.
//!
//! # State Machines
//! ```text
//! Rate-limited:
//!     ACQUIRE (pool.acquire, ≤ half the remaining budget)
//!         → CALL
//!         → SUCCESS: mark_success, return
//!         → RETRY:   penalize (short cool-down), sleep base × 2^n, back to ACQUIRE
//!         → FATAL:   return immediately
//!     ACQUIRE timeout is terminal (CapacityExhausted).
//!
//! Failover-only (budget = min(pool + extra, pool × 3)):
//!     SELECT (pool.next_eligible, never blocks)
//!         → CALL
//!         → SUCCESS: mark_success, return
//!         → RETRY:   mark_failure, penalize (configured), optional fixed pause, back to SELECT
//!         → FATAL:   return immediately
//!     Budget spent: last error, or CapacityExhausted if there was none.
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::dispatch::admission::{AdmissionMode, DispatchSettings};
use crate::dispatch::context::{CallContext, ModelMap};
use crate::error::{RelayError, RelayResult};
use crate::load_balancer::{Backend, Pool};
use crate::observability::metrics;
use crate::resilience::backoff::{exponential_backoff, linear_backoff};
use crate::resilience::retries::{classify, failover_attempt_budget, Outcome};
use crate::resilience::timeouts;
use crate::upstream::{ChatCompletion, ChatRequest, HttpUpstream, UpstreamClient, UpstreamError};
use crate::usage::{self, SynthesizedUsage};

/// Result of a successful dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub completion: ChatCompletion,
    /// Backend that served the final attempt.
    pub backend_id: String,
    pub attempts: u32,
    pub elapsed: Duration,
    pub usage: SynthesizedUsage,
}

/// Routes calls to the credential pool under the configured admission mode.
#[derive(Debug)]
pub struct Dispatcher<U = HttpUpstream> {
    pool: Arc<Pool>,
    upstream: U,
    settings: DispatchSettings,
    models: ModelMap,
}

impl<U: UpstreamClient> Dispatcher<U> {
    pub fn new(pool: Arc<Pool>, upstream: U, settings: DispatchSettings, models: ModelMap) -> Self {
        tracing::info!(
            mode = %settings.mode,
            backends = pool.len(),
            rpm = settings.requests_per_minute,
            rps = settings.requests_per_second,
            "Dispatcher ready"
        );
        Self {
            pool,
            upstream,
            settings,
            models,
        }
    }

    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn mode(&self) -> AdmissionMode {
        self.settings.mode
    }

    pub fn models(&self) -> &ModelMap {
        &self.models
    }

    /// Map a caller model name to the upstream one without touching the pool.
    pub fn resolve_model(&self, requested: &str) -> RelayResult<String> {
        self.models.resolve(requested)
    }

    /// Run one call to completion, retrying and failing over as the mode allows.
    #[tracing::instrument(name = "dispatch", skip_all, fields(model = %ctx.model, mode = %self.settings.mode))]
    pub async fn dispatch(&self, ctx: CallContext) -> RelayResult<DispatchOutcome> {
        let start = Instant::now();
        let request = ChatRequest {
            model: ctx.model.clone(),
            messages: ctx.messages.clone(),
            stream: false,
            max_tokens: self.settings.effective_max_tokens(ctx.max_tokens),
        };

        let result = match self.settings.mode {
            AdmissionMode::RateLimited => self.dispatch_rate_limited(&ctx, &request).await,
            AdmissionMode::FailoverOnly => self.dispatch_failover(&request).await,
        };

        let (completion, backend, attempts) = match result {
            Ok(served) => served,
            Err(err) => {
                if matches!(err, RelayError::CapacityExhausted(_)) {
                    metrics::record_capacity_exhausted(self.settings.mode.as_str());
                }
                tracing::warn!(error = %err, "Dispatch failed");
                return Err(err);
            }
        };

        let elapsed = start.elapsed();
        let usage = usage::synthesize(
            completion.completion_tokens,
            &completion.content,
            elapsed,
            self.settings.min_tokens_per_second,
        );

        tracing::debug!(
            backend = %backend.id(),
            attempts,
            elapsed = ?elapsed,
            completion_tokens = usage.completion_tokens,
            "Dispatch succeeded"
        );

        Ok(DispatchOutcome {
            completion,
            backend_id: backend.id().to_string(),
            attempts,
            elapsed,
            usage,
        })
    }

    async fn dispatch_rate_limited(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
    ) -> RelayResult<(ChatCompletion, Arc<Backend>, u32)> {
        let mode = AdmissionMode::RateLimited;
        let mut retries = 0u32;

        loop {
            let wait = timeouts::admission_wait(timeouts::remaining(ctx.deadline));
            let backend = self.pool.acquire(wait).await?;
            let attempt = retries + 1;

            let err = match self.call(&backend, request, attempt).await {
                Ok(completion) => return Ok((completion, backend, attempt)),
                Err(err) => err,
            };

            if classify(&err, mode) == Outcome::Fatal {
                return Err(RelayError::UpstreamFatal(err));
            }

            backend.penalize(self.settings.rate_limited_cooldown);
            metrics::record_penalty(backend.id());
            retries += 1;

            if retries > self.settings.max_retries {
                return Err(RelayError::UpstreamRetryable {
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = exponential_backoff(retries, self.settings.base_backoff, self.settings.max_backoff);
            tracing::info!(backend = %backend.id(), attempt, delay = ?delay, "Retrying after retryable failure");
            tokio::time::sleep(delay).await;
        }
    }

    async fn dispatch_failover(
        &self,
        request: &ChatRequest,
    ) -> RelayResult<(ChatCompletion, Arc<Backend>, u32)> {
        let mode = AdmissionMode::FailoverOnly;
        let budget = failover_attempt_budget(self.pool.len(), self.settings.failover_extra_retries);
        let mut last_error: Option<UpstreamError> = None;

        for attempt in 1..=budget {
            let backend = self.pool.next_eligible();

            let err = match self.call(&backend, request, attempt).await {
                Ok(completion) => return Ok((completion, backend, attempt)),
                Err(err) => err,
            };

            if classify(&err, mode) == Outcome::Fatal {
                return Err(RelayError::UpstreamFatal(err));
            }

            backend.penalize(self.settings.failover_penalty);
            metrics::record_penalty(backend.id());
            tracing::info!(
                backend = %backend.id(),
                attempt,
                budget,
                penalty = ?self.settings.failover_penalty,
                "Failing over to next credential"
            );
            last_error = Some(err);

            if attempt < budget {
                if let Some(pause) = linear_backoff(self.settings.failover_pause) {
                    tokio::time::sleep(pause).await;
                }
            }
        }

        Err(match last_error {
            Some(source) => RelayError::UpstreamRetryable {
                attempts: budget,
                source,
            },
            None => RelayError::CapacityExhausted("failover attempt budget exhausted".to_string()),
        })
    }

    /// One upstream attempt, with health bookkeeping on the backend.
    async fn call(
        &self,
        backend: &Backend,
        request: &ChatRequest,
        attempt: u32,
    ) -> Result<ChatCompletion, UpstreamError> {
        match self.upstream.chat(backend.credential(), request).await {
            Ok(completion) => {
                backend.mark_success();
                metrics::record_upstream_attempt(backend.id(), "success");
                Ok(completion)
            }
            Err(err) => {
                tracing::warn!(
                    backend = %backend.id(),
                    attempt,
                    status = ?err.status(),
                    error = %err,
                    "Upstream attempt failed"
                );
                backend.mark_failure(err.status(), err.to_string());
                metrics::record_upstream_attempt(backend.id(), outcome_label(&err));
                Err(err)
            }
        }
    }
}

fn outcome_label(err: &UpstreamError) -> &'static str {
    match err {
        UpstreamError::Status { status: 429, .. } => "rate_limited",
        UpstreamError::Status { status, .. } if *status >= 500 => "server_error",
        UpstreamError::Status { .. } => "client_error",
        UpstreamError::Timeout => "timeout",
        UpstreamError::Transport(_) => "transport_error",
        UpstreamError::InvalidBody(_) => "invalid_body",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::config::RelayConfig;
    use crate::upstream::ChatMessage;

    type Script = dyn Fn(&str, usize) -> Result<ChatCompletion, UpstreamError> + Send + Sync;

    /// Upstream double: answers by credential and call index, records every call.
    struct ScriptedUpstream {
        script: Box<Script>,
        calls: Mutex<Vec<(String, Option<u32>, Instant)>>,
    }

    impl ScriptedUpstream {
        fn new(script: impl Fn(&str, usize) -> Result<ChatCompletion, UpstreamError> + Send + Sync + 'static) -> Self {
            Self {
                script: Box::new(script),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn credentials(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|c| c.0.clone()).collect()
        }
    }

    impl UpstreamClient for ScriptedUpstream {
        async fn chat(&self, credential: &str, request: &ChatRequest) -> Result<ChatCompletion, UpstreamError> {
            let index = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((credential.to_string(), request.max_tokens, Instant::now()));
                calls.len() - 1
            };
            (self.script)(credential, index)
        }
    }

    fn ok(content: &str, tokens: Option<u64>) -> Result<ChatCompletion, UpstreamError> {
        Ok(ChatCompletion {
            content: content.to_string(),
            finish_reason: Some("stop".into()),
            prompt_tokens: None,
            completion_tokens: tokens,
        })
    }

    fn status(s: u16) -> Result<ChatCompletion, UpstreamError> {
        Err(UpstreamError::Status { status: s, body: format!("status {}", s) })
    }

    fn settings(rpm: u32, rps: u32) -> DispatchSettings {
        let mut config = RelayConfig::default();
        config.rate_limit.requests_per_minute = rpm;
        config.rate_limit.requests_per_second = rps;
        config.retries.base_delay_ms = 100;
        config.failover.extra_retries = 1;
        config.failover.penalty_secs = 60;
        DispatchSettings::from_config(&config)
    }

    fn dispatcher(
        keys: &[&str],
        settings: DispatchSettings,
        upstream: ScriptedUpstream,
    ) -> Dispatcher<ScriptedUpstream> {
        let backends = keys
            .iter()
            .map(|k| Backend::new(*k, *k, settings.requests_per_minute, settings.requests_per_second))
            .collect();
        let pool = Arc::new(Pool::new(backends).unwrap());
        Dispatcher::new(pool, upstream, settings, ModelMap::default())
    }

    fn ctx() -> CallContext {
        CallContext::new("model", vec![ChatMessage::new("user", "hi")], None, Duration::from_secs(120))
    }

    #[tokio::test]
    async fn test_failover_moves_to_next_credential() {
        let upstream = ScriptedUpstream::new(|cred, _| match cred {
            "k1" => status(429),
            _ => ok("hello", Some(3)),
        });
        let d = dispatcher(&["k1", "k2"], settings(0, 0), upstream);

        let outcome = d.dispatch(ctx()).await.unwrap();
        assert_eq!(outcome.backend_id, "k2");
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.completion.content, "hello");

        let snaps = d.pool().status_snapshot();
        assert!(snaps[0].penalty_remaining_ms > 0);
        assert_eq!(snaps[0].last_failure_code, Some(429));
        assert!(snaps[0].last_failure_message.is_some());
        assert!(snaps[1].last_success_at.is_some());
        assert_eq!(snaps[1].penalty_remaining_ms, 0);
    }

    #[tokio::test]
    async fn test_failover_exhausts_budget() {
        let upstream = ScriptedUpstream::new(|_, _| status(500));
        let d = dispatcher(&["k1", "k2"], settings(0, 0), upstream);

        let err = d.dispatch(ctx()).await.unwrap_err();
        match err {
            RelayError::UpstreamRetryable { attempts, ref source } => {
                assert_eq!(attempts, 3);
                assert_eq!(source.status(), Some(500));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.status_code(), 500);
        assert_eq!(d.upstream.credentials().len(), 3);
    }

    #[tokio::test]
    async fn test_failover_unauthorized_tries_other_credential() {
        let upstream = ScriptedUpstream::new(|cred, _| match cred {
            "k1" => status(401),
            _ => ok("fine", None),
        });
        let d = dispatcher(&["k1", "k2"], settings(0, 0), upstream);
        let outcome = d.dispatch(ctx()).await.unwrap();
        assert_eq!(outcome.backend_id, "k2");
    }

    #[tokio::test]
    async fn test_fatal_surfaces_immediately() {
        let upstream = ScriptedUpstream::new(|_, _| status(400));
        let d = dispatcher(&["k1", "k2"], settings(0, 0), upstream);

        let err = d.dispatch(ctx()).await.unwrap_err();
        assert!(matches!(err, RelayError::UpstreamFatal(_)));
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.detail(), Some("status 400"));
        assert_eq!(d.upstream.credentials(), vec!["k1"]);
        assert_eq!(d.pool().penalized_count(), 0);
    }

    #[tokio::test]
    async fn test_failover_skips_penalized_credential() {
        let upstream = ScriptedUpstream::new(|_, _| ok("x", None));
        let d = dispatcher(&["k1", "k2"], settings(0, 0), upstream);
        d.pool().backends()[0].penalize(Duration::from_secs(60));

        for _ in 0..3 {
            assert_eq!(d.dispatch(ctx()).await.unwrap().backend_id, "k2");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_pause_between_attempts() {
        let upstream = ScriptedUpstream::new(|_, _| status(503));
        let mut s = settings(0, 0);
        s.failover_pause = Duration::from_millis(400);
        let d = dispatcher(&["k1", "k2"], s, upstream);

        let start = Instant::now();
        let _ = d.dispatch(ctx()).await.unwrap_err();
        // Three attempts, two pauses, no growth between them.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(800));
        assert!(elapsed < Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_retries_on_other_credential() {
        let upstream = ScriptedUpstream::new(|cred, _| match cred {
            "k1" => status(503),
            _ => ok("done", Some(4)),
        });
        let d = dispatcher(&["k1", "k2"], settings(60, 0), upstream);

        let outcome = d.dispatch(ctx()).await.unwrap();
        assert_eq!(outcome.backend_id, "k2");
        assert_eq!(outcome.attempts, 2);
        assert_eq!(d.upstream.credentials(), vec!["k1", "k2"]);
        assert!(d.pool().backends()[0].in_penalty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_exponential_backoff_and_exhaustion() {
        let upstream = ScriptedUpstream::new(|_, _| status(500));
        let mut s = settings(600, 0);
        s.max_retries = 2;
        s.rate_limited_cooldown = Duration::ZERO;
        let d = dispatcher(&["k1"], s, upstream);

        let err = d.dispatch(ctx()).await.unwrap_err();
        assert!(matches!(err, RelayError::UpstreamRetryable { attempts: 3, .. }));

        let calls = d.upstream.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        // base 100ms: sleeps of 200ms then 400ms.
        assert!(calls[1].2 - calls[0].2 >= Duration::from_millis(200));
        assert!(calls[2].2 - calls[1].2 >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_unauthorized_is_fatal() {
        let upstream = ScriptedUpstream::new(|_, _| status(401));
        let d = dispatcher(&["k1", "k2"], settings(60, 0), upstream);
        let err = d.dispatch(ctx()).await.unwrap_err();
        assert!(matches!(err, RelayError::UpstreamFatal(_)));
        assert_eq!(d.upstream.credentials().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_capacity_exhausted() {
        let upstream = ScriptedUpstream::new(|_, _| ok("x", None));
        let d = dispatcher(&["k1"], settings(1, 0), upstream);
        assert!(d.pool().backends()[0].try_acquire());

        let start = Instant::now();
        let call = CallContext::new("model", Vec::new(), None, Duration::from_secs(4));
        let err = d.dispatch(call).await.unwrap_err();

        assert!(matches!(err, RelayError::CapacityExhausted(_)));
        assert_eq!(err.status_code(), 429);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(d.upstream.credentials().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_admits_only_available_permits() {
        let upstream = ScriptedUpstream::new(|_, _| ok("x", Some(1)));
        let d = dispatcher(&["k1", "k2"], settings(1, 1), upstream);
        let start = Instant::now();

        // 240s budget: each admission may wait the full 90s ceiling.
        let burst = (0..6).map(|_| {
            let call = CallContext::new("model", Vec::new(), None, Duration::from_secs(240));
            d.dispatch(call)
        });
        let results = futures_util::future::join_all(burst).await;

        let calls = d.upstream.calls.lock().unwrap().clone();
        let immediate: Vec<_> = calls.iter().filter(|c| c.2 == start).collect();
        let later: Vec<_> = calls.iter().filter(|c| c.2 != start).collect();

        // One permit per backend up front, one more per backend after the refill.
        assert_eq!(immediate.len(), 2);
        assert_eq!(later.len(), 2);
        for (_, _, at) in &later {
            assert!(*at - start >= Duration::from_secs(60));
            assert!(*at - start < Duration::from_secs(90));
        }

        let ok_count = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok_count, 4);
        let exhausted = results
            .iter()
            .filter(|r| matches!(r, Err(RelayError::CapacityExhausted(_))))
            .count();
        assert_eq!(exhausted, 2);
    }

    #[tokio::test]
    async fn test_output_cap_applied_to_request() {
        let upstream = ScriptedUpstream::new(|_, _| ok("x", None));
        let mut s = settings(0, 0);
        s.max_output_tokens = 128;
        let d = dispatcher(&["k1"], s, upstream);

        let call = CallContext::new("model", Vec::new(), Some(4096), Duration::from_secs(5));
        d.dispatch(call).await.unwrap();
        assert_eq!(d.upstream.calls.lock().unwrap()[0].1, Some(128));
    }

    #[tokio::test(start_paused = true)]
    async fn test_usage_floor_applied_on_success() {
        let upstream = ScriptedUpstream::new(|_, index| match index {
            0 => status(503),
            _ => ok("short", Some(1)),
        });
        let mut s = settings(0, 0);
        s.min_tokens_per_second = 50.0;
        s.failover_pause = Duration::from_secs(2);
        let d = dispatcher(&["k1", "k2"], s, upstream);

        let outcome = d.dispatch(ctx()).await.unwrap();
        assert!(outcome.usage.inflated);
        assert!(outcome.usage.completion_tokens >= 100);
        assert!(outcome.usage.tokens_per_second >= 50.0);
        assert_eq!(outcome.completion.content, "short");
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome_label(&UpstreamError::Timeout), "timeout");
        assert_eq!(
            outcome_label(&UpstreamError::Status { status: 502, body: String::new() }),
            "server_error"
        );
    }
}
