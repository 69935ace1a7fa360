//! Admission mode and dispatch settings.

use std::time::Duration;

use serde::Serialize;

use crate::config::RelayConfig;

/// How requests are admitted to a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionMode {
    /// Local token buckets gate every request.
    RateLimited,
    /// No local gating; eligibility follows observed upstream failures.
    FailoverOnly,
}

impl AdmissionMode {
    /// Rate-limited when either per-credential dimension is enabled.
    pub fn from_limits(requests_per_minute: u32, requests_per_second: u32) -> Self {
        if requests_per_minute > 0 || requests_per_second > 0 {
            AdmissionMode::RateLimited
        } else {
            AdmissionMode::FailoverOnly
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionMode::RateLimited => "rate_limited",
            AdmissionMode::FailoverOnly => "failover_only",
        }
    }
}

impl std::fmt::Display for AdmissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the dispatcher reads from configuration.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSettings {
    pub mode: AdmissionMode,
    pub requests_per_minute: u32,
    pub requests_per_second: u32,
    /// Retries after the first attempt (rate-limited mode).
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Penalty after a retryable failure in rate-limited mode.
    pub rate_limited_cooldown: Duration,
    /// Attempts beyond one sweep of the pool (failover-only mode).
    pub failover_extra_retries: u32,
    pub failover_penalty: Duration,
    pub failover_pause: Duration,
    pub call_timeout: Duration,
    /// Global output-token cap (0 disables).
    pub max_output_tokens: u32,
    /// Throughput floor for reported usage (0 disables).
    pub min_tokens_per_second: f64,
}

/// Short cool-down applied to a credential after a retryable failure
/// when rate limiting is active.
pub const RATE_LIMITED_COOLDOWN: Duration = Duration::from_secs(5);

impl DispatchSettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        let rl = &config.rate_limit;
        Self {
            mode: AdmissionMode::from_limits(rl.requests_per_minute, rl.requests_per_second),
            requests_per_minute: rl.requests_per_minute,
            requests_per_second: rl.requests_per_second,
            max_retries: config.retries.max_retries,
            base_backoff: Duration::from_millis(config.retries.base_delay_ms),
            max_backoff: Duration::from_millis(config.retries.max_delay_ms),
            rate_limited_cooldown: RATE_LIMITED_COOLDOWN,
            failover_extra_retries: config.failover.extra_retries,
            failover_penalty: Duration::from_secs(config.failover.penalty_secs),
            failover_pause: Duration::from_millis(config.failover.pause_ms),
            call_timeout: Duration::from_secs(config.upstream.timeout_secs),
            max_output_tokens: config.upstream.max_output_tokens,
            min_tokens_per_second: config.usage.min_tokens_per_second,
        }
    }

    /// Apply the global cap to a caller's requested output tokens.
    ///
    /// Non-positive requests count as absent. With no request the cap itself
    /// is sent; with neither, the field is omitted.
    pub fn effective_max_tokens(&self, requested: Option<i64>) -> Option<u32> {
        let requested = requested
            .filter(|n| *n > 0)
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX));
        let cap = Some(self.max_output_tokens).filter(|c| *c > 0);
        match (requested, cap) {
            (Some(r), Some(c)) => Some(r.min(c)),
            (Some(r), None) => Some(r),
            (None, cap) => cap,
        }
    }
}
