//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Upstream endpoint and credential list.
    pub upstream: UpstreamConfig,

    /// Per-credential rate budgets.
    pub rate_limit: RateLimitConfig,

    /// Retry configuration for rate-limited admission.
    pub retries: RetryConfig,

    /// Failover configuration for failover-only admission.
    pub failover: FailoverConfig,

    /// Caller-facing usage reporting.
    pub usage: UsageConfig,

    /// Caller model name -> upstream model name.
    pub models: BTreeMap<String, String>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin endpoints.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:11434").
    pub bind_address: String,

    /// Maximum inbound request body in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:11434".to_string(),
            max_body_size: 4 * 1024 * 1024,
        }
    }
}

/// Upstream endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the OpenAI-compatible API (e.g., "https://api.example.com/v1").
    pub base_url: String,

    /// Per-call timeout in seconds.
    pub timeout_secs: u64,

    /// Credential list. Order defines pool order.
    pub api_keys: Vec<String>,

    /// Global cap on output tokens (0 disables the cap).
    pub max_output_tokens: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://integrate.api.nvidia.com/v1".to_string(),
            timeout_secs: 120,
            api_keys: Vec::new(),
            max_output_tokens: 0,
        }
    }
}

/// Per-credential rate limits. Zero disables a dimension.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per minute, per credential.
    pub requests_per_minute: u32,

    /// Requests per second, per credential.
    pub requests_per_second: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 40,
            requests_per_second: 0,
        }
    }
}

impl RateLimitConfig {
    /// True when at least one dimension gates admission.
    pub fn is_enabled(&self) -> bool {
        self.requests_per_minute > 0 || self.requests_per_second > 0
    }
}

/// Retry configuration (rate-limited admission).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff sleep in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

/// Failover configuration (failover-only admission).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Attempts beyond one full sweep of the pool.
    pub extra_retries: u32,

    /// Penalty applied to a credential after a retryable failure, in seconds.
    pub penalty_secs: u64,

    /// Pause between failover attempts in milliseconds (0 disables).
    pub pause_ms: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            extra_retries: 2,
            penalty_secs: 60,
            pause_ms: 0,
        }
    }
}

/// Caller-facing usage reporting.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UsageConfig {
    /// Minimum reported tokens per second (0 disables).
    pub min_tokens_per_second: f64,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin endpoints.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
        }
    }
}
