//! Backend pool management.
//!
//! # Responsibilities
//! - Own the ordered credential list and the shared rotation cursor
//! - Blocking selection for rate-limited admission (`acquire`)
//! - Non-blocking selection for failover-only admission (`next_eligible`)
//! - Provide snapshots for status endpoints

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::{RateLimitConfig, UpstreamConfig};
use crate::error::{RelayError, RelayResult};
use crate::load_balancer::{
    backend::{Backend, BackendSnapshot},
    round_robin::RoundRobin,
};
use crate::observability::metrics;

/// Wait between acquire passes when no backend admitted the request.
pub const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Fixed-size ordered set of backends plus one rotation cursor.
#[derive(Debug)]
pub struct Pool {
    backends: Vec<Arc<Backend>>,
    cursor: RoundRobin,
}

impl Pool {
    /// Create a pool. Order of `backends` is the rotation order.
    pub fn new(backends: Vec<Backend>) -> RelayResult<Self> {
        if backends.is_empty() {
            return Err(RelayError::Configuration("no upstream credentials configured".to_string()));
        }
        Ok(Self {
            backends: backends.into_iter().map(Arc::new).collect(),
            cursor: RoundRobin::new(),
        })
    }

    /// Build one backend per configured credential.
    pub fn from_config(upstream: &UpstreamConfig, rate_limit: &RateLimitConfig) -> RelayResult<Self> {
        let backends = upstream
            .api_keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                Backend::new(
                    format!("key-{}", i + 1),
                    key.clone(),
                    rate_limit.requests_per_minute,
                    rate_limit.requests_per_second,
                )
            })
            .collect();
        Self::new(backends)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Current rotation cursor.
    pub fn cursor_position(&self) -> usize {
        self.cursor.position()
    }

    /// All backends starting at the cursor; advances the cursor by one.
    pub fn rotation_order(&self) -> Vec<Arc<Backend>> {
        self.cursor
            .rotation(self.backends.len())
            .map(|i| self.backends[i].clone())
            .collect()
    }

    /// Wait up to `timeout` for any backend to admit a request.
    ///
    /// Each pass takes a fresh rotation order and returns the first backend
    /// whose `try_acquire` succeeds. Between passes the task sleeps for
    /// [`ACQUIRE_POLL_INTERVAL`]. Never gives up before `timeout` has elapsed.
    pub async fn acquire(&self, timeout: Duration) -> RelayResult<Arc<Backend>> {
        let deadline = Instant::now() + timeout;
        let mut passes = 0u32;

        loop {
            passes += 1;
            if let Some(backend) = self.rotation_order().into_iter().find(|b| b.try_acquire()) {
                tracing::trace!(backend = %backend.id(), passes, "Backend acquired");
                return Ok(backend);
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL.min(deadline - now)).await;
        }

        tracing::warn!(passes, timeout = ?timeout, "No backend admitted request before timeout");
        Err(RelayError::CapacityExhausted(format!(
            "all {} credentials are rate limited or penalized (waited {:?})",
            self.backends.len(),
            timeout
        )))
    }

    /// First backend of a fresh rotation that is not penalized.
    /// When every backend is penalized the first of the rotation is returned anyway.
    pub fn next_eligible(&self) -> Arc<Backend> {
        let order = self.rotation_order();
        match order.iter().find(|b| !b.in_penalty()) {
            Some(backend) => backend.clone(),
            None => {
                // Pool is never empty, so the rotation has a first element.
                let fallback = order[0].clone();
                tracing::debug!(backend = %fallback.id(), "All backends penalized, using rotation head");
                fallback
            }
        }
    }

    /// Snapshot of every backend, in pool order.
    pub fn status_snapshot(&self) -> Vec<BackendSnapshot> {
        self.backends
            .iter()
            .map(|b| {
                let snap = b.snapshot();
                metrics::record_backend_tokens(&snap);
                snap
            })
            .collect()
    }

    /// Number of backends currently penalized.
    pub fn penalized_count(&self) -> usize {
        self.backends.iter().filter(|b| b.in_penalty()).count()
    }
}
