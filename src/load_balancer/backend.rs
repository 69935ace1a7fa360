//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream credential
//! - Track two independent token buckets (per minute, per second)
//! - Track the penalty window after observed failures
//! - Record the last success/failure for observability
//!
//! # Design Decisions
//! - All mutable state sits behind one mutex so refill + consume is all-or-nothing
//! - Buckets start full and refill continuously
//! - Time comes from `tokio::time::Instant` so tests can pause the clock

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// A token bucket for one rate dimension.
#[derive(Debug, Clone)]
struct RateDimension {
    capacity: f64,
    period: Duration,
    tokens: f64,
    last_refill: Instant,
}

impl RateDimension {
    fn new(capacity: u32, period: Duration, now: Instant) -> Self {
        Self {
            capacity: capacity as f64,
            period,
            tokens: capacity as f64,
            last_refill: now,
        }
    }

    fn is_enabled(&self) -> bool {
        self.capacity > 0.0
    }

    fn refill(&mut self, now: Instant) {
        if !self.is_enabled() {
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        let periods = elapsed / self.period.as_secs_f64();
        self.tokens = (self.tokens + periods * self.capacity).min(self.capacity);
        self.last_refill = now;
    }

    fn available(&self) -> u32 {
        self.tokens.floor().max(0.0) as u32
    }
}

#[derive(Debug)]
struct BackendState {
    per_minute: RateDimension,
    per_second: RateDimension,
    penalty_until: Option<Instant>,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    last_failure_code: Option<u16>,
    last_failure_message: Option<String>,
}

impl BackendState {
    fn refill(&mut self, now: Instant) {
        self.per_minute.refill(now);
        self.per_second.refill(now);
    }

    fn in_penalty(&self, now: Instant) -> bool {
        self.penalty_until.is_some_and(|until| now < until)
    }
}

/// A single upstream credential and its admission state.
pub struct Backend {
    id: String,
    credential: String,
    state: Mutex<BackendState>,
}

/// Read-only view of a backend for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct BackendSnapshot {
    pub id: String,
    /// Last four characters of the credential.
    pub credential_hint: String,
    pub requests_per_minute: u32,
    pub requests_per_second: u32,
    pub available_per_minute: u32,
    pub available_per_second: u32,
    pub in_penalty: bool,
    pub penalty_remaining_ms: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_failure_code: Option<u16>,
    pub last_failure_message: Option<String>,
}

impl Backend {
    /// Create a new backend. A limit of zero disables that dimension.
    pub fn new(
        id: impl Into<String>,
        credential: impl Into<String>,
        requests_per_minute: u32,
        requests_per_second: u32,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: id.into(),
            credential: credential.into(),
            state: Mutex::new(BackendState {
                per_minute: RateDimension::new(requests_per_minute, Duration::from_secs(60), now),
                per_second: RateDimension::new(requests_per_second, Duration::from_secs(1), now),
                penalty_until: None,
                last_success: None,
                last_failure: None,
                last_failure_code: None,
                last_failure_message: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The opaque credential sent upstream.
    pub fn credential(&self) -> &str {
        &self.credential
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().expect("backend state mutex poisoned")
    }

    /// Top up both buckets for the time elapsed since their last refill.
    pub fn refill(&self) {
        self.lock().refill(Instant::now());
    }

    /// Take one permit from every enabled dimension, or nothing at all.
    ///
    /// Refused while penalized. Always succeeds when both dimensions are disabled.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut state = self.lock();

        if state.in_penalty(now) {
            return false;
        }

        let minute_on = state.per_minute.is_enabled();
        let second_on = state.per_second.is_enabled();
        if !minute_on && !second_on {
            return true;
        }

        state.refill(now);

        let ready = (!minute_on || state.per_minute.available() >= 1)
            && (!second_on || state.per_second.available() >= 1);
        if !ready {
            return false;
        }

        if minute_on {
            state.per_minute.tokens -= 1.0;
        }
        if second_on {
            state.per_second.tokens -= 1.0;
        }
        true
    }

    pub fn in_penalty(&self) -> bool {
        self.lock().in_penalty(Instant::now())
    }

    /// Make the backend ineligible for `duration` from now.
    pub fn penalize(&self, duration: Duration) {
        self.lock().penalty_until = Some(Instant::now() + duration);
    }

    /// Record a successful call; clears the last failure code and message.
    pub fn mark_success(&self) {
        let mut state = self.lock();
        state.last_success = Some(Utc::now());
        state.last_failure_code = None;
        state.last_failure_message = None;
    }

    /// Record a failed call, overwriting the previous failure.
    pub fn mark_failure(&self, code: Option<u16>, message: impl Into<String>) {
        let mut state = self.lock();
        state.last_failure = Some(Utc::now());
        state.last_failure_code = code;
        state.last_failure_message = Some(message.into());
    }

    /// Refill, then report capacities, permits and health.
    pub fn snapshot(&self) -> BackendSnapshot {
        let now = Instant::now();
        let mut state = self.lock();
        state.refill(now);

        let penalty_remaining = state
            .penalty_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default();

        BackendSnapshot {
            id: self.id.clone(),
            credential_hint: credential_hint(&self.credential),
            requests_per_minute: state.per_minute.capacity as u32,
            requests_per_second: state.per_second.capacity as u32,
            available_per_minute: state.per_minute.available(),
            available_per_second: state.per_second.available(),
            in_penalty: state.in_penalty(now),
            penalty_remaining_ms: penalty_remaining.as_millis() as u64,
            last_success_at: state.last_success,
            last_failure_at: state.last_failure,
            last_failure_code: state.last_failure_code,
            last_failure_message: state.last_failure_message.clone(),
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("id", &self.id)
            .field("credential", &credential_hint(&self.credential))
            .finish()
    }
}

fn credential_hint(credential: &str) -> String {
    let chars: Vec<char> = credential.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("...{}", tail)
}
