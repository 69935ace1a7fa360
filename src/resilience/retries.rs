//! Retry classification.
//!
//! # Responsibilities
//! - Decide whether an upstream failure may succeed on another attempt
//! - Size the failover attempt budget
//!
//! # Design Decisions
//! - 429, 5xx and timeouts are always retryable
//! - 401 is retryable only in failover-only mode (another credential may work)
//! - Everything else is fatal and surfaces immediately

use crate::dispatch::AdmissionMode;
use crate::upstream::UpstreamError;

/// What the dispatcher should do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Retryable,
    Fatal,
}

/// Classify a failed attempt under the given admission mode.
pub fn classify(err: &UpstreamError, mode: AdmissionMode) -> Outcome {
    match err {
        UpstreamError::Timeout => Outcome::Retryable,
        UpstreamError::Status { status, .. } => match *status {
            429 => Outcome::Retryable,
            s if s >= 500 => Outcome::Retryable,
            401 if mode == AdmissionMode::FailoverOnly => Outcome::Retryable,
            _ => Outcome::Fatal,
        },
        UpstreamError::Transport(_) | UpstreamError::InvalidBody(_) => Outcome::Fatal,
    }
}

/// Attempt budget for failover-only mode.
///
/// At least one full sweep plus `extra_retries`, never more than three sweeps.
pub fn failover_attempt_budget(pool_size: usize, extra_retries: u32) -> u32 {
    let pool_size = pool_size as u32;
    pool_size
        .saturating_add(extra_retries)
        .min(pool_size.saturating_mul(3))
}
