//! Backoff delays between attempts.

use std::time::Duration;

/// Exponential backoff: `base × 2^attempt`, capped at `max`.
pub fn exponential_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

/// Linear backoff: the same pause after every attempt.
pub fn linear_backoff(pause: Duration) -> Option<Duration> {
    if pause.is_zero() {
        None
    } else {
        Some(pause)
    }
}
