//! Deadline arithmetic for a dispatch.
//!
//! # Design Decisions
//! - Uses Tokio's clock so paused-time tests see the same deadlines
//! - Admission may spend at most half of what is left, and never more than a ceiling

use std::time::Duration;

use tokio::time::Instant;

/// Longest a single rate-limited admission may wait. Longer than the
/// per-minute refill period, so a waiting call can outlast one refill.
pub const ADMISSION_WAIT_CEILING: Duration = Duration::from_secs(90);

/// Time left before `deadline` (zero once it has passed).
pub fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// How long one admission may wait given the remaining call budget.
pub fn admission_wait(remaining: Duration) -> Duration {
    (remaining / 2).min(ADMISSION_WAIT_CEILING)
}
