//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt failed:
//!     → retries.rs (retryable or fatal under the admission mode)
//!     → backoff.rs (exponential in rate-limited mode, linear in failover mode)
//!     → timeouts.rs (how much of the call budget admission may spend)
//! ```
//!
//! # Design Decisions
//! - Every dispatch has a deadline; admission never waits past half of it
//! - Retries change credential, never the request body
//! - No jitter: rotation already spreads retries across credentials

pub mod backoff;
pub mod retries;
pub mod timeouts;
