//! Logs and process metrics.
//!
//! # Data Flow
//! ```text
//! dispatch / pool / http handlers
//!     → logging.rs (tracing events, request_id spans)
//!     → metrics.rs (attempt outcomes, penalties, bucket gauges)
//!
//! Sinks:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape listener, when enabled
//! ```
//!
//! The caller-facing eval counts are not produced here; see `usage`.

pub mod logging;
pub mod metrics;
