//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define relay metrics (requests, latency, upstream attempts, penalties)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-backend and aggregate metrics
//!
//! # Metrics
//! - `relay_requests_total` (counter): inbound requests by route, status
//! - `relay_request_duration_seconds` (histogram): inbound latency by route
//! - `relay_upstream_attempts_total` (counter): attempts by backend, outcome
//! - `relay_backend_penalties_total` (counter): penalties by backend
//! - `relay_capacity_exhausted_total` (counter): admission failures by mode
//! - `relay_backend_available_tokens` (gauge): permits by backend, dimension
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::load_balancer::BackendSnapshot;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a completed inbound request.
pub fn record_request(route: &'static str, status: u16, start: Instant) {
    counter!("relay_requests_total", "route" => route, "status" => status.to_string()).increment(1);
    histogram!("relay_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

/// Record the outcome of one upstream attempt.
pub fn record_upstream_attempt(backend: &str, outcome: &'static str) {
    counter!(
        "relay_upstream_attempts_total",
        "backend" => backend.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a penalty applied to a backend.
pub fn record_penalty(backend: &str) {
    counter!("relay_backend_penalties_total", "backend" => backend.to_string()).increment(1);
}

/// Record an admission failure.
pub fn record_capacity_exhausted(mode: &'static str) {
    counter!("relay_capacity_exhausted_total", "mode" => mode).increment(1);
}

/// Publish available permits from a snapshot.
pub fn record_backend_tokens(snapshot: &BackendSnapshot) {
    gauge!(
        "relay_backend_available_tokens",
        "backend" => snapshot.id.clone(),
        "dimension" => "minute"
    )
    .set(snapshot.available_per_minute as f64);
    gauge!(
        "relay_backend_available_tokens",
        "backend" => snapshot.id.clone(),
        "dimension" => "second"
    )
    .set(snapshot.available_per_second as f64);
}
