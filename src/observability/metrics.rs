//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gate metrics (requests, latency, rejections, store health)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gate_requests_total` (counter): total requests by status
//! - `gate_request_duration_seconds` (histogram): latency distribution
//! - `gate_rejections_total` (counter): guard rejections by guard and code
//! - `gate_limiter_store_errors_total` (counter): store failures by policy
//! - `gate_rate_limit_tracked_keys` (gauge): keys held by the in-process store
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests need no setup
//! - Labels are low-cardinality; source IPs never become labels

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::config::FailurePolicy;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(status: u16, start: Instant) {
    metrics::counter!("gate_requests_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("gate_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(guard: &'static str, code: &'static str) {
    metrics::counter!("gate_rejections_total", "guard" => guard, "code" => code).increment(1);
}

pub fn record_store_error(policy: FailurePolicy) {
    let policy = match policy {
        FailurePolicy::FailOpen => "fail_open",
        FailurePolicy::FailClosed => "fail_closed",
    };
    metrics::counter!("gate_limiter_store_errors_total", "policy" => policy).increment(1);
}

pub fn set_tracked_keys(count: usize) {
    metrics::gauge!("gate_rate_limit_tracked_keys").set(count as f64);
}
