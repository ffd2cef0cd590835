//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): requests by method, status
//! - `relay_request_duration_seconds` (histogram): end-to-end latency
//! - `relay_auth_denied_total` (counter): access denials by status
//! - `relay_quota_denied_total` (counter): quota denials by scope
//! - `relay_upstream_duration_seconds` (histogram): upstream latency by outcome
//! - `relay_upstream_timeouts_total` (counter): deadline expiries
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("relay_requests_total", &labels).increment(1);
    histogram!("relay_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_auth_denied(status: u16) {
    counter!("relay_auth_denied_total", "status" => status.to_string()).increment(1);
}

pub fn record_quota_denied(scope: &'static str) {
    counter!("relay_quota_denied_total", "scope" => scope).increment(1);
}

pub fn record_upstream(outcome: &'static str, start: Instant) {
    histogram!("relay_upstream_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_timeout() {
    counter!("relay_upstream_timeouts_total").increment(1);
}
