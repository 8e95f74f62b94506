//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_body_rewrites_total` (counter): rewrite outcomes by route

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

/// Record a finished request.
pub fn record_request(method: &str, status: u16, route: &str, started: Instant) {
    let labels = [
        ("method", method.to_owned()),
        ("status", status.to_string()),
        ("route", route.to_owned()),
    ];
    ::metrics::counter!("gateway_requests_total", &labels).increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds", &labels)
        .record(started.elapsed().as_secs_f64());
}

/// Record the outcome of a response-body rewrite (`done`, `passthrough`, or an error kind).
pub fn record_rewrite(route: &str, outcome: &str) {
    ::metrics::counter!(
        "gateway_body_rewrites_total",
        "route" => route.to_owned(),
        "outcome" => outcome.to_owned()
    )
    .increment(1);
}
