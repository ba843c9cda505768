//! Prometheus metrics.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): proxied requests by method, status
//! - `proxy_request_duration_seconds` (histogram): time to response headers
//! - `proxy_bytes_total` (counter): relayed bytes by direction (up/down)
//! - `proxy_rejections_total` (counter): requests refused, by reason
//! - `proxy_rate_limited_total` (counter): rate limit rejections, by axis
//!
//! Calls are no-ops until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Record a finished proxied request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("proxy_requests_total", &labels).increment(1);
    metrics::histogram!("proxy_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

/// Record relayed bytes in one direction.
pub fn record_bytes(direction: &'static str, n: u64) {
    metrics::counter!("proxy_bytes_total", "direction" => direction).increment(n);
}

/// Record a request refused before or during forwarding.
pub fn record_rejection(reason: &'static str) {
    metrics::counter!("proxy_rejections_total", "reason" => reason).increment(1);
}

/// Record a rate limit rejection on the given axis.
pub fn record_rate_limited(axis: &'static str) {
    metrics::counter!("proxy_rate_limited_total", "axis" => axis).increment(1);
}
