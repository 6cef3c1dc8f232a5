//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): proxied requests by outcome
//! - `proxy_upstream_duration_seconds` (histogram): upstream fetch latency
//! - `proxy_sessions_active` (gauge): live sessions
//! - `proxy_sessions_created_total` (counter)
//! - `proxy_sessions_expired_total` (counter)
//! - `proxy_rewrites_total` (counter): rewritten bodies by kind
//!
//! All recorders are no-ops until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(outcome: &'static str) {
    counter!("proxy_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_upstream(start: Instant) {
    histogram!("proxy_upstream_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_active_sessions(count: usize) {
    gauge!("proxy_sessions_active").set(count as f64);
}

pub fn record_session_created() {
    counter!("proxy_sessions_created_total").increment(1);
}

pub fn record_sessions_expired(count: usize) {
    counter!("proxy_sessions_expired_total").increment(count as u64);
}

pub fn record_rewrite(kind: &'static str) {
    counter!("proxy_rewrites_total", "kind" => kind).increment(1);
}
