//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, status
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `http_requests_in_flight` (gauge): requests currently being handled
//! - `dependency_open_total` (counter): dependency opens by name, result
//! - `runtime_shutdown_total` (counter): shutdowns by outcome
//! - `runtime_shutdown_duration_seconds` (histogram): signal to stopped
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let method = method.to_string();
    let status = status.to_string();
    counter!("http_requests_total", "method" => method.clone(), "status" => status.clone()).increment(1);
    histogram!("http_request_duration_seconds", "method" => method, "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn set_in_flight(count: usize) {
    gauge!("http_requests_in_flight").set(count as f64);
}

pub fn record_dependency_open(name: &'static str, success: bool) {
    let result = if success { "ok" } else { "error" };
    counter!("dependency_open_total", "dependency" => name, "result" => result).increment(1);
}

pub fn record_shutdown(forced: bool, elapsed: Duration) {
    let outcome = if forced { "forced" } else { "drained" };
    counter!("runtime_shutdown_total", "outcome" => outcome).increment(1);
    histogram!("runtime_shutdown_duration_seconds").record(elapsed.as_secs_f64());
}
