//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_batches_total` (counter): finished batch requests by status
//! - `gateway_batch_duration_seconds` (histogram): batch latency
//! - `gateway_batches_in_flight` (gauge): admitted batches currently running
//! - `gateway_admission_rejected_total` (counter): requests answered with 429
//! - `gateway_fetches_total` (counter): upstream fetches by outcome
//! - `gateway_fetch_duration_seconds` (histogram): upstream fetch latency
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_batch(status: u16, started: Instant) {
    metrics::counter!("gateway_batches_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("gateway_batch_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn set_batches_in_flight(count: usize) {
    metrics::gauge!("gateway_batches_in_flight").set(count as f64);
}

pub fn record_admission_rejected() {
    metrics::counter!("gateway_admission_rejected_total").increment(1);
}

pub fn record_fetch(outcome: &'static str, started: Instant) {
    metrics::counter!("gateway_fetches_total", "outcome" => outcome).increment(1);
    metrics::histogram!("gateway_fetch_duration_seconds").record(started.elapsed().as_secs_f64());
}
