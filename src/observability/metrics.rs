//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define front-end metrics (requests, latency, decode failures, cluster counts)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, status
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `http_body_decode_errors_total` (counter): rejected bodies by kind
//! - `http_handler_failures_total` (counter): handler errors and panics
//! - `ipc_messages_dropped_total` (counter): notifications lost by reason
//! - `cluster_worker_requests` (gauge): last reported count per worker pid
//! - `cluster_workers_alive` (gauge): workers in the last snapshot
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op
//! - Only the process that installs the exporter serves `/metrics`

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::cluster::state::ClusterSnapshot;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start_time: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_request_duration_seconds", &labels)
        .record(start_time.elapsed().as_secs_f64());
}

pub fn record_decode_error(kind: &str) {
    metrics::counter!("http_body_decode_errors_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_handler_failure(cause: &'static str) {
    metrics::counter!("http_handler_failures_total", "cause" => cause).increment(1);
}

pub fn record_ipc_dropped(reason: &'static str) {
    metrics::counter!("ipc_messages_dropped_total", "reason" => reason).increment(1);
}

/// Publish one cluster snapshot.
pub fn record_cluster_snapshot(snapshot: &ClusterSnapshot) {
    metrics::gauge!("cluster_workers_alive").set(snapshot.alive as f64);
    for (pid, count) in &snapshot.counts {
        metrics::gauge!("cluster_worker_requests", "pid" => pid.to_string()).set(*count as f64);
    }
}
