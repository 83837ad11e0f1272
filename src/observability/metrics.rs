//! Metrics collection and exposition.
//!
//! # Metrics
//! - `supervisor_health_probes_total` (counter): management probes by result
//! - `supervisor_rate_limited_total` (counter): control-plane rejections
//! - `supervisor_child_exits_total` (counter): child exits by outcome

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exporter on `addr`.
///
/// Must be called from within the Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_health_probe(healthy: bool) {
    let result = if healthy { "success" } else { "failure" };
    ::metrics::counter!("supervisor_health_probes_total", "result" => result).increment(1);
}

pub fn record_rate_limited() {
    ::metrics::counter!("supervisor_rate_limited_total").increment(1);
}

pub fn record_child_exit(outcome: &'static str) {
    ::metrics::counter!("supervisor_child_exits_total", "outcome" => outcome).increment(1);
}
