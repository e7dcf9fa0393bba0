//! Prometheus metrics for the futures engine.
//!
//! Covers exchange traffic, admission control, chain lifecycle, and the
//! decision gate. Recording is a no-op until [`init_metrics`] installs the
//! exporter, so tests can call every function freely.
//!
//! # Example
//!
//! ```ignore
//! use futures_engine::observability::{init_metrics, MetricsConfig};
//!
//! init_metrics(&MetricsConfig::default())?;
//! record_exchange_request("order", "success", 0.042);
//! ```

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
    /// Histogram buckets for request latency (seconds).
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9090)),
            // 5ms to 15s, the signed request timeout
            latency_buckets: vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0],
        }
    }
}

impl MetricsConfig {
    /// Create a configuration with a custom address.
    #[must_use]
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            listen_addr: addr,
            ..Default::default()
        }
    }
}

/// Initialize the Prometheus exporter serving `/metrics`.
///
/// # Errors
///
/// Returns an error if the exporter fails to start (e.g., port already in use).
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .set_buckets(&config.latency_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(addr = %config.listen_addr, "Prometheus metrics exporter started");
    Ok(())
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure the exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install the exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

// ============================================================================
// Exchange Traffic
// ============================================================================

/// Record one HTTP attempt against the exchange.
///
/// # Arguments
///
/// * `endpoint` - Endpoint label (e.g., "order", "position_risk")
/// * `outcome` - "success", "retryable", "rate_limited", "permanent", "network"
/// * `latency_seconds` - Round-trip time
pub fn record_exchange_request(endpoint: &str, outcome: &str, latency_seconds: f64) {
    counter!(
        "exchange_requests_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        "exchange_request_latency_seconds",
        "endpoint" => endpoint.to_string()
    )
    .record(latency_seconds);
}

/// Record a retry of a logical call.
pub fn record_exchange_retry(endpoint: &str) {
    counter!("exchange_retries_total", "endpoint" => endpoint.to_string()).increment(1);
}

// ============================================================================
// Admission Control
// ============================================================================

/// Record a refused admission.
pub fn record_admission_denied(reason: &str, priority: &str) {
    counter!(
        "admission_denied_total",
        "reason" => reason.to_string(),
        "priority" => priority.to_string()
    )
    .increment(1);
}

/// Record the exchange ban circuit opening.
pub fn record_circuit_trip() {
    counter!("admission_circuit_trips_total").increment(1);
}

/// Record a critical call admitted through an open circuit.
pub fn record_critical_bypass() {
    counter!("admission_critical_bypass_total").increment(1);
}

/// Update window usage gauges.
pub fn set_admission_usage(used_weight: u32, used_orders: u32) {
    gauge!("admission_used_weight").set(f64::from(used_weight));
    gauge!("admission_used_orders").set(f64::from(used_orders));
}

// ============================================================================
// Chain Lifecycle
// ============================================================================

/// Record a published chain event.
pub fn record_chain_event(event_type: &str) {
    counter!("chain_events_total", "type" => event_type.to_string()).increment(1);
}

/// Update the active and unprotected chain gauges.
pub fn set_chain_counts(active: usize, unprotected: usize) {
    gauge!("chains_active").set(active as f64);
    gauge!("chains_unprotected").set(unprotected as f64);
}

/// Record a monitor tick.
pub fn record_monitor_tick(outcome: &str, latency_seconds: f64) {
    counter!("monitor_ticks_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("monitor_tick_latency_seconds").record(latency_seconds);
}

// ============================================================================
// Decision Gate
// ============================================================================

/// Record a decision accepted or dropped by the constraint engine.
pub fn record_decision(outcome: &str, action: &str) {
    counter!(
        "decisions_total",
        "outcome" => outcome.to_string(),
        "action" => action.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_exporter_is_noop() {
        record_exchange_request("order", "success", 0.01);
        record_exchange_retry("order");
        record_admission_denied("circuit_open", "normal");
        record_circuit_trip();
        record_critical_bypass();
        set_admission_usage(10, 1);
        record_chain_event("LEG_FILLED");
        set_chain_counts(2, 0);
        record_monitor_tick("ok", 0.1);
        record_decision("accepted", "OPEN_LONG");
    }

    #[test]
    fn default_config_listens_on_9090() {
        let config = MetricsConfig::default();
        assert_eq!(config.listen_addr.port(), 9090);
        assert!(config.latency_buckets.windows(2).all(|w| w[0] < w[1]));
    }
}
