//! Observability module for metrics.
//!
//! Prometheus metrics export for exchange traffic, admission control and
//! chain lifecycle. Logging is initialized by the binary.

pub mod metrics;

pub use metrics::{MetricsConfig, MetricsError, init_metrics};
