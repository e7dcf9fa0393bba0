//! Resilience patterns for exchange calls.
//!
//! Admission control (weighted per-minute budgets plus the exchange ban
//! circuit) and retry backoff for the signed request executor.

mod admission;
mod retry;

pub use admission::{
    AdmissionConfig, AdmissionController, AdmissionDecision, AdmissionError, AdmissionSnapshot,
    DenyReason, EndpointClass, HeaderSnapshot, RequestCost, RequestPriority, parse_ban_until,
};
pub use retry::{
    ExponentialBackoffCalculator, RetryPolicy, is_rate_limit_status, is_retryable_status,
    parse_retry_after,
};
