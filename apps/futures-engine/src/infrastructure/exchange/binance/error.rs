//! Binance-specific error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::error_codes::ErrorClass;
use crate::application::ports::ExchangeError;
use crate::resilience::AdmissionError;

/// Errors from the Binance futures adapter.
#[derive(Debug, Error, Clone)]
pub enum BinanceError {
    /// Request never produced a response (connect, timeout, TLS).
    #[error("Network error: {0}")]
    Network(String),

    /// Exchange returned an error body.
    #[error("API error {code} (HTTP {status}): {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Exchange error code (0 when the body had none).
        code: i64,
        /// Exchange message.
        message: String,
        /// Classification used for retry decisions.
        class: ErrorClass,
    },

    /// Rate-limited; the admission circuit is open until `banned_until`.
    #[error("Rate limited until {banned_until}: {message}")]
    RateLimited {
        /// Ban end in force.
        banned_until: DateTime<Utc>,
        /// Last exchange message.
        message: String,
    },

    /// Admission refused the call before it was sent.
    #[error("Admission denied: {0}")]
    AdmissionDenied(#[from] AdmissionError),

    /// Retry budget spent on retryable failures.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Last failure.
        last: String,
    },

    /// Response body did not match the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Signed call without credentials.
    #[error("API credentials not configured")]
    MissingCredentials,

    /// Request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No order with this token.
    #[error("Order not found: {client_order_id}")]
    OrderNotFound {
        /// Token queried.
        client_order_id: String,
    },
}

impl BinanceError {
    /// Exchange error code, if the exchange returned one.
    #[must_use]
    pub const fn code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Classification of an API error.
    #[must_use]
    pub const fn class(&self) -> Option<ErrorClass> {
        match self {
            Self::Api { class, .. } => Some(*class),
            _ => None,
        }
    }

    /// Whether the call outcome is unknown and could succeed later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::RateLimited { .. }
                | Self::AdmissionDenied(_)
                | Self::RetriesExhausted { .. }
                | Self::Api {
                    class: ErrorClass::Retryable | ErrorClass::RateLimit,
                    ..
                }
        )
    }
}

impl From<BinanceError> for ExchangeError {
    fn from(err: BinanceError) -> Self {
        match err {
            BinanceError::Network(msg) => Self::Transient { message: msg },
            BinanceError::RetriesExhausted { attempts, last } => Self::Transient {
                message: format!("retries exhausted after {attempts} attempts: {last}"),
            },
            BinanceError::RateLimited { .. } | BinanceError::AdmissionDenied(_) => {
                Self::CircuitOpen {
                    message: err.to_string(),
                }
            }
            BinanceError::Api {
                code,
                message,
                class,
                ..
            } => match class {
                ErrorClass::Retryable | ErrorClass::RateLimit => Self::Transient {
                    message: format!("{code}: {message}"),
                },
                ErrorClass::Permanent | ErrorClass::Duplicate | ErrorClass::Benign => {
                    Self::Rejected { code, message }
                }
            },
            BinanceError::OrderNotFound { client_order_id } => Self::NotFound { client_order_id },
            BinanceError::Decode(msg) | BinanceError::InvalidRequest(msg) => {
                Self::Unknown { message: msg }
            }
            BinanceError::MissingCredentials => Self::Unknown {
                message: "API credentials not configured".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(code: i64, class: ErrorClass) -> BinanceError {
        BinanceError::Api {
            status: 400,
            code,
            message: "boom".to_string(),
            class,
        }
    }

    #[test]
    fn permanent_api_error_keeps_code_and_message() {
        let err: ExchangeError = api(-2019, ErrorClass::Permanent).into();
        assert_eq!(
            err,
            ExchangeError::Rejected {
                code: -2019,
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn rate_limit_maps_to_circuit_open() {
        let err: ExchangeError = BinanceError::RateLimited {
            banned_until: Utc::now(),
            message: "banned".to_string(),
        }
        .into();
        assert!(matches!(err, ExchangeError::CircuitOpen { .. }));
    }

    #[test]
    fn network_and_exhausted_are_transient() {
        assert!(BinanceError::Network("reset".into()).is_transient());
        let exhausted = BinanceError::RetriesExhausted {
            attempts: 3,
            last: "503".into(),
        };
        assert!(exhausted.is_transient());
        assert!(ExchangeError::from(exhausted).is_transient());
        assert!(!api(-1022, ErrorClass::Permanent).is_transient());
    }

    #[test]
    fn not_found_maps_through() {
        let err: ExchangeError = BinanceError::OrderNotFound {
            client_order_id: "SCA-16OCT-00001-SL".into(),
        }
        .into();
        assert!(matches!(err, ExchangeError::NotFound { .. }));
    }
}
