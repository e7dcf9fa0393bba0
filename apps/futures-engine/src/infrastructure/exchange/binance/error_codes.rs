//! Exchange error code classification.
//!
//! Lookup order: HTTP 429/418, then the code table, then the HTTP status
//! class. Unknown codes on a 4xx are permanent.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::resilience::{is_rate_limit_status, is_retryable_status};

/// How the executor treats an error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Transient; retry with backoff.
    Retryable,
    /// Rate limit or IP ban; trips the admission circuit.
    RateLimit,
    /// Return immediately with code and message.
    Permanent,
    /// Idempotency token already used.
    Duplicate,
    /// Requested state already in effect; treated as success.
    Benign,
}

const RETRYABLE: &[i64] = &[-1000, -1001, -1006, -1007, -1008, -1015, -1016, -1021];
const RATE_LIMIT: &[i64] = &[-1003];
const PERMANENT: &[i64] = &[
    -1022, -2014, -2015, -1100, -1101, -1102, -1106, -1111, -1116, -1121, -2010, -2011, -2013,
    -2019, -2021, -2022, -4003, -4028, -4164,
];
const DUPLICATE: &[i64] = &[-4116, -4015];
const BENIGN: &[i64] = &[-4046, -4059];

fn table() -> &'static HashMap<i64, ErrorClass> {
    static TABLE: OnceLock<HashMap<i64, ErrorClass>> = OnceLock::new();
    TABLE.get_or_init(|| {
        [
            (RETRYABLE, ErrorClass::Retryable),
            (RATE_LIMIT, ErrorClass::RateLimit),
            (PERMANENT, ErrorClass::Permanent),
            (DUPLICATE, ErrorClass::Duplicate),
            (BENIGN, ErrorClass::Benign),
        ]
        .into_iter()
        .flat_map(|(codes, class)| codes.iter().map(move |code| (*code, class)))
        .collect()
    })
}

/// Classify an error response.
#[must_use]
pub fn classify(status: u16, code: Option<i64>) -> ErrorClass {
    if is_rate_limit_status(status) {
        return ErrorClass::RateLimit;
    }
    if let Some(class) = code.and_then(|c| table().get(&c).copied()) {
        return class;
    }
    if is_retryable_status(status) {
        ErrorClass::Retryable
    } else {
        ErrorClass::Permanent
    }
}

/// Class of a known code, ignoring the HTTP status.
#[must_use]
pub fn class_of_code(code: i64) -> Option<ErrorClass> {
    table().get(&code).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(429, None, ErrorClass::RateLimit ; "too many requests")]
    #[test_case(418, Some(-1003), ErrorClass::RateLimit ; "ip banned")]
    #[test_case(400, Some(-1003), ErrorClass::RateLimit ; "weight exceeded code")]
    #[test_case(400, Some(-1021), ErrorClass::Retryable ; "timestamp outside recv window")]
    #[test_case(400, Some(-1001), ErrorClass::Retryable ; "disconnected")]
    #[test_case(400, Some(-1007), ErrorClass::Retryable ; "backend timeout")]
    #[test_case(400, Some(-2019), ErrorClass::Permanent ; "margin insufficient")]
    #[test_case(401, Some(-2015), ErrorClass::Permanent ; "invalid api key")]
    #[test_case(400, Some(-1022), ErrorClass::Permanent ; "invalid signature")]
    #[test_case(400, Some(-4116), ErrorClass::Duplicate ; "duplicate client order id")]
    #[test_case(400, Some(-4015), ErrorClass::Duplicate ; "duplicate algo id")]
    #[test_case(400, Some(-4046), ErrorClass::Benign ; "margin type unchanged")]
    #[test_case(400, Some(-4059), ErrorClass::Benign ; "position side unchanged")]
    #[test_case(503, None, ErrorClass::Retryable ; "unavailable")]
    #[test_case(408, None, ErrorClass::Retryable ; "request timeout")]
    #[test_case(503, Some(-2019), ErrorClass::Permanent ; "known code wins over status")]
    #[test_case(400, Some(-9999), ErrorClass::Permanent ; "unknown code")]
    #[test_case(404, None, ErrorClass::Permanent ; "not found")]
    fn classification(status: u16, code: Option<i64>, expected: ErrorClass) {
        assert_eq!(classify(status, code), expected);
    }

    #[test]
    fn code_lookup() {
        assert_eq!(class_of_code(-1015), Some(ErrorClass::Retryable));
        assert_eq!(class_of_code(-4164), Some(ErrorClass::Permanent));
        assert_eq!(class_of_code(0), None);
    }
}
