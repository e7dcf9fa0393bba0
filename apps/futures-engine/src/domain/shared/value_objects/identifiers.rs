//! Strongly-typed identifiers for domain entities.
//!
//! These prevent mixing up chain ids, client order ids and exchange ids,
//! which are all plain strings on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from a string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(
    ChainId,
    "Identifier of an order chain. Doubles as the base of every leg's client order id."
);
define_id!(
    ClientOrderId,
    "Client-assigned order identifier, used as the exchange idempotency token."
);
define_id!(
    ExchangeOrderId,
    "Exchange-assigned identifier (order id or algo id)."
);
define_id!(EventId, "Unique identifier of a published lifecycle event.");

impl EventId {
    /// Generate a new unique event identifier using UUID v4.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl ExchangeOrderId {
    /// Build from the numeric id the exchange returns.
    #[must_use]
    pub fn from_numeric(id: i64) -> Self {
        Self(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_id_new_and_display() {
        let id = ChainId::new("SCA-15JAN-00001");
        assert_eq!(id.as_str(), "SCA-15JAN-00001");
        assert_eq!(format!("{id}"), "SCA-15JAN-00001");
    }

    #[test]
    fn client_order_id_from_string() {
        let id: ClientOrderId = "SCA-15JAN-00001-E".into();
        assert_eq!(id.as_str(), "SCA-15JAN-00001-E");

        let id: ClientOrderId = String::from("SCA-15JAN-00001-SL").into();
        assert_eq!(id.into_inner(), "SCA-15JAN-00001-SL");
    }

    #[test]
    fn exchange_order_id_from_numeric() {
        let id = ExchangeOrderId::from_numeric(8_389_765_612);
        assert_eq!(id.as_str(), "8389765612");
    }

    #[test]
    fn event_id_generate_is_unique() {
        assert_ne!(EventId::generate(), EventId::generate());
    }
}
