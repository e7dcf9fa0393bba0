//! Shared Value Objects
//!
//! Immutable domain types used across bounded contexts.
//! Value objects are compared by value, not identity.

mod identifiers;
mod symbol;

pub use identifiers::{ChainId, ClientOrderId, EventId, ExchangeOrderId};
pub use symbol::Symbol;
