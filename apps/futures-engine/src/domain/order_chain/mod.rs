//! Order Chain Bounded Context
//!
//! A chain is one position's lifecycle: the entry, its protective stop,
//! take-profit ladder, averaging re-entries, trailing adjustments, and the
//! exits that bring it flat. Hedges are sibling chains linked to a parent.
//!
//! ```text
//! leg:   PENDING → OPEN → PARTIALLY_FILLED → FILLED
//!                      └→ CANCELLED | REJECTED
//! chain: ACTIVE → PARTIAL → COMPLETED
//!           └→ CANCELLED (entry never filled)
//! ```

pub mod aggregate;
pub mod errors;
pub mod events;
pub mod services;
pub mod value_objects;

pub use aggregate::{
    Chain, ChainKind, ChainPolicy, LegTransition, LegUpdate, NewLeg, OpenChain, OrderLeg,
    ProtectionState, ProtectionTargets, StopState,
};
pub use errors::{ChainError, LegError};
pub use events::{ChainEvent, ChainEventKind};
pub use services::{ClientOrderIdGenerator, leg_token, parse_leg_token};
pub use value_objects::{
    ChainStatus, LegOrderType, LegRole, LegStatus, OrderSide, PositionSide, TradingMode,
};
