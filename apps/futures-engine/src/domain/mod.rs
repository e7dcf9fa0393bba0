//! Domain Layer
//!
//! The innermost layer containing business logic with zero infrastructure dependencies.
//! This layer defines:
//!
//! - **Aggregates**: Consistency boundaries with invariants
//! - **Value Objects**: Immutable domain types with equality by value
//! - **Domain Events**: Records of state transitions
//! - **Domain Services**: Stateless business logic
//!
//! # Bounded Contexts
//!
//! - [`order_chain`]: Chains of legs from entry to flat, protection and hedges
//! - [`risk_management`]: Constraint clamping of trade decisions

pub mod order_chain;
pub mod risk_management;
pub mod shared;
