//! Risk Management Bounded Context
//!
//! Gates trade decisions before they become exchange traffic.
//!
//! # Key Concepts
//!
//! - **Trade Decision**: Strategy output, read-only to the engine
//! - **Constraint Set**: Immutable per-mode limits
//! - **Constraint Engine**: Clamps or drops decisions, never errors

pub mod services;
pub mod value_objects;

pub use services::{Adjustment, ConstraintEngine, ConstraintReport, RejectionReason};
pub use value_objects::{ConstraintSet, DecisionAction, EntryZone, TradeDecision};
