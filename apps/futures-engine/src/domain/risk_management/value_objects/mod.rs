//! Risk management value objects.

mod constraint_set;
mod trade_decision;

pub use constraint_set::ConstraintSet;
pub use trade_decision::{DecisionAction, EntryZone, TradeDecision};
