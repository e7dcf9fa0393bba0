//! Risk management domain services.

mod constraint_engine;

pub use constraint_engine::{Adjustment, ConstraintEngine, ConstraintReport, RejectionReason};
