//! Application Use Cases
//!
//! Use cases orchestrate domain logic to fulfill application requirements.

mod execute_decisions;

pub use execute_decisions::{DecisionOutcome, ExecuteDecisionsUseCase, ExecutionSummary};
