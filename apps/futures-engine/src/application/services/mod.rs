//! Application Services
//!
//! Application services coordinate domain logic and infrastructure adapters.
//! The chain manager owns live chains and talks to the exchange; the
//! position monitor runs it on a timer.

pub mod chain_manager;
mod chain_registry;
mod position_monitor;

pub use chain_manager::{ChainManager, ChainManagerConfig, ChainManagerError, TickReport};
pub use chain_registry::{ChainEntry, ChainHandle, ChainRegistry, DuplicateChain};
pub use position_monitor::{PositionMonitor, PositionMonitorConfig, PositionMonitorError};
