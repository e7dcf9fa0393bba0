//! Order chain aggregates.

mod chain;
mod leg;

pub use chain::{
    Chain, ChainKind, ChainPolicy, OpenChain, ProtectionState, ProtectionTargets, StopState,
};
pub use leg::{LegTransition, LegUpdate, NewLeg, OrderLeg};
