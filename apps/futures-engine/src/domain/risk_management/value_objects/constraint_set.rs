//! Per-mode risk limits.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Immutable limits applied to a batch of decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintSet {
    /// Maximum simultaneously open positions.
    pub max_positions: u32,
    /// Maximum leverage.
    pub max_leverage: u32,
    /// Maximum margin per position, in USD.
    pub max_position_size_usd: Decimal,
    /// Maximum margin across accepted decisions, in USD.
    pub max_total_usd: Decimal,
    /// Whether averaging actions are permitted.
    pub allow_averaging: bool,
    /// Maximum averaging entries per position.
    pub max_averages: u32,
    /// Smallest size worth sending, in USD.
    pub min_meaningful_size_usd: Decimal,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self {
            max_positions: 5,
            max_leverage: 10,
            max_position_size_usd: dec!(500),
            max_total_usd: dec!(2000),
            allow_averaging: true,
            max_averages: 2,
            min_meaningful_size_usd: dec!(10),
        }
    }
}
