//! Chain manager configuration.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::order_chain::ChainPolicy;
use crate::domain::shared::Symbol;

/// Exchange price and quantity increments for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFilters {
    /// Price increment.
    pub tick_size: Decimal,
    /// Quantity increment.
    pub step_size: Decimal,
}

impl Default for SymbolFilters {
    fn default() -> Self {
        Self {
            tick_size: dec!(0.01),
            step_size: dec!(0.001),
        }
    }
}

impl SymbolFilters {
    /// Round a price to the nearest tick.
    #[must_use]
    pub fn round_price(&self, price: Decimal) -> Decimal {
        if self.tick_size <= Decimal::ZERO {
            return price.normalize();
        }
        ((price / self.tick_size).round() * self.tick_size).normalize()
    }

    /// Round a quantity down to the step.
    #[must_use]
    pub fn round_quantity(&self, quantity: Decimal) -> Decimal {
        if self.step_size <= Decimal::ZERO {
            return quantity.normalize();
        }
        ((quantity / self.step_size).floor() * self.step_size).normalize()
    }
}

/// One step of the take-profit ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeProfitStep {
    /// Share of the open quantity closed by this step.
    pub fraction: Decimal,
    /// Multiple of the decision's take-profit distance.
    pub distance_multiple: Decimal,
}

/// Cost-averaging limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AveragingConfig {
    /// Entry-like legs with fills allowed per chain, the entry included.
    pub max_entries_per_position: u32,
    /// Adverse move from the average entry required before averaging, in percent.
    pub min_price_improve_pct: Decimal,
    /// Minimum time between averaging placements.
    pub cooldown: Duration,
}

impl Default for AveragingConfig {
    fn default() -> Self {
        Self {
            max_entries_per_position: 3,
            min_price_improve_pct: dec!(1.0),
            cooldown: Duration::from_secs(15 * 60),
        }
    }
}

/// Re-entry after a take-profit fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuyConfig {
    /// Place a rebuy leg once a take-profit fills.
    pub enabled: bool,
    /// Pullback from the take-profit fill price, in percent.
    pub pullback_percent: Decimal,
}

impl Default for RebuyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pullback_percent: dec!(1.0),
        }
    }
}

/// Hedge sub-chain limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HedgeConfig {
    /// Allow hedges at all. Requires hedge (dual-side) position mode.
    pub enabled: bool,
    /// Live hedges per parent chain.
    pub max_simultaneous: usize,
    /// Hedge quantity as a share of the parent's open quantity.
    pub size_ratio: Decimal,
    /// Parent loss, in percent of average entry, that opens a hedge on a tick.
    pub trigger_loss_percent: Option<Decimal>,
    /// Stop distance for the hedge.
    pub stop_loss_percent: Decimal,
    /// Take-profit distance for the hedge.
    pub take_profit_percent: Option<Decimal>,
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_simultaneous: 1,
            size_ratio: dec!(0.5),
            trigger_loss_percent: None,
            stop_loss_percent: dec!(2.0),
            take_profit_percent: Some(dec!(2.0)),
        }
    }
}

/// Where trailing is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingMode {
    /// Tighten the stop-loss leg from the monitor.
    #[default]
    Client,
    /// Place an exchange-native trailing stop leg.
    Exchange,
}

/// Trailing stop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailingConfig {
    /// Trailing on or off.
    pub enabled: bool,
    /// Client or exchange trailing.
    pub mode: TrailingMode,
    /// Distance behind the best price, in percent.
    pub callback_percent: Decimal,
    /// Profit from average entry before trailing starts, in percent.
    pub activation_percent: Decimal,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: TrailingMode::Client,
            callback_percent: dec!(1.0),
            activation_percent: dec!(1.0),
        }
    }
}

/// What happens when a protective stop cannot be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtectionRetryPolicy {
    /// Mark the chain unprotected and retry on the next monitor tick.
    #[default]
    NextTick,
    /// Retry in place before falling back to the next tick.
    Immediate {
        /// Placement attempts, the first included.
        attempts: u32,
        /// Pause between attempts.
        delay: Duration,
    },
}

impl ProtectionRetryPolicy {
    /// Placement attempts per protection pass.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::NextTick => 1,
            Self::Immediate { attempts, .. } => {
                if *attempts == 0 {
                    1
                } else {
                    *attempts
                }
            }
        }
    }

    /// Pause between in-place attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        match self {
            Self::NextTick => Duration::ZERO,
            Self::Immediate { delay, .. } => *delay,
        }
    }
}

/// Chain manager settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainManagerConfig {
    /// Policy stamped on new chains.
    pub policy: ChainPolicy,
    /// Stop distance when a decision carries none, in percent.
    pub default_stop_loss_percent: Decimal,
    /// Take-profit ladder; fractions sum to one.
    pub take_profit_ladder: Vec<TakeProfitStep>,
    /// Averaging limits.
    pub averaging: AveragingConfig,
    /// Rebuy settings.
    pub rebuy: RebuyConfig,
    /// Hedge limits.
    pub hedge: HedgeConfig,
    /// Trailing settings.
    pub trailing: TrailingConfig,
    /// Protective stop retry policy.
    pub protection_retry: ProtectionRetryPolicy,
    /// Filters for symbols without an override.
    pub default_filters: SymbolFilters,
    /// Per-symbol filters.
    pub symbol_filters: HashMap<Symbol, SymbolFilters>,
}

impl Default for ChainManagerConfig {
    fn default() -> Self {
        Self {
            policy: ChainPolicy::default(),
            default_stop_loss_percent: dec!(2.0),
            take_profit_ladder: vec![
                TakeProfitStep {
                    fraction: dec!(0.4),
                    distance_multiple: dec!(1),
                },
                TakeProfitStep {
                    fraction: dec!(0.6),
                    distance_multiple: dec!(2),
                },
            ],
            averaging: AveragingConfig::default(),
            rebuy: RebuyConfig::default(),
            hedge: HedgeConfig::default(),
            trailing: TrailingConfig::default(),
            protection_retry: ProtectionRetryPolicy::default(),
            default_filters: SymbolFilters::default(),
            symbol_filters: HashMap::new(),
        }
    }
}

impl ChainManagerConfig {
    /// Filters for `symbol`.
    #[must_use]
    pub fn filters_for(&self, symbol: &Symbol) -> SymbolFilters {
        self.symbol_filters
            .get(symbol)
            .copied()
            .unwrap_or(self.default_filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_follows_filters() {
        let filters = SymbolFilters {
            tick_size: dec!(0.1),
            step_size: dec!(0.001),
        };
        assert_eq!(filters.round_price(dec!(95123.46)), dec!(95123.5));
        assert_eq!(filters.round_quantity(dec!(0.0039)), dec!(0.003));
        assert_eq!(filters.round_quantity(dec!(0.0009)), Decimal::ZERO);
    }

    #[test]
    fn retry_policy_attempts() {
        assert_eq!(ProtectionRetryPolicy::NextTick.attempts(), 1);
        let immediate = ProtectionRetryPolicy::Immediate {
            attempts: 0,
            delay: Duration::from_millis(10),
        };
        assert_eq!(immediate.attempts(), 1);
        assert_eq!(immediate.delay(), Duration::from_millis(10));
    }

    #[test]
    fn symbol_override_wins() {
        let mut config = ChainManagerConfig::default();
        let btc = Symbol::new("BTCUSDT");
        let filters = SymbolFilters {
            tick_size: dec!(0.1),
            step_size: dec!(0.001),
        };
        config.symbol_filters.insert(btc.clone(), filters);
        assert_eq!(config.filters_for(&btc), filters);
        assert_eq!(
            config.filters_for(&Symbol::new("ETHUSDT")),
            SymbolFilters::default()
        );
    }

    #[test]
    fn default_ladder_covers_whole_position() {
        let total: Decimal = ChainManagerConfig::default()
            .take_profit_ladder
            .iter()
            .map(|s| s.fraction)
            .sum();
        assert_eq!(total, Decimal::ONE);
    }
}
