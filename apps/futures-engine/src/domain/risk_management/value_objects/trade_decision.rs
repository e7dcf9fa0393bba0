//! Trade decisions supplied by the strategy layer.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::order_chain::value_objects::PositionSide;
use crate::domain::shared::Symbol;

/// What a decision asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    /// Open a long position.
    OpenLong,
    /// Open a short position.
    OpenShort,
    /// Add to a losing long (buy lower).
    AverageDown,
    /// Add to a losing short (sell higher).
    AverageUp,
    /// Close the open position.
    Close,
    /// Do nothing.
    Hold,
}

impl DecisionAction {
    /// Opens a new position.
    #[must_use]
    pub const fn is_opening(&self) -> bool {
        matches!(self, Self::OpenLong | Self::OpenShort)
    }

    /// Adds to an existing position.
    #[must_use]
    pub const fn is_averaging(&self) -> bool {
        matches!(self, Self::AverageDown | Self::AverageUp)
    }

    /// Direction of the position this action opens or adds to.
    #[must_use]
    pub const fn position_side(&self) -> Option<PositionSide> {
        match self {
            Self::OpenLong | Self::AverageDown => Some(PositionSide::Long),
            Self::OpenShort | Self::AverageUp => Some(PositionSide::Short),
            Self::Close | Self::Hold => None,
        }
    }
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenLong => write!(f, "OPEN_LONG"),
            Self::OpenShort => write!(f, "OPEN_SHORT"),
            Self::AverageDown => write!(f, "AVERAGE_DOWN"),
            Self::AverageUp => write!(f, "AVERAGE_UP"),
            Self::Close => write!(f, "CLOSE"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// Acceptable entry price band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryZone {
    /// Lower bound.
    pub low: Decimal,
    /// Upper bound.
    pub high: Decimal,
}

impl EntryZone {
    /// Whether `price` lies inside the band.
    #[must_use]
    pub fn contains(&self, price: Decimal) -> bool {
        price >= self.low && price <= self.high
    }
}

/// One decision from the strategy layer. Read-only to the engine; the
/// constraint engine returns adjusted copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeDecision {
    /// Traded symbol.
    pub symbol: Symbol,
    /// Requested action.
    pub action: DecisionAction,
    /// Margin to commit, in USD.
    pub proposed_size_usd: Decimal,
    /// Requested leverage.
    pub proposed_leverage: u32,
    /// Entry price band; market entry when absent.
    #[serde(default)]
    pub entry_zone: Option<EntryZone>,
    /// Stop distance in percent.
    #[serde(default)]
    pub stop_loss_percent: Option<Decimal>,
    /// Take-profit distance in percent.
    #[serde(default)]
    pub take_profit_percent: Option<Decimal>,
    /// Whether the strategy permits averaging this position.
    #[serde(default)]
    pub averaging_allowed: bool,
    /// Averaging entries the strategy wants at most.
    #[serde(default)]
    pub max_average_count: u32,
    /// Strategy confidence in [0, 1].
    #[serde(default)]
    pub confidence: Decimal,
    /// Higher is processed first.
    #[serde(default)]
    pub priority: i32,
}
