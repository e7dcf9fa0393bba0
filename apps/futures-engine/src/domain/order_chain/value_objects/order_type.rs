//! Order type of a leg.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a leg is expressed on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegOrderType {
    /// Fill immediately at market.
    Market,
    /// Rest at `price`.
    Limit,
    /// Market order once the stop price trades.
    StopMarket,
    /// Market take-profit once the stop price trades.
    TakeProfitMarket,
    /// Exchange-side trailing stop with a callback percentage.
    TrailingStop {
        /// Callback rate in percent (0.1 to 5.0 on the exchange).
        callback_rate: Decimal,
    },
}

impl LegOrderType {
    /// Conditional orders live on the exchange's algo-order venue.
    #[must_use]
    pub const fn is_conditional(&self) -> bool {
        matches!(
            self,
            Self::StopMarket | Self::TakeProfitMarket | Self::TrailingStop { .. }
        )
    }
}
