//! Binance futures REST response types.
//!
//! Numeric fields arrive as JSON strings and decode straight into `Decimal`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_chain::LegStatus;

/// Error body: `{"code": -2019, "msg": "Margin is insufficient."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceErrorResponse {
    /// Exchange error code.
    pub code: i64,
    /// Message.
    #[serde(default)]
    pub msg: String,
}

/// Regular order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BinanceOrderStatus {
    /// Accepted, no fills.
    New,
    /// Some quantity filled.
    PartiallyFilled,
    /// Fully filled.
    Filled,
    /// Cancelled.
    #[serde(rename = "CANCELED")]
    Canceled,
    /// Rejected.
    Rejected,
    /// Expired (IOC/FOK, GTX, liquidation).
    Expired,
    /// Expired in the matching engine (self-trade prevention).
    ExpiredInMatch,
    /// Any status added later.
    #[serde(other)]
    Unknown,
}

impl BinanceOrderStatus {
    /// Leg status for this order status.
    #[must_use]
    pub const fn to_leg_status(self) -> LegStatus {
        match self {
            Self::New | Self::Unknown => LegStatus::Open,
            Self::PartiallyFilled => LegStatus::PartiallyFilled,
            Self::Filled => LegStatus::Filled,
            Self::Canceled | Self::Expired | Self::ExpiredInMatch => LegStatus::Cancelled,
            Self::Rejected => LegStatus::Rejected,
        }
    }
}

/// `/fapi/v1/order` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceOrderResponse {
    /// Exchange order id.
    pub order_id: i64,
    /// Symbol.
    pub symbol: String,
    /// Status.
    pub status: BinanceOrderStatus,
    /// Client order id.
    pub client_order_id: String,
    /// Limit price.
    #[serde(default)]
    pub price: Decimal,
    /// Average fill price (`"0"` when unfilled).
    #[serde(default)]
    pub avg_price: Decimal,
    /// Ordered quantity.
    #[serde(default)]
    pub orig_qty: Decimal,
    /// Filled quantity.
    #[serde(default)]
    pub executed_qty: Decimal,
    /// Order type.
    #[serde(rename = "type", default)]
    pub order_type: String,
    /// Side.
    #[serde(default)]
    pub side: String,
    /// Position side.
    #[serde(default)]
    pub position_side: String,
    /// Reduce-only flag.
    #[serde(default)]
    pub reduce_only: bool,
    /// Last update, epoch ms.
    #[serde(default)]
    pub update_time: i64,
}

impl BinanceOrderResponse {
    /// Average fill price, `None` when nothing filled.
    #[must_use]
    pub fn avg_fill_price(&self) -> Option<Decimal> {
        (self.executed_qty > Decimal::ZERO && self.avg_price > Decimal::ZERO)
            .then_some(self.avg_price)
    }
}

/// Conditional order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlgoStatus {
    /// Waiting for the trigger.
    New,
    /// Triggered, placing the market order.
    Triggering,
    /// Triggered and the resulting order was placed.
    Triggered,
    /// Resulting order completed.
    Finished,
    /// Cancelled.
    #[serde(rename = "CANCELED")]
    Canceled,
    /// Expired.
    Expired,
    /// Rejected.
    Rejected,
    /// Any status added later.
    #[serde(other)]
    Unknown,
}

impl AlgoStatus {
    /// Leg status for this algo status.
    #[must_use]
    pub const fn to_leg_status(self) -> LegStatus {
        match self {
            Self::New | Self::Triggering | Self::Unknown => LegStatus::Open,
            Self::Triggered | Self::Finished => LegStatus::Filled,
            Self::Canceled | Self::Expired => LegStatus::Cancelled,
            Self::Rejected => LegStatus::Rejected,
        }
    }
}

/// `/fapi/v1/algoOrder` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceAlgoOrderResponse {
    /// Algo id.
    pub algo_id: i64,
    /// Client algo id.
    pub client_algo_id: String,
    /// Symbol.
    #[serde(default)]
    pub symbol: String,
    /// Status.
    pub algo_status: AlgoStatus,
    /// Order type (`STOP_MARKET`, ...).
    #[serde(default)]
    pub order_type: String,
    /// Side.
    #[serde(default)]
    pub side: String,
    /// Quantity.
    #[serde(default)]
    pub quantity: Decimal,
    /// Trigger price.
    #[serde(default)]
    pub trigger_price: Decimal,
    /// Fill price of the triggered order, when reported.
    #[serde(default)]
    pub actual_price: Option<Decimal>,
    /// Last update, epoch ms.
    #[serde(default)]
    pub update_time: i64,
}

/// `/fapi/v2/positionRisk` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinancePositionRisk {
    /// Symbol.
    pub symbol: String,
    /// Signed size; negative for short in one-way mode.
    pub position_amt: Decimal,
    /// Average entry price.
    pub entry_price: Decimal,
    /// Mark price.
    pub mark_price: Decimal,
    /// Unrealized PnL.
    #[serde(rename = "unRealizedProfit")]
    pub unrealized_profit: Decimal,
    /// Leverage, as a string.
    pub leverage: String,
    /// `BOTH`, `LONG`, or `SHORT`.
    #[serde(default)]
    pub position_side: String,
}

/// `/fapi/v2/account` summary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceAccount {
    /// Wallet balance.
    pub total_wallet_balance: Decimal,
    /// Unrealized PnL.
    pub total_unrealized_profit: Decimal,
    /// Wallet balance plus unrealized PnL.
    pub total_margin_balance: Decimal,
    /// Margin available for new positions.
    pub available_balance: Decimal,
}

/// `/fapi/v1/premiumIndex` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinancePremiumIndex {
    /// Symbol.
    pub symbol: String,
    /// Mark price.
    pub mark_price: Decimal,
    /// Index price.
    #[serde(default)]
    pub index_price: Decimal,
    /// Last funding rate.
    #[serde(default)]
    pub last_funding_rate: Decimal,
    /// Next funding time, epoch ms.
    #[serde(default)]
    pub next_funding_time: i64,
}

/// `/fapi/v1/ticker/price` response.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceTickerPrice {
    /// Symbol.
    pub symbol: String,
    /// Last price.
    pub price: Decimal,
}

/// `/fapi/v1/income` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceIncome {
    /// Symbol (empty for transfers).
    #[serde(default)]
    pub symbol: String,
    /// `FUNDING_FEE`, `REALIZED_PNL`, `COMMISSION`, ...
    pub income_type: String,
    /// Amount, signed.
    pub income: Decimal,
    /// Asset.
    pub asset: String,
    /// Time, epoch ms.
    pub time: i64,
    /// Transaction id.
    #[serde(default)]
    pub tran_id: i64,
}

/// `/fapi/v1/leverage` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceLeverageResponse {
    /// Symbol.
    pub symbol: String,
    /// Applied leverage.
    pub leverage: u32,
}

/// `/fapi/v1/listenKey` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceListenKey {
    /// User stream key.
    pub listen_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decodes_order_response() {
        let json = r#"{
            "orderId": 8389765612, "symbol": "BTCUSDT", "status": "PARTIALLY_FILLED",
            "clientOrderId": "SCA-16OCT-00001-E", "price": "0", "avgPrice": "67250.10",
            "origQty": "0.010", "executedQty": "0.004", "cumQuote": "269.0004",
            "type": "MARKET", "side": "BUY", "positionSide": "LONG",
            "reduceOnly": false, "updateTime": 1760600000000
        }"#;
        let order: BinanceOrderResponse = serde_json::from_str(json).unwrap();
        assert_eq!(order.status.to_leg_status(), LegStatus::PartiallyFilled);
        assert_eq!(order.executed_qty, dec!(0.004));
        assert_eq!(order.avg_fill_price(), Some(dec!(67250.10)));
    }

    #[test]
    fn unfilled_order_has_no_average() {
        let json = r#"{"orderId": 1, "symbol": "BTCUSDT", "status": "NEW",
            "clientOrderId": "x", "avgPrice": "0.00", "executedQty": "0"}"#;
        let order: BinanceOrderResponse = serde_json::from_str(json).unwrap();
        assert_eq!(order.avg_fill_price(), None);
        assert_eq!(order.status.to_leg_status(), LegStatus::Open);
    }

    #[test]
    fn unknown_statuses_decode() {
        let status: BinanceOrderStatus = serde_json::from_str("\"NEW_INSURANCE\"").unwrap();
        assert_eq!(status, BinanceOrderStatus::Unknown);
        let algo: AlgoStatus = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(algo, AlgoStatus::Unknown);
    }

    #[test]
    fn algo_status_mapping() {
        assert_eq!(AlgoStatus::New.to_leg_status(), LegStatus::Open);
        assert_eq!(AlgoStatus::Triggering.to_leg_status(), LegStatus::Open);
        assert_eq!(AlgoStatus::Triggered.to_leg_status(), LegStatus::Filled);
        assert_eq!(AlgoStatus::Finished.to_leg_status(), LegStatus::Filled);
        assert_eq!(AlgoStatus::Canceled.to_leg_status(), LegStatus::Cancelled);
        assert_eq!(AlgoStatus::Expired.to_leg_status(), LegStatus::Cancelled);
        assert_eq!(AlgoStatus::Rejected.to_leg_status(), LegStatus::Rejected);
    }

    #[test]
    fn decodes_algo_order() {
        let json = r#"{"algoId": 2000000001, "clientAlgoId": "SCA-16OCT-00001-SL",
            "algoType": "CONDITIONAL", "orderType": "STOP_MARKET", "symbol": "BTCUSDT",
            "side": "SELL", "positionSide": "LONG", "quantity": "0.010",
            "algoStatus": "NEW", "triggerPrice": "65000", "workingType": "MARK_PRICE"}"#;
        let order: BinanceAlgoOrderResponse = serde_json::from_str(json).unwrap();
        assert_eq!(order.algo_id, 2_000_000_001);
        assert_eq!(order.trigger_price, dec!(65000));
        assert_eq!(order.actual_price, None);
    }

    #[test]
    fn decodes_position_risk() {
        let json = r#"[{"symbol": "ETHUSDT", "positionAmt": "-0.300", "entryPrice": "2500.0",
            "markPrice": "2450.5", "unRealizedProfit": "14.85", "leverage": "5",
            "positionSide": "SHORT"}]"#;
        let positions: Vec<BinancePositionRisk> = serde_json::from_str(json).unwrap();
        assert_eq!(positions[0].position_amt, dec!(-0.3));
        assert_eq!(positions[0].unrealized_profit, dec!(14.85));
    }

    #[test]
    fn decodes_error_body() {
        let err: BinanceErrorResponse =
            serde_json::from_str(r#"{"code": -2019, "msg": "Margin is insufficient."}"#).unwrap();
        assert_eq!(err.code, -2019);
    }
}
