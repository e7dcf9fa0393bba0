//! Typed request parameter builders.
//!
//! Each builder renders into [`RequestParams`], the flat key/value list the
//! signer canonicalizes. Decimals are rendered normalized (`0.010` → `0.01`).

use rust_decimal::Decimal;

use crate::domain::order_chain::{OrderSide, PositionSide};
use crate::domain::shared::{ClientOrderId, ExchangeOrderId, Symbol};

/// Query or form parameters of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    pairs: Vec<(String, String)>,
}

impl RequestParams {
    /// Empty parameter list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing an existing value.
    pub fn insert(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        if let Some(slot) = self.pairs.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            self.pairs.push((key.to_string(), value));
        }
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    /// Set `key` when `value` is present.
    #[must_use]
    pub fn with_opt<T: ToString>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    /// Set a decimal in normalized form.
    #[must_use]
    pub fn with_decimal(self, key: &str, value: Decimal) -> Self {
        self.with(key, value.normalize())
    }

    /// Value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether no parameters are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// `positionSide` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WirePositionSide {
    /// One-way mode.
    Both,
    /// Hedge-mode long.
    Long,
    /// Hedge-mode short.
    Short,
}

impl WirePositionSide {
    /// Wire string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Both => "BOTH",
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }
}

impl From<PositionSide> for WirePositionSide {
    fn from(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => Self::Long,
            PositionSide::Short => Self::Short,
        }
    }
}

const fn side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}

/// Regular order type on `/fapi/v1/order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegularOrderType {
    /// Market.
    Market,
    /// Good-till-cancel limit.
    Limit {
        /// Limit price.
        price: Decimal,
    },
}

/// `POST /fapi/v1/order`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    /// Symbol.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Position side; `None` in one-way mode.
    pub position_side: Option<WirePositionSide>,
    /// Order type.
    pub order_type: RegularOrderType,
    /// Quantity.
    pub quantity: Decimal,
    /// Reduce-only flag (one-way mode only).
    pub reduce_only: bool,
    /// Idempotency token.
    pub client_order_id: ClientOrderId,
}

impl NewOrder {
    /// Render parameters.
    #[must_use]
    pub fn to_params(&self) -> RequestParams {
        let mut params = RequestParams::new()
            .with("symbol", &self.symbol)
            .with("side", side_str(self.side))
            .with_opt("positionSide", self.position_side.map(|p| p.as_str()))
            .with_decimal("quantity", self.quantity)
            .with("newClientOrderId", &self.client_order_id)
            .with("newOrderRespType", "RESULT");
        params = match self.order_type {
            RegularOrderType::Market => params.with("type", "MARKET"),
            RegularOrderType::Limit { price } => params
                .with("type", "LIMIT")
                .with("timeInForce", "GTC")
                .with_decimal("price", price),
        };
        // Hedge mode infers reduce-only from positionSide and rejects the flag.
        if self.reduce_only && !is_hedge(self.position_side) {
            params = params.with("reduceOnly", "true");
        }
        params
    }
}

fn is_hedge(side: Option<WirePositionSide>) -> bool {
    matches!(side, Some(WirePositionSide::Long | WirePositionSide::Short))
}

/// Conditional order type on `/fapi/v1/algoOrder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalType {
    /// Stop-market.
    StopMarket {
        /// Trigger.
        trigger: Decimal,
    },
    /// Take-profit-market.
    TakeProfitMarket {
        /// Trigger.
        trigger: Decimal,
    },
    /// Trailing stop.
    TrailingStopMarket {
        /// Callback percent.
        callback_rate: Decimal,
        /// Activation price.
        activation_price: Option<Decimal>,
    },
}

/// `POST /fapi/v1/algoOrder` with `algoType=CONDITIONAL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlgoOrder {
    /// Symbol.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Position side; `None` in one-way mode.
    pub position_side: Option<WirePositionSide>,
    /// Conditional type.
    pub order_type: ConditionalType,
    /// Quantity.
    pub quantity: Decimal,
    /// Reduce-only flag (one-way mode only).
    pub reduce_only: bool,
    /// Idempotency token.
    pub client_algo_id: ClientOrderId,
}

impl NewAlgoOrder {
    /// Render parameters. Triggers use the mark price.
    #[must_use]
    pub fn to_params(&self) -> RequestParams {
        let mut params = RequestParams::new()
            .with("algoType", "CONDITIONAL")
            .with("symbol", &self.symbol)
            .with("side", side_str(self.side))
            .with_opt("positionSide", self.position_side.map(|p| p.as_str()))
            .with_decimal("quantity", self.quantity)
            .with("clientAlgoId", &self.client_algo_id)
            .with("workingType", "MARK_PRICE");
        params = match self.order_type {
            ConditionalType::StopMarket { trigger } => params
                .with("type", "STOP_MARKET")
                .with_decimal("triggerPrice", trigger),
            ConditionalType::TakeProfitMarket { trigger } => params
                .with("type", "TAKE_PROFIT_MARKET")
                .with_decimal("triggerPrice", trigger),
            ConditionalType::TrailingStopMarket {
                callback_rate,
                activation_price,
            } => {
                let params = params
                    .with("type", "TRAILING_STOP_MARKET")
                    .with_decimal("callbackRate", callback_rate);
                match activation_price {
                    Some(price) => params.with_decimal("activatePrice", price),
                    None => params,
                }
            }
        };
        if self.reduce_only && !is_hedge(self.position_side) {
            params = params.with("reduceOnly", "true");
        }
        params
    }
}

/// Order lookup by exchange id or token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderQuery {
    /// By exchange order id.
    ById(ExchangeOrderId),
    /// By client order id.
    ByClientId(ClientOrderId),
}

impl OrderQuery {
    /// Render parameters for `/fapi/v1/order` (GET or DELETE).
    #[must_use]
    pub fn to_params(&self, symbol: &Symbol) -> RequestParams {
        let params = RequestParams::new().with("symbol", symbol);
        match self {
            Self::ById(id) => params.with("orderId", id),
            Self::ByClientId(id) => params.with("origClientOrderId", id),
        }
    }

    /// Render parameters for `/fapi/v1/algoOrder` (GET or DELETE).
    #[must_use]
    pub fn to_algo_params(&self, symbol: &Symbol) -> RequestParams {
        let params = RequestParams::new().with("symbol", symbol);
        match self {
            Self::ById(id) => params.with("algoId", id),
            Self::ByClientId(id) => params.with("clientAlgoId", id),
        }
    }
}

/// `POST /fapi/v1/leverage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeverageChange {
    /// Symbol.
    pub symbol: Symbol,
    /// Leverage (1-125).
    pub leverage: u32,
}

impl LeverageChange {
    /// Render parameters.
    #[must_use]
    pub fn to_params(&self) -> RequestParams {
        RequestParams::new()
            .with("symbol", &self.symbol)
            .with("leverage", self.leverage)
    }
}

/// Margin mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginType {
    /// Per-position margin.
    Isolated,
    /// Shared margin.
    Crossed,
}

/// `POST /fapi/v1/marginType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarginTypeChange {
    /// Symbol.
    pub symbol: Symbol,
    /// Margin mode.
    pub margin_type: MarginType,
}

impl MarginTypeChange {
    /// Render parameters.
    #[must_use]
    pub fn to_params(&self) -> RequestParams {
        let margin = match self.margin_type {
            MarginType::Isolated => "ISOLATED",
            MarginType::Crossed => "CROSSED",
        };
        RequestParams::new()
            .with("symbol", &self.symbol)
            .with("marginType", margin)
    }
}

/// `POST /fapi/v1/positionSide/dual`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionModeChange {
    /// Hedge mode when true, one-way otherwise.
    pub dual_side: bool,
}

impl PositionModeChange {
    /// Render parameters.
    #[must_use]
    pub fn to_params(&self) -> RequestParams {
        RequestParams::new().with("dualSidePosition", self.dual_side)
    }
}

/// `GET /fapi/v1/income`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomeQuery {
    /// Restrict to a symbol.
    pub symbol: Option<Symbol>,
    /// Income type (`FUNDING_FEE`, `REALIZED_PNL`, `COMMISSION`, ...).
    pub income_type: Option<String>,
    /// Start time, epoch ms.
    pub start_time: Option<i64>,
    /// End time, epoch ms.
    pub end_time: Option<i64>,
    /// Page size (max 1000).
    pub limit: Option<u32>,
}

impl IncomeQuery {
    /// Render parameters.
    #[must_use]
    pub fn to_params(&self) -> RequestParams {
        RequestParams::new()
            .with_opt("symbol", self.symbol.as_ref())
            .with_opt("incomeType", self.income_type.as_deref())
            .with_opt("startTime", self.start_time)
            .with_opt("endTime", self.end_time)
            .with_opt("limit", self.limit.map(|l| l.min(1000)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn market_order_params() {
        let order = NewOrder {
            symbol: Symbol::new("BTCUSDT"),
            side: OrderSide::Buy,
            position_side: Some(WirePositionSide::Long),
            order_type: RegularOrderType::Market,
            quantity: dec!(0.0100),
            reduce_only: false,
            client_order_id: ClientOrderId::new("SCA-16OCT-00001-E"),
        };
        let params = order.to_params();
        assert_eq!(params.get("type"), Some("MARKET"));
        assert_eq!(params.get("quantity"), Some("0.01"));
        assert_eq!(params.get("positionSide"), Some("LONG"));
        assert_eq!(params.get("newClientOrderId"), Some("SCA-16OCT-00001-E"));
        assert_eq!(params.get("timeInForce"), None);
    }

    #[test]
    fn reduce_only_only_in_one_way_mode() {
        let mut order = NewOrder {
            symbol: Symbol::new("BTCUSDT"),
            side: OrderSide::Sell,
            position_side: Some(WirePositionSide::Long),
            order_type: RegularOrderType::Limit { price: dec!(101.50) },
            quantity: dec!(1),
            reduce_only: true,
            client_order_id: ClientOrderId::new("SCA-16OCT-00001-X"),
        };
        assert_eq!(order.to_params().get("reduceOnly"), None);
        assert_eq!(order.to_params().get("price"), Some("101.5"));

        order.position_side = None;
        assert_eq!(order.to_params().get("reduceOnly"), Some("true"));
    }

    #[test]
    fn stop_market_algo_params() {
        let order = NewAlgoOrder {
            symbol: Symbol::new("ETHUSDT"),
            side: OrderSide::Sell,
            position_side: Some(WirePositionSide::Long),
            order_type: ConditionalType::StopMarket { trigger: dec!(2450) },
            quantity: dec!(0.3),
            reduce_only: true,
            client_algo_id: ClientOrderId::new("SWI-16OCT-00002-SL"),
        };
        let params = order.to_params();
        assert_eq!(params.get("algoType"), Some("CONDITIONAL"));
        assert_eq!(params.get("type"), Some("STOP_MARKET"));
        assert_eq!(params.get("triggerPrice"), Some("2450"));
        assert_eq!(params.get("clientAlgoId"), Some("SWI-16OCT-00002-SL"));
        assert_eq!(params.get("workingType"), Some("MARK_PRICE"));
    }

    #[test]
    fn trailing_algo_params() {
        let order = NewAlgoOrder {
            symbol: Symbol::new("ETHUSDT"),
            side: OrderSide::Buy,
            position_side: None,
            order_type: ConditionalType::TrailingStopMarket {
                callback_rate: dec!(1.0),
                activation_price: Some(dec!(2300)),
            },
            quantity: dec!(0.3),
            reduce_only: true,
            client_algo_id: ClientOrderId::new("SWI-16OCT-00002-TS"),
        };
        let params = order.to_params();
        assert_eq!(params.get("type"), Some("TRAILING_STOP_MARKET"));
        assert_eq!(params.get("callbackRate"), Some("1"));
        assert_eq!(params.get("activatePrice"), Some("2300"));
        assert_eq!(params.get("reduceOnly"), Some("true"));
    }

    #[test]
    fn query_params_by_venue() {
        let symbol = Symbol::new("BTCUSDT");
        let by_token = OrderQuery::ByClientId(ClientOrderId::new("SCA-16OCT-00001-SL"));
        assert_eq!(
            by_token.to_params(&symbol).get("origClientOrderId"),
            Some("SCA-16OCT-00001-SL")
        );
        assert_eq!(
            by_token.to_algo_params(&symbol).get("clientAlgoId"),
            Some("SCA-16OCT-00001-SL")
        );
        let by_id = OrderQuery::ById(ExchangeOrderId::from_numeric(42));
        assert_eq!(by_id.to_algo_params(&symbol).get("algoId"), Some("42"));
    }

    #[test]
    fn insert_replaces_existing_key() {
        let mut params = RequestParams::new().with("limit", 10);
        params.insert("limit", 20);
        assert_eq!(params.get("limit"), Some("20"));
        assert_eq!(params.iter().count(), 1);
    }

    #[test]
    fn income_limit_is_capped() {
        let query = IncomeQuery {
            limit: Some(5000),
            ..Default::default()
        };
        assert_eq!(query.to_params().get("limit"), Some("1000"));
        assert!(IncomeQuery::default().to_params().is_empty());
    }
}
