//! REST endpoints and their request weights.

use std::fmt;

use reqwest::Method;

use crate::resilience::{RequestCost, RequestPriority};

/// USDⓈ-M futures REST endpoints used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Place, query, or cancel a regular order.
    Order,
    /// Query one open regular order.
    OpenOrder,
    /// All open regular orders.
    OpenOrders,
    /// Cancel all open regular orders of a symbol.
    AllOpenOrders,
    /// Place, query, or cancel a conditional order.
    AlgoOrder,
    /// Open conditional orders.
    OpenAlgoOrders,
    /// Cancel all open conditional orders of a symbol.
    AlgoOpenOrders,
    /// Position information.
    PositionRisk,
    /// Account balances and positions.
    Account,
    /// Hedge-mode switch.
    PositionSideDual,
    /// Initial leverage.
    Leverage,
    /// Isolated or crossed margin.
    MarginType,
    /// Last traded price.
    TickerPrice,
    /// Mark price and funding.
    PremiumIndex,
    /// Income history (funding, PnL, fees).
    Income,
    /// User data stream session.
    ListenKey,
}

impl Endpoint {
    /// URL path.
    #[must_use]
    pub const fn path(&self) -> &'static str {
        match self {
            Self::Order => "/fapi/v1/order",
            Self::OpenOrder => "/fapi/v1/openOrder",
            Self::OpenOrders => "/fapi/v1/openOrders",
            Self::AllOpenOrders => "/fapi/v1/allOpenOrders",
            Self::AlgoOrder => "/fapi/v1/algoOrder",
            Self::OpenAlgoOrders => "/fapi/v1/openAlgoOrders",
            Self::AlgoOpenOrders => "/fapi/v1/algoOpenOrders",
            Self::PositionRisk => "/fapi/v2/positionRisk",
            Self::Account => "/fapi/v2/account",
            Self::PositionSideDual => "/fapi/v1/positionSide/dual",
            Self::Leverage => "/fapi/v1/leverage",
            Self::MarginType => "/fapi/v1/marginType",
            Self::TickerPrice => "/fapi/v1/ticker/price",
            Self::PremiumIndex => "/fapi/v1/premiumIndex",
            Self::Income => "/fapi/v1/income",
            Self::ListenKey => "/fapi/v1/listenKey",
        }
    }

    /// Request weight charged by the exchange.
    #[must_use]
    pub const fn weight(&self) -> u32 {
        match self {
            Self::PositionRisk | Self::Account => 5,
            Self::PositionSideDual | Self::Income => 30,
            _ => 1,
        }
    }

    /// Budget cost of calling this endpoint with `method`.
    ///
    /// Placements also count against the order budget.
    #[must_use]
    pub fn cost(&self, method: &Method) -> RequestCost {
        let places = *method == Method::POST && matches!(self, Self::Order | Self::AlgoOrder);
        if places {
            RequestCost::order(self.weight())
        } else {
            RequestCost::weight(self.weight())
        }
    }

    /// Whether the call needs an HMAC signature.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        !matches!(self, Self::TickerPrice | Self::PremiumIndex | Self::ListenKey)
    }

    /// Whether the call needs the API key header.
    #[must_use]
    pub const fn requires_api_key(&self) -> bool {
        !matches!(self, Self::TickerPrice | Self::PremiumIndex)
    }

    /// Default priority for calls that do not pick one.
    #[must_use]
    pub fn default_priority(&self, method: &Method) -> RequestPriority {
        match self {
            Self::Order | Self::AlgoOrder | Self::AllOpenOrders | Self::AlgoOpenOrders
                if *method != Method::GET =>
            {
                RequestPriority::High
            }
            Self::Income => RequestPriority::Low,
            _ => RequestPriority::Normal,
        }
    }

    /// Label for logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::OpenOrder => "open_order",
            Self::OpenOrders => "open_orders",
            Self::AllOpenOrders => "all_open_orders",
            Self::AlgoOrder => "algo_order",
            Self::OpenAlgoOrders => "open_algo_orders",
            Self::AlgoOpenOrders => "algo_open_orders",
            Self::PositionRisk => "position_risk",
            Self::Account => "account",
            Self::PositionSideDual => "position_side_dual",
            Self::Leverage => "leverage",
            Self::MarginType => "margin_type",
            Self::TickerPrice => "ticker_price",
            Self::PremiumIndex => "premium_index",
            Self::Income => "income",
            Self::ListenKey => "listen_key",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
