//! Exchange Port (Driven Port)
//!
//! What the chain manager needs from a futures exchange. Implemented by the
//! live REST client and by the paper exchange used in dry runs.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_chain::{LegOrderType, LegStatus, OrderLeg, OrderSide, PositionSide};
use crate::domain::shared::{ClientOrderId, ExchangeOrderId, Symbol};

/// Exchange order shape for a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlacementKind {
    /// Market order.
    Market,
    /// Resting limit order (GTC).
    Limit {
        /// Limit price.
        price: Decimal,
    },
    /// Conditional market stop.
    StopMarket {
        /// Trigger price.
        trigger: Decimal,
    },
    /// Conditional market take-profit.
    TakeProfitMarket {
        /// Trigger price.
        trigger: Decimal,
    },
    /// Exchange-native trailing stop.
    TrailingStop {
        /// Callback in percent.
        callback_rate: Decimal,
        /// Price at which trailing starts; immediate when absent.
        activation_price: Option<Decimal>,
    },
}

impl PlacementKind {
    /// Conditional orders live on the algo venue.
    #[must_use]
    pub const fn venue(&self) -> OrderVenue {
        match self {
            Self::Market | Self::Limit { .. } => OrderVenue::Regular,
            Self::StopMarket { .. } | Self::TakeProfitMarket { .. } | Self::TrailingStop { .. } => {
                OrderVenue::Algo
            }
        }
    }
}

/// Where an order lives on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderVenue {
    /// Regular order book (`/fapi/v1/order`).
    Regular,
    /// Conditional orders (`/fapi/v1/algoOrder`).
    Algo,
}

impl OrderVenue {
    /// Venue of a leg by its order type.
    #[must_use]
    pub const fn of(order_type: LegOrderType) -> Self {
        if order_type.is_conditional() {
            Self::Algo
        } else {
            Self::Regular
        }
    }
}

/// Request to place one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    /// Idempotency token.
    pub client_order_id: ClientOrderId,
    /// Symbol to trade.
    pub symbol: Symbol,
    /// Order side.
    pub side: OrderSide,
    /// Position the order belongs to (hedge mode).
    pub position_side: PositionSide,
    /// Order shape.
    pub kind: PlacementKind,
    /// Quantity in contract units.
    pub quantity: Decimal,
    /// Only reduce an existing position.
    pub reduce_only: bool,
}

impl PlaceOrderRequest {
    /// Build the request for a recorded leg.
    ///
    /// Returns `None` when the leg lacks the price its order type needs.
    #[must_use]
    pub fn for_leg(leg: &OrderLeg, symbol: &Symbol, position_side: PositionSide) -> Option<Self> {
        let kind = match leg.order_type() {
            LegOrderType::Market => PlacementKind::Market,
            LegOrderType::Limit => PlacementKind::Limit {
                price: leg.price()?,
            },
            LegOrderType::StopMarket => PlacementKind::StopMarket {
                trigger: leg.stop_price()?,
            },
            LegOrderType::TakeProfitMarket => PlacementKind::TakeProfitMarket {
                trigger: leg.stop_price()?,
            },
            LegOrderType::TrailingStop { callback_rate } => PlacementKind::TrailingStop {
                callback_rate,
                activation_price: leg.stop_price(),
            },
        };
        Some(Self {
            client_order_id: leg.leg_id().clone(),
            symbol: symbol.clone(),
            side: leg.side(),
            position_side,
            kind,
            quantity: leg.quantity(),
            reduce_only: leg.is_reduce_only(),
        })
    }
}

/// Reference to an order by its token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderRef {
    /// Venue to look in.
    pub venue: OrderVenue,
    /// Idempotency token used at placement.
    pub client_order_id: ClientOrderId,
}

impl OrderRef {
    /// Reference to a recorded leg.
    #[must_use]
    pub fn for_leg(leg: &OrderLeg) -> Self {
        Self {
            venue: OrderVenue::of(leg.order_type()),
            client_order_id: leg.leg_id().clone(),
        }
    }
}

/// Exchange view of one order, mapped onto leg statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderState {
    /// Token echoed back.
    pub client_order_id: ClientOrderId,
    /// Exchange order id or algo id.
    pub exchange_order_id: Option<ExchangeOrderId>,
    /// Venue the order lives on.
    pub venue: OrderVenue,
    /// Status.
    pub status: LegStatus,
    /// Cumulative filled quantity.
    pub filled_quantity: Decimal,
    /// Average fill price.
    pub avg_fill_price: Option<Decimal>,
}

/// One open position as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Symbol.
    pub symbol: Symbol,
    /// Direction.
    pub position_side: PositionSide,
    /// Absolute size.
    pub quantity: Decimal,
    /// Average entry price.
    pub entry_price: Decimal,
    /// Mark price at report time.
    pub mark_price: Decimal,
    /// Unrealized PnL in quote currency.
    pub unrealized_pnl: Decimal,
    /// Leverage.
    pub leverage: u32,
}

/// Exchange port error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    /// Retryable failure that outlived the retry budget (network, 5xx, timeout).
    #[error("Exchange transient error: {message}")]
    Transient {
        /// Error details.
        message: String,
    },

    /// Rate-limit ban in force; normal traffic is refused until it ends.
    #[error("Exchange circuit open: {message}")]
    CircuitOpen {
        /// Error details.
        message: String,
    },

    /// Exchange refused the request.
    #[error("Exchange rejected request ({code}): {message}")]
    Rejected {
        /// Exchange error code.
        code: i64,
        /// Exchange message.
        message: String,
    },

    /// No order with the given token.
    #[error("Order not found: {client_order_id}")]
    NotFound {
        /// Token queried.
        client_order_id: String,
    },

    /// Anything else (decode failures, misconfiguration).
    #[error("Exchange error: {message}")]
    Unknown {
        /// Error details.
        message: String,
    },
}

impl ExchangeError {
    /// Whether the outcome of the call is unknown and worth retrying later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::CircuitOpen { .. })
    }
}

/// Port for exchange interactions.
#[async_trait]
pub trait ExchangePort: Send + Sync {
    /// Place an order. Placing the same token twice returns the existing order.
    async fn place_order(&self, request: PlaceOrderRequest) -> Result<OrderState, ExchangeError>;

    /// Cancel an order by token.
    async fn cancel_order(&self, symbol: &Symbol, order: &OrderRef) -> Result<OrderState, ExchangeError>;

    /// Current state of an order by token.
    async fn query_order(&self, symbol: &Symbol, order: &OrderRef) -> Result<OrderState, ExchangeError>;

    /// Current mark price.
    async fn mark_price(&self, symbol: &Symbol) -> Result<Decimal, ExchangeError>;

    /// Set leverage for a symbol.
    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<(), ExchangeError>;

    /// Open positions.
    async fn positions(&self) -> Result<Vec<PositionSnapshot>, ExchangeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_chain::{LegRole, NewLeg};
    use crate::domain::shared::ChainId;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn leg(role: LegRole, order_type: LegOrderType, price: Option<Decimal>, stop: Option<Decimal>) -> OrderLeg {
        OrderLeg::new(NewLeg {
            leg_id: ClientOrderId::new(format!("SCA-16OCT-00001-{}", role.code())),
            chain_id: ChainId::new("SCA-16OCT-00001"),
            role,
            order_type,
            side: OrderSide::Sell,
            price,
            stop_price: stop,
            quantity: dec!(0.5),
            created_at: Utc::now(),
        })
    }

    #[test]
    fn stop_leg_maps_to_reduce_only_algo_order() {
        let sl = leg(LegRole::StopLoss, LegOrderType::StopMarket, None, Some(dec!(95)));
        let request = PlaceOrderRequest::for_leg(&sl, &Symbol::new("BTCUSDT"), PositionSide::Long).unwrap();

        assert_eq!(request.kind, PlacementKind::StopMarket { trigger: dec!(95) });
        assert_eq!(request.kind.venue(), OrderVenue::Algo);
        assert!(request.reduce_only);
        assert_eq!(OrderRef::for_leg(&sl).venue, OrderVenue::Algo);
    }

    #[test]
    fn limit_leg_without_price_is_not_placeable() {
        let rebuy = leg(LegRole::Rebuy, LegOrderType::Limit, None, None);
        assert!(PlaceOrderRequest::for_leg(&rebuy, &Symbol::new("BTCUSDT"), PositionSide::Long).is_none());
    }

    #[test]
    fn transient_classification() {
        assert!(ExchangeError::Transient { message: "timeout".into() }.is_transient());
        assert!(ExchangeError::CircuitOpen { message: "banned".into() }.is_transient());
        assert!(!ExchangeError::Rejected { code: -2019, message: "margin".into() }.is_transient());
    }
}
