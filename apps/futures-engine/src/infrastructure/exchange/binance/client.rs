//! Typed futures client implementing `ExchangePort`.
//!
//! A thin layer over [`SignedRequestExecutor`]: it builds parameters, decodes
//! responses and maps them onto port types. Retries and admission live in
//! the executor; this layer keeps no state of its own.

use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::api_types::{
    BinanceAccount, BinanceAlgoOrderResponse, BinanceIncome, BinanceLeverageResponse,
    BinanceListenKey, BinanceOrderResponse, BinancePositionRisk, BinancePremiumIndex,
    BinanceTickerPrice,
};
use super::endpoints::Endpoint;
use super::error::BinanceError;
use super::error_codes::ErrorClass;
use super::executor::{SignedRequestExecutor, decode};
use super::params::{
    ConditionalType, IncomeQuery, LeverageChange, MarginType, MarginTypeChange, NewAlgoOrder,
    NewOrder, OrderQuery, PositionModeChange, RegularOrderType, RequestParams, WirePositionSide,
};
use crate::application::ports::{
    ExchangeError, ExchangePort, OrderRef, OrderState, OrderVenue, PlaceOrderRequest,
    PlacementKind, PositionSnapshot, PriceSourcePort,
};
use crate::domain::order_chain::{LegStatus, PositionSide};
use crate::domain::shared::{ClientOrderId, ExchangeOrderId, Symbol};
use crate::resilience::RequestPriority;

/// Code returned when cancelling an order that is no longer open.
const UNKNOWN_ORDER_ON_CANCEL: i64 = -2011;
/// Code returned when querying an order that does not exist.
const ORDER_DOES_NOT_EXIST: i64 = -2013;

/// Binance USDⓈ-M futures client.
#[derive(Debug, Clone)]
pub struct FuturesClient {
    executor: SignedRequestExecutor,
    hedge_mode: bool,
}

impl FuturesClient {
    /// Create a client. In hedge mode every order carries `positionSide`.
    #[must_use]
    pub const fn new(executor: SignedRequestExecutor, hedge_mode: bool) -> Self {
        Self {
            executor,
            hedge_mode,
        }
    }

    /// Underlying executor.
    #[must_use]
    pub const fn executor(&self) -> &SignedRequestExecutor {
        &self.executor
    }

    fn wire_side(&self, side: PositionSide) -> Option<WirePositionSide> {
        self.hedge_mode.then(|| side.into())
    }

    // =========================================================================
    // Regular orders
    // =========================================================================

    /// Place a regular order. A duplicate token returns the existing order.
    pub async fn place_order(&self, order: &NewOrder) -> Result<BinanceOrderResponse, BinanceError> {
        let result = self
            .executor
            .execute_json(
                Method::POST,
                Endpoint::Order,
                &order.to_params(),
                RequestPriority::High,
            )
            .await;
        match result {
            Err(err) if err.class() == Some(ErrorClass::Duplicate) => {
                info!(
                    client_order_id = %order.client_order_id,
                    "Duplicate client order id, recovering existing order"
                );
                self.query_order(
                    &order.symbol,
                    &OrderQuery::ByClientId(order.client_order_id.clone()),
                )
                .await
            }
            other => other,
        }
    }

    /// Query a regular order.
    pub async fn query_order(
        &self,
        symbol: &Symbol,
        query: &OrderQuery,
    ) -> Result<BinanceOrderResponse, BinanceError> {
        self.executor
            .execute_json(
                Method::GET,
                Endpoint::Order,
                &query.to_params(symbol),
                RequestPriority::Normal,
            )
            .await
            .map_err(|err| not_found(err, query))
    }

    /// Cancel a regular order.
    pub async fn cancel_order(
        &self,
        symbol: &Symbol,
        query: &OrderQuery,
    ) -> Result<BinanceOrderResponse, BinanceError> {
        self.executor
            .execute_json(
                Method::DELETE,
                Endpoint::Order,
                &query.to_params(symbol),
                RequestPriority::High,
            )
            .await
    }

    /// Open regular orders, optionally for one symbol.
    pub async fn open_orders(
        &self,
        symbol: Option<&Symbol>,
    ) -> Result<Vec<BinanceOrderResponse>, BinanceError> {
        let params = RequestParams::new().with_opt("symbol", symbol);
        self.executor
            .execute_json(
                Method::GET,
                Endpoint::OpenOrders,
                &params,
                RequestPriority::Normal,
            )
            .await
    }

    /// Cancel every open regular order of a symbol.
    pub async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<(), BinanceError> {
        let params = RequestParams::new().with("symbol", symbol);
        self.executor
            .execute(Method::DELETE, Endpoint::AllOpenOrders, &params)
            .await
            .map(|_| ())
    }

    // =========================================================================
    // Conditional (algo) orders
    // =========================================================================

    /// Place a conditional order. A duplicate token returns the existing order.
    pub async fn place_algo_order(
        &self,
        order: &NewAlgoOrder,
        priority: RequestPriority,
    ) -> Result<BinanceAlgoOrderResponse, BinanceError> {
        let result = self
            .executor
            .execute_json(Method::POST, Endpoint::AlgoOrder, &order.to_params(), priority)
            .await;
        match result {
            Err(err) if err.class() == Some(ErrorClass::Duplicate) => {
                info!(
                    client_algo_id = %order.client_algo_id,
                    "Duplicate client algo id, recovering existing order"
                );
                self.query_algo_order(
                    &order.symbol,
                    &OrderQuery::ByClientId(order.client_algo_id.clone()),
                )
                .await
            }
            other => other,
        }
    }

    /// Query a conditional order.
    pub async fn query_algo_order(
        &self,
        symbol: &Symbol,
        query: &OrderQuery,
    ) -> Result<BinanceAlgoOrderResponse, BinanceError> {
        self.executor
            .execute_json(
                Method::GET,
                Endpoint::AlgoOrder,
                &query.to_algo_params(symbol),
                RequestPriority::Normal,
            )
            .await
            .map_err(|err| not_found(err, query))
    }

    /// Cancel a conditional order.
    pub async fn cancel_algo_order(
        &self,
        symbol: &Symbol,
        query: &OrderQuery,
    ) -> Result<BinanceAlgoOrderResponse, BinanceError> {
        self.executor
            .execute_json(
                Method::DELETE,
                Endpoint::AlgoOrder,
                &query.to_algo_params(symbol),
                RequestPriority::High,
            )
            .await
    }

    /// Open conditional orders, optionally for one symbol.
    pub async fn open_algo_orders(
        &self,
        symbol: Option<&Symbol>,
    ) -> Result<Vec<BinanceAlgoOrderResponse>, BinanceError> {
        let params = RequestParams::new().with_opt("symbol", symbol);
        self.executor
            .execute_json(
                Method::GET,
                Endpoint::OpenAlgoOrders,
                &params,
                RequestPriority::Normal,
            )
            .await
    }

    /// Cancel every open conditional order of a symbol.
    pub async fn cancel_all_algo_orders(&self, symbol: &Symbol) -> Result<(), BinanceError> {
        let params = RequestParams::new().with("symbol", symbol);
        self.executor
            .execute(Method::DELETE, Endpoint::AlgoOpenOrders, &params)
            .await
            .map(|_| ())
    }

    // =========================================================================
    // Account configuration
    // =========================================================================

    /// Set leverage; returns the applied value.
    pub async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<u32, BinanceError> {
        let change = LeverageChange {
            symbol: symbol.clone(),
            leverage,
        };
        let response: BinanceLeverageResponse = self
            .executor
            .execute_json(
                Method::POST,
                Endpoint::Leverage,
                &change.to_params(),
                RequestPriority::High,
            )
            .await?;
        Ok(response.leverage)
    }

    /// Set margin mode. "No need to change" counts as success.
    pub async fn set_margin_type(
        &self,
        symbol: &Symbol,
        margin_type: MarginType,
    ) -> Result<(), BinanceError> {
        let change = MarginTypeChange {
            symbol: symbol.clone(),
            margin_type,
        };
        let result = self
            .executor
            .execute(Method::POST, Endpoint::MarginType, &change.to_params())
            .await;
        benign_ok(result, "margin type")
    }

    /// Switch between hedge and one-way mode. "No need to change" counts as success.
    pub async fn set_position_mode(&self, dual_side: bool) -> Result<(), BinanceError> {
        let change = PositionModeChange { dual_side };
        let result = self
            .executor
            .execute(Method::POST, Endpoint::PositionSideDual, &change.to_params())
            .await;
        benign_ok(result, "position mode")
    }

    // =========================================================================
    // Account state and market data
    // =========================================================================

    /// Position information, including flat entries.
    pub async fn position_risk(
        &self,
        symbol: Option<&Symbol>,
    ) -> Result<Vec<BinancePositionRisk>, BinanceError> {
        let params = RequestParams::new().with_opt("symbol", symbol);
        self.executor
            .execute_json(
                Method::GET,
                Endpoint::PositionRisk,
                &params,
                RequestPriority::Normal,
            )
            .await
    }

    /// Account balances.
    pub async fn account(&self) -> Result<BinanceAccount, BinanceError> {
        self.executor
            .execute_json(
                Method::GET,
                Endpoint::Account,
                &RequestParams::new(),
                RequestPriority::Normal,
            )
            .await
    }

    /// Last traded price.
    pub async fn ticker_price(&self, symbol: &Symbol) -> Result<Decimal, BinanceError> {
        let params = RequestParams::new().with("symbol", symbol);
        let ticker: BinanceTickerPrice = self
            .executor
            .execute_json(
                Method::GET,
                Endpoint::TickerPrice,
                &params,
                RequestPriority::Normal,
            )
            .await?;
        Ok(ticker.price)
    }

    /// Mark price and funding.
    pub async fn premium_index(&self, symbol: &Symbol) -> Result<BinancePremiumIndex, BinanceError> {
        let params = RequestParams::new().with("symbol", symbol);
        self.executor
            .execute_json(
                Method::GET,
                Endpoint::PremiumIndex,
                &params,
                RequestPriority::Normal,
            )
            .await
    }

    /// Funding, realized PnL and commission history.
    pub async fn income(&self, query: &IncomeQuery) -> Result<Vec<BinanceIncome>, BinanceError> {
        self.executor
            .execute_json(
                Method::GET,
                Endpoint::Income,
                &query.to_params(),
                RequestPriority::Low,
            )
            .await
    }

    // =========================================================================
    // User data stream
    // =========================================================================

    /// Start a user data stream session.
    pub async fn start_user_stream(&self) -> Result<String, BinanceError> {
        let body = self
            .executor
            .execute_critical(Method::POST, Endpoint::ListenKey, &RequestParams::new())
            .await?;
        let key: BinanceListenKey = decode(&body)?;
        Ok(key.listen_key)
    }

    /// Extend the session. Runs on the critical path so a ban cannot expire it.
    pub async fn keepalive_user_stream(&self) -> Result<(), BinanceError> {
        self.executor
            .execute_critical(Method::PUT, Endpoint::ListenKey, &RequestParams::new())
            .await
            .map(|_| ())
    }

    /// Close the session.
    pub async fn close_user_stream(&self) -> Result<(), BinanceError> {
        self.executor
            .execute(Method::DELETE, Endpoint::ListenKey, &RequestParams::new())
            .await
            .map(|_| ())
    }

    // =========================================================================
    // Port mapping
    // =========================================================================

    fn new_order(&self, request: &PlaceOrderRequest, order_type: RegularOrderType) -> NewOrder {
        NewOrder {
            symbol: request.symbol.clone(),
            side: request.side,
            position_side: self.wire_side(request.position_side),
            order_type,
            quantity: request.quantity,
            reduce_only: request.reduce_only,
            client_order_id: request.client_order_id.clone(),
        }
    }

    fn new_algo_order(&self, request: &PlaceOrderRequest, order_type: ConditionalType) -> NewAlgoOrder {
        NewAlgoOrder {
            symbol: request.symbol.clone(),
            side: request.side,
            position_side: self.wire_side(request.position_side),
            order_type,
            quantity: request.quantity,
            reduce_only: request.reduce_only,
            client_algo_id: request.client_order_id.clone(),
        }
    }
}

fn not_found(err: BinanceError, query: &OrderQuery) -> BinanceError {
    if err.code() == Some(ORDER_DOES_NOT_EXIST) {
        let client_order_id = match query {
            OrderQuery::ById(id) => id.to_string(),
            OrderQuery::ByClientId(id) => id.to_string(),
        };
        BinanceError::OrderNotFound { client_order_id }
    } else {
        err
    }
}

fn benign_ok(result: Result<String, BinanceError>, what: &str) -> Result<(), BinanceError> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.class() == Some(ErrorClass::Benign) => {
            debug!(setting = what, "Exchange setting already in effect");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn regular_state(order: &BinanceOrderResponse) -> OrderState {
    OrderState {
        client_order_id: ClientOrderId::new(order.client_order_id.clone()),
        exchange_order_id: Some(ExchangeOrderId::from_numeric(order.order_id)),
        venue: OrderVenue::Regular,
        status: order.status.to_leg_status(),
        filled_quantity: order.executed_qty,
        avg_fill_price: order.avg_fill_price(),
    }
}

fn algo_state(order: &BinanceAlgoOrderResponse) -> OrderState {
    let status = order.algo_status.to_leg_status();
    let filled = status == LegStatus::Filled;
    OrderState {
        client_order_id: ClientOrderId::new(order.client_algo_id.clone()),
        exchange_order_id: Some(ExchangeOrderId::from_numeric(order.algo_id)),
        venue: OrderVenue::Algo,
        status,
        filled_quantity: if filled { order.quantity } else { Decimal::ZERO },
        avg_fill_price: if filled {
            order
                .actual_price
                .filter(|p| *p > Decimal::ZERO)
                .or(Some(order.trigger_price))
        } else {
            None
        },
    }
}

fn position_snapshot(position: &BinancePositionRisk) -> Option<PositionSnapshot> {
    if position.position_amt.is_zero() {
        return None;
    }
    let position_side = match position.position_side.as_str() {
        "LONG" => PositionSide::Long,
        "SHORT" => PositionSide::Short,
        _ if position.position_amt.is_sign_negative() => PositionSide::Short,
        _ => PositionSide::Long,
    };
    Some(PositionSnapshot {
        symbol: Symbol::new(position.symbol.clone()),
        position_side,
        quantity: position.position_amt.abs(),
        entry_price: position.entry_price,
        mark_price: position.mark_price,
        unrealized_pnl: position.unrealized_profit,
        leverage: position.leverage.parse().unwrap_or(1),
    })
}

#[async_trait]
impl ExchangePort for FuturesClient {
    async fn place_order(&self, request: PlaceOrderRequest) -> Result<OrderState, ExchangeError> {
        let state = match request.kind {
            PlacementKind::Market => {
                let order = self.new_order(&request, RegularOrderType::Market);
                regular_state(&FuturesClient::place_order(self, &order).await?)
            }
            PlacementKind::Limit { price } => {
                let order = self.new_order(&request, RegularOrderType::Limit { price });
                regular_state(&FuturesClient::place_order(self, &order).await?)
            }
            PlacementKind::StopMarket { trigger } => {
                let order = self.new_algo_order(&request, ConditionalType::StopMarket { trigger });
                algo_state(&self.place_algo_order(&order, RequestPriority::High).await?)
            }
            PlacementKind::TakeProfitMarket { trigger } => {
                let order =
                    self.new_algo_order(&request, ConditionalType::TakeProfitMarket { trigger });
                algo_state(&self.place_algo_order(&order, RequestPriority::High).await?)
            }
            PlacementKind::TrailingStop {
                callback_rate,
                activation_price,
            } => {
                let order = self.new_algo_order(
                    &request,
                    ConditionalType::TrailingStopMarket {
                        callback_rate,
                        activation_price,
                    },
                );
                algo_state(&self.place_algo_order(&order, RequestPriority::High).await?)
            }
        };
        Ok(state)
    }

    async fn cancel_order(&self, symbol: &Symbol, order: &OrderRef) -> Result<OrderState, ExchangeError> {
        let query = OrderQuery::ByClientId(order.client_order_id.clone());
        let result = match order.venue {
            OrderVenue::Regular => FuturesClient::cancel_order(self, symbol, &query)
                .await
                .map(|o| regular_state(&o)),
            OrderVenue::Algo => self
                .cancel_algo_order(symbol, &query)
                .await
                .map(|o| algo_state(&o)),
        };
        match result {
            // Already filled or cancelled: report what actually happened.
            Err(err) if err.code() == Some(UNKNOWN_ORDER_ON_CANCEL) => {
                ExchangePort::query_order(self, symbol, order).await
            }
            other => other.map_err(ExchangeError::from),
        }
    }

    async fn query_order(&self, symbol: &Symbol, order: &OrderRef) -> Result<OrderState, ExchangeError> {
        let query = OrderQuery::ByClientId(order.client_order_id.clone());
        let state = match order.venue {
            OrderVenue::Regular => regular_state(&FuturesClient::query_order(self, symbol, &query).await?),
            OrderVenue::Algo => algo_state(&self.query_algo_order(symbol, &query).await?),
        };
        Ok(state)
    }

    async fn mark_price(&self, symbol: &Symbol) -> Result<Decimal, ExchangeError> {
        Ok(self.premium_index(symbol).await?.mark_price)
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<(), ExchangeError> {
        FuturesClient::set_leverage(self, symbol, leverage).await?;
        Ok(())
    }

    async fn positions(&self) -> Result<Vec<PositionSnapshot>, ExchangeError> {
        let positions = self.position_risk(None).await?;
        Ok(positions.iter().filter_map(position_snapshot).collect())
    }
}

#[async_trait]
impl PriceSourcePort for FuturesClient {
    async fn mark_price(&self, symbol: &Symbol) -> Result<Decimal, ExchangeError> {
        Ok(self.premium_index(symbol).await?.mark_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn algo(status: &str, actual: Option<&str>) -> BinanceAlgoOrderResponse {
        let actual = actual.map_or("null".to_string(), |p| format!("\"{p}\""));
        serde_json::from_str(&format!(
            r#"{{"algoId": 7, "clientAlgoId": "SCA-16OCT-00001-SL", "algoStatus": "{status}",
                "quantity": "0.5", "triggerPrice": "95", "actualPrice": {actual}}}"#
        ))
        .unwrap()
    }

    #[test]
    fn triggered_algo_order_counts_as_filled() {
        let state = algo_state(&algo("FINISHED", Some("94.8")));
        assert_eq!(state.status, LegStatus::Filled);
        assert_eq!(state.filled_quantity, dec!(0.5));
        assert_eq!(state.avg_fill_price, Some(dec!(94.8)));
        assert_eq!(state.venue, OrderVenue::Algo);

        let state = algo_state(&algo("TRIGGERED", None));
        assert_eq!(state.avg_fill_price, Some(dec!(95)));
    }

    #[test]
    fn working_algo_order_has_no_fill() {
        let state = algo_state(&algo("NEW", None));
        assert_eq!(state.status, LegStatus::Open);
        assert_eq!(state.filled_quantity, Decimal::ZERO);
        assert_eq!(state.avg_fill_price, None);
        assert_eq!(state.exchange_order_id, Some(ExchangeOrderId::new("7")));
    }

    #[test]
    fn one_way_positions_use_sign() {
        let position: BinancePositionRisk = serde_json::from_str(
            r#"{"symbol": "BTCUSDT", "positionAmt": "-0.010", "entryPrice": "67000",
                "markPrice": "66000", "unRealizedProfit": "10", "leverage": "10",
                "positionSide": "BOTH"}"#,
        )
        .unwrap();
        let snapshot = position_snapshot(&position).unwrap();
        assert_eq!(snapshot.position_side, PositionSide::Short);
        assert_eq!(snapshot.quantity, dec!(0.01));
        assert_eq!(snapshot.leverage, 10);
    }

    #[test]
    fn flat_positions_are_skipped() {
        let position: BinancePositionRisk = serde_json::from_str(
            r#"{"symbol": "BTCUSDT", "positionAmt": "0.000", "entryPrice": "0",
                "markPrice": "66000", "unRealizedProfit": "0", "leverage": "20",
                "positionSide": "LONG"}"#,
        )
        .unwrap();
        assert!(position_snapshot(&position).is_none());
    }

    #[test]
    fn benign_codes_are_success() {
        let benign = Err(BinanceError::Api {
            status: 400,
            code: -4046,
            message: "No need to change margin type.".into(),
            class: ErrorClass::Benign,
        });
        assert!(benign_ok(benign, "margin type").is_ok());
        let permanent = Err(BinanceError::Api {
            status: 400,
            code: -1102,
            message: "Mandatory parameter".into(),
            class: ErrorClass::Permanent,
        });
        assert!(benign_ok(permanent, "margin type").is_err());
    }
}
