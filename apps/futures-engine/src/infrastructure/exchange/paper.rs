//! Paper exchange for dry runs.
//!
//! Implements `ExchangePort` in memory against a [`PriceSourcePort`]:
//! market orders fill at the mark price, limit orders fill once marketable,
//! and conditional orders trigger when an observed price crosses them.
//! Prices are observed whenever the monitor asks for a mark price or an
//! order status. Placements are idempotent by client order id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::application::ports::{
    ExchangeError, ExchangePort, OrderRef, OrderState, OrderVenue, PlaceOrderRequest,
    PlacementKind, PositionSnapshot, PriceSourcePort,
};
use crate::domain::order_chain::{LegStatus, OrderSide, PositionSide};
use crate::domain::shared::{ClientOrderId, ExchangeOrderId, Symbol};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Prices set by hand; for tests and offline dry runs.
#[derive(Debug, Default)]
pub struct ManualPriceSource {
    prices: RwLock<HashMap<Symbol, Decimal>>,
}

impl ManualPriceSource {
    /// Create an empty price source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the price for a symbol.
    pub fn set_price(&self, symbol: &Symbol, price: Decimal) {
        self.prices.write().insert(symbol.clone(), price);
    }
}

#[async_trait]
impl PriceSourcePort for ManualPriceSource {
    async fn mark_price(&self, symbol: &Symbol) -> Result<Decimal, ExchangeError> {
        self.prices
            .read()
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::Unknown {
                message: format!("no price for {symbol}"),
            })
    }
}

#[derive(Debug, Clone)]
struct PaperOrder {
    request: PlaceOrderRequest,
    exchange_order_id: ExchangeOrderId,
    status: LegStatus,
    filled_quantity: Decimal,
    avg_fill_price: Option<Decimal>,
    /// Best price seen since a trailing stop activated.
    extreme: Option<Decimal>,
}

impl PaperOrder {
    fn state(&self) -> OrderState {
        OrderState {
            client_order_id: self.request.client_order_id.clone(),
            exchange_order_id: Some(self.exchange_order_id.clone()),
            venue: self.request.kind.venue(),
            status: self.status,
            filled_quantity: self.filled_quantity,
            avg_fill_price: self.avg_fill_price,
        }
    }

    /// Whether the order executes at `price`, updating trailing state.
    fn triggers_at(&mut self, price: Decimal) -> bool {
        let sell = self.request.side == OrderSide::Sell;
        match self.request.kind {
            PlacementKind::Market => true,
            PlacementKind::Limit { price: limit } => {
                if sell {
                    price >= limit
                } else {
                    price <= limit
                }
            }
            PlacementKind::StopMarket { trigger } => {
                if sell {
                    price <= trigger
                } else {
                    price >= trigger
                }
            }
            PlacementKind::TakeProfitMarket { trigger } => {
                if sell {
                    price >= trigger
                } else {
                    price <= trigger
                }
            }
            PlacementKind::TrailingStop {
                callback_rate,
                activation_price,
            } => {
                if self.extreme.is_none() {
                    let active = activation_price.is_none_or(|act| {
                        if sell { price >= act } else { price <= act }
                    });
                    if !active {
                        return false;
                    }
                    self.extreme = Some(price);
                }
                let extreme = self.extreme.unwrap_or(price);
                let extreme = if sell {
                    extreme.max(price)
                } else {
                    extreme.min(price)
                };
                self.extreme = Some(extreme);
                let callback = extreme * callback_rate / HUNDRED;
                if sell {
                    price <= extreme - callback
                } else {
                    price >= extreme + callback
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PaperPosition {
    quantity: Decimal,
    entry_price: Decimal,
}

#[derive(Debug, Default)]
struct PaperBook {
    orders: HashMap<ClientOrderId, PaperOrder>,
    positions: HashMap<(Symbol, PositionSide), PaperPosition>,
    leverage: HashMap<Symbol, u32>,
    marks: HashMap<Symbol, Decimal>,
}

impl PaperBook {
    /// Execute `order` at `price`. Reduce-only orders are capped at the open
    /// position and expire when it is flat.
    fn fill(&mut self, token: &ClientOrderId, price: Decimal) {
        let Some(order) = self.orders.get(token) else {
            return;
        };
        let request = order.request.clone();
        let key = (request.symbol.clone(), request.position_side);
        let position = self.positions.get(&key).copied().unwrap_or_default();

        let quantity = if request.reduce_only {
            request.quantity.min(position.quantity)
        } else {
            request.quantity
        };

        let Some(order) = self.orders.get_mut(token) else {
            return;
        };
        if quantity <= Decimal::ZERO {
            order.status = LegStatus::Cancelled;
            debug!(client_order_id = %token, "Paper reduce-only order expired on flat position");
            return;
        }
        order.status = LegStatus::Filled;
        order.filled_quantity = quantity;
        order.avg_fill_price = Some(price);

        let next = if request.reduce_only {
            PaperPosition {
                quantity: position.quantity - quantity,
                entry_price: position.entry_price,
            }
        } else {
            let total = position.quantity + quantity;
            PaperPosition {
                quantity: total,
                entry_price: (position.entry_price * position.quantity + price * quantity) / total,
            }
        };
        if next.quantity.is_zero() {
            self.positions.remove(&key);
        } else {
            self.positions.insert(key, next);
        }
        info!(
            client_order_id = %token,
            symbol = %request.symbol,
            quantity = %quantity,
            price = %price,
            "Paper order filled"
        );
    }

    /// Run every working order of `symbol` against `price`.
    fn observe(&mut self, symbol: &Symbol, price: Decimal) {
        self.marks.insert(symbol.clone(), price);
        let mut triggered: Vec<(ClientOrderId, u64)> = Vec::new();
        for (token, order) in &mut self.orders {
            if order.request.symbol == *symbol
                && order.status == LegStatus::Open
                && order.triggers_at(price)
            {
                // Entries before exits so a same-tick entry is protected.
                let rank = u64::from(order.request.reduce_only);
                triggered.push((token.clone(), rank));
            }
        }
        triggered.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        for (token, _) in triggered {
            self.fill(&token, price);
        }
    }
}

/// In-memory exchange filling against observed prices.
#[derive(Debug)]
pub struct PaperExchange<P> {
    prices: P,
    book: Mutex<PaperBook>,
    next_id: AtomicI64,
}

impl<P: PriceSourcePort> PaperExchange<P> {
    /// Create a paper exchange reading prices from `prices`.
    pub fn new(prices: P) -> Self {
        Self {
            prices,
            book: Mutex::new(PaperBook::default()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Price source.
    pub const fn prices(&self) -> &P {
        &self.prices
    }

    /// Leverage last set for `symbol`.
    pub fn leverage(&self, symbol: &Symbol) -> Option<u32> {
        self.book.lock().leverage.get(symbol).copied()
    }

    /// Orders still working, across symbols.
    pub fn open_orders(&self) -> Vec<OrderState> {
        self.book
            .lock()
            .orders
            .values()
            .filter(|o| o.status == LegStatus::Open)
            .map(PaperOrder::state)
            .collect()
    }

    /// Fetch the current price and run triggers against it.
    pub async fn observe(&self, symbol: &Symbol) -> Result<Decimal, ExchangeError> {
        let price = self.prices.mark_price(symbol).await?;
        self.book.lock().observe(symbol, price);
        Ok(price)
    }
}

#[async_trait]
impl<P: PriceSourcePort> ExchangePort for PaperExchange<P> {
    async fn place_order(&self, request: PlaceOrderRequest) -> Result<OrderState, ExchangeError> {
        if request.quantity <= Decimal::ZERO {
            return Err(ExchangeError::Rejected {
                code: -4003,
                message: "Quantity less than or equal to zero.".to_string(),
            });
        }
        if let Some(existing) = self.book.lock().orders.get(&request.client_order_id) {
            return Ok(existing.state());
        }

        let price = self.prices.mark_price(&request.symbol).await?;
        let token = request.client_order_id.clone();
        let symbol = request.symbol.clone();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut book = self.book.lock();
        // Re-check under the lock; another placement may have raced the price read.
        if let Some(existing) = book.orders.get(&token) {
            return Ok(existing.state());
        }
        book.orders.insert(
            token.clone(),
            PaperOrder {
                request,
                exchange_order_id: ExchangeOrderId::from_numeric(id),
                status: LegStatus::Open,
                filled_quantity: Decimal::ZERO,
                avg_fill_price: None,
                extreme: None,
            },
        );
        let executes_now = book
            .orders
            .get_mut(&token)
            .is_some_and(|o| o.request.kind.venue() == OrderVenue::Regular && o.triggers_at(price));
        if executes_now {
            book.fill(&token, price);
        }
        book.marks.insert(symbol, price);
        book.orders
            .get(&token)
            .map(PaperOrder::state)
            .ok_or_else(|| ExchangeError::Unknown {
                message: format!("paper order {token} vanished"),
            })
    }

    async fn cancel_order(&self, _symbol: &Symbol, order: &OrderRef) -> Result<OrderState, ExchangeError> {
        let mut book = self.book.lock();
        let paper = book
            .orders
            .get_mut(&order.client_order_id)
            .ok_or_else(|| ExchangeError::NotFound {
                client_order_id: order.client_order_id.to_string(),
            })?;
        if !paper.status.is_terminal() {
            paper.status = LegStatus::Cancelled;
        }
        Ok(paper.state())
    }

    async fn query_order(&self, symbol: &Symbol, order: &OrderRef) -> Result<OrderState, ExchangeError> {
        self.observe(symbol).await?;
        self.book
            .lock()
            .orders
            .get(&order.client_order_id)
            .map(PaperOrder::state)
            .ok_or_else(|| ExchangeError::NotFound {
                client_order_id: order.client_order_id.to_string(),
            })
    }

    async fn mark_price(&self, symbol: &Symbol) -> Result<Decimal, ExchangeError> {
        self.observe(symbol).await
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<(), ExchangeError> {
        if !(1..=125).contains(&leverage) {
            return Err(ExchangeError::Rejected {
                code: -4028,
                message: format!("Leverage {leverage} is not valid"),
            });
        }
        self.book.lock().leverage.insert(symbol.clone(), leverage);
        Ok(())
    }

    async fn positions(&self) -> Result<Vec<PositionSnapshot>, ExchangeError> {
        let book = self.book.lock();
        Ok(book
            .positions
            .iter()
            .map(|((symbol, side), position)| {
                let mark = book.marks.get(symbol).copied().unwrap_or(position.entry_price);
                let direction = match side {
                    PositionSide::Long => Decimal::ONE,
                    PositionSide::Short => Decimal::NEGATIVE_ONE,
                };
                PositionSnapshot {
                    symbol: symbol.clone(),
                    position_side: *side,
                    quantity: position.quantity,
                    entry_price: position.entry_price,
                    mark_price: mark,
                    unrealized_pnl: (mark - position.entry_price) * position.quantity * direction,
                    leverage: book.leverage.get(symbol).copied().unwrap_or(1),
                }
            })
            .collect())
    }
}
