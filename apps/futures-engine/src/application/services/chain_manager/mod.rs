//! Order Chain Manager
//!
//! Owns the chain registry and realizes every chain transition through the
//! exchange port. Each operation locks one chain, talks to the exchange,
//! applies the observed order states back onto the legs, then drains the
//! chain's events to the publisher.
//!
//! Legs are recorded before they are sent, with their client order id as
//! the idempotency token. A placement whose outcome is unknown leaves the
//! leg `Pending`; the next reconcile looks the token up and re-sends the same
//! token only if the exchange has never seen it.

mod config;
mod protection;
mod reconcile;

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use config::{
    AveragingConfig, ChainManagerConfig, HedgeConfig, ProtectionRetryPolicy, RebuyConfig,
    SymbolFilters, TakeProfitStep, TrailingConfig, TrailingMode,
};
pub use reconcile::TickReport;

use super::chain_registry::{ChainRegistry, DuplicateChain};
use crate::application::ports::{
    EventPublisherPort, ExchangeError, ExchangePort, OrderRef, OrderState, PlaceOrderRequest,
};
use crate::domain::order_chain::{
    Chain, ChainError, ChainKind, ClientOrderIdGenerator, LegOrderType, LegRole, LegStatus,
    LegUpdate, NewLeg, OpenChain, OrderLeg, OrderSide, PositionSide, ProtectionTargets, TradingMode,
    leg_token,
};
use crate::domain::risk_management::{DecisionAction, EntryZone, TradeDecision};
use crate::domain::shared::{ChainId, ClientOrderId, Symbol};
use crate::observability::metrics;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Chain manager errors.
#[derive(Debug, Error)]
pub enum ChainManagerError {
    /// Decision action cannot drive this operation.
    #[error("{action} cannot be used to {operation}")]
    UnsupportedAction {
        /// Offending action.
        action: DecisionAction,
        /// Operation attempted.
        operation: &'static str,
    },

    /// No live chain with this id.
    #[error("chain not found: {0}")]
    ChainNotFound(ChainId),

    /// No primary chain for the symbol and side.
    #[error("no open {side:?} chain on {symbol}")]
    NoOpenChain {
        /// Symbol.
        symbol: Symbol,
        /// Direction.
        side: PositionSide,
    },

    /// Chain is closed or closing.
    #[error("chain {0} is not open")]
    ChainClosed(ChainId),

    /// Size rounds to a zero quantity.
    #[error("quantity for {symbol} rounds to zero")]
    QuantityTooSmall {
        /// Symbol.
        symbol: Symbol,
    },

    /// Averaging refused by the chain's limits.
    #[error("averaging refused: {0}")]
    AveragingRefused(String),

    /// Hedge refused by the configured limits.
    #[error("hedge refused: {0}")]
    HedgeRefused(String),

    /// Entry placement returned without an accepted order.
    #[error("entry {leg_id} not accepted: {status}")]
    EntryNotAccepted {
        /// Entry token.
        leg_id: ClientOrderId,
        /// Reported status.
        status: LegStatus,
    },

    /// Leg lacks a price its order type needs.
    #[error("leg {0} cannot be expressed as an order")]
    InvalidLeg(ClientOrderId),

    /// Exchange call failed.
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    /// Chain rejected the mutation.
    #[error("chain rejected the change: {0}")]
    Chain(#[from] ChainError),

    /// Chain id collision.
    #[error(transparent)]
    Registry(#[from] DuplicateChain),
}

/// Exchange-facing owner of all chains.
pub struct ChainManager<E: ?Sized> {
    exchange: Arc<E>,
    publisher: Arc<dyn EventPublisherPort>,
    registry: Arc<ChainRegistry>,
    ids: ClientOrderIdGenerator,
    config: ChainManagerConfig,
}

impl<E: ?Sized> std::fmt::Debug for ChainManager<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainManager")
            .field("chains", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Entry leg parameters shared by primaries and hedges.
struct EntryPlan {
    kind: ChainKind,
    symbol: Symbol,
    side: PositionSide,
    mode: TradingMode,
    order_type: LegOrderType,
    price: Option<Decimal>,
    quantity: Decimal,
    targets: ProtectionTargets,
}

impl<E: ExchangePort + ?Sized> ChainManager<E> {
    /// Create a manager with an empty registry.
    pub fn new(
        exchange: Arc<E>,
        publisher: Arc<dyn EventPublisherPort>,
        config: ChainManagerConfig,
    ) -> Self {
        Self::with_registry(exchange, publisher, config, Arc::new(ChainRegistry::new()))
    }

    /// Create a manager over an existing registry.
    pub fn with_registry(
        exchange: Arc<E>,
        publisher: Arc<dyn EventPublisherPort>,
        config: ChainManagerConfig,
        registry: Arc<ChainRegistry>,
    ) -> Self {
        Self {
            exchange,
            publisher,
            registry,
            ids: ClientOrderIdGenerator::new(),
            config,
        }
    }

    /// Chain registry.
    pub const fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    /// Exchange port.
    pub const fn exchange(&self) -> &Arc<E> {
        &self.exchange
    }

    /// Configuration.
    pub const fn config(&self) -> &ChainManagerConfig {
        &self.config
    }

    /// Open primary positions, as counted against `max_positions`.
    pub fn open_position_count(&self) -> u32 {
        u32::try_from(self.registry.primary_count()).unwrap_or(u32::MAX)
    }

    /// Copy of a chain's current state.
    pub async fn chain(&self, chain_id: &ChainId) -> Option<Chain> {
        self.registry.snapshot(chain_id).await
    }

    // =========================================================================
    // Opening
    // =========================================================================

    /// Open a primary chain for an `OPEN_LONG` or `OPEN_SHORT` decision.
    ///
    /// Sets leverage, places the entry, and records the chain only once the
    /// exchange accepted the entry. A filled entry gets its protection placed
    /// before this returns.
    pub async fn open_chain(
        &self,
        decision: &TradeDecision,
        mode: TradingMode,
    ) -> Result<ChainId, ChainManagerError> {
        let side = match decision.action {
            DecisionAction::OpenLong => PositionSide::Long,
            DecisionAction::OpenShort => PositionSide::Short,
            action => {
                return Err(ChainManagerError::UnsupportedAction {
                    action,
                    operation: "open a chain",
                });
            }
        };
        let symbol = &decision.symbol;
        let filters = self.config.filters_for(symbol);

        self.exchange
            .set_leverage(symbol, decision.proposed_leverage)
            .await?;
        let mark = self.exchange.mark_price(symbol).await?;

        let (order_type, price) = entry_order(side, decision.entry_zone, mark);
        let price = price.map(|p| filters.round_price(p));
        let reference = price.unwrap_or(mark);
        let quantity = filters.round_quantity(notional_quantity(
            decision.proposed_size_usd,
            decision.proposed_leverage,
            reference,
        ));
        if quantity <= Decimal::ZERO {
            return Err(ChainManagerError::QuantityTooSmall {
                symbol: symbol.clone(),
            });
        }

        self.place_entry(EntryPlan {
            kind: ChainKind::Primary,
            symbol: symbol.clone(),
            side,
            mode,
            order_type,
            price,
            quantity,
            targets: ProtectionTargets {
                stop_loss_percent: decision.stop_loss_percent,
                take_profit_percent: decision.take_profit_percent,
            },
        })
        .await
    }

    /// Open a hedge sub-chain against `parent_id`.
    pub async fn open_hedge(&self, parent_id: &ChainId) -> Result<ChainId, ChainManagerError> {
        self.open_hedge_capped(parent_id, None).await
    }

    /// Open a hedge for an opposite-side decision. The hedge is sized by
    /// `size_ratio` but never above the decision's (clamped) notional.
    pub async fn open_hedge_for(
        &self,
        parent_id: &ChainId,
        decision: &TradeDecision,
    ) -> Result<ChainId, ChainManagerError> {
        self.open_hedge_capped(parent_id, Some(decision)).await
    }

    async fn open_hedge_capped(
        &self,
        parent_id: &ChainId,
        cap: Option<&TradeDecision>,
    ) -> Result<ChainId, ChainManagerError> {
        let hedge = &self.config.hedge;
        if !hedge.enabled {
            return Err(ChainManagerError::HedgeRefused("hedging disabled".to_string()));
        }
        let handle = self
            .registry
            .get(parent_id)
            .ok_or_else(|| ChainManagerError::ChainNotFound(parent_id.clone()))?;
        let mut parent = handle.lock().await;

        if *parent.kind() != ChainKind::Primary {
            return Err(ChainManagerError::HedgeRefused(
                "cannot hedge a hedge".to_string(),
            ));
        }
        if !parent.status().is_open() {
            return Err(ChainManagerError::ChainClosed(parent_id.clone()));
        }
        let live = self.registry.hedges_of(parent_id).len();
        if live >= hedge.max_simultaneous {
            return Err(ChainManagerError::HedgeRefused(format!(
                "{live} of {} hedges already open",
                hedge.max_simultaneous
            )));
        }

        let filters = self.config.filters_for(parent.symbol());
        let mut quantity = filters.round_quantity(parent.open_quantity() * hedge.size_ratio);
        if let Some(decision) = cap {
            let mark = self.exchange.mark_price(parent.symbol()).await?;
            let allowed = filters.round_quantity(notional_quantity(
                decision.proposed_size_usd,
                decision.proposed_leverage,
                mark,
            ));
            if allowed < quantity {
                debug!(
                    chain_id = %parent_id,
                    ratio_quantity = %quantity,
                    allowed = %allowed,
                    "Hedge capped at decision size"
                );
                quantity = allowed;
            }
        }
        if quantity <= Decimal::ZERO {
            return Err(ChainManagerError::QuantityTooSmall {
                symbol: parent.symbol().clone(),
            });
        }

        let hedge_id = self
            .place_entry(EntryPlan {
                kind: ChainKind::Hedge {
                    parent: parent_id.clone(),
                },
                symbol: parent.symbol().clone(),
                side: parent.position_side().opposite(),
                mode: parent.mode(),
                order_type: LegOrderType::Market,
                price: None,
                quantity,
                targets: ProtectionTargets {
                    stop_loss_percent: Some(hedge.stop_loss_percent),
                    take_profit_percent: hedge.take_profit_percent,
                },
            })
            .await?;

        parent.record_hedge_opened(hedge_id.clone(), Utc::now());
        self.settle(&mut parent).await;
        Ok(hedge_id)
    }

    async fn place_entry(&self, plan: EntryPlan) -> Result<ChainId, ChainManagerError> {
        let now = Utc::now();
        let chain_id = self.ids.next_chain_id_at(plan.mode, now);
        let role = plan.kind.entry_role();
        let mut entry = OrderLeg::new(NewLeg {
            leg_id: leg_token(&chain_id, role, 1),
            chain_id: chain_id.clone(),
            role,
            order_type: plan.order_type,
            side: plan.side.entry_side(),
            price: plan.price,
            stop_price: None,
            quantity: plan.quantity,
            created_at: now,
        });
        let request = PlaceOrderRequest::for_leg(&entry, &plan.symbol, plan.side)
            .ok_or_else(|| ChainManagerError::InvalidLeg(entry.leg_id().clone()))?;

        let state = match self.exchange.place_order(request).await {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    chain_id = %chain_id,
                    symbol = %plan.symbol,
                    error = %e,
                    "Entry placement failed, no chain created"
                );
                return Err(e.into());
            }
        };
        if matches!(state.status, LegStatus::Rejected | LegStatus::Cancelled)
            && state.filled_quantity.is_zero()
        {
            return Err(ChainManagerError::EntryNotAccepted {
                leg_id: entry.leg_id().clone(),
                status: state.status,
            });
        }
        entry
            .apply(leg_update(&state))
            .map_err(|e| ChainManagerError::Chain(e.into()))?;

        let chain = Chain::open(OpenChain {
            chain_id: chain_id.clone(),
            symbol: plan.symbol.clone(),
            position_side: plan.side,
            kind: plan.kind,
            mode: plan.mode,
            policy: self.config.policy,
            targets: plan.targets,
            entry,
            opened_at: now,
        })?;
        let handle = self.registry.insert(chain)?;
        let mut chain = handle.lock().await;
        info!(
            chain_id = %chain_id,
            symbol = %plan.symbol,
            side = %plan.side,
            quantity = %plan.quantity,
            status = %state.status,
            "Chain opened"
        );

        if chain.needs_protection() {
            self.ensure_protection(&mut chain).await;
        }
        self.settle(&mut chain).await;
        Ok(chain_id)
    }

    // =========================================================================
    // Averaging
    // =========================================================================

    /// Add a cost-averaging leg for an `AVERAGE_DOWN` or `AVERAGE_UP` decision.
    ///
    /// Refused unless the strategy allows averaging, the chain is under its
    /// entry allowance, the cooldown since the last averaging has passed, and
    /// price moved against the position by the configured minimum.
    pub async fn add_averaging(
        &self,
        decision: &TradeDecision,
    ) -> Result<ClientOrderId, ChainManagerError> {
        let side = match decision.action {
            DecisionAction::AverageDown => PositionSide::Long,
            DecisionAction::AverageUp => PositionSide::Short,
            action => {
                return Err(ChainManagerError::UnsupportedAction {
                    action,
                    operation: "average a position",
                });
            }
        };
        let entry = self
            .registry
            .primary_for(&decision.symbol, side)
            .ok_or_else(|| ChainManagerError::NoOpenChain {
                symbol: decision.symbol.clone(),
                side,
            })?;
        let handle = self
            .registry
            .get(&entry.chain_id)
            .ok_or_else(|| ChainManagerError::ChainNotFound(entry.chain_id.clone()))?;
        let mut chain = handle.lock().await;

        if !chain.status().is_open() {
            return Err(ChainManagerError::ChainClosed(entry.chain_id));
        }
        if !decision.averaging_allowed {
            return Err(ChainManagerError::AveragingRefused(
                "strategy does not allow averaging".to_string(),
            ));
        }
        let entries = u32::try_from(chain.entry_count()).unwrap_or(u32::MAX);
        let allowance = &self.config.averaging;
        if entries >= allowance.max_entries_per_position {
            return Err(ChainManagerError::AveragingRefused(format!(
                "{entries} of {} entries used",
                allowance.max_entries_per_position
            )));
        }
        if entries.saturating_sub(1) >= decision.max_average_count {
            return Err(ChainManagerError::AveragingRefused(format!(
                "decision allows {} averages",
                decision.max_average_count
            )));
        }
        if let Some(live) = chain.live_entry() {
            return Err(ChainManagerError::AveragingRefused(format!(
                "entry {} still working",
                live.leg_id()
            )));
        }
        let now = Utc::now();
        if let Some(last) = chain.last_averaged_at() {
            let elapsed = (now - last).to_std().unwrap_or_default();
            if elapsed < allowance.cooldown {
                return Err(ChainManagerError::AveragingRefused(format!(
                    "cooldown, {}s left",
                    (allowance.cooldown - elapsed).as_secs()
                )));
            }
        }

        let average = chain
            .average_entry_price()
            .ok_or_else(|| ChainManagerError::AveragingRefused("no filled entry".to_string()))?;
        let mark = self.exchange.mark_price(chain.symbol()).await?;
        let filters = self.config.filters_for(chain.symbol());
        let (order_type, price) = entry_order(side, decision.entry_zone, mark);
        let price = price.map(|p| filters.round_price(p));
        let reference = price.unwrap_or(mark);

        let adverse = adverse_move_pct(side, average, reference);
        if adverse < allowance.min_price_improve_pct {
            return Err(ChainManagerError::AveragingRefused(format!(
                "price moved {adverse:.2}% against the position, {}% required",
                allowance.min_price_improve_pct
            )));
        }

        let quantity = filters.round_quantity(notional_quantity(
            decision.proposed_size_usd,
            decision.proposed_leverage,
            reference,
        ));
        if quantity <= Decimal::ZERO {
            return Err(ChainManagerError::QuantityTooSmall {
                symbol: decision.symbol.clone(),
            });
        }

        let role = LegRole::Dca(u8::try_from(entries).unwrap_or(u8::MAX));
        let leg = self.new_leg(&chain, role, order_type, side.entry_side(), price, None, quantity);
        let leg_id = leg.leg_id().clone();
        info!(
            chain_id = %chain.chain_id(),
            leg_id = %leg_id,
            adverse_pct = %adverse.round_dp(2),
            quantity = %quantity,
            "Adding averaging leg"
        );
        let result = self.issue_leg(&mut chain, leg).await;
        self.settle(&mut chain).await;
        result.map(|()| leg_id)
    }

    // =========================================================================
    // Trailing
    // =========================================================================

    /// Move the protective stop to `stop_price` if that is tighter.
    ///
    /// Returns false when the stop is unconfirmed or the price would loosen
    /// it. The replacement is placed before the old stop is cancelled.
    pub async fn update_trailing_stop(
        &self,
        chain_id: &ChainId,
        stop_price: Decimal,
    ) -> Result<bool, ChainManagerError> {
        let handle = self
            .registry
            .get(chain_id)
            .ok_or_else(|| ChainManagerError::ChainNotFound(chain_id.clone()))?;
        let mut chain = handle.lock().await;
        let result = self.tighten_stop(&mut chain, stop_price).await;
        self.settle(&mut chain).await;
        result
    }

    // =========================================================================
    // Closing
    // =========================================================================

    /// Close a chain: withdraw a working entry and exit the open quantity at
    /// market. Remaining exit legs are cancelled once the position is flat.
    pub async fn close_chain(&self, chain_id: &ChainId) -> Result<(), ChainManagerError> {
        let handle = self
            .registry
            .get(chain_id)
            .ok_or_else(|| ChainManagerError::ChainNotFound(chain_id.clone()))?;
        let mut chain = handle.lock().await;
        let result = self.close_locked(&mut chain).await;
        self.settle(&mut chain).await;
        result
    }

    /// Withdraw a chain whose entry has not filled; closes it otherwise.
    pub async fn cancel_chain(&self, chain_id: &ChainId) -> Result<(), ChainManagerError> {
        let handle = self
            .registry
            .get(chain_id)
            .ok_or_else(|| ChainManagerError::ChainNotFound(chain_id.clone()))?;
        let mut chain = handle.lock().await;
        let result = if chain.entry_filled_quantity().is_zero() {
            match chain.live_entry().cloned() {
                Some(entry) => self.cancel_leg(&mut chain, &entry).await,
                None => Ok(()),
            }
        } else {
            self.close_locked(&mut chain).await
        };
        self.settle(&mut chain).await;
        result
    }

    /// Close every chain on `symbol`, hedges included.
    pub async fn close_symbol(&self, symbol: &Symbol) -> Vec<(ChainId, Result<(), ChainManagerError>)> {
        let mut results = Vec::new();
        for entry in self.registry.entries_for_symbol(symbol) {
            let result = self.close_chain(&entry.chain_id).await;
            results.push((entry.chain_id, result));
        }
        results
    }

    async fn close_locked(&self, chain: &mut Chain) -> Result<(), ChainManagerError> {
        if chain.status().is_closed() {
            return Ok(());
        }
        if let Some(entry) = chain.live_entry().cloned() {
            self.cancel_leg(chain, &entry).await?;
        }
        let open = chain.open_quantity();
        if open > Decimal::ZERO {
            let working_close = chain
                .working_legs()
                .any(|l| l.role() == LegRole::Close);
            if !working_close {
                info!(
                    chain_id = %chain.chain_id(),
                    quantity = %open,
                    "Closing chain at market"
                );
                self.place_close(chain, open).await?;
            }
        }
        self.cancel_dangling_exits(chain).await;
        Ok(())
    }

    pub(crate) async fn place_close(
        &self,
        chain: &mut Chain,
        quantity: Decimal,
    ) -> Result<(), ChainManagerError> {
        let leg = self.new_leg(
            chain,
            LegRole::Close,
            LegOrderType::Market,
            chain.position_side().exit_side(),
            None,
            None,
            quantity,
        );
        self.issue_leg(chain, leg).await
    }

    // =========================================================================
    // Leg plumbing
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    fn new_leg(
        &self,
        chain: &Chain,
        role: LegRole,
        order_type: LegOrderType,
        side: OrderSide,
        price: Option<Decimal>,
        stop_price: Option<Decimal>,
        quantity: Decimal,
    ) -> OrderLeg {
        let version = chain.next_version(role);
        OrderLeg::new(NewLeg {
            leg_id: leg_token(chain.chain_id(), role, version),
            chain_id: chain.chain_id().clone(),
            role,
            order_type,
            side,
            price,
            stop_price,
            quantity,
            created_at: Utc::now(),
        })
    }

    /// Record a leg and send it.
    async fn issue_leg(&self, chain: &mut Chain, leg: OrderLeg) -> Result<(), ChainManagerError> {
        let leg_id = leg.leg_id().clone();
        let request = PlaceOrderRequest::for_leg(&leg, chain.symbol(), chain.position_side())
            .ok_or_else(|| ChainManagerError::InvalidLeg(leg_id.clone()))?;
        chain.add_leg(leg, Utc::now())?;
        self.submit(chain, &leg_id, request).await
    }

    /// Send a recorded leg. Rejections are applied to the leg; any other
    /// failure leaves it `Pending` for the next reconcile.
    async fn submit(
        &self,
        chain: &mut Chain,
        leg_id: &ClientOrderId,
        request: PlaceOrderRequest,
    ) -> Result<(), ChainManagerError> {
        match self.exchange.place_order(request).await {
            Ok(state) => {
                self.apply_state(chain, leg_id, &state);
                Ok(())
            }
            Err(e @ ExchangeError::Rejected { .. }) => {
                warn!(chain_id = %chain.chain_id(), leg_id = %leg_id, error = %e, "Leg rejected");
                let update = LegUpdate::status_only(LegStatus::Rejected, Decimal::ZERO, Utc::now());
                if let Err(apply) = chain.apply_update(leg_id, update) {
                    warn!(leg_id = %leg_id, error = %apply, "Could not record rejection");
                }
                Err(e.into())
            }
            Err(e) => {
                warn!(
                    chain_id = %chain.chain_id(),
                    leg_id = %leg_id,
                    error = %e,
                    "Leg placement outcome unknown, will re-check by token"
                );
                Err(e.into())
            }
        }
    }

    /// Cancel one leg. A leg the exchange never saw is withdrawn locally.
    async fn cancel_leg(&self, chain: &mut Chain, leg: &OrderLeg) -> Result<(), ChainManagerError> {
        match self
            .exchange
            .cancel_order(chain.symbol(), &OrderRef::for_leg(leg))
            .await
        {
            Ok(state) => {
                self.apply_state(chain, leg.leg_id(), &state);
                Ok(())
            }
            Err(ExchangeError::NotFound { .. }) if !leg.is_confirmed() => {
                let update = LegUpdate::status_only(
                    LegStatus::Cancelled,
                    leg.filled_quantity(),
                    Utc::now(),
                );
                chain.apply_update(leg.leg_id(), update)?;
                Ok(())
            }
            Err(e) => {
                warn!(leg_id = %leg.leg_id(), error = %e, "Cancel failed");
                Err(e.into())
            }
        }
    }

    /// Cancel exit legs still working after the position went flat.
    async fn cancel_dangling_exits(&self, chain: &mut Chain) -> usize {
        let dangling: Vec<OrderLeg> = chain.dangling_exit_legs().into_iter().cloned().collect();
        let mut cancelled = 0;
        for leg in dangling {
            if self.cancel_leg(chain, &leg).await.is_ok() {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Apply an observed order state. Returns true if the leg changed.
    fn apply_state(&self, chain: &mut Chain, leg_id: &ClientOrderId, state: &OrderState) -> bool {
        match chain.apply_update(leg_id, leg_update(state)) {
            Ok(transition) => {
                if !transition.is_noop() {
                    debug!(
                        chain_id = %chain.chain_id(),
                        leg_id = %leg_id,
                        from = %transition.from,
                        to = %transition.to,
                        fill_delta = %transition.fill_delta,
                        "Leg transition"
                    );
                }
                !transition.is_noop()
            }
            Err(e) => {
                warn!(chain_id = %chain.chain_id(), leg_id = %leg_id, error = %e, "Ignoring exchange update");
                false
            }
        }
    }

    /// Publish drained events and retire the chain if it is done.
    async fn settle(&self, chain: &mut Chain) -> bool {
        let events = chain.take_events();
        for event in &events {
            metrics::record_chain_event(event.event_type());
        }
        if !events.is_empty() {
            if let Err(e) = self.publisher.publish_chain_events(events).await {
                warn!(chain_id = %chain.chain_id(), error = %e, "Event publish failed");
            }
        }
        if chain.is_retired() && self.registry.remove(chain.chain_id()) {
            info!(
                chain_id = %chain.chain_id(),
                status = %chain.status(),
                "Chain retired"
            );
            return true;
        }
        false
    }
}

/// Market entry, or a limit at the near edge of the zone when price is
/// outside it on the unfavourable side.
fn entry_order(
    side: PositionSide,
    zone: Option<EntryZone>,
    mark: Decimal,
) -> (LegOrderType, Option<Decimal>) {
    match (side, zone) {
        (PositionSide::Long, Some(zone)) if mark > zone.high => {
            (LegOrderType::Limit, Some(zone.high))
        }
        (PositionSide::Short, Some(zone)) if mark < zone.low => {
            (LegOrderType::Limit, Some(zone.low))
        }
        _ => (LegOrderType::Market, None),
    }
}

/// Base quantity for a margin size at a leverage.
fn notional_quantity(size_usd: Decimal, leverage: u32, price: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    size_usd * Decimal::from(leverage.max(1)) / price
}

/// Percent move from `average` to `price` against the position.
fn adverse_move_pct(side: PositionSide, average: Decimal, price: Decimal) -> Decimal {
    if average.is_zero() {
        return Decimal::ZERO;
    }
    let moved = match side {
        PositionSide::Long => average - price,
        PositionSide::Short => price - average,
    };
    moved / average * HUNDRED
}

/// Price `pct` percent from `base` in the position's favour.
fn favourable(side: PositionSide, base: Decimal, pct: Decimal) -> Decimal {
    match side {
        PositionSide::Long => base * (HUNDRED + pct) / HUNDRED,
        PositionSide::Short => base * (HUNDRED - pct) / HUNDRED,
    }
}

/// Price `pct` percent from `base` against the position.
fn adverse(side: PositionSide, base: Decimal, pct: Decimal) -> Decimal {
    favourable(side, base, -pct)
}

fn leg_update(state: &OrderState) -> LegUpdate {
    LegUpdate {
        status: state.status,
        exchange_order_id: state.exchange_order_id.clone(),
        filled_quantity: state.filled_quantity,
        avg_fill_price: state.avg_fill_price,
        observed_at: Utc::now(),
    }
}
