//! Chain aggregate: one position's legs from entry to flat.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::leg::{LegTransition, LegUpdate, OrderLeg};
use crate::domain::order_chain::errors::ChainError;
use crate::domain::order_chain::events::{ChainEvent, ChainEventKind};
use crate::domain::order_chain::value_objects::{
    ChainStatus, LegRole, LegStatus, PositionSide, TradingMode,
};
use crate::domain::shared::{ChainId, ClientOrderId, Symbol};

/// Whether a chain is a primary position or a hedge against one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainKind {
    /// Position opened from a trade decision.
    Primary,
    /// Opposite-side sub-chain linked to its parent.
    Hedge {
        /// Originating chain.
        parent: ChainId,
    },
}

impl ChainKind {
    /// Kind name for logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Hedge { .. } => "hedge",
        }
    }

    /// Parent chain of a hedge.
    #[must_use]
    pub const fn parent(&self) -> Option<&ChainId> {
        match self {
            Self::Primary => None,
            Self::Hedge { parent } => Some(parent),
        }
    }

    /// Role of the opening leg.
    #[must_use]
    pub const fn entry_role(&self) -> LegRole {
        match self {
            Self::Primary => LegRole::Entry,
            Self::Hedge { .. } => LegRole::Hedge,
        }
    }

    /// Role of the protective stop.
    #[must_use]
    pub const fn stop_role(&self) -> LegRole {
        match self {
            Self::Primary => LegRole::StopLoss,
            Self::Hedge { .. } => LegRole::HedgeStopLoss,
        }
    }

    /// Role of take-profit step `k` (1-based).
    #[must_use]
    pub const fn take_profit_role(&self, k: u8) -> LegRole {
        match self {
            Self::Primary => LegRole::TakeProfit(k),
            Self::Hedge { .. } => LegRole::HedgeTakeProfit,
        }
    }

    const fn allows(&self, role: LegRole) -> bool {
        match self {
            Self::Primary => !role.is_hedge_role(),
            Self::Hedge { .. } => matches!(
                role,
                LegRole::Hedge
                    | LegRole::HedgeStopLoss
                    | LegRole::HedgeTakeProfit
                    | LegRole::Trailing
                    | LegRole::Close
            ),
        }
    }
}

/// Protection status of the open position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProtectionState {
    /// No filled exposure yet.
    Pending,
    /// A confirmed protective stop is working.
    Protected,
    /// Exposure without a working stop.
    Unprotected {
        /// First failure time.
        since: DateTime<Utc>,
        /// Consecutive failed attempts.
        failures: u32,
        /// Last failure reason.
        reason: String,
    },
    /// Protection turned off by configuration.
    Disabled,
}

impl ProtectionState {
    /// Returns true while exposure lacks a working stop.
    #[must_use]
    pub const fn is_unprotected(&self) -> bool {
        matches!(self, Self::Unprotected { .. })
    }
}

/// Per-chain policy fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPolicy {
    /// Maintain a protective stop for open exposure.
    pub protection_enabled: bool,
    /// Maximum take-profit legs.
    pub max_take_profits: u8,
    /// Entry fill ratio at which protection is placed.
    pub min_fill_ratio: Decimal,
}

impl Default for ChainPolicy {
    fn default() -> Self {
        Self {
            protection_enabled: true,
            max_take_profits: 3,
            min_fill_ratio: dec!(0.5),
        }
    }
}

/// Stop and target distances carried over from the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProtectionTargets {
    /// Stop distance in percent of average entry.
    pub stop_loss_percent: Option<Decimal>,
    /// Take-profit distance in percent of average entry.
    pub take_profit_percent: Option<Decimal>,
}

/// Parameters for [`Chain::open`].
#[derive(Debug, Clone)]
pub struct OpenChain {
    /// Chain id, the base of every leg token.
    pub chain_id: ChainId,
    /// Traded symbol.
    pub symbol: Symbol,
    /// Position direction.
    pub position_side: PositionSide,
    /// Primary or hedge.
    pub kind: ChainKind,
    /// Trading mode.
    pub mode: TradingMode,
    /// Policy.
    pub policy: ChainPolicy,
    /// Stop and target distances.
    pub targets: ProtectionTargets,
    /// Entry leg, already accepted by the exchange.
    pub entry: OrderLeg,
    /// Creation time.
    pub opened_at: DateTime<Utc>,
}

/// The protective stop as seen from the chain.
#[derive(Debug, Clone, Copy)]
pub enum StopState<'a> {
    /// No non-terminal stop leg.
    Missing,
    /// Placement issued but never acknowledged.
    Unconfirmed(&'a OrderLeg),
    /// Stop known to be working on the exchange.
    Confirmed(&'a OrderLeg),
}

/// A position's lifecycle.
///
/// Legs are ordered by creation. All mutation goes through methods that keep
/// the chain invariants and record [`ChainEvent`]s, drained with
/// [`Chain::take_events`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    chain_id: ChainId,
    symbol: Symbol,
    position_side: PositionSide,
    kind: ChainKind,
    mode: TradingMode,
    policy: ChainPolicy,
    targets: ProtectionTargets,
    legs: Vec<OrderLeg>,
    status: ChainStatus,
    protection: ProtectionState,
    best_price: Option<Decimal>,
    last_averaged_at: Option<DateTime<Utc>>,
    opened_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<ChainEvent>,
}

impl Chain {
    /// Record a chain around an accepted entry leg.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::RoleNotAllowed`] if the leg is not the opening
    /// role for this kind of chain.
    pub fn open(params: OpenChain) -> Result<Self, ChainError> {
        let entry_role = params.kind.entry_role();
        if params.entry.role() != entry_role {
            return Err(ChainError::RoleNotAllowed {
                role: params.entry.role(),
                kind: params.kind.name(),
            });
        }

        let protection = if params.policy.protection_enabled {
            ProtectionState::Pending
        } else {
            ProtectionState::Disabled
        };

        let mut chain = Self {
            chain_id: params.chain_id,
            symbol: params.symbol,
            position_side: params.position_side,
            kind: params.kind,
            mode: params.mode,
            policy: params.policy,
            targets: params.targets,
            legs: Vec::new(),
            status: ChainStatus::Active,
            protection,
            best_price: None,
            last_averaged_at: None,
            opened_at: params.opened_at,
            updated_at: params.opened_at,
            events: Vec::new(),
        };

        let entry = params.entry;
        chain.push_event(
            params.opened_at,
            ChainEventKind::ChainCreated {
                mode: chain.mode,
                position_side: chain.position_side,
                parent: chain.kind.parent().cloned(),
                entry_leg_id: entry.leg_id().clone(),
            },
        );
        if entry.status() != LegStatus::Pending {
            chain.emit_placed(&entry, params.opened_at);
        }
        if entry.filled_quantity() > Decimal::ZERO {
            chain.emit_fill(&entry, params.opened_at);
        }
        chain.legs.push(entry);
        chain.recompute_status(params.opened_at);
        Ok(chain)
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Chain id.
    #[must_use]
    pub const fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    /// Traded symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Position direction.
    #[must_use]
    pub const fn position_side(&self) -> PositionSide {
        self.position_side
    }

    /// Primary or hedge.
    #[must_use]
    pub const fn kind(&self) -> &ChainKind {
        &self.kind
    }

    /// Trading mode.
    #[must_use]
    pub const fn mode(&self) -> TradingMode {
        self.mode
    }

    /// Policy.
    #[must_use]
    pub const fn policy(&self) -> &ChainPolicy {
        &self.policy
    }

    /// Stop and target distances.
    #[must_use]
    pub const fn targets(&self) -> &ProtectionTargets {
        &self.targets
    }

    /// All legs in creation order.
    #[must_use]
    pub fn legs(&self) -> &[OrderLeg] {
        &self.legs
    }

    /// Leg by client order id.
    #[must_use]
    pub fn leg(&self, leg_id: &ClientOrderId) -> Option<&OrderLeg> {
        self.legs.iter().find(|l| l.leg_id() == leg_id)
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> ChainStatus {
        self.status
    }

    /// Protection status.
    #[must_use]
    pub const fn protection(&self) -> &ProtectionState {
        &self.protection
    }

    /// Most favourable price observed since opening.
    #[must_use]
    pub const fn best_price(&self) -> Option<Decimal> {
        self.best_price
    }

    /// Time of the last averaging placement.
    #[must_use]
    pub const fn last_averaged_at(&self) -> Option<DateTime<Utc>> {
        self.last_averaged_at
    }

    /// Creation time.
    #[must_use]
    pub const fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Last change time.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // =========================================================================
    // Quantities
    // =========================================================================

    /// Filled quantity across entry-like legs.
    #[must_use]
    pub fn entry_filled_quantity(&self) -> Decimal {
        self.legs
            .iter()
            .filter(|l| l.role().is_entry_like())
            .map(OrderLeg::filled_quantity)
            .sum()
    }

    /// Filled quantity across exit legs.
    #[must_use]
    pub fn exit_filled_quantity(&self) -> Decimal {
        self.legs
            .iter()
            .filter(|l| l.role().is_exit())
            .map(OrderLeg::filled_quantity)
            .sum()
    }

    /// Net exposure still open.
    #[must_use]
    pub fn open_quantity(&self) -> Decimal {
        (self.entry_filled_quantity() - self.exit_filled_quantity()).max(Decimal::ZERO)
    }

    /// Entry-like legs that received any fill.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.legs
            .iter()
            .filter(|l| l.role().is_entry_like() && l.filled_quantity() > Decimal::ZERO)
            .count()
    }

    /// Quantity-weighted average fill price of entry-like legs.
    #[must_use]
    pub fn average_entry_price(&self) -> Option<Decimal> {
        let (notional, qty) = self
            .legs
            .iter()
            .filter(|l| l.role().is_entry_like())
            .filter_map(|l| l.avg_fill_price().map(|p| (p * l.filled_quantity(), l.filled_quantity())))
            .fold((Decimal::ZERO, Decimal::ZERO), |(n, q), (ln, lq)| (n + ln, q + lq));
        if qty.is_zero() {
            None
        } else {
            Some(notional / qty)
        }
    }

    /// The working entry-like leg, if any.
    #[must_use]
    pub fn live_entry(&self) -> Option<&OrderLeg> {
        self.legs
            .iter()
            .find(|l| l.role().is_entry_like() && !l.status().is_terminal())
    }

    /// Legs that still need exchange reconciliation.
    pub fn working_legs(&self) -> impl Iterator<Item = &OrderLeg> {
        self.legs.iter().filter(|l| !l.status().is_terminal())
    }

    // =========================================================================
    // Leg management
    // =========================================================================

    /// Next version number for a role (1 for the first leg of that role).
    #[must_use]
    pub fn next_version(&self, role: LegRole) -> u32 {
        let existing = self.legs.iter().filter(|l| l.role() == role).count();
        u32::try_from(existing).unwrap_or(u32::MAX).saturating_add(1)
    }

    /// Add a leg before it is sent to the exchange.
    ///
    /// # Errors
    ///
    /// Rejects duplicates, roles foreign to the chain kind, a second working
    /// entry, a full take-profit ladder, and any addition to a closed chain.
    pub fn add_leg(&mut self, leg: OrderLeg, now: DateTime<Utc>) -> Result<(), ChainError> {
        if self.status.is_closed() {
            return Err(ChainError::Closed {
                chain_id: self.chain_id.to_string(),
                status: self.status,
            });
        }
        if self.leg(leg.leg_id()).is_some() {
            return Err(ChainError::DuplicateLeg {
                leg_id: leg.leg_id().to_string(),
            });
        }
        if !self.kind.allows(leg.role()) {
            return Err(ChainError::RoleNotAllowed {
                role: leg.role(),
                kind: self.kind.name(),
            });
        }
        if leg.role().is_entry_like() {
            if let Some(live) = self.live_entry() {
                return Err(ChainError::EntryAlreadyActive {
                    leg_id: live.leg_id().to_string(),
                });
            }
        }
        if leg.role().is_take_profit() {
            let active_tps = self
                .legs
                .iter()
                .filter(|l| {
                    l.role().is_take_profit()
                        && !matches!(l.status(), LegStatus::Cancelled | LegStatus::Rejected)
                })
                .count();
            if active_tps >= usize::from(self.policy.max_take_profits) {
                return Err(ChainError::TakeProfitLimit {
                    max: self.policy.max_take_profits,
                });
            }
        }

        if matches!(leg.role(), LegRole::Dca(_) | LegRole::Rebuy) {
            self.last_averaged_at = Some(now);
        }
        self.legs.push(leg);
        self.updated_at = now;
        Ok(())
    }

    /// Apply an exchange observation to one leg.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::LegNotFound`] or the leg's own rejection.
    pub fn apply_update(
        &mut self,
        leg_id: &ClientOrderId,
        update: LegUpdate,
    ) -> Result<LegTransition, ChainError> {
        let now = update.observed_at;
        let idx = self
            .legs
            .iter()
            .position(|l| l.leg_id() == leg_id)
            .ok_or_else(|| ChainError::LegNotFound {
                leg_id: leg_id.to_string(),
            })?;

        let transition = self.legs[idx].apply(update)?;
        if transition.is_noop() {
            return Ok(transition);
        }

        let leg = self.legs[idx].clone();
        if transition.from == LegStatus::Pending && transition.to != LegStatus::Rejected {
            self.emit_placed(&leg, now);
        }
        match transition.to {
            LegStatus::Rejected => self.push_event(
                now,
                ChainEventKind::LegRejected {
                    leg_id: leg.leg_id().clone(),
                    role: leg.role(),
                },
            ),
            LegStatus::Cancelled => self.push_event(
                now,
                ChainEventKind::LegCancelled {
                    leg_id: leg.leg_id().clone(),
                    role: leg.role(),
                    filled_quantity: leg.filled_quantity(),
                },
            ),
            _ if transition.fill_delta > Decimal::ZERO => self.emit_fill(&leg, now),
            _ => {}
        }

        self.updated_at = now;
        self.recompute_status(now);
        Ok(transition)
    }

    // =========================================================================
    // Protection
    // =========================================================================

    /// State of the protective stop.
    #[must_use]
    pub fn stop_state(&self) -> StopState<'_> {
        let stop_role = self.kind.stop_role();
        match self
            .legs
            .iter()
            .rev()
            .find(|l| l.role() == stop_role && !l.status().is_terminal())
        {
            None => StopState::Missing,
            Some(leg) if leg.is_confirmed() => StopState::Confirmed(leg),
            Some(leg) => StopState::Unconfirmed(leg),
        }
    }

    /// Whether the chain currently owes a protective stop.
    ///
    /// Protection is owed once the entry reached the minimum fill ratio, or
    /// stopped working with some quantity filled.
    #[must_use]
    pub fn needs_protection(&self) -> bool {
        if !self.policy.protection_enabled || !self.status.is_open() {
            return false;
        }
        if self.open_quantity().is_zero() {
            return false;
        }
        match self.live_entry() {
            None => true,
            Some(entry) if entry.quantity().is_zero() => false,
            Some(entry) => {
                let ratio = self.entry_filled_quantity() / entry.quantity();
                ratio >= self.policy.min_fill_ratio || self.entry_count() > 1
            }
        }
    }

    /// Returns true if a working stop exists or none is owed.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        !self.needs_protection() || !matches!(self.stop_state(), StopState::Missing)
    }

    /// Record a failed attempt to place protection.
    pub fn record_protection_failure(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        let reason = reason.into();
        let (since, failures) = match &self.protection {
            ProtectionState::Unprotected {
                since, failures, ..
            } => (*since, failures.saturating_add(1)),
            _ => (now, 1),
        };
        self.protection = ProtectionState::Unprotected {
            since,
            failures,
            reason: reason.clone(),
        };
        self.updated_at = now;
        self.push_event(now, ChainEventKind::ProtectionFailed { failures, reason });
    }

    /// Record that a confirmed stop is working.
    pub fn record_protection_restored(&mut self, now: DateTime<Utc>) {
        if matches!(self.protection, ProtectionState::Disabled) {
            return;
        }
        let StopState::Confirmed(stop) = self.stop_state() else {
            return;
        };
        let stop_leg_id = stop.leg_id().clone();
        let was_unprotected = self.protection.is_unprotected();
        self.protection = ProtectionState::Protected;
        if was_unprotected {
            self.updated_at = now;
            self.push_event(now, ChainEventKind::ProtectionRestored { stop_leg_id });
        }
    }

    /// Working exit legs left over once the position is flat.
    #[must_use]
    pub fn dangling_exit_legs(&self) -> Vec<&OrderLeg> {
        if self.status != ChainStatus::Completed {
            return Vec::new();
        }
        self.legs
            .iter()
            .filter(|l| l.role().is_exit() && !l.status().is_terminal())
            .collect()
    }

    // =========================================================================
    // Trailing
    // =========================================================================

    /// Track the most favourable price. Returns true if it improved.
    pub fn observe_price(&mut self, price: Decimal) -> bool {
        let improved = match (self.best_price, self.position_side) {
            (None, _) => true,
            (Some(best), PositionSide::Long) => price > best,
            (Some(best), PositionSide::Short) => price < best,
        };
        if improved {
            self.best_price = Some(price);
        }
        improved
    }

    /// Whether `candidate` is strictly tighter than `current` for this side.
    #[must_use]
    pub fn is_tighter(&self, candidate: Decimal, current: Decimal) -> bool {
        match self.position_side {
            PositionSide::Long => candidate > current,
            PositionSide::Short => candidate < current,
        }
    }

    /// Record a stop replaced at a tighter price.
    pub fn record_stop_tightened(
        &mut self,
        previous_leg_id: ClientOrderId,
        leg_id: ClientOrderId,
        previous_stop: Decimal,
        stop_price: Decimal,
        now: DateTime<Utc>,
    ) {
        self.updated_at = now;
        self.push_event(
            now,
            ChainEventKind::StopTightened {
                previous_leg_id,
                leg_id,
                previous_stop,
                stop_price,
            },
        );
    }

    /// Record a hedge opened against this chain.
    pub fn record_hedge_opened(&mut self, hedge_chain_id: ChainId, now: DateTime<Utc>) {
        self.updated_at = now;
        self.push_event(now, ChainEventKind::HedgeOpened { hedge_chain_id });
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Closed and nothing left working on the exchange.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.status.is_closed() && self.legs.iter().all(|l| l.status().is_terminal())
    }

    /// Drain accumulated events.
    pub fn take_events(&mut self) -> Vec<ChainEvent> {
        std::mem::take(&mut self.events)
    }

    /// Events recorded but not yet drained.
    #[must_use]
    pub fn pending_events(&self) -> &[ChainEvent] {
        &self.events
    }

    fn recompute_status(&mut self, now: DateTime<Utc>) {
        if self.status.is_closed() {
            return;
        }
        let entry = self.entry_filled_quantity();
        let exit = self.exit_filled_quantity();
        // Unfilled re-entries resting below a flat position do not hold it open.
        let entry_working = self.legs.iter().any(|l| {
            l.role().is_entry_like()
                && !l.status().is_terminal()
                && !(matches!(l.role(), LegRole::Dca(_) | LegRole::Rebuy)
                    && l.filled_quantity().is_zero())
        });
        let any_exit_leg = self.legs.iter().any(|l| l.role().is_exit());

        let next = if entry > Decimal::ZERO && exit >= entry && !entry_working {
            ChainStatus::Completed
        } else if entry.is_zero() && !entry_working && !any_exit_leg {
            ChainStatus::Cancelled
        } else if exit > Decimal::ZERO {
            ChainStatus::Partial
        } else {
            ChainStatus::Active
        };

        if next == self.status {
            return;
        }
        self.status = next;
        match next {
            ChainStatus::Completed => self.push_event(
                now,
                ChainEventKind::ChainCompleted {
                    entry_filled: entry,
                    exit_filled: exit,
                },
            ),
            ChainStatus::Cancelled => self.push_event(now, ChainEventKind::ChainCancelled),
            ChainStatus::Active | ChainStatus::Partial => {}
        }
    }

    fn emit_placed(&mut self, leg: &OrderLeg, now: DateTime<Utc>) {
        self.push_event(
            now,
            ChainEventKind::LegPlaced {
                leg_id: leg.leg_id().clone(),
                role: leg.role(),
                status: leg.status(),
                exchange_order_id: leg.exchange_order_id().cloned(),
            },
        );
    }

    fn emit_fill(&mut self, leg: &OrderLeg, now: DateTime<Utc>) {
        let kind = if leg.status() == LegStatus::Filled {
            ChainEventKind::LegFilled {
                leg_id: leg.leg_id().clone(),
                role: leg.role(),
                filled_quantity: leg.filled_quantity(),
                avg_fill_price: leg.avg_fill_price(),
            }
        } else {
            ChainEventKind::LegPartiallyFilled {
                leg_id: leg.leg_id().clone(),
                role: leg.role(),
                filled_quantity: leg.filled_quantity(),
                avg_fill_price: leg.avg_fill_price(),
            }
        };
        self.push_event(now, kind);
    }

    fn push_event(&mut self, now: DateTime<Utc>, kind: ChainEventKind) {
        self.events.push(ChainEvent::new(
            self.chain_id.clone(),
            self.symbol.clone(),
            now,
            kind,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_chain::aggregate::leg::NewLeg;
    use crate::domain::order_chain::value_objects::{LegOrderType, OrderSide};
    use crate::domain::shared::ExchangeOrderId;

    const CHAIN: &str = "SCA-16OCT-00001";

    fn leg(role: LegRole, order_type: LegOrderType, side: OrderSide, qty: Decimal) -> OrderLeg {
        OrderLeg::new(NewLeg {
            leg_id: ClientOrderId::new(format!("{CHAIN}-{}", role.code())),
            chain_id: ChainId::new(CHAIN),
            role,
            order_type,
            side,
            price: None,
            stop_price: None,
            quantity: qty,
            created_at: Utc::now(),
        })
    }

    fn filled(status: LegStatus, qty: Decimal, price: Decimal) -> LegUpdate {
        LegUpdate {
            status,
            exchange_order_id: Some(ExchangeOrderId::new("1")),
            filled_quantity: qty,
            avg_fill_price: Some(price),
            observed_at: Utc::now(),
        }
    }

    fn open_long(entry_filled: Decimal) -> Chain {
        let mut entry = leg(LegRole::Entry, LegOrderType::Market, OrderSide::Buy, dec!(1));
        let status = if entry_filled == dec!(1) {
            LegStatus::Filled
        } else {
            LegStatus::Open
        };
        entry.apply(filled(status, entry_filled, dec!(100))).unwrap();
        Chain::open(OpenChain {
            chain_id: ChainId::new(CHAIN),
            symbol: Symbol::new("BTCUSDT"),
            position_side: PositionSide::Long,
            kind: ChainKind::Primary,
            mode: TradingMode::Scalp,
            policy: ChainPolicy::default(),
            targets: ProtectionTargets::default(),
            entry,
            opened_at: Utc::now(),
        })
        .unwrap()
    }

    fn add_exit(chain: &mut Chain, role: LegRole, order_type: LegOrderType, qty: Decimal) -> ClientOrderId {
        let l = leg(role, order_type, OrderSide::Sell, qty);
        let id = l.leg_id().clone();
        chain.add_leg(l, Utc::now()).unwrap();
        id
    }

    #[test]
    fn open_emits_created_placed_and_filled() {
        let mut chain = open_long(dec!(1));
        let types: Vec<_> = chain.take_events().iter().map(ChainEvent::event_type).collect();
        assert_eq!(types, vec!["CHAIN_CREATED", "LEG_PLACED", "LEG_FILLED"]);
        assert_eq!(chain.status(), ChainStatus::Active);
        assert!(chain.take_events().is_empty());
    }

    #[test]
    fn open_rejects_non_entry_leg() {
        let sl = leg(LegRole::StopLoss, LegOrderType::StopMarket, OrderSide::Sell, dec!(1));
        let result = Chain::open(OpenChain {
            chain_id: ChainId::new(CHAIN),
            symbol: Symbol::new("BTCUSDT"),
            position_side: PositionSide::Long,
            kind: ChainKind::Primary,
            mode: TradingMode::Scalp,
            policy: ChainPolicy::default(),
            targets: ProtectionTargets::default(),
            entry: sl,
            opened_at: Utc::now(),
        });
        assert!(matches!(result, Err(ChainError::RoleNotAllowed { .. })));
    }

    #[test]
    fn filled_entry_without_stop_needs_protection() {
        let chain = open_long(dec!(1));
        assert!(chain.needs_protection());
        assert!(!chain.is_protected());
        assert!(matches!(chain.stop_state(), StopState::Missing));
    }

    #[test]
    fn below_min_fill_ratio_does_not_need_protection() {
        let chain = open_long(dec!(0.2));
        assert!(!chain.needs_protection());
    }

    #[test]
    fn pending_stop_is_unconfirmed_until_acknowledged() {
        let mut chain = open_long(dec!(1));
        let sl = add_exit(&mut chain, LegRole::StopLoss, LegOrderType::StopMarket, dec!(1));
        assert!(matches!(chain.stop_state(), StopState::Unconfirmed(_)));

        chain
            .apply_update(&sl, filled(LegStatus::Open, dec!(0), dec!(0)))
            .unwrap();
        assert!(matches!(chain.stop_state(), StopState::Confirmed(_)));
        assert!(chain.is_protected());
    }

    #[test]
    fn duplicate_leg_is_rejected() {
        let mut chain = open_long(dec!(1));
        add_exit(&mut chain, LegRole::StopLoss, LegOrderType::StopMarket, dec!(1));
        let again = leg(LegRole::StopLoss, LegOrderType::StopMarket, OrderSide::Sell, dec!(1));
        let err = chain.add_leg(again, Utc::now()).unwrap_err();
        assert!(matches!(err, ChainError::DuplicateLeg { .. }));
        assert_eq!(chain.legs().len(), 2);
    }

    #[test]
    fn second_working_entry_is_rejected() {
        let mut chain = open_long(dec!(0.2));
        let dca = leg(LegRole::Dca(1), LegOrderType::Market, OrderSide::Buy, dec!(1));
        let err = chain.add_leg(dca, Utc::now()).unwrap_err();
        assert!(matches!(err, ChainError::EntryAlreadyActive { .. }));
    }

    #[test]
    fn take_profit_ladder_is_capped() {
        let mut chain = open_long(dec!(1));
        for k in 1..=3 {
            add_exit(&mut chain, LegRole::TakeProfit(k), LegOrderType::TakeProfitMarket, dec!(0.3));
        }
        let fourth = leg(LegRole::TakeProfit(4), LegOrderType::TakeProfitMarket, OrderSide::Sell, dec!(0.1));
        let err = chain.add_leg(fourth, Utc::now()).unwrap_err();
        assert_eq!(err, ChainError::TakeProfitLimit { max: 3 });
    }

    #[test]
    fn hedge_roles_rejected_on_primary() {
        let mut chain = open_long(dec!(1));
        let hsl = leg(LegRole::HedgeStopLoss, LegOrderType::StopMarket, OrderSide::Sell, dec!(1));
        assert!(matches!(
            chain.add_leg(hsl, Utc::now()),
            Err(ChainError::RoleNotAllowed { .. })
        ));
    }

    #[test]
    fn partial_then_completed_through_take_profits() {
        let mut chain = open_long(dec!(1));
        let sl = add_exit(&mut chain, LegRole::StopLoss, LegOrderType::StopMarket, dec!(1));
        let tp1 = add_exit(&mut chain, LegRole::TakeProfit(1), LegOrderType::TakeProfitMarket, dec!(0.4));
        let tp2 = add_exit(&mut chain, LegRole::TakeProfit(2), LegOrderType::TakeProfitMarket, dec!(0.6));
        for id in [&sl, &tp1, &tp2] {
            chain.apply_update(id, filled(LegStatus::Open, dec!(0), dec!(0))).unwrap();
        }

        chain.apply_update(&tp1, filled(LegStatus::Filled, dec!(0.4), dec!(110))).unwrap();
        assert_eq!(chain.status(), ChainStatus::Partial);
        assert_eq!(chain.open_quantity(), dec!(0.6));
        assert!(chain.dangling_exit_legs().is_empty());

        chain.apply_update(&tp2, filled(LegStatus::Filled, dec!(0.6), dec!(120))).unwrap();
        assert_eq!(chain.status(), ChainStatus::Completed);
        let dangling: Vec<_> = chain.dangling_exit_legs().iter().map(|l| l.leg_id().clone()).collect();
        assert_eq!(dangling, vec![sl]);
        assert!(!chain.is_retired());
    }

    #[test]
    fn entry_withdrawn_unfilled_cancels_chain() {
        let mut entry = leg(LegRole::Entry, LegOrderType::Limit, OrderSide::Buy, dec!(1));
        entry.apply(filled(LegStatus::Open, dec!(0), dec!(0))).unwrap();
        let id = entry.leg_id().clone();
        let mut chain = Chain::open(OpenChain {
            chain_id: ChainId::new(CHAIN),
            symbol: Symbol::new("BTCUSDT"),
            position_side: PositionSide::Long,
            kind: ChainKind::Primary,
            mode: TradingMode::Scalp,
            policy: ChainPolicy::default(),
            targets: ProtectionTargets::default(),
            entry,
            opened_at: Utc::now(),
        })
        .unwrap();

        chain
            .apply_update(&id, LegUpdate::status_only(LegStatus::Cancelled, dec!(0), Utc::now()))
            .unwrap();
        assert_eq!(chain.status(), ChainStatus::Cancelled);
        assert!(chain.is_retired());
        let last = chain.take_events().pop().unwrap();
        assert_eq!(last.event_type(), "CHAIN_CANCELLED");
    }

    #[test]
    fn protection_failure_and_restore_events() {
        let mut chain = open_long(dec!(1));
        chain.take_events();
        chain.record_protection_failure("network", Utc::now());
        chain.record_protection_failure("network", Utc::now());
        assert!(matches!(
            chain.protection(),
            ProtectionState::Unprotected { failures: 2, .. }
        ));

        let sl = add_exit(&mut chain, LegRole::StopLoss, LegOrderType::StopMarket, dec!(1));
        chain.apply_update(&sl, filled(LegStatus::Open, dec!(0), dec!(0))).unwrap();
        chain.record_protection_restored(Utc::now());
        assert_eq!(chain.protection(), &ProtectionState::Protected);

        let types: Vec<_> = chain.take_events().iter().map(ChainEvent::event_type).collect();
        assert_eq!(
            types,
            vec!["PROTECTION_FAILED", "PROTECTION_FAILED", "LEG_PLACED", "PROTECTION_RESTORED"]
        );
    }

    #[test]
    fn best_price_tracks_favourable_direction() {
        let mut chain = open_long(dec!(1));
        assert!(chain.observe_price(dec!(100)));
        assert!(chain.observe_price(dec!(105)));
        assert!(!chain.observe_price(dec!(103)));
        assert_eq!(chain.best_price(), Some(dec!(105)));
        assert!(chain.is_tighter(dec!(99), dec!(98)));
        assert!(!chain.is_tighter(dec!(97), dec!(98)));
    }

    #[test]
    fn next_version_counts_role() {
        let mut chain = open_long(dec!(1));
        assert_eq!(chain.next_version(LegRole::StopLoss), 1);
        add_exit(&mut chain, LegRole::StopLoss, LegOrderType::StopMarket, dec!(1));
        assert_eq!(chain.next_version(LegRole::StopLoss), 2);
    }
}
