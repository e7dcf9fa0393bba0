//! A single order inside a chain.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_chain::errors::LegError;
use crate::domain::order_chain::value_objects::{LegOrderType, LegRole, LegStatus, OrderSide};
use crate::domain::shared::{ChainId, ClientOrderId, ExchangeOrderId};

/// Parameters for a new leg. The leg starts in `Pending`.
#[derive(Debug, Clone)]
pub struct NewLeg {
    /// Client order id, also the idempotency token.
    pub leg_id: ClientOrderId,
    /// Owning chain.
    pub chain_id: ChainId,
    /// Purpose of the leg.
    pub role: LegRole,
    /// Exchange order type.
    pub order_type: LegOrderType,
    /// Order side.
    pub side: OrderSide,
    /// Limit price, for limit legs.
    pub price: Option<Decimal>,
    /// Trigger price, for conditional legs.
    pub stop_price: Option<Decimal>,
    /// Ordered quantity.
    pub quantity: Decimal,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Exchange-observed state applied to a leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegUpdate {
    /// Reported status.
    pub status: LegStatus,
    /// Exchange id, when known.
    pub exchange_order_id: Option<ExchangeOrderId>,
    /// Cumulative filled quantity.
    pub filled_quantity: Decimal,
    /// Average fill price.
    pub avg_fill_price: Option<Decimal>,
    /// Observation time.
    pub observed_at: DateTime<Utc>,
}

impl LegUpdate {
    /// Update carrying only a status change, with no fill information.
    #[must_use]
    pub const fn status_only(status: LegStatus, filled_quantity: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self {
            status,
            exchange_order_id: None,
            filled_quantity,
            avg_fill_price: None,
            observed_at,
        }
    }
}

/// Result of applying an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegTransition {
    /// Status before the update.
    pub from: LegStatus,
    /// Status after the update.
    pub to: LegStatus,
    /// Newly filled quantity.
    pub fill_delta: Decimal,
}

impl LegTransition {
    /// True when the update changed nothing observable.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.fill_delta.is_zero()
    }
}

/// One order of a chain.
///
/// Fields are private; state only changes through [`OrderLeg::apply`],
/// which enforces the leg lifecycle and monotonic fills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLeg {
    leg_id: ClientOrderId,
    chain_id: ChainId,
    role: LegRole,
    order_type: LegOrderType,
    exchange_order_id: Option<ExchangeOrderId>,
    side: OrderSide,
    price: Option<Decimal>,
    stop_price: Option<Decimal>,
    quantity: Decimal,
    filled_quantity: Decimal,
    avg_fill_price: Option<Decimal>,
    status: LegStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderLeg {
    /// Create a pending leg.
    #[must_use]
    pub fn new(params: NewLeg) -> Self {
        Self {
            leg_id: params.leg_id,
            chain_id: params.chain_id,
            role: params.role,
            order_type: params.order_type,
            exchange_order_id: None,
            side: params.side,
            price: params.price,
            stop_price: params.stop_price,
            quantity: params.quantity,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            status: LegStatus::Pending,
            created_at: params.created_at,
            updated_at: params.created_at,
        }
    }

    /// Client order id.
    #[must_use]
    pub const fn leg_id(&self) -> &ClientOrderId {
        &self.leg_id
    }

    /// Owning chain.
    #[must_use]
    pub const fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    /// Leg role.
    #[must_use]
    pub const fn role(&self) -> LegRole {
        self.role
    }

    /// Exchange order type.
    #[must_use]
    pub const fn order_type(&self) -> LegOrderType {
        self.order_type
    }

    /// Exchange-assigned id, once known.
    #[must_use]
    pub const fn exchange_order_id(&self) -> Option<&ExchangeOrderId> {
        self.exchange_order_id.as_ref()
    }

    /// Order side.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.side
    }

    /// Limit price.
    #[must_use]
    pub const fn price(&self) -> Option<Decimal> {
        self.price
    }

    /// Trigger price.
    #[must_use]
    pub const fn stop_price(&self) -> Option<Decimal> {
        self.stop_price
    }

    /// Ordered quantity.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Cumulative filled quantity.
    #[must_use]
    pub const fn filled_quantity(&self) -> Decimal {
        self.filled_quantity
    }

    /// Unfilled quantity.
    #[must_use]
    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    /// Average fill price.
    #[must_use]
    pub const fn avg_fill_price(&self) -> Option<Decimal> {
        self.avg_fill_price
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> LegStatus {
        self.status
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last change time.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// A pending leg without an exchange id may or may not exist remotely.
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        self.exchange_order_id.is_some() || !matches!(self.status, LegStatus::Pending)
    }

    /// Reduce-only legs close exposure.
    #[must_use]
    pub const fn is_reduce_only(&self) -> bool {
        self.role.is_exit()
    }

    /// Apply an exchange observation.
    ///
    /// Repeating the current state is accepted as a no-op. An `Open` report
    /// carrying fills is recorded as `PartiallyFilled`, and a fill reaching
    /// the ordered quantity is recorded as `Filled`.
    ///
    /// # Errors
    ///
    /// Returns [`LegError`] for an illegal status change, a fill that goes
    /// backwards, or a fill larger than the ordered quantity.
    pub fn apply(&mut self, update: LegUpdate) -> Result<LegTransition, LegError> {
        if update.filled_quantity < self.filled_quantity {
            return Err(LegError::FillRegression {
                leg_id: self.leg_id.to_string(),
                recorded: self.filled_quantity.to_string(),
                reported: update.filled_quantity.to_string(),
            });
        }
        if update.filled_quantity > self.quantity {
            return Err(LegError::OverFill {
                leg_id: self.leg_id.to_string(),
                filled: update.filled_quantity.to_string(),
                quantity: self.quantity.to_string(),
            });
        }

        let target = self.normalize(update.status, update.filled_quantity);
        let from = self.status;

        if target != from && !from.can_transition_to(target) {
            return Err(LegError::InvalidTransition {
                leg_id: self.leg_id.to_string(),
                from,
                to: target,
            });
        }
        if target == from && from.is_terminal() && update.filled_quantity != self.filled_quantity {
            return Err(LegError::InvalidTransition {
                leg_id: self.leg_id.to_string(),
                from,
                to: target,
            });
        }

        let fill_delta = update.filled_quantity - self.filled_quantity;
        if self.exchange_order_id.is_none() {
            self.exchange_order_id = update.exchange_order_id;
        }
        if update.avg_fill_price.is_some() {
            self.avg_fill_price = update.avg_fill_price;
        }
        self.filled_quantity = update.filled_quantity;
        self.status = target;

        let transition = LegTransition {
            from,
            to: target,
            fill_delta,
        };
        if !transition.is_noop() {
            self.updated_at = update.observed_at;
        }
        Ok(transition)
    }

    fn normalize(&self, reported: LegStatus, filled: Decimal) -> LegStatus {
        match reported {
            LegStatus::Open | LegStatus::PartiallyFilled
                if filled >= self.quantity && !self.quantity.is_zero() =>
            {
                LegStatus::Filled
            }
            LegStatus::Open if filled > Decimal::ZERO => LegStatus::PartiallyFilled,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_leg(quantity: Decimal) -> OrderLeg {
        OrderLeg::new(NewLeg {
            leg_id: ClientOrderId::new("SCA-16OCT-00001-E"),
            chain_id: ChainId::new("SCA-16OCT-00001"),
            role: LegRole::Entry,
            order_type: LegOrderType::Market,
            side: OrderSide::Buy,
            price: None,
            stop_price: None,
            quantity,
            created_at: Utc::now(),
        })
    }

    fn update(status: LegStatus, filled: Decimal) -> LegUpdate {
        LegUpdate {
            status,
            exchange_order_id: Some(ExchangeOrderId::new("42")),
            filled_quantity: filled,
            avg_fill_price: Some(dec!(100)),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn new_leg_is_pending_and_unconfirmed() {
        let leg = make_leg(dec!(1));
        assert_eq!(leg.status(), LegStatus::Pending);
        assert!(!leg.is_confirmed());
        assert!(!leg.is_reduce_only());
    }

    #[test]
    fn open_then_partial_then_filled() {
        let mut leg = make_leg(dec!(1));

        let t = leg.apply(update(LegStatus::Open, dec!(0))).unwrap();
        assert_eq!((t.from, t.to), (LegStatus::Pending, LegStatus::Open));
        assert!(leg.is_confirmed());

        let t = leg.apply(update(LegStatus::Open, dec!(0.4))).unwrap();
        assert_eq!(t.to, LegStatus::PartiallyFilled);
        assert_eq!(t.fill_delta, dec!(0.4));

        let t = leg.apply(update(LegStatus::PartiallyFilled, dec!(1))).unwrap();
        assert_eq!(t.to, LegStatus::Filled);
        assert_eq!(leg.remaining_quantity(), dec!(0));
    }

    #[test]
    fn repeated_observation_is_noop() {
        let mut leg = make_leg(dec!(1));
        leg.apply(update(LegStatus::Filled, dec!(1))).unwrap();
        let t = leg.apply(update(LegStatus::Filled, dec!(1))).unwrap();
        assert!(t.is_noop());
    }

    #[test]
    fn rejects_fill_regression() {
        let mut leg = make_leg(dec!(1));
        leg.apply(update(LegStatus::PartiallyFilled, dec!(0.5))).unwrap();
        let err = leg
            .apply(update(LegStatus::PartiallyFilled, dec!(0.2)))
            .unwrap_err();
        assert!(matches!(err, LegError::FillRegression { .. }));
    }

    #[test]
    fn rejects_over_fill() {
        let mut leg = make_leg(dec!(1));
        let err = leg.apply(update(LegStatus::Filled, dec!(1.5))).unwrap_err();
        assert!(matches!(err, LegError::OverFill { .. }));
    }

    #[test]
    fn rejects_transition_out_of_terminal() {
        let mut leg = make_leg(dec!(1));
        leg.apply(update(LegStatus::Cancelled, dec!(0))).unwrap();
        let err = leg.apply(update(LegStatus::Open, dec!(0))).unwrap_err();
        assert!(matches!(err, LegError::InvalidTransition { .. }));
    }

    #[test]
    fn cancelled_after_partial_keeps_fills() {
        let mut leg = make_leg(dec!(1));
        leg.apply(update(LegStatus::PartiallyFilled, dec!(0.3))).unwrap();
        leg.apply(update(LegStatus::Cancelled, dec!(0.3))).unwrap();
        assert_eq!(leg.status(), LegStatus::Cancelled);
        assert_eq!(leg.filled_quantity(), dec!(0.3));
    }
}
