//! Chain lifecycle events.
//!
//! Every event carries a unique `event_id`; publishers deliver at least once
//! and consumers deduplicate on it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value_objects::{LegRole, LegStatus, PositionSide, TradingMode};
use crate::domain::shared::{ChainId, ClientOrderId, EventId, ExchangeOrderId, Symbol};

/// Envelope for a chain lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEvent {
    /// Unique id for deduplication.
    pub event_id: EventId,
    /// Chain the event belongs to.
    pub chain_id: ChainId,
    /// Traded symbol.
    pub symbol: Symbol,
    /// When the event happened.
    pub occurred_at: DateTime<Utc>,
    /// Event payload.
    #[serde(flatten)]
    pub kind: ChainEventKind,
}

impl ChainEvent {
    /// Build an event with a fresh id.
    #[must_use]
    pub fn new(
        chain_id: ChainId,
        symbol: Symbol,
        occurred_at: DateTime<Utc>,
        kind: ChainEventKind,
    ) -> Self {
        Self {
            event_id: EventId::generate(),
            chain_id,
            symbol,
            occurred_at,
            kind,
        }
    }

    /// Event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}

/// All chain lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainEventKind {
    /// Entry accepted by the exchange and the chain recorded.
    ChainCreated {
        /// Trading mode.
        mode: TradingMode,
        /// Position direction.
        position_side: PositionSide,
        /// Parent chain for hedge chains.
        parent: Option<ChainId>,
        /// Entry leg token.
        entry_leg_id: ClientOrderId,
    },
    /// Leg confirmed on the exchange.
    LegPlaced {
        /// Leg token.
        leg_id: ClientOrderId,
        /// Leg role.
        role: LegRole,
        /// Status after placement.
        status: LegStatus,
        /// Exchange order id, when known.
        exchange_order_id: Option<ExchangeOrderId>,
    },
    /// Leg filled partially.
    LegPartiallyFilled {
        /// Leg token.
        leg_id: ClientOrderId,
        /// Leg role.
        role: LegRole,
        /// Cumulative filled quantity.
        filled_quantity: Decimal,
        /// Average fill price.
        avg_fill_price: Option<Decimal>,
    },
    /// Leg filled completely.
    LegFilled {
        /// Leg token.
        leg_id: ClientOrderId,
        /// Leg role.
        role: LegRole,
        /// Filled quantity.
        filled_quantity: Decimal,
        /// Average fill price.
        avg_fill_price: Option<Decimal>,
    },
    /// Leg cancelled or expired.
    LegCancelled {
        /// Leg token.
        leg_id: ClientOrderId,
        /// Leg role.
        role: LegRole,
        /// Quantity filled before cancellation.
        filled_quantity: Decimal,
    },
    /// Leg rejected by the exchange.
    LegRejected {
        /// Leg token.
        leg_id: ClientOrderId,
        /// Leg role.
        role: LegRole,
    },
    /// Open position left without a working protective stop.
    ProtectionFailed {
        /// Consecutive failed attempts.
        failures: u32,
        /// Last failure reason.
        reason: String,
    },
    /// Protective stop confirmed again after a failure.
    ProtectionRestored {
        /// Working stop leg.
        stop_leg_id: ClientOrderId,
    },
    /// Protective stop moved in the protective direction.
    StopTightened {
        /// Replaced stop leg.
        previous_leg_id: ClientOrderId,
        /// New stop leg.
        leg_id: ClientOrderId,
        /// Previous stop price.
        previous_stop: Decimal,
        /// New stop price.
        stop_price: Decimal,
    },
    /// Hedge sub-chain opened against this chain.
    HedgeOpened {
        /// The hedge chain.
        hedge_chain_id: ChainId,
    },
    /// Position flat through exit fills.
    ChainCompleted {
        /// Total entry fills.
        entry_filled: Decimal,
        /// Total exit fills.
        exit_filled: Decimal,
    },
    /// Entry withdrawn without filling.
    ChainCancelled,
}

impl ChainEventKind {
    /// Event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::ChainCreated { .. } => "CHAIN_CREATED",
            Self::LegPlaced { .. } => "LEG_PLACED",
            Self::LegPartiallyFilled { .. } => "LEG_PARTIALLY_FILLED",
            Self::LegFilled { .. } => "LEG_FILLED",
            Self::LegCancelled { .. } => "LEG_CANCELLED",
            Self::LegRejected { .. } => "LEG_REJECTED",
            Self::ProtectionFailed { .. } => "PROTECTION_FAILED",
            Self::ProtectionRestored { .. } => "PROTECTION_RESTORED",
            Self::StopTightened { .. } => "STOP_TIGHTENED",
            Self::HedgeOpened { .. } => "HEDGE_OPENED",
            Self::ChainCompleted { .. } => "CHAIN_COMPLETED",
            Self::ChainCancelled => "CHAIN_CANCELLED",
        }
    }
}
