//! Leg status in the order lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one leg.
///
/// ```text
/// PENDING → OPEN → PARTIALLY_FILLED → FILLED
///    │        │            │
///    │        ├────────────┴──→ CANCELLED
///    └────────┴──→ REJECTED
/// ```
///
/// A leg may also jump from PENDING or OPEN straight to FILLED when the
/// exchange reports an immediate fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegStatus {
    /// Placement issued; exchange outcome not yet confirmed.
    Pending,
    /// Resting on the exchange.
    Open,
    /// Some quantity filled, remainder resting.
    PartiallyFilled,
    /// Fully filled.
    Filled,
    /// Cancelled or expired on the exchange.
    Cancelled,
    /// Rejected by the exchange.
    Rejected,
}

impl LegStatus {
    /// Returns true if no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    /// Returns true if the leg is known to exist on the exchange.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Open | Self::PartiallyFilled)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Staying in `PartiallyFilled` is legal (additional fills).
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Pending => !matches!(next, Self::Pending),
            Self::Open => matches!(
                next,
                Self::PartiallyFilled | Self::Filled | Self::Cancelled | Self::Rejected
            ),
            Self::PartiallyFilled => {
                matches!(next, Self::PartiallyFilled | Self::Filled | Self::Cancelled)
            }
            Self::Filled | Self::Cancelled | Self::Rejected => false,
        }
    }
}

impl fmt::Display for LegStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Open => write!(f, "OPEN"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}
