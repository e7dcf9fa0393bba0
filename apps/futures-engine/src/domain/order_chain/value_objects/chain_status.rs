//! Chain lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a chain as a whole.
///
/// ```text
/// ACTIVE → PARTIAL → COMPLETED
///    │
///    └──→ CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainStatus {
    /// Entry placed; no exit quantity filled yet.
    Active,
    /// Some exit quantity filled, position not yet flat.
    Partial,
    /// Exit fills equal entry fills.
    Completed,
    /// Entry never filled and was withdrawn.
    Cancelled,
}

impl ChainStatus {
    /// Returns true for Completed or Cancelled.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Returns true while the chain may still accept new legs.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::Partial)
    }
}

impl fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Partial => write!(f, "PARTIAL"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}
