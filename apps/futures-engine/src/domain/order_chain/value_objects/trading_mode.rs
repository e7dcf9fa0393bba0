//! Trading mode (holding-period style) of a chain.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading style a chain was opened under.
///
/// The mode selects the constraint set and prefixes every client order id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    /// Seconds-to-minutes holds.
    UltraFast,
    /// Minutes-to-hours holds.
    Scalp,
    /// Hours-to-days holds.
    Swing,
    /// Multi-day positions.
    Position,
}

impl TradingMode {
    /// Three-letter prefix used in client order ids.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UltraFast => "ULT",
            Self::Scalp => "SCA",
            Self::Swing => "SWI",
            Self::Position => "POS",
        }
    }

    /// Parse a client order id prefix.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "ULT" => Some(Self::UltraFast),
            "SCA" => Some(Self::Scalp),
            "SWI" => Some(Self::Swing),
            "POS" => Some(Self::Position),
            _ => None,
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UltraFast => write!(f, "ultra_fast"),
            Self::Scalp => write!(f, "scalp"),
            Self::Swing => write!(f, "swing"),
            Self::Position => write!(f, "position"),
        }
    }
}
