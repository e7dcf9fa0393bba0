//! Role a leg plays inside its chain.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The purpose of one order within a chain.
///
/// Roles serialize to the short code that is also used as the suffix of the
/// leg's client order id (`E`, `SL`, `TP1`, `DCA2`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum LegRole {
    /// Opening order.
    Entry,
    /// Protective stop.
    StopLoss,
    /// Take-profit ladder step (1-based).
    TakeProfit(u8),
    /// Cost-averaging re-entry (1-based).
    Dca(u8),
    /// Opening order of a hedge sub-chain.
    Hedge,
    /// Protective stop of a hedge sub-chain.
    HedgeStopLoss,
    /// Take-profit of a hedge sub-chain.
    HedgeTakeProfit,
    /// Exchange-native trailing stop.
    Trailing,
    /// Limit re-entry after a partial take-profit.
    Rebuy,
    /// Market exit issued for an explicit close decision.
    Close,
}

impl LegRole {
    /// Short code used in client order ids.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::Entry => "E".to_string(),
            Self::StopLoss => "SL".to_string(),
            Self::TakeProfit(k) => format!("TP{k}"),
            Self::Dca(k) => format!("DCA{k}"),
            Self::Hedge => "H".to_string(),
            Self::HedgeStopLoss => "HSL".to_string(),
            Self::HedgeTakeProfit => "HTP".to_string(),
            Self::Trailing => "TS".to_string(),
            Self::Rebuy => "RB".to_string(),
            Self::Close => "X".to_string(),
        }
    }

    /// Legs that open or add to the position.
    #[must_use]
    pub const fn is_entry_like(&self) -> bool {
        matches!(self, Self::Entry | Self::Dca(_) | Self::Hedge | Self::Rebuy)
    }

    /// Legs that reduce the position.
    #[must_use]
    pub const fn is_exit(&self) -> bool {
        matches!(
            self,
            Self::StopLoss
                | Self::TakeProfit(_)
                | Self::HedgeStopLoss
                | Self::HedgeTakeProfit
                | Self::Trailing
                | Self::Close
        )
    }

    /// Stop legs that keep an open position protected.
    #[must_use]
    pub const fn is_protective_stop(&self) -> bool {
        matches!(self, Self::StopLoss | Self::HedgeStopLoss)
    }

    /// Take-profit legs of either chain kind.
    #[must_use]
    pub const fn is_take_profit(&self) -> bool {
        matches!(self, Self::TakeProfit(_) | Self::HedgeTakeProfit)
    }

    /// Roles that belong to a hedge sub-chain.
    #[must_use]
    pub const fn is_hedge_role(&self) -> bool {
        matches!(
            self,
            Self::Hedge | Self::HedgeStopLoss | Self::HedgeTakeProfit
        )
    }
}

impl fmt::Display for LegRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// Error returned when a role code cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLegRole(pub String);

impl fmt::Display for UnknownLegRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown leg role code: {}", self.0)
    }
}

impl std::error::Error for UnknownLegRole {}

impl FromStr for LegRole {
    type Err = UnknownLegRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let indexed = |prefix: &str| -> Option<u8> {
            s.strip_prefix(prefix)
                .and_then(|n| n.parse::<u8>().ok())
                .filter(|n| *n > 0)
        };

        match s {
            "E" => Ok(Self::Entry),
            "SL" => Ok(Self::StopLoss),
            "H" => Ok(Self::Hedge),
            "HSL" => Ok(Self::HedgeStopLoss),
            "HTP" => Ok(Self::HedgeTakeProfit),
            "TS" => Ok(Self::Trailing),
            "RB" => Ok(Self::Rebuy),
            "X" => Ok(Self::Close),
            _ => indexed("TP")
                .map(Self::TakeProfit)
                .or_else(|| indexed("DCA").map(Self::Dca))
                .ok_or_else(|| UnknownLegRole(s.to_string())),
        }
    }
}

impl From<LegRole> for String {
    fn from(role: LegRole) -> Self {
        role.code()
    }
}

impl TryFrom<String> for LegRole {
    type Error = UnknownLegRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
