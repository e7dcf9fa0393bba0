//! Order chain errors.

use std::fmt;

use super::value_objects::{ChainStatus, LegRole, LegStatus};

/// Errors raised by a single leg rejecting an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegError {
    /// Status change not permitted by the leg lifecycle.
    InvalidTransition {
        /// Leg client order id.
        leg_id: String,
        /// Current status.
        from: LegStatus,
        /// Reported status.
        to: LegStatus,
    },

    /// Reported filled quantity is lower than the recorded one.
    FillRegression {
        /// Leg client order id.
        leg_id: String,
        /// Recorded filled quantity.
        recorded: String,
        /// Reported filled quantity.
        reported: String,
    },

    /// Reported filled quantity exceeds the ordered quantity.
    OverFill {
        /// Leg client order id.
        leg_id: String,
        /// Reported filled quantity.
        filled: String,
        /// Ordered quantity.
        quantity: String,
    },
}

impl fmt::Display for LegError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTransition { leg_id, from, to } => {
                write!(f, "Invalid leg transition for {leg_id}: {from} -> {to}")
            }
            Self::FillRegression {
                leg_id,
                recorded,
                reported,
            } => {
                write!(
                    f,
                    "Filled quantity for {leg_id} went backwards: {recorded} -> {reported}"
                )
            }
            Self::OverFill {
                leg_id,
                filled,
                quantity,
            } => {
                write!(
                    f,
                    "Filled quantity {filled} exceeds ordered {quantity} for {leg_id}"
                )
            }
        }
    }
}

impl std::error::Error for LegError {}

/// Errors raised by a chain rejecting a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// No leg with this client order id belongs to the chain.
    LegNotFound {
        /// Leg client order id.
        leg_id: String,
    },

    /// A leg with this client order id is already recorded.
    DuplicateLeg {
        /// Leg client order id.
        leg_id: String,
    },

    /// A non-terminal entry-like leg already exists.
    EntryAlreadyActive {
        /// The live entry leg.
        leg_id: String,
    },

    /// Take-profit ladder is full.
    TakeProfitLimit {
        /// Configured maximum.
        max: u8,
    },

    /// Role cannot be used on this kind of chain.
    RoleNotAllowed {
        /// Offending role.
        role: LegRole,
        /// Chain kind name.
        kind: &'static str,
    },

    /// Chain is closed and accepts no new legs.
    Closed {
        /// Chain id.
        chain_id: String,
        /// Closed status.
        status: ChainStatus,
    },

    /// Leg rejected the update.
    Leg(LegError),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LegNotFound { leg_id } => write!(f, "Leg not found: {leg_id}"),
            Self::DuplicateLeg { leg_id } => write!(f, "Duplicate leg: {leg_id}"),
            Self::EntryAlreadyActive { leg_id } => {
                write!(f, "Entry leg {leg_id} is still working")
            }
            Self::TakeProfitLimit { max } => {
                write!(f, "Take-profit ladder already has {max} legs")
            }
            Self::RoleNotAllowed { role, kind } => {
                write!(f, "Role {role} is not allowed on a {kind} chain")
            }
            Self::Closed { chain_id, status } => {
                write!(f, "Chain {chain_id} is {status}")
            }
            Self::Leg(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<LegError> for ChainError {
    fn from(e: LegError) -> Self {
        Self::Leg(e)
    }
}
