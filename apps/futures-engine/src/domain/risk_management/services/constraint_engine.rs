//! Constraint Engine
//!
//! Clamps or drops trade decisions against a [`ConstraintSet`] before any of
//! them reaches the exchange. Never fails: every decision is either accepted
//! (possibly adjusted) or rejected with a reason.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::risk_management::value_objects::{ConstraintSet, DecisionAction, TradeDecision};
use crate::domain::shared::Symbol;

/// Why a decision was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    /// Hold decisions carry nothing to execute.
    NoAction,
    /// Open position count already at the limit.
    MaxPositionsReached {
        /// Open positions, including ones accepted earlier in the batch.
        open: u32,
        /// Configured limit.
        max: u32,
    },
    /// Remaining total allocation is below the minimum useful size.
    InsufficientRoom {
        /// Remaining room.
        room: Decimal,
        /// Minimum meaningful size.
        min: Decimal,
    },
    /// Size after clamping is below the minimum useful size.
    BelowMinimumSize {
        /// Size after clamping.
        size: Decimal,
        /// Minimum meaningful size.
        min: Decimal,
    },
    /// Averaging is disabled for this mode.
    AveragingDisabled,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAction => write!(f, "no action"),
            Self::MaxPositionsReached { open, max } => {
                write!(f, "max positions reached ({open}/{max})")
            }
            Self::InsufficientRoom { room, min } => {
                write!(f, "remaining allocation {room} below minimum {min}")
            }
            Self::BelowMinimumSize { size, min } => {
                write!(f, "size {size} below minimum {min}")
            }
            Self::AveragingDisabled => write!(f, "averaging disabled"),
        }
    }
}

/// A clamp applied to an accepted decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Adjustment {
    /// Leverage clamped into `[1, max_leverage]`.
    Leverage {
        /// Requested.
        from: u32,
        /// Applied.
        to: u32,
    },
    /// Size clamped to the per-position limit.
    PositionSize {
        /// Requested.
        from: Decimal,
        /// Applied.
        to: Decimal,
    },
    /// Size clamped to the remaining total allocation.
    TotalAllocation {
        /// Before the clamp.
        from: Decimal,
        /// Applied.
        to: Decimal,
    },
    /// Averaging count clamped to the mode limit.
    AverageCount {
        /// Requested.
        from: u32,
        /// Applied.
        to: u32,
    },
}

/// Outcome of evaluating a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintReport {
    /// Accepted decisions in processing order.
    pub accepted: Vec<TradeDecision>,
    /// Dropped decisions with the reason.
    pub rejected: Vec<(TradeDecision, RejectionReason)>,
    /// Clamps applied to accepted decisions.
    pub adjustments: Vec<(Symbol, Adjustment)>,
}

impl ConstraintReport {
    /// Sum of accepted sizes for opening and averaging actions.
    #[must_use]
    pub fn committed_usd(&self) -> Decimal {
        self.accepted
            .iter()
            .filter(|d| d.action.is_opening() || d.action.is_averaging())
            .map(|d| d.proposed_size_usd)
            .sum()
    }
}

/// Stateless constraint evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintEngine;

impl ConstraintEngine {
    /// Create the engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Accepted decisions only.
    #[must_use]
    pub fn apply(
        &self,
        decisions: &[TradeDecision],
        constraints: &ConstraintSet,
        current_open_count: u32,
    ) -> Vec<TradeDecision> {
        self.evaluate(decisions, constraints, current_open_count)
            .accepted
    }

    /// Evaluate a batch in priority order (highest first, stable).
    #[must_use]
    pub fn evaluate(
        &self,
        decisions: &[TradeDecision],
        constraints: &ConstraintSet,
        current_open_count: u32,
    ) -> ConstraintReport {
        let mut ordered: Vec<&TradeDecision> = decisions.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut report = ConstraintReport::default();
        let mut open_count = current_open_count;
        let mut running_total = Decimal::ZERO;
        let max_leverage = constraints.max_leverage.max(1);

        for decision in ordered {
            let mut d = decision.clone();

            if d.action == DecisionAction::Hold {
                report.rejected.push((d, RejectionReason::NoAction));
                continue;
            }
            if !d.action.is_opening() && !d.action.is_averaging() {
                report.accepted.push(d);
                continue;
            }

            // 1. position count
            if open_count >= constraints.max_positions {
                report.rejected.push((
                    d,
                    RejectionReason::MaxPositionsReached {
                        open: open_count,
                        max: constraints.max_positions,
                    },
                ));
                continue;
            }

            // 2. leverage
            let leverage = d.proposed_leverage.clamp(1, max_leverage);
            if leverage != d.proposed_leverage {
                report.adjustments.push((
                    d.symbol.clone(),
                    Adjustment::Leverage {
                        from: d.proposed_leverage,
                        to: leverage,
                    },
                ));
                d.proposed_leverage = leverage;
            }

            // 3. per-position size
            if d.proposed_size_usd > constraints.max_position_size_usd {
                report.adjustments.push((
                    d.symbol.clone(),
                    Adjustment::PositionSize {
                        from: d.proposed_size_usd,
                        to: constraints.max_position_size_usd,
                    },
                ));
                d.proposed_size_usd = constraints.max_position_size_usd;
            }

            // 4. remaining total allocation
            let room = (constraints.max_total_usd - running_total).max(Decimal::ZERO);
            if room < constraints.min_meaningful_size_usd {
                report.rejected.push((
                    d,
                    RejectionReason::InsufficientRoom {
                        room,
                        min: constraints.min_meaningful_size_usd,
                    },
                ));
                continue;
            }
            if d.proposed_size_usd > room {
                report.adjustments.push((
                    d.symbol.clone(),
                    Adjustment::TotalAllocation {
                        from: d.proposed_size_usd,
                        to: room,
                    },
                ));
                d.proposed_size_usd = room;
            }
            if d.proposed_size_usd < constraints.min_meaningful_size_usd {
                let size = d.proposed_size_usd;
                report.rejected.push((
                    d,
                    RejectionReason::BelowMinimumSize {
                        size,
                        min: constraints.min_meaningful_size_usd,
                    },
                ));
                continue;
            }

            // 5. averaging
            if d.action.is_averaging() {
                if !constraints.allow_averaging {
                    report.rejected.push((d, RejectionReason::AveragingDisabled));
                    continue;
                }
                if d.max_average_count > constraints.max_averages {
                    report.adjustments.push((
                        d.symbol.clone(),
                        Adjustment::AverageCount {
                            from: d.max_average_count,
                            to: constraints.max_averages,
                        },
                    ));
                    d.max_average_count = constraints.max_averages;
                }
            }

            // 6. accept
            running_total += d.proposed_size_usd;
            if d.action.is_opening() {
                open_count += 1;
            }
            report.accepted.push(d);
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn decision(symbol: &str, action: DecisionAction, size: Decimal, leverage: u32) -> TradeDecision {
        TradeDecision {
            symbol: Symbol::new(symbol),
            action,
            proposed_size_usd: size,
            proposed_leverage: leverage,
            entry_zone: None,
            stop_loss_percent: None,
            take_profit_percent: None,
            averaging_allowed: true,
            max_average_count: 0,
            confidence: dec!(0.8),
            priority: 0,
        }
    }

    fn constraints() -> ConstraintSet {
        ConstraintSet {
            max_positions: 3,
            max_leverage: 2,
            max_position_size_usd: dec!(300),
            max_total_usd: dec!(1000),
            allow_averaging: true,
            max_averages: 2,
            min_meaningful_size_usd: dec!(10),
        }
    }

    #[test]
    fn clamps_size_and_leverage() {
        let engine = ConstraintEngine::new();
        let out = engine.apply(
            &[decision("BTCUSDT", DecisionAction::OpenLong, dec!(500), 3)],
            &constraints(),
            0,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].proposed_size_usd, dec!(300));
        assert_eq!(out[0].proposed_leverage, 2);
    }

    #[test]
    fn zero_leverage_is_raised_to_one() {
        let out = ConstraintEngine::new().apply(
            &[decision("BTCUSDT", DecisionAction::OpenLong, dec!(50), 0)],
            &constraints(),
            0,
        );
        assert_eq!(out[0].proposed_leverage, 1);
    }

    #[test]
    fn drops_when_positions_full() {
        let report = ConstraintEngine::new().evaluate(
            &[decision("BTCUSDT", DecisionAction::OpenLong, dec!(100), 1)],
            &constraints(),
            3,
        );
        assert!(report.accepted.is_empty());
        assert!(matches!(
            report.rejected[0].1,
            RejectionReason::MaxPositionsReached { open: 3, max: 3 }
        ));
    }

    #[test]
    fn clamps_to_remaining_total_then_drops() {
        let batch = vec![
            decision("A", DecisionAction::OpenLong, dec!(300), 1),
            decision("B", DecisionAction::OpenLong, dec!(300), 1),
            decision("C", DecisionAction::OpenShort, dec!(300), 1),
            decision("D", DecisionAction::OpenShort, dec!(300), 1),
        ];
        let mut limits = constraints();
        limits.max_positions = 10;
        limits.max_total_usd = dec!(905);
        let report = ConstraintEngine::new().evaluate(&batch, &limits, 0);

        let sizes: Vec<_> = report.accepted.iter().map(|d| d.proposed_size_usd).collect();
        assert_eq!(sizes, vec![dec!(300), dec!(300), dec!(300)]);
        assert!(matches!(
            report.rejected[0].1,
            RejectionReason::InsufficientRoom { .. }
        ));

        limits.max_total_usd = dec!(950);
        let report = ConstraintEngine::new().evaluate(&batch, &limits, 0);
        assert_eq!(report.accepted[3].proposed_size_usd, dec!(50));
        assert_eq!(report.committed_usd(), dec!(950));
    }

    #[test]
    fn averaging_disabled_is_dropped() {
        let mut limits = constraints();
        limits.allow_averaging = false;
        let report = ConstraintEngine::new().evaluate(
            &[decision("BTCUSDT", DecisionAction::AverageDown, dec!(50), 1)],
            &limits,
            1,
        );
        assert_eq!(report.rejected[0].1, RejectionReason::AveragingDisabled);
    }

    #[test]
    fn averaging_count_is_clamped_and_does_not_add_position() {
        let mut avg = decision("BTCUSDT", DecisionAction::AverageDown, dec!(50), 1);
        avg.max_average_count = 5;
        let open = decision("ETHUSDT", DecisionAction::OpenLong, dec!(50), 1);
        let report = ConstraintEngine::new().evaluate(&[avg, open], &constraints(), 2);
        assert_eq!(report.accepted.len(), 2);
        assert_eq!(report.accepted[0].max_average_count, 2);
    }

    #[test]
    fn hold_dropped_close_passes_through() {
        let report = ConstraintEngine::new().evaluate(
            &[
                decision("A", DecisionAction::Hold, dec!(0), 1),
                decision("B", DecisionAction::Close, dec!(0), 1),
            ],
            &constraints(),
            3,
        );
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.accepted[0].action, DecisionAction::Close);
        assert_eq!(report.rejected[0].1, RejectionReason::NoAction);
    }

    #[test]
    fn priority_order_is_stable() {
        let mut low = decision("LOW", DecisionAction::OpenLong, dec!(100), 1);
        low.priority = 1;
        let mut high = decision("HIGH", DecisionAction::OpenLong, dec!(100), 1);
        high.priority = 5;
        let tie = decision("TIE", DecisionAction::OpenLong, dec!(100), 1);
        let mut tie2 = decision("TIE2", DecisionAction::OpenLong, dec!(100), 1);
        tie2.priority = 1;

        let mut limits = constraints();
        limits.max_positions = 10;
        let out = ConstraintEngine::new().apply(&[low, tie, high, tie2], &limits, 0);
        let order: Vec<_> = out.iter().map(|d| d.symbol.as_str().to_string()).collect();
        assert_eq!(order, vec!["HIGH", "LOW", "TIE2", "TIE"]);
    }

    fn arb_action() -> impl Strategy<Value = DecisionAction> {
        prop_oneof![
            Just(DecisionAction::OpenLong),
            Just(DecisionAction::OpenShort),
            Just(DecisionAction::AverageDown),
            Just(DecisionAction::AverageUp),
            Just(DecisionAction::Close),
            Just(DecisionAction::Hold),
        ]
    }

    fn arb_decision() -> impl Strategy<Value = TradeDecision> {
        (arb_action(), 0u64..5_000, 0u32..50, -3i32..3).prop_map(|(action, size, lev, prio)| {
            let mut d = decision("XUSDT", action, Decimal::from(size), lev);
            d.priority = prio;
            d.max_average_count = lev;
            d
        })
    }

    proptest! {
        #[test]
        fn accepted_batch_respects_limits(
            batch in prop::collection::vec(arb_decision(), 0..30),
            open in 0u32..6,
            max_positions in 0u32..8,
            max_leverage in 1u32..20,
            max_total in 0u64..5_000,
        ) {
            let limits = ConstraintSet {
                max_positions,
                max_leverage,
                max_position_size_usd: dec!(800),
                max_total_usd: Decimal::from(max_total),
                allow_averaging: true,
                max_averages: 3,
                min_meaningful_size_usd: dec!(10),
            };
            let report = ConstraintEngine::new().evaluate(&batch, &limits, open);

            prop_assert!(report.committed_usd() <= limits.max_total_usd);
            prop_assert_eq!(report.accepted.len() + report.rejected.len(), batch.len());

            let mut opened = 0u32;
            for d in &report.accepted {
                if d.action.is_opening() || d.action.is_averaging() {
                    prop_assert!(d.proposed_leverage >= 1 && d.proposed_leverage <= max_leverage);
                    prop_assert!(d.proposed_size_usd <= limits.max_position_size_usd);
                }
                if d.action.is_averaging() {
                    prop_assert!(d.max_average_count <= limits.max_averages);
                }
                if d.action.is_opening() {
                    opened += 1;
                }
                prop_assert!(d.action != DecisionAction::Hold);
            }
            if opened > 0 {
                prop_assert!(open + opened <= max_positions);
            }
        }
    }
}
