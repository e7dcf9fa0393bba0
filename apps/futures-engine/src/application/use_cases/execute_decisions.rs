//! Execute Decisions Use Case
//!
//! Gates a batch of trade decisions through the constraint engine and hands
//! each accepted one to the chain manager.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::application::ports::ExchangePort;
use crate::application::services::{ChainManager, ChainManagerError};
use crate::domain::order_chain::TradingMode;
use crate::domain::risk_management::{
    Adjustment, ConstraintEngine, ConstraintSet, DecisionAction, RejectionReason, TradeDecision,
};
use crate::domain::shared::{ChainId, ClientOrderId, Symbol};
use crate::observability::metrics;

/// What happened to one accepted decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// New primary chain.
    Opened {
        /// Symbol.
        symbol: Symbol,
        /// Chain opened.
        chain_id: ChainId,
    },
    /// Averaging leg placed on an existing chain.
    Averaged {
        /// Symbol.
        symbol: Symbol,
        /// Leg placed.
        leg_id: ClientOrderId,
    },
    /// Opposite-side decision turned into a hedge.
    Hedged {
        /// Symbol.
        symbol: Symbol,
        /// Chain hedged.
        parent: ChainId,
        /// Hedge chain.
        chain_id: ChainId,
    },
    /// Chains on the symbol closed.
    Closed {
        /// Symbol.
        symbol: Symbol,
        /// Chains closed.
        chains: Vec<ChainId>,
    },
    /// Nothing to do.
    Skipped {
        /// Symbol.
        symbol: Symbol,
        /// Why.
        reason: String,
    },
    /// The manager refused or the exchange failed.
    Failed {
        /// Symbol.
        symbol: Symbol,
        /// Action attempted.
        action: DecisionAction,
        /// Error text.
        error: String,
    },
}

impl DecisionOutcome {
    /// Label for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Opened { .. } => "opened",
            Self::Averaged { .. } => "averaged",
            Self::Hedged { .. } => "hedged",
            Self::Closed { .. } => "closed",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened { symbol, chain_id } => write!(f, "{symbol}: opened {chain_id}"),
            Self::Averaged { symbol, leg_id } => write!(f, "{symbol}: averaged with {leg_id}"),
            Self::Hedged {
                symbol,
                parent,
                chain_id,
            } => write!(f, "{symbol}: hedged {parent} with {chain_id}"),
            Self::Closed { symbol, chains } => write!(f, "{symbol}: closed {} chain(s)", chains.len()),
            Self::Skipped { symbol, reason } => write!(f, "{symbol}: skipped, {reason}"),
            Self::Failed {
                symbol,
                action,
                error,
            } => write!(f, "{symbol}: {action} failed, {error}"),
        }
    }
}

/// Result of one batch.
#[derive(Debug, Clone, Default)]
pub struct ExecutionSummary {
    /// Outcome per accepted decision, in processing order.
    pub outcomes: Vec<DecisionOutcome>,
    /// Decisions the constraint engine dropped.
    pub rejected: Vec<(TradeDecision, RejectionReason)>,
    /// Clamps applied before execution.
    pub adjustments: Vec<(Symbol, Adjustment)>,
}

/// Use case for executing strategy decisions.
pub struct ExecuteDecisionsUseCase<E: ?Sized> {
    manager: Arc<ChainManager<E>>,
    engine: ConstraintEngine,
    constraints: HashMap<TradingMode, ConstraintSet>,
}

impl<E: ExchangePort + ?Sized> ExecuteDecisionsUseCase<E> {
    /// Create the use case with per-mode constraint sets.
    pub fn new(
        manager: Arc<ChainManager<E>>,
        constraints: HashMap<TradingMode, ConstraintSet>,
    ) -> Self {
        Self {
            manager,
            engine: ConstraintEngine::new(),
            constraints,
        }
    }

    /// Constraints for a mode; the defaults when none are configured.
    #[must_use]
    pub fn constraints_for(&self, mode: TradingMode) -> ConstraintSet {
        self.constraints.get(&mode).cloned().unwrap_or_default()
    }

    /// Execute the use case.
    pub async fn execute(&self, decisions: &[TradeDecision], mode: TradingMode) -> ExecutionSummary {
        let constraints = self.constraints_for(mode);
        let report = self
            .engine
            .evaluate(decisions, &constraints, self.manager.open_position_count());

        for (decision, reason) in &report.rejected {
            tracing::info!(
                symbol = %decision.symbol,
                action = %decision.action,
                reason = %reason,
                "Decision rejected"
            );
            metrics::record_decision("rejected", &decision.action.to_string());
        }
        for (symbol, adjustment) in &report.adjustments {
            tracing::debug!(symbol = %symbol, adjustment = ?adjustment, "Decision adjusted");
        }

        let mut outcomes = Vec::with_capacity(report.accepted.len());
        for decision in &report.accepted {
            let outcome = self.dispatch(decision, mode).await;
            match &outcome {
                DecisionOutcome::Failed { .. } => tracing::warn!(outcome = %outcome, "Decision failed"),
                _ => tracing::info!(outcome = %outcome, "Decision executed"),
            }
            metrics::record_decision(outcome.label(), &decision.action.to_string());
            outcomes.push(outcome);
        }

        ExecutionSummary {
            outcomes,
            rejected: report.rejected,
            adjustments: report.adjustments,
        }
    }

    async fn dispatch(&self, decision: &TradeDecision, mode: TradingMode) -> DecisionOutcome {
        let symbol = decision.symbol.clone();
        let registry = self.manager.registry();
        match decision.action {
            DecisionAction::OpenLong | DecisionAction::OpenShort => {
                let Some(side) = decision.action.position_side() else {
                    return skipped(symbol, "no direction");
                };
                if registry.primary_for(&symbol, side).is_some() {
                    return skipped(symbol, format!("{side} chain already open"));
                }
                if let Some(opposite) = registry.primary_for(&symbol, side.opposite()) {
                    if !self.manager.config().hedge.enabled {
                        return skipped(symbol, format!("{} chain open, hedging disabled", side.opposite()));
                    }
                    return match self.manager.open_hedge_for(&opposite.chain_id, decision).await {
                        Ok(chain_id) => DecisionOutcome::Hedged {
                            symbol,
                            parent: opposite.chain_id,
                            chain_id,
                        },
                        Err(e) => failed(decision, &e),
                    };
                }
                match self.manager.open_chain(decision, mode).await {
                    Ok(chain_id) => DecisionOutcome::Opened { symbol, chain_id },
                    Err(e) => failed(decision, &e),
                }
            }
            DecisionAction::AverageDown | DecisionAction::AverageUp => {
                match self.manager.add_averaging(decision).await {
                    Ok(leg_id) => DecisionOutcome::Averaged { symbol, leg_id },
                    Err(ChainManagerError::AveragingRefused(reason)) => skipped(symbol, reason),
                    Err(e) => failed(decision, &e),
                }
            }
            DecisionAction::Close => {
                let results = self.manager.close_symbol(&symbol).await;
                if results.is_empty() {
                    return skipped(symbol, "no open chain");
                }
                let mut chains = Vec::new();
                let mut errors = Vec::new();
                for (chain_id, result) in results {
                    match result {
                        Ok(()) => chains.push(chain_id),
                        Err(e) => errors.push(format!("{chain_id}: {e}")),
                    }
                }
                if errors.is_empty() {
                    DecisionOutcome::Closed { symbol, chains }
                } else {
                    DecisionOutcome::Failed {
                        symbol,
                        action: decision.action,
                        error: errors.join("; "),
                    }
                }
            }
            DecisionAction::Hold => skipped(symbol, "hold"),
        }
    }
}

fn skipped(symbol: Symbol, reason: impl Into<String>) -> DecisionOutcome {
    DecisionOutcome::Skipped {
        symbol,
        reason: reason.into(),
    }
}

fn failed(decision: &TradeDecision, error: &ChainManagerError) -> DecisionOutcome {
    DecisionOutcome::Failed {
        symbol: decision.symbol.clone(),
        action: decision.action,
        error: error.to_string(),
    }
}
