//! One monitor tick for one chain.

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::{ChainManager, ChainManagerError, TrailingMode, adverse, adverse_move_pct};
use crate::application::ports::{ExchangeError, ExchangePort, OrderRef, PlaceOrderRequest};
use crate::domain::order_chain::{
    Chain, ChainKind, ChainStatus, LegOrderType, LegRole, LegStatus, OrderLeg, ProtectionState,
};
use crate::domain::shared::ChainId;

/// What one reconcile pass saw and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Chain reconciled.
    pub chain_id: ChainId,
    /// Status after the pass.
    pub status: ChainStatus,
    /// Protection after the pass.
    pub protection: ProtectionState,
    /// Mark price used, if it could be fetched.
    pub mark_price: Option<Decimal>,
    /// Legs whose state changed.
    pub legs_changed: usize,
    /// Stop moved by client trailing.
    pub stop_tightened: bool,
    /// Hedge opened by the loss trigger.
    pub hedge_opened: Option<ChainId>,
    /// Chain left the registry.
    pub retired: bool,
    /// Failures that did not abort the pass.
    pub errors: Vec<String>,
}

impl TickReport {
    /// Short label for metrics.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        if !self.errors.is_empty() {
            "error"
        } else if self.retired {
            "retired"
        } else if self.protection.is_unprotected() {
            "unprotected"
        } else {
            "ok"
        }
    }
}

impl<E: ExchangePort + ?Sized> ChainManager<E> {
    /// Reconcile a chain with the exchange.
    ///
    /// Refreshes every working leg, re-sends legs the exchange never saw,
    /// cancels exits left over once flat, restores protection, trails the
    /// stop, places a rebuy after a take-profit, and opens a hedge when the
    /// loss trigger is reached.
    pub async fn reconcile(&self, chain_id: &ChainId) -> Result<TickReport, ChainManagerError> {
        let handle = self
            .registry
            .get(chain_id)
            .ok_or_else(|| ChainManagerError::ChainNotFound(chain_id.clone()))?;
        let mut chain = handle.lock().await;
        let mut errors = Vec::new();

        let mark_price = match self.exchange.mark_price(chain.symbol()).await {
            Ok(price) => Some(price),
            Err(e) => {
                errors.push(format!("mark price: {e}"));
                None
            }
        };

        let legs_changed = self.sync_legs(&mut chain, &mut errors).await;
        self.withdraw_orphan_entry(&mut chain, &mut errors).await;
        self.cancel_dangling_exits(&mut chain).await;
        self.ensure_protection(&mut chain).await;

        let mut stop_tightened = false;
        let mut hedge_wanted = false;
        if let Some(mark) = mark_price {
            match self.trail_stop(&mut chain, mark).await {
                Ok(tightened) => stop_tightened = tightened,
                Err(e) => errors.push(format!("trailing: {e}")),
            }
            if let Err(e) = self.ensure_rebuy(&mut chain).await {
                errors.push(format!("rebuy: {e}"));
            }
            hedge_wanted = self.hedge_triggered(&chain, mark);
        }

        let status = chain.status();
        let protection = chain.protection().clone();
        let retired = self.settle(&mut chain).await;
        drop(chain);

        let mut hedge_opened = None;
        if hedge_wanted && !retired {
            match self.open_hedge(chain_id).await {
                Ok(hedge_id) => hedge_opened = Some(hedge_id),
                Err(ChainManagerError::HedgeRefused(reason)) => {
                    debug!(chain_id = %chain_id, reason = %reason, "Hedge not opened");
                }
                Err(e) => errors.push(format!("hedge: {e}")),
            }
        }

        Ok(TickReport {
            chain_id: chain_id.clone(),
            status,
            protection,
            mark_price,
            legs_changed,
            stop_tightened,
            hedge_opened,
            retired,
            errors,
        })
    }

    /// Query every working leg. Legs never acknowledged and unknown to the
    /// exchange are re-sent under the same token.
    async fn sync_legs(&self, chain: &mut Chain, errors: &mut Vec<String>) -> usize {
        let working: Vec<OrderLeg> = chain.working_legs().cloned().collect();
        let mut changed = 0;
        for leg in working {
            match self
                .exchange
                .query_order(chain.symbol(), &OrderRef::for_leg(&leg))
                .await
            {
                Ok(state) => {
                    if self.apply_state(chain, leg.leg_id(), &state) {
                        changed += 1;
                    }
                }
                Err(ExchangeError::NotFound { .. }) if !leg.is_confirmed() => {
                    let Some(request) =
                        PlaceOrderRequest::for_leg(&leg, chain.symbol(), chain.position_side())
                    else {
                        continue;
                    };
                    info!(
                        chain_id = %chain.chain_id(),
                        leg_id = %leg.leg_id(),
                        "Re-sending unacknowledged leg"
                    );
                    match self.submit(chain, leg.leg_id(), request).await {
                        Ok(()) => changed += 1,
                        Err(e) => errors.push(format!("{}: {e}", leg.leg_id())),
                    }
                }
                Err(ExchangeError::NotFound { .. }) => {
                    warn!(
                        chain_id = %chain.chain_id(),
                        leg_id = %leg.leg_id(),
                        "Acknowledged leg unknown to exchange"
                    );
                    errors.push(format!("{}: not found", leg.leg_id()));
                }
                Err(e) => errors.push(format!("{}: {e}", leg.leg_id())),
            }
        }
        changed
    }

    /// Cancel a working averaging or rebuy entry once the position went flat.
    async fn withdraw_orphan_entry(&self, chain: &mut Chain, errors: &mut Vec<String>) {
        if !chain.open_quantity().is_zero() || chain.exit_filled_quantity().is_zero() {
            return;
        }
        let Some(entry) = chain
            .live_entry()
            .filter(|l| matches!(l.role(), LegRole::Dca(_) | LegRole::Rebuy))
            .cloned()
        else {
            return;
        };
        info!(
            chain_id = %chain.chain_id(),
            leg_id = %entry.leg_id(),
            "Position flat, withdrawing working entry"
        );
        if let Err(e) = self.cancel_leg(chain, &entry).await {
            errors.push(format!("{}: {e}", entry.leg_id()));
        }
    }

    /// Client-side trailing: tighten the stop behind the best price once
    /// profit reached the activation distance.
    async fn trail_stop(&self, chain: &mut Chain, mark: Decimal) -> Result<bool, ChainManagerError> {
        chain.observe_price(mark);
        let trailing = &self.config.trailing;
        if !trailing.enabled || trailing.mode != TrailingMode::Client || !chain.status().is_open() {
            return Ok(false);
        }
        let (Some(best), Some(average)) = (chain.best_price(), chain.average_entry_price()) else {
            return Ok(false);
        };
        let side = chain.position_side();
        let gain = -adverse_move_pct(side, average, best);
        if gain < trailing.activation_percent {
            return Ok(false);
        }
        let candidate = adverse(side, best, trailing.callback_percent);
        self.tighten_stop(chain, candidate).await
    }

    /// After a take-profit fill, rest a limit to re-enter on a pullback.
    async fn ensure_rebuy(&self, chain: &mut Chain) -> Result<(), ChainManagerError> {
        let rebuy = &self.config.rebuy;
        if !rebuy.enabled || *chain.kind() != ChainKind::Primary || !chain.status().is_open() {
            return Ok(());
        }
        if chain.live_entry().is_some() || chain.legs().iter().any(|l| l.role() == LegRole::Rebuy) {
            return Ok(());
        }
        let allowance = usize::try_from(self.config.averaging.max_entries_per_position)
            .unwrap_or(usize::MAX);
        if chain.entry_count() >= allowance {
            return Ok(());
        }
        let Some((fill_price, quantity)) = chain
            .legs()
            .iter()
            .filter(|l| l.role().is_take_profit() && l.status() == LegStatus::Filled)
            .find_map(|l| l.avg_fill_price().map(|p| (p, l.filled_quantity())))
        else {
            return Ok(());
        };

        let side = chain.position_side();
        let price = self
            .config
            .filters_for(chain.symbol())
            .round_price(adverse(side, fill_price, rebuy.pullback_percent));
        let leg = self.new_leg(
            chain,
            LegRole::Rebuy,
            LegOrderType::Limit,
            side.entry_side(),
            Some(price),
            None,
            quantity,
        );
        info!(
            chain_id = %chain.chain_id(),
            take_profit_price = %fill_price,
            price = %price,
            quantity = %quantity,
            "Placing rebuy"
        );
        self.issue_leg(chain, leg).await
    }

    fn hedge_triggered(&self, chain: &Chain, mark: Decimal) -> bool {
        let hedge = &self.config.hedge;
        let Some(trigger) = hedge.trigger_loss_percent else {
            return false;
        };
        if !hedge.enabled || *chain.kind() != ChainKind::Primary || !chain.status().is_open() {
            return false;
        }
        if self.registry.hedges_of(chain.chain_id()).len() >= hedge.max_simultaneous {
            return false;
        }
        chain
            .average_entry_price()
            .is_some_and(|average| adverse_move_pct(chain.position_side(), average, mark) >= trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn report() -> TickReport {
        TickReport {
            chain_id: ChainId::new("SCA-16OCT-00001"),
            status: ChainStatus::Active,
            protection: ProtectionState::Protected,
            mark_price: None,
            legs_changed: 0,
            stop_tightened: false,
            hedge_opened: None,
            retired: false,
            errors: Vec::new(),
        }
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(report().outcome(), "ok");

        let mut retired = report();
        retired.retired = true;
        assert_eq!(retired.outcome(), "retired");

        let mut exposed = report();
        exposed.protection = ProtectionState::Unprotected {
            since: Utc::now(),
            failures: 2,
            reason: "timeout".to_string(),
        };
        assert_eq!(exposed.outcome(), "unprotected");

        let mut failed = exposed;
        failed.errors.push("mark price: timeout".to_string());
        assert_eq!(failed.outcome(), "error");
    }
}
