//! Protective stop, take-profit ladder and exchange trailing.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{error, info, warn};

use super::{ChainManager, ChainManagerError, TakeProfitStep, TrailingMode, adverse, favourable};
use crate::application::ports::{ExchangeError, ExchangePort, PlaceOrderRequest};
use crate::domain::order_chain::{Chain, LegOrderType, LegRole, LegStatus, OrderLeg, StopState};

/// Immediate-trigger rejection for conditional orders.
const WOULD_TRIGGER_IMMEDIATELY: i64 = -2021;

const MIN_CALLBACK_RATE: Decimal = dec!(0.1);
const MAX_CALLBACK_RATE: Decimal = dec!(5);

enum StopAction {
    Keep,
    Place,
    Resize(OrderLeg),
}

impl<E: ExchangePort + ?Sized> ChainManager<E> {
    /// Bring the chain's protection in line with its open quantity.
    ///
    /// Failures mark the chain unprotected; the next reconcile retries.
    pub(super) async fn ensure_protection(&self, chain: &mut Chain) {
        if !chain.needs_protection() {
            return;
        }
        self.cancel_superseded_stops(chain).await;

        let now = Utc::now();
        match self.ensure_stop(chain).await {
            Ok(()) => chain.record_protection_restored(now),
            Err(reason) => {
                error!(
                    chain_id = %chain.chain_id(),
                    symbol = %chain.symbol(),
                    open_quantity = %chain.open_quantity(),
                    reason = %reason,
                    "Position unprotected"
                );
                chain.record_protection_failure(reason, now);
            }
        }

        if chain.status().is_open() {
            self.ensure_take_profits(chain).await;
            self.ensure_exchange_trailing(chain).await;
        }
    }

    async fn ensure_stop(&self, chain: &mut Chain) -> Result<(), String> {
        let open = chain.open_quantity();
        let action = match chain.stop_state() {
            StopState::Missing => StopAction::Place,
            StopState::Unconfirmed(leg) => {
                return Err(format!("stop {} not yet confirmed", leg.leg_id()));
            }
            StopState::Confirmed(leg) if leg.remaining_quantity() < open => {
                StopAction::Resize(leg.clone())
            }
            StopState::Confirmed(_) => StopAction::Keep,
        };

        match action {
            StopAction::Keep => Ok(()),
            StopAction::Place => {
                let stop_price = self
                    .stop_price_for(chain)
                    .ok_or_else(|| "no average entry price".to_string())?;
                self.place_stop(chain, stop_price, open).await
            }
            StopAction::Resize(previous) => {
                let stop_price = previous
                    .stop_price()
                    .or_else(|| self.stop_price_for(chain))
                    .ok_or_else(|| "no stop price".to_string())?;
                info!(
                    chain_id = %chain.chain_id(),
                    previous = %previous.leg_id(),
                    quantity = %open,
                    "Resizing protective stop"
                );
                self.place_stop(chain, stop_price, open).await?;
                if let Err(e) = self.cancel_leg(chain, &previous).await {
                    warn!(leg_id = %previous.leg_id(), error = %e, "Undersized stop left working");
                }
                Ok(())
            }
        }
    }

    /// Stop price for a new stop: the last placed stop's price, otherwise
    /// the configured distance from the average entry.
    fn stop_price_for(&self, chain: &Chain) -> Option<Decimal> {
        let stop_role = chain.kind().stop_role();
        let previous = chain
            .legs()
            .iter()
            .rev()
            .filter(|l| l.role() == stop_role && l.status() != LegStatus::Rejected)
            .find_map(OrderLeg::stop_price);
        if previous.is_some() {
            return previous;
        }
        let average = chain.average_entry_price()?;
        let percent = chain
            .targets()
            .stop_loss_percent
            .unwrap_or(self.config.default_stop_loss_percent);
        let filters = self.config.filters_for(chain.symbol());
        Some(filters.round_price(adverse(chain.position_side(), average, percent)))
    }

    async fn place_stop(
        &self,
        chain: &mut Chain,
        stop_price: Decimal,
        quantity: Decimal,
    ) -> Result<(), String> {
        let leg = self.new_leg(
            chain,
            chain.kind().stop_role(),
            LegOrderType::StopMarket,
            chain.position_side().exit_side(),
            None,
            Some(stop_price),
            quantity,
        );
        let leg_id = leg.leg_id().clone();
        let request = PlaceOrderRequest::for_leg(&leg, chain.symbol(), chain.position_side())
            .ok_or_else(|| format!("stop {leg_id} has no trigger price"))?;
        chain
            .add_leg(leg, Utc::now())
            .map_err(|e| e.to_string())?;

        let attempts = self.config.protection_retry.attempts();
        let delay = self.config.protection_retry.delay();
        let mut attempt = 1;
        loop {
            match self.submit(chain, &leg_id, request.clone()).await {
                Ok(()) => {
                    info!(
                        chain_id = %chain.chain_id(),
                        leg_id = %leg_id,
                        stop_price = %stop_price,
                        quantity = %quantity,
                        "Protective stop placed"
                    );
                    return Ok(());
                }
                Err(ChainManagerError::Exchange(ExchangeError::Rejected { code, .. }))
                    if code == WOULD_TRIGGER_IMMEDIATELY =>
                {
                    return self.emergency_close(chain, stop_price).await;
                }
                Err(ChainManagerError::Exchange(e)) if e.is_transient() && attempt < attempts => {
                    warn!(
                        leg_id = %leg_id,
                        attempt,
                        attempts,
                        error = %e,
                        "Stop placement failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.to_string()),
            }
        }
    }

    /// Price is already through the stop: exit the open quantity at market.
    async fn emergency_close(&self, chain: &mut Chain, stop_price: Decimal) -> Result<(), String> {
        let open = chain.open_quantity();
        error!(
            chain_id = %chain.chain_id(),
            stop_price = %stop_price,
            quantity = %open,
            "Stop would trigger immediately, closing at market"
        );
        if chain
            .working_legs()
            .any(|l| l.role() == LegRole::Close)
        {
            return Ok(());
        }
        self.place_close(chain, open)
            .await
            .map_err(|e| format!("emergency close failed: {e}"))
    }

    /// Cancel stops left working behind a newer stop.
    async fn cancel_superseded_stops(&self, chain: &mut Chain) {
        let stop_role = chain.kind().stop_role();
        let mut working: Vec<OrderLeg> = chain
            .working_legs()
            .filter(|l| l.role() == stop_role)
            .cloned()
            .collect();
        working.pop();
        for leg in working {
            if let Err(e) = self.cancel_leg(chain, &leg).await {
                warn!(leg_id = %leg.leg_id(), error = %e, "Superseded stop still working");
            }
        }
    }

    /// Place the take-profit ladder once the entry is done filling.
    async fn ensure_take_profits(&self, chain: &mut Chain) {
        let Some(percent) = chain.targets().take_profit_percent else {
            return;
        };
        if chain.live_entry().is_some() || chain.legs().iter().any(|l| l.role().is_take_profit()) {
            return;
        }
        let Some(average) = chain.average_entry_price() else {
            return;
        };

        let steps: Vec<TakeProfitStep> = if chain.kind().parent().is_some() {
            vec![TakeProfitStep {
                fraction: Decimal::ONE,
                distance_multiple: Decimal::ONE,
            }]
        } else {
            self.config
                .take_profit_ladder
                .iter()
                .take(usize::from(chain.policy().max_take_profits))
                .copied()
                .collect()
        };

        let filters = self.config.filters_for(chain.symbol());
        let side = chain.position_side();
        let open = chain.open_quantity();
        let mut remaining = open;
        for (i, step) in steps.iter().enumerate() {
            let quantity = if i + 1 == steps.len() {
                remaining
            } else {
                filters.round_quantity(open * step.fraction).min(remaining)
            };
            if quantity <= Decimal::ZERO {
                continue;
            }
            remaining -= quantity;
            let price = filters.round_price(favourable(side, average, percent * step.distance_multiple));
            let role = chain
                .kind()
                .take_profit_role(u8::try_from(i + 1).unwrap_or(u8::MAX));
            let leg = self.new_leg(
                chain,
                role,
                LegOrderType::TakeProfitMarket,
                side.exit_side(),
                None,
                Some(price),
                quantity,
            );
            if let Err(e) = self.issue_leg(chain, leg).await {
                warn!(chain_id = %chain.chain_id(), role = %role, error = %e, "Take-profit not placed");
            }
        }
    }

    /// Place an exchange-native trailing stop behind a confirmed stop.
    async fn ensure_exchange_trailing(&self, chain: &mut Chain) {
        let trailing = &self.config.trailing;
        if !trailing.enabled || trailing.mode != TrailingMode::Exchange {
            return;
        }
        if chain.live_entry().is_some()
            || chain.legs().iter().any(|l| l.role() == LegRole::Trailing)
            || !matches!(chain.stop_state(), StopState::Confirmed(_))
        {
            return;
        }
        let Some(average) = chain.average_entry_price() else {
            return;
        };

        let filters = self.config.filters_for(chain.symbol());
        let side = chain.position_side();
        let callback_rate = trailing
            .callback_percent
            .clamp(MIN_CALLBACK_RATE, MAX_CALLBACK_RATE);
        let activation = filters.round_price(favourable(side, average, trailing.activation_percent));
        let leg = self.new_leg(
            chain,
            LegRole::Trailing,
            LegOrderType::TrailingStop { callback_rate },
            side.exit_side(),
            None,
            Some(activation),
            chain.open_quantity(),
        );
        if let Err(e) = self.issue_leg(chain, leg).await {
            warn!(chain_id = %chain.chain_id(), error = %e, "Trailing stop not placed");
        }
    }

    /// Replace the confirmed stop with a tighter one.
    pub(super) async fn tighten_stop(
        &self,
        chain: &mut Chain,
        stop_price: Decimal,
    ) -> Result<bool, ChainManagerError> {
        let StopState::Confirmed(current) = chain.stop_state() else {
            return Ok(false);
        };
        let current = current.clone();
        let Some(current_stop) = current.stop_price() else {
            return Ok(false);
        };
        let stop_price = self.config.filters_for(chain.symbol()).round_price(stop_price);
        let quantity = chain.open_quantity();
        if quantity.is_zero() || !chain.is_tighter(stop_price, current_stop) {
            return Ok(false);
        }

        let leg = self.new_leg(
            chain,
            current.role(),
            LegOrderType::StopMarket,
            chain.position_side().exit_side(),
            None,
            Some(stop_price),
            quantity,
        );
        let leg_id = leg.leg_id().clone();
        self.issue_leg(chain, leg).await?;

        if let Err(e) = self.cancel_leg(chain, &current).await {
            warn!(
                leg_id = %current.leg_id(),
                error = %e,
                "Previous stop still working, cancel retried on next tick"
            );
        }
        info!(
            chain_id = %chain.chain_id(),
            previous = %current_stop,
            stop_price = %stop_price,
            "Stop tightened"
        );
        chain.record_stop_tightened(
            current.leg_id().clone(),
            leg_id,
            current_stop,
            stop_price,
            Utc::now(),
        );
        Ok(true)
    }
}
