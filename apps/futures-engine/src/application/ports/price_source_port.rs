//! Price Source Port (Driven Port)
//!
//! Mark prices for the paper exchange. The live exchange client is one
//! implementation, so a dry run can trade against real prices.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::exchange_port::ExchangeError;
use crate::domain::shared::Symbol;

/// Port for reading mark prices.
#[async_trait]
pub trait PriceSourcePort: Send + Sync {
    /// Current mark price of `symbol`.
    async fn mark_price(&self, symbol: &Symbol) -> Result<Decimal, ExchangeError>;
}

#[async_trait]
impl<T: PriceSourcePort + ?Sized> PriceSourcePort for std::sync::Arc<T> {
    async fn mark_price(&self, symbol: &Symbol) -> Result<Decimal, ExchangeError> {
        (**self).mark_price(symbol).await
    }
}
