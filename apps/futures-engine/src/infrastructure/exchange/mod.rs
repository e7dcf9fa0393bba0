//! Exchange adapters.
//!
//! - `binance`: USDⓈ-M futures REST client
//! - `paper`: in-memory exchange for dry runs

pub mod binance;
pub mod paper;

pub use paper::{ManualPriceSource, PaperExchange};
