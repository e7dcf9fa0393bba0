//! Binance USDⓈ-M Futures Adapter
//!
//! Production implementation of `ExchangePort` with:
//! - HMAC-SHA256 request signing with a fresh timestamp per attempt
//! - Shared admission control (weight and order budgets, ban circuit)
//! - Retry with exponential backoff on transient failures
//! - Regular and conditional (algo) order venues

mod api_types;
mod client;
mod config;
mod endpoints;
mod error;
mod error_codes;
mod executor;
mod params;
mod signer;

pub use api_types::{
    AlgoStatus, BinanceAccount, BinanceAlgoOrderResponse, BinanceIncome, BinanceOrderResponse,
    BinanceOrderStatus, BinancePositionRisk, BinancePremiumIndex,
};
pub use client::FuturesClient;
pub use config::{BinanceConfig, BinanceEnvironment, Credentials};
pub use endpoints::Endpoint;
pub use error::BinanceError;
pub use error_codes::{ErrorClass, class_of_code, classify};
pub use executor::SignedRequestExecutor;
pub use params::{
    ConditionalType, IncomeQuery, LeverageChange, MarginType, MarginTypeChange, NewAlgoOrder,
    NewOrder, OrderQuery, PositionModeChange, RegularOrderType, RequestParams, WirePositionSide,
};
pub use signer::{RequestSigner, SignedQuery, canonical_query, sign};
