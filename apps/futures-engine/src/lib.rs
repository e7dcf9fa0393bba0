// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Futures Engine - Rust Core Library
//!
//! Execution core for USD-margined perpetual futures: gates strategy
//! decisions through hard risk limits, turns them into multi-leg order
//! chains, and keeps every open chain protected.
//!
//! # Architecture (Clean Architecture + DDD + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Core business logic (aggregates, value objects, domain events)
//!   - `order_chain`: Chain aggregate, legs, client order ids, lifecycle events
//!   - `risk_management`: Trade decisions, constraint sets, constraint engine
//!
//! - **Application**: Use cases and orchestration
//!   - `ports`: Interfaces for external systems (`ExchangePort`, `EventPublisherPort`)
//!   - `services`: `ChainManager`, `PositionMonitor`, chain registry
//!   - `use_cases`: `ExecuteDecisions`
//!
//! - **Infrastructure**: Adapters (implementations)
//!   - `exchange`: Binance futures client and the paper exchange
//!   - `events`: Logging and broadcast publishers
//!
//! Cross-cutting: `resilience` (admission control, retry), `observability`
//! (Prometheus metrics), and `config` (YAML settings).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Cross-cutting
// =============================================================================

/// Configuration loading and validation.
pub mod config;

/// Metrics export.
pub mod observability;

/// Admission control and retry.
pub mod resilience;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::order_chain::{
    Chain, ChainEvent, ChainEventKind, ChainKind, ChainStatus, LegRole, LegStatus, OrderLeg,
    PositionSide, TradingMode,
};
pub use domain::risk_management::{
    ConstraintEngine, ConstraintReport, ConstraintSet, DecisionAction, TradeDecision,
};
pub use domain::shared::{ChainId, ClientOrderId, Symbol};

// Application re-exports
pub use application::ports::{EventPublisherPort, ExchangeError, ExchangePort, NoOpEventPublisher};
pub use application::services::{ChainManager, ChainManagerConfig, PositionMonitor};
pub use application::use_cases::{DecisionOutcome, ExecuteDecisionsUseCase, ExecutionSummary};

// Infrastructure re-exports
pub use infrastructure::exchange::binance::{
    BinanceConfig, BinanceEnvironment, Credentials, FuturesClient, SignedRequestExecutor,
};
pub use infrastructure::exchange::{ManualPriceSource, PaperExchange};
pub use resilience::{AdmissionConfig, AdmissionController, RequestPriority};
