//! Configuration Loading Tests
//!
//! Loads configuration from files on disk, including the shipped
//! `config/default.yaml`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::Write;
use std::time::Duration;

use futures_engine::application::services::chain_manager::{ProtectionRetryPolicy, TrailingMode};
use futures_engine::config::{ConfigError, ExchangeEnvironment, LogFormat, load_config};
use futures_engine::domain::order_chain::TradingMode;
use futures_engine::domain::shared::Symbol;
use rust_decimal_macros::dec;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

// ============================================
// Shipped Config
// ============================================

#[test]
fn test_shipped_default_config_loads() {
    let path = format!("{}/config/default.yaml", env!("CARGO_MANIFEST_DIR"));
    let config = load_config(Some(&path)).unwrap();

    assert_eq!(config.exchange.environment, ExchangeEnvironment::Testnet);
    assert!(!config.exchange.hedge_mode);
    assert_eq!(config.observability.logging.format, LogFormat::Text);
    assert!(config.metrics_config().unwrap().is_none());

    let sets = config.constraint_sets();
    assert_eq!(sets[&TradingMode::Scalp].max_leverage, 15);
    assert!(sets[&TradingMode::Scalp].allow_averaging);
    assert!(!sets[&TradingMode::UltraFast].allow_averaging);
    assert_eq!(sets[&TradingMode::Swing].max_total_usd, dec!(2000));

    let chains = config.chain_manager_config();
    assert_eq!(chains.take_profit_ladder.len(), 2);
    assert_eq!(chains.averaging.cooldown, Duration::from_secs(900));
    assert_eq!(chains.trailing.mode, TrailingMode::Client);
    assert_eq!(chains.protection_retry, ProtectionRetryPolicy::NextTick);
    assert_eq!(chains.filters_for(&Symbol::new("BTCUSDT")).tick_size, dec!(0.1));

    let admission = config.admission_config();
    assert_eq!(admission.default_ban, Duration::from_secs(120));
    assert_eq!(admission.wait_ceiling, Duration::from_secs(30));
}

// ============================================
// Files on Disk
// ============================================

#[test]
fn test_load_from_file() {
    let file = write_config(
        r"
engine:
  mode: ultra_fast
  dry_run: true
exchange:
  hedge_mode: true
chains:
  hedge:
    enabled: true
    max_simultaneous: 2
monitor:
  tick_interval_ms: 1500
",
    );
    let config = load_config(file.path().to_str()).unwrap();

    assert_eq!(config.engine.mode, TradingMode::UltraFast);
    assert_eq!(config.chain_manager_config().hedge.max_simultaneous, 2);
    assert_eq!(config.monitor_config().tick_interval, Duration::from_millis(1500));
}

#[test]
fn test_missing_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");
    let err = load_config(path.to_str()).unwrap_err();

    assert!(matches!(err, ConfigError::ReadError { .. }));
    assert!(err.to_string().contains("absent.yaml"));
}

#[test]
fn test_malformed_yaml_is_parse_error() {
    let file = write_config("engine: [unterminated\n");
    let err = load_config(file.path().to_str()).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn test_invalid_values_fail_validation() {
    let file = write_config(
        r"
retry:
  max_attempts: 0
",
    );
    let err = load_config(file.path().to_str()).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));
}

#[test]
fn test_env_defaults_apply_in_files() {
    let file = write_config(
        r"
engine:
  mode: ${FUTURES_ENGINE_CONFIG_TEST_UNSET_MODE:-position}
exchange:
  api_key: ${FUTURES_ENGINE_CONFIG_TEST_UNSET_KEY}
",
    );
    let config = load_config(file.path().to_str()).unwrap();

    assert_eq!(config.engine.mode, TradingMode::Position);
    assert!(config.exchange.api_key.is_empty());
    assert!(config.binance_config().credentials.is_none());
}
