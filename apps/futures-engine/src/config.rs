//! Configuration module for the futures engine.
//!
//! Loads one YAML file at startup, interpolates environment variables,
//! validates it, and converts each section into the settings type of the
//! component it configures.
//!
//! # Usage
//!
//! ```rust,ignore
//! use futures_engine::config::{Config, load_config};
//!
//! // Load from FUTURES_ENGINE_CONFIG or config/default.yaml
//! let config = load_config(None)?;
//!
//! // Load from custom path
//! let config = load_config(Some("config/testnet.yaml"))?;
//!
//! let admission = config.admission_config();
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::services::PositionMonitorConfig;
use crate::application::services::chain_manager::{
    AveragingConfig, ChainManagerConfig, HedgeConfig, ProtectionRetryPolicy, RebuyConfig,
    SymbolFilters, TakeProfitStep, TrailingConfig, TrailingMode,
};
use crate::domain::order_chain::{ChainPolicy, TradingMode};
use crate::domain::risk_management::ConstraintSet;
use crate::domain::shared::Symbol;
use crate::infrastructure::exchange::binance::{BinanceConfig, BinanceEnvironment, Credentials};
use crate::observability::MetricsConfig;
use crate::resilience::{AdmissionConfig, RetryPolicy};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "FUTURES_ENGINE_CONFIG";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.yaml";

/// Exchange callback rate bounds for trailing stops, in percent.
const CALLBACK_RATE_RANGE: (Decimal, Decimal) = (dec!(0.1), dec!(5));

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Engine-wide settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Exchange connection.
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Request budgets.
    #[serde(default)]
    pub admission: AdmissionSettings,
    /// Retry policy for exchange calls.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Risk constraints per trading mode.
    #[serde(default)]
    pub constraints: ConstraintsConfig,
    /// Chain management.
    #[serde(default)]
    pub chains: ChainsConfig,
    /// Position monitor.
    #[serde(default)]
    pub monitor: MonitorSettings,
    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// =============================================================================
// Engine
// =============================================================================

/// Engine-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Trading mode for decisions that do not name one.
    #[serde(default = "default_mode")]
    pub mode: TradingMode,
    /// Trade against the paper exchange instead of the live API.
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            dry_run: true,
        }
    }
}

const fn default_mode() -> TradingMode {
    TradingMode::Swing
}
const fn default_true() -> bool {
    true
}

// =============================================================================
// Exchange
// =============================================================================

/// Exchange environment name in YAML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeEnvironment {
    /// Futures testnet.
    #[default]
    Testnet,
    /// Production.
    Mainnet,
}

/// Exchange connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Testnet or mainnet.
    #[serde(default)]
    pub environment: ExchangeEnvironment,
    /// API key (from environment variable).
    #[serde(default)]
    pub api_key: String,
    /// API secret (from environment variable).
    #[serde(default)]
    pub api_secret: String,
    /// Base URL override; empty uses the environment's URL.
    #[serde(default)]
    pub base_url: String,
    /// Account runs in hedge (dual-side) position mode.
    #[serde(default)]
    pub hedge_mode: bool,
    /// `recvWindow` in milliseconds.
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    /// Signed call timeout in seconds.
    #[serde(default = "default_signed_timeout")]
    pub signed_timeout_secs: u64,
    /// Public call timeout in seconds.
    #[serde(default = "default_public_timeout")]
    pub public_timeout_secs: u64,
    /// User-stream keepalive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            environment: ExchangeEnvironment::default(),
            api_key: String::new(),
            api_secret: String::new(),
            base_url: String::new(),
            hedge_mode: false,
            recv_window_ms: default_recv_window(),
            signed_timeout_secs: default_signed_timeout(),
            public_timeout_secs: default_public_timeout(),
            keepalive_interval_secs: default_keepalive(),
        }
    }
}

const fn default_recv_window() -> u64 {
    10_000
}
const fn default_signed_timeout() -> u64 {
    15
}
const fn default_public_timeout() -> u64 {
    10
}
const fn default_keepalive() -> u64 {
    30 * 60
}

// =============================================================================
// Admission and retry
// =============================================================================

/// Request budget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionSettings {
    /// Request weight per minute.
    #[serde(default = "default_max_weight")]
    pub max_weight_per_minute: u32,
    /// Orders per minute.
    #[serde(default = "default_max_orders")]
    pub max_orders_per_minute: u32,
    /// Ban applied when the exchange gives no unban time, in seconds.
    #[serde(default = "default_ban")]
    pub default_ban_secs: u64,
    /// Longest wait for a slot, in seconds.
    #[serde(default = "default_wait_ceiling")]
    pub wait_ceiling_secs: u64,
    /// Longest single sleep while waiting, in seconds.
    #[serde(default = "default_wait_step")]
    pub max_wait_step_secs: u64,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            max_weight_per_minute: default_max_weight(),
            max_orders_per_minute: default_max_orders(),
            default_ban_secs: default_ban(),
            wait_ceiling_secs: default_wait_ceiling(),
            max_wait_step_secs: default_wait_step(),
        }
    }
}

const fn default_max_weight() -> u32 {
    2400
}
const fn default_max_orders() -> u32 {
    1200
}
const fn default_ban() -> u64 {
    120
}
const fn default_wait_ceiling() -> u64 {
    30
}
const fn default_wait_step() -> u64 {
    5
}

/// Retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    /// Delay ceiling, in milliseconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Growth factor between retries.
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
    /// Jitter as a fraction of the delay.
    #[serde(default = "default_jitter")]
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_multiplier: default_multiplier(),
            jitter_factor: default_jitter(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    3
}
const fn default_initial_backoff() -> u64 {
    500
}
const fn default_max_backoff() -> u64 {
    5000
}
const fn default_multiplier() -> f64 {
    2.0
}
const fn default_jitter() -> f64 {
    0.25
}

// =============================================================================
// Constraints
// =============================================================================

/// Risk constraints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstraintsConfig {
    /// Limits for modes without an override.
    #[serde(default)]
    pub default: ConstraintSet,
    /// Per-mode overrides; omitted fields take the built-in defaults.
    #[serde(default)]
    pub modes: HashMap<TradingMode, ConstraintSet>,
}

// =============================================================================
// Chains
// =============================================================================

/// Chain management settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainsConfig {
    /// Maintain a protective stop on every open chain.
    #[serde(default = "default_true")]
    pub protection_enabled: bool,
    /// Entry fill ratio at which protection is placed.
    #[serde(default = "default_min_fill_ratio")]
    pub min_fill_ratio: Decimal,
    /// Maximum take-profit legs per chain.
    #[serde(default = "default_max_take_profits")]
    pub max_take_profits: u8,
    /// Stop distance when a decision carries none, in percent.
    #[serde(default = "default_stop_loss_percent")]
    pub default_stop_loss_percent: Decimal,
    /// Take-profit ladder.
    #[serde(default = "default_ladder")]
    pub take_profit_ladder: Vec<TakeProfitStep>,
    /// Averaging limits.
    #[serde(default)]
    pub averaging: AveragingSettings,
    /// Rebuy after a take-profit.
    #[serde(default)]
    pub rebuy: RebuySettings,
    /// Hedge sub-chains.
    #[serde(default)]
    pub hedge: HedgeSettings,
    /// Trailing stop.
    #[serde(default)]
    pub trailing: TrailingSettings,
    /// Protective stop retry.
    #[serde(default)]
    pub protection_retry: ProtectionRetrySettings,
    /// Per-symbol price and quantity increments.
    #[serde(default)]
    pub symbols: HashMap<String, SymbolFilters>,
}

impl Default for ChainsConfig {
    fn default() -> Self {
        Self {
            protection_enabled: true,
            min_fill_ratio: default_min_fill_ratio(),
            max_take_profits: default_max_take_profits(),
            default_stop_loss_percent: default_stop_loss_percent(),
            take_profit_ladder: default_ladder(),
            averaging: AveragingSettings::default(),
            rebuy: RebuySettings::default(),
            hedge: HedgeSettings::default(),
            trailing: TrailingSettings::default(),
            protection_retry: ProtectionRetrySettings::default(),
            symbols: HashMap::new(),
        }
    }
}

fn default_min_fill_ratio() -> Decimal {
    dec!(0.5)
}
const fn default_max_take_profits() -> u8 {
    3
}
fn default_stop_loss_percent() -> Decimal {
    dec!(2.0)
}
fn default_ladder() -> Vec<TakeProfitStep> {
    ChainManagerConfig::default().take_profit_ladder
}

/// Averaging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AveragingSettings {
    /// Entry-like legs with fills per chain, the entry included.
    #[serde(default = "default_max_entries")]
    pub max_entries_per_position: u32,
    /// Adverse move from the average entry required, in percent.
    #[serde(default = "default_min_improve")]
    pub min_price_improve_pct: Decimal,
    /// Minimum time between averaging placements, in seconds.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

impl Default for AveragingSettings {
    fn default() -> Self {
        Self {
            max_entries_per_position: default_max_entries(),
            min_price_improve_pct: default_min_improve(),
            cooldown_secs: default_cooldown(),
        }
    }
}

const fn default_max_entries() -> u32 {
    3
}
fn default_min_improve() -> Decimal {
    dec!(1.0)
}
const fn default_cooldown() -> u64 {
    15 * 60
}

/// Rebuy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuySettings {
    /// Place a rebuy after a take-profit fill.
    #[serde(default)]
    pub enabled: bool,
    /// Pullback from the take-profit fill price, in percent.
    #[serde(default = "default_pullback")]
    pub pullback_percent: Decimal,
}

impl Default for RebuySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            pullback_percent: default_pullback(),
        }
    }
}

fn default_pullback() -> Decimal {
    dec!(1.0)
}

/// Hedge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeSettings {
    /// Allow hedges.
    #[serde(default)]
    pub enabled: bool,
    /// Live hedges per parent.
    #[serde(default = "default_max_hedges")]
    pub max_simultaneous: usize,
    /// Hedge size as a share of the parent's open quantity.
    #[serde(default = "default_size_ratio")]
    pub size_ratio: Decimal,
    /// Parent loss that opens a hedge automatically, in percent.
    #[serde(default)]
    pub trigger_loss_percent: Option<Decimal>,
    /// Hedge stop distance, in percent.
    #[serde(default = "default_stop_loss_percent")]
    pub stop_loss_percent: Decimal,
    /// Hedge take-profit distance, in percent.
    #[serde(default = "default_hedge_take_profit")]
    pub take_profit_percent: Option<Decimal>,
}

impl Default for HedgeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_simultaneous: default_max_hedges(),
            size_ratio: default_size_ratio(),
            trigger_loss_percent: None,
            stop_loss_percent: default_stop_loss_percent(),
            take_profit_percent: default_hedge_take_profit(),
        }
    }
}

const fn default_max_hedges() -> usize {
    1
}
fn default_size_ratio() -> Decimal {
    dec!(0.5)
}
#[allow(clippy::unnecessary_wraps)]
fn default_hedge_take_profit() -> Option<Decimal> {
    Some(dec!(2.0))
}

/// Trailing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingSettings {
    /// Trailing on or off.
    #[serde(default)]
    pub enabled: bool,
    /// `client` tightens the stop; `exchange` places a trailing stop order.
    #[serde(default)]
    pub mode: TrailingMode,
    /// Distance behind the best price, in percent.
    #[serde(default = "default_callback")]
    pub callback_percent: Decimal,
    /// Profit before trailing starts, in percent.
    #[serde(default = "default_callback")]
    pub activation_percent: Decimal,
}

impl Default for TrailingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: TrailingMode::default(),
            callback_percent: default_callback(),
            activation_percent: default_callback(),
        }
    }
}

fn default_callback() -> Decimal {
    dec!(1.0)
}

/// Protective stop retry policy name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicyKind {
    /// Leave the chain unprotected until the next tick.
    #[default]
    NextTick,
    /// Retry in place first.
    Immediate,
}

/// Protective stop retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionRetrySettings {
    /// Policy.
    #[serde(default)]
    pub policy: RetryPolicyKind,
    /// Attempts for `immediate`.
    #[serde(default = "default_protection_attempts")]
    pub attempts: u32,
    /// Pause between attempts, in milliseconds.
    #[serde(default = "default_protection_delay")]
    pub delay_ms: u64,
}

impl Default for ProtectionRetrySettings {
    fn default() -> Self {
        Self {
            policy: RetryPolicyKind::default(),
            attempts: default_protection_attempts(),
            delay_ms: default_protection_delay(),
        }
    }
}

const fn default_protection_attempts() -> u32 {
    3
}
const fn default_protection_delay() -> u64 {
    500
}

// =============================================================================
// Monitor and observability
// =============================================================================

/// Position monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Run the monitor.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Reconcile interval per chain, in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Registry scan interval, in milliseconds.
    #[serde(default = "default_supervisor_interval")]
    pub supervisor_interval_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_ms: default_tick_interval(),
            supervisor_interval_ms: default_supervisor_interval(),
        }
    }
}

const fn default_tick_interval() -> u64 {
    5000
}
const fn default_supervisor_interval() -> u64 {
    1000
}

/// Observability configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Metrics exporter.
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "futures_engine=info".to_string()
}

/// Metrics exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Serve `/metrics`.
    #[serde(default)]
    pub enabled: bool,
    /// Listen address.
    #[serde(default = "default_metrics_addr")]
    pub listen_addr: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

// =============================================================================
// Conversions
// =============================================================================

impl Config {
    /// Admission controller settings.
    #[must_use]
    pub fn admission_config(&self) -> AdmissionConfig {
        let a = &self.admission;
        AdmissionConfig {
            max_weight_per_window: a.max_weight_per_minute,
            max_orders_per_window: a.max_orders_per_minute,
            default_ban: Duration::from_secs(a.default_ban_secs),
            wait_ceiling: Duration::from_secs(a.wait_ceiling_secs),
            max_wait_step: Duration::from_secs(a.max_wait_step_secs),
            ..AdmissionConfig::default()
        }
    }

    /// Retry policy for exchange calls.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let r = &self.retry;
        RetryPolicy {
            max_attempts: r.max_attempts,
            initial_backoff: Duration::from_millis(r.initial_backoff_ms),
            max_backoff: Duration::from_millis(r.max_backoff_ms),
            backoff_multiplier: r.backoff_multiplier,
            jitter_factor: r.jitter_factor,
        }
    }

    /// Live exchange adapter settings.
    #[must_use]
    pub fn binance_config(&self) -> BinanceConfig {
        let x = &self.exchange;
        let environment = match x.environment {
            ExchangeEnvironment::Testnet => BinanceEnvironment::Testnet,
            ExchangeEnvironment::Mainnet => BinanceEnvironment::Mainnet,
        };
        let credentials = (!x.api_key.is_empty() && !x.api_secret.is_empty())
            .then(|| Credentials::new(x.api_key.clone(), x.api_secret.clone()));

        let mut config = BinanceConfig::new(credentials, environment)
            .with_retry(self.retry_policy())
            .with_admission_wait_ceiling(Duration::from_secs(self.admission.wait_ceiling_secs));
        config.recv_window_ms = x.recv_window_ms;
        config.signed_timeout = Duration::from_secs(x.signed_timeout_secs);
        config.public_timeout = Duration::from_secs(x.public_timeout_secs);
        if !x.base_url.is_empty() {
            config = config.with_base_url(x.base_url.clone());
        }
        config
    }

    /// Constraint set for every trading mode.
    #[must_use]
    pub fn constraint_sets(&self) -> HashMap<TradingMode, ConstraintSet> {
        [
            TradingMode::UltraFast,
            TradingMode::Scalp,
            TradingMode::Swing,
            TradingMode::Position,
        ]
        .into_iter()
        .map(|mode| {
            let set = self
                .constraints
                .modes
                .get(&mode)
                .cloned()
                .unwrap_or_else(|| self.constraints.default.clone());
            (mode, set)
        })
        .collect()
    }

    /// Chain manager settings.
    #[must_use]
    pub fn chain_manager_config(&self) -> ChainManagerConfig {
        let c = &self.chains;
        let protection_retry = match c.protection_retry.policy {
            RetryPolicyKind::NextTick => ProtectionRetryPolicy::NextTick,
            RetryPolicyKind::Immediate => ProtectionRetryPolicy::Immediate {
                attempts: c.protection_retry.attempts,
                delay: Duration::from_millis(c.protection_retry.delay_ms),
            },
        };
        ChainManagerConfig {
            policy: ChainPolicy {
                protection_enabled: c.protection_enabled,
                max_take_profits: c.max_take_profits,
                min_fill_ratio: c.min_fill_ratio,
            },
            default_stop_loss_percent: c.default_stop_loss_percent,
            take_profit_ladder: c.take_profit_ladder.clone(),
            averaging: AveragingConfig {
                max_entries_per_position: c.averaging.max_entries_per_position,
                min_price_improve_pct: c.averaging.min_price_improve_pct,
                cooldown: Duration::from_secs(c.averaging.cooldown_secs),
            },
            rebuy: RebuyConfig {
                enabled: c.rebuy.enabled,
                pullback_percent: c.rebuy.pullback_percent,
            },
            hedge: HedgeConfig {
                enabled: c.hedge.enabled,
                max_simultaneous: c.hedge.max_simultaneous,
                size_ratio: c.hedge.size_ratio,
                trigger_loss_percent: c.hedge.trigger_loss_percent,
                stop_loss_percent: c.hedge.stop_loss_percent,
                take_profit_percent: c.hedge.take_profit_percent,
            },
            trailing: TrailingConfig {
                enabled: c.trailing.enabled,
                mode: c.trailing.mode,
                callback_percent: c.trailing.callback_percent,
                activation_percent: c.trailing.activation_percent,
            },
            protection_retry,
            default_filters: SymbolFilters::default(),
            symbol_filters: c
                .symbols
                .iter()
                .map(|(symbol, filters)| (Symbol::new(symbol.as_str()), *filters))
                .collect(),
        }
    }

    /// Position monitor settings.
    #[must_use]
    pub fn monitor_config(&self) -> PositionMonitorConfig {
        PositionMonitorConfig {
            enabled: self.monitor.enabled,
            tick_interval: Duration::from_millis(self.monitor.tick_interval_ms),
            supervisor_interval: Duration::from_millis(self.monitor.supervisor_interval_ms),
        }
    }

    /// Metrics exporter settings, when enabled.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unparsable listen address.
    pub fn metrics_config(&self) -> Result<Option<MetricsConfig>, ConfigError> {
        if !self.observability.metrics.enabled {
            return Ok(None);
        }
        let addr: SocketAddr = self
            .observability
            .metrics
            .listen_addr
            .parse()
            .map_err(|e| {
                ConfigError::ValidationError(format!(
                    "observability.metrics.listen_addr '{}': {e}",
                    self.observability.metrics.listen_addr
                ))
            })?;
        Ok(Some(MetricsConfig::with_addr(addr)))
    }

    /// Whether orders go to the real-money venue.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.engine.dry_run && self.exchange.environment == ExchangeEnvironment::Mainnet
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Path of the config file: `FUTURES_ENGINE_CONFIG` or the default.
#[must_use]
pub fn config_path() -> String {
    std::env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

/// Load configuration from a YAML file.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to [`config_path`].
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, str::to_string);

    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
        path: path.clone(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map_or("", |m| m.as_str());
        match cap.get(1).map(|m| std::env::var(m.as_str())) {
            Some(Ok(v)) if !v.is_empty() => v,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Exchange
    if config.is_live()
        && (config.exchange.api_key.is_empty() || config.exchange.api_secret.is_empty())
    {
        return Err(invalid(
            "exchange.api_key and exchange.api_secret are required for mainnet trading",
        ));
    }
    if config.exchange.keepalive_interval_secs == 0 {
        return Err(invalid("exchange.keepalive_interval_secs must be positive"));
    }

    // Admission and retry
    if config.admission.max_weight_per_minute == 0 || config.admission.max_orders_per_minute == 0 {
        return Err(invalid("admission budgets must be positive"));
    }
    if config.retry.max_attempts == 0 {
        return Err(invalid("retry.max_attempts must be at least 1"));
    }
    if !(0.0..=1.0).contains(&config.retry.jitter_factor) {
        return Err(invalid("retry.jitter_factor must be between 0.0 and 1.0"));
    }
    if config.retry.backoff_multiplier < 1.0 {
        return Err(invalid("retry.backoff_multiplier must be at least 1.0"));
    }

    // Constraints
    for (mode, set) in config.constraint_sets() {
        if !(1..=125).contains(&set.max_leverage) {
            return Err(invalid(format!(
                "constraints for {mode}: max_leverage must be between 1 and 125"
            )));
        }
        if set.min_meaningful_size_usd > set.max_position_size_usd {
            return Err(invalid(format!(
                "constraints for {mode}: min_meaningful_size_usd exceeds max_position_size_usd"
            )));
        }
    }

    // Chains
    let chains = &config.chains;
    if chains.min_fill_ratio <= Decimal::ZERO || chains.min_fill_ratio > Decimal::ONE {
        return Err(invalid("chains.min_fill_ratio must be in (0, 1]"));
    }
    if chains.default_stop_loss_percent <= Decimal::ZERO {
        return Err(invalid("chains.default_stop_loss_percent must be positive"));
    }
    if chains.take_profit_ladder.is_empty() {
        return Err(invalid("chains.take_profit_ladder must have at least one step"));
    }
    if chains
        .take_profit_ladder
        .iter()
        .any(|s| s.fraction <= Decimal::ZERO || s.distance_multiple <= Decimal::ZERO)
    {
        return Err(invalid("chains.take_profit_ladder steps must be positive"));
    }
    let ladder_total: Decimal = chains.take_profit_ladder.iter().map(|s| s.fraction).sum();
    if ladder_total != Decimal::ONE {
        return Err(invalid(format!(
            "chains.take_profit_ladder fractions sum to {ladder_total}, expected 1"
        )));
    }
    if chains.averaging.max_entries_per_position == 0 {
        return Err(invalid("chains.averaging.max_entries_per_position must be at least 1"));
    }
    if chains.hedge.enabled && !config.engine.dry_run && !config.exchange.hedge_mode {
        return Err(invalid("chains.hedge.enabled requires exchange.hedge_mode"));
    }
    if chains.hedge.size_ratio <= Decimal::ZERO || chains.hedge.size_ratio > Decimal::ONE {
        return Err(invalid("chains.hedge.size_ratio must be in (0, 1]"));
    }
    let (min_cb, max_cb) = CALLBACK_RATE_RANGE;
    if chains.trailing.enabled
        && chains.trailing.mode == TrailingMode::Exchange
        && !(min_cb..=max_cb).contains(&chains.trailing.callback_percent)
    {
        return Err(invalid(format!(
            "chains.trailing.callback_percent must be between {min_cb} and {max_cb} in exchange mode"
        )));
    }
    for (symbol, filters) in &chains.symbols {
        if filters.tick_size <= Decimal::ZERO || filters.step_size <= Decimal::ZERO {
            return Err(invalid(format!("chains.symbols.{symbol}: increments must be positive")));
        }
    }

    // Monitor
    if config.monitor.tick_interval_ms == 0 || config.monitor.supervisor_interval_ms == 0 {
        return Err(invalid("monitor intervals must be positive"));
    }

    // Observability
    config.metrics_config()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        validate_config(&config).unwrap();
        assert!(config.engine.dry_run);
        assert_eq!(config.engine.mode, TradingMode::Swing);
        assert_eq!(config.admission_config(), AdmissionConfig::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.chain_manager_config(), ChainManagerConfig::default());
    }

    #[test]
    fn test_load_minimal_config() {
        let config = load_config_from_string("engine:\n  mode: scalp\n").unwrap();
        assert_eq!(config.engine.mode, TradingMode::Scalp);
        assert_eq!(config.exchange.recv_window_ms, 10_000);
        assert_eq!(config.constraint_sets().len(), 4);
    }

    #[test]
    fn test_env_var_with_default_when_missing() {
        let input = "mode: ${FUTURES_ENGINE_TEST_NONEXISTENT_VAR:-swing}";
        assert_eq!(interpolate_env_vars(input), "mode: swing");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)] // ${...} is env var syntax, not format args
    fn test_env_var_with_default_uses_existing() {
        let input = "path: ${PATH:-default}";
        let result = interpolate_env_vars(input);
        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn test_env_var_without_default_becomes_empty() {
        let input = "api_key: ${FUTURES_ENGINE_TEST_UNLIKELY_TO_EXIST}";
        assert_eq!(interpolate_env_vars(input), "api_key: ");
    }

    #[test]
    fn test_ladder_must_cover_position() {
        let yaml = r"
chains:
  take_profit_ladder:
    - fraction: 0.5
      distance_multiple: 1
    - fraction: 0.3
      distance_multiple: 2
";
        let err = load_config_from_string(yaml).unwrap_err();
        assert!(err.to_string().contains("sum to 0.8"));
    }

    #[test]
    fn test_hedging_live_requires_hedge_mode() {
        let yaml = r"
engine:
  dry_run: false
exchange:
  api_key: key
  api_secret: secret
chains:
  hedge:
    enabled: true
";
        assert!(matches!(
            load_config_from_string(yaml),
            Err(ConfigError::ValidationError(_))
        ));

        let yaml = yaml.replace("  api_secret: secret\n", "  api_secret: secret\n  hedge_mode: true\n");
        assert!(load_config_from_string(&yaml).is_ok());
    }

    #[test]
    fn test_mainnet_requires_credentials() {
        let yaml = r"
engine:
  dry_run: false
exchange:
  environment: mainnet
";
        let err = load_config_from_string(yaml).unwrap_err();
        assert!(err.to_string().contains("api_key"));
    }

    #[test]
    fn test_leverage_bounds_per_mode() {
        let yaml = r"
constraints:
  modes:
    ultra_fast:
      max_leverage: 200
";
        assert!(load_config_from_string(yaml).is_err());
    }

    #[test]
    fn test_full_config_parse() {
        let yaml = r"
engine:
  mode: position
  dry_run: true
exchange:
  environment: testnet
  base_url: http://127.0.0.1:9000
  hedge_mode: true
admission:
  max_weight_per_minute: 1200
  default_ban_secs: 300
retry:
  max_attempts: 5
  initial_backoff_ms: 250
constraints:
  default:
    max_positions: 3
  modes:
    scalp:
      max_leverage: 20
      max_positions: 8
chains:
  take_profit_ladder:
    - fraction: 1
      distance_multiple: 1
  averaging:
    cooldown_secs: 60
  hedge:
    enabled: true
    trigger_loss_percent: 3
  trailing:
    enabled: true
    mode: exchange
    callback_percent: 0.5
  protection_retry:
    policy: immediate
    attempts: 2
    delay_ms: 100
  symbols:
    btcusdt:
      tick_size: 0.1
      step_size: 0.001
monitor:
  tick_interval_ms: 2000
observability:
  logging:
    format: json
  metrics:
    enabled: true
    listen_addr: 127.0.0.1:9191
";
        let config = load_config_from_string(yaml).unwrap();

        assert_eq!(config.admission_config().default_ban, Duration::from_secs(300));
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.binance_config().base_url(), "http://127.0.0.1:9000");
        assert!(config.binance_config().credentials.is_none());

        let sets = config.constraint_sets();
        assert_eq!(sets[&TradingMode::Scalp].max_leverage, 20);
        assert_eq!(sets[&TradingMode::Scalp].max_positions, 8);
        assert_eq!(sets[&TradingMode::Swing].max_positions, 3);
        assert_eq!(sets[&TradingMode::Swing].max_leverage, 10);

        let chains = config.chain_manager_config();
        assert_eq!(chains.averaging.cooldown, Duration::from_secs(60));
        assert_eq!(chains.hedge.trigger_loss_percent, Some(dec!(3)));
        assert_eq!(chains.trailing.mode, TrailingMode::Exchange);
        assert_eq!(
            chains.protection_retry,
            ProtectionRetryPolicy::Immediate {
                attempts: 2,
                delay: Duration::from_millis(100)
            }
        );
        assert_eq!(
            chains.filters_for(&Symbol::new("BTCUSDT")).tick_size,
            dec!(0.1)
        );

        assert_eq!(config.monitor_config().tick_interval, Duration::from_secs(2));
        assert_eq!(config.observability.logging.format, LogFormat::Json);
        assert_eq!(
            config.metrics_config().unwrap().unwrap().listen_addr,
            "127.0.0.1:9191".parse::<SocketAddr>().unwrap()
        );
    }
}
