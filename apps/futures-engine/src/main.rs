//! Futures Engine Binary
//!
//! Reads trade decision batches from stdin and executes them as order chains.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin futures-engine < decisions.ndjson
//! ```
//!
//! Each stdin line is one JSON batch:
//!
//! ```json
//! {"mode": "scalp", "decisions": [{"symbol": "BTCUSDT", "action": "OPEN_LONG", ...}]}
//! ```
//!
//! # Environment Variables
//!
//! - `FUTURES_ENGINE_CONFIG`: Config file path (default: config/default.yaml)
//! - `BINANCE_API_KEY`, `BINANCE_API_SECRET`: Exchange credentials
//! - `RUST_LOG`: Log filter (default: from `observability.logging.level`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use futures_engine::application::ports::{EventPublisherPort, ExchangePort};
use futures_engine::application::services::{ChainManager, PositionMonitor};
use futures_engine::application::use_cases::ExecuteDecisionsUseCase;
use futures_engine::config::{Config, LogFormat, load_config};
use futures_engine::domain::order_chain::TradingMode;
use futures_engine::domain::risk_management::TradeDecision;
use futures_engine::infrastructure::events::{
    BroadcastEventPublisher, FanoutEventPublisher, LoggingEventPublisher,
};
use futures_engine::infrastructure::exchange::PaperExchange;
use futures_engine::infrastructure::exchange::binance::{FuturesClient, SignedRequestExecutor};
use futures_engine::observability::init_metrics;
use futures_engine::resilience::AdmissionController;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffered chain events for in-process subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

type Engine = ExecuteDecisionsUseCase<dyn ExchangePort>;

/// One stdin line.
#[derive(Debug, Deserialize)]
struct DecisionBatch {
    /// Mode for the batch; the configured mode when absent.
    #[serde(default)]
    mode: Option<TradingMode>,
    decisions: Vec<TradeDecision>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let config = load_config(None).context("loading configuration")?;
    init_tracing(&config);

    tracing::info!("Starting Futures Engine");
    log_config(&config);

    if let Some(metrics) = config.metrics_config()? {
        init_metrics(&metrics).context("starting metrics exporter")?;
        tracing::info!(addr = %metrics.listen_addr, "Metrics exporter listening");
    }

    let admission = Arc::new(AdmissionController::new(config.admission_config()));
    let executor = SignedRequestExecutor::new(&config.binance_config(), Arc::clone(&admission))
        .context("building exchange client")?;
    let client = FuturesClient::new(executor, config.exchange.hedge_mode);

    let shutdown = CancellationToken::new();
    let exchange = create_exchange(&config, &client);
    let manager = Arc::new(ChainManager::new(
        exchange,
        create_publisher(),
        config.chain_manager_config(),
    ));

    let monitor =
        PositionMonitor::with_config(config.monitor_config(), Arc::clone(&manager), shutdown.clone());
    if let Err(e) = monitor.start() {
        tracing::warn!(error = %e, "Position monitor not started");
    } else {
        tracing::info!("Position monitor started");
    }

    let keepalive = (!config.engine.dry_run).then(|| {
        spawn_keepalive(
            client,
            Duration::from_secs(config.exchange.keepalive_interval_secs),
            shutdown.clone(),
        )
    });

    let engine = Engine::new(Arc::clone(&manager), config.constraint_sets());
    tracing::info!("Futures engine ready, reading decisions from stdin");

    tokio::select! {
        result = read_decisions(&engine, config.engine.mode) => {
            result?;
            tracing::info!("Decision input closed");
        }
        () = shutdown_signal() => {}
    }

    shutdown.cancel();
    monitor.stop();
    if let Some(handle) = keepalive {
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
            tracing::warn!("Keepalive task did not stop in time");
        }
    }

    tracing::info!(
        open_chains = manager.registry().len(),
        "Futures engine stopped"
    );
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(&config.observability.logging.level)
    });

    match config.observability.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

/// Log the loaded configuration.
fn log_config(config: &Config) {
    tracing::info!(
        mode = %config.engine.mode,
        dry_run = config.engine.dry_run,
        environment = ?config.exchange.environment,
        hedge_mode = config.exchange.hedge_mode,
        monitor_enabled = config.monitor.enabled,
        "Configuration loaded"
    );
}

/// Live client, or the paper exchange priced by the live client on dry runs.
fn create_exchange(config: &Config, client: &FuturesClient) -> Arc<dyn ExchangePort> {
    if config.engine.dry_run {
        tracing::info!("Dry run: orders fill on the paper exchange");
        Arc::new(PaperExchange::new(client.clone()))
    } else {
        tracing::warn!(
            environment = ?config.exchange.environment,
            "Live trading: orders go to the exchange"
        );
        Arc::new(client.clone())
    }
}

/// Log every chain event and fan it out to in-process subscribers.
fn create_publisher() -> Arc<dyn EventPublisherPort> {
    Arc::new(
        FanoutEventPublisher::new()
            .with(Arc::new(LoggingEventPublisher::new()))
            .with(Arc::new(BroadcastEventPublisher::new(EVENT_CHANNEL_CAPACITY))),
    )
}

/// Keep the user data stream alive. Runs on the critical path.
fn spawn_keepalive(
    client: FuturesClient,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = client.start_user_stream().await {
            tracing::warn!(error = %e, "Failed to start user data stream");
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match client.keepalive_user_stream().await {
                        Ok(()) => tracing::debug!("User data stream extended"),
                        Err(e) => tracing::warn!(error = %e, "User data stream keepalive failed"),
                    }
                }
            }
        }

        if let Err(e) = client.close_user_stream().await {
            tracing::debug!(error = %e, "Failed to close user data stream");
        }
    })
}

/// Execute one batch per stdin line until input closes.
async fn read_decisions(engine: &Engine, default_mode: TradingMode) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let batch: DecisionBatch = match serde_json::from_str(line) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed decision batch");
                continue;
            }
        };

        let mode = batch.mode.unwrap_or(default_mode);
        let summary = engine.execute(&batch.decisions, mode).await;
        for outcome in &summary.outcomes {
            tracing::info!(mode = %mode, outcome = %outcome, "Decision executed");
        }
        for (decision, reason) in &summary.rejected {
            tracing::info!(
                symbol = %decision.symbol,
                action = %decision.action,
                reason = %reason,
                "Decision rejected"
            );
        }
    }

    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
