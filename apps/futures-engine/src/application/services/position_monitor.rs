//! Position Monitor Service
//!
//! Runs one reconcile loop per live chain. A supervisor task watches the
//! chain registry, starts a ticker for every new chain and lets tickers end
//! once their chain retires. Each tick's [`TickReport`] is broadcast to
//! subscribers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::chain_manager::{ChainManager, ChainManagerError, TickReport};
use crate::application::ports::ExchangePort;
use crate::domain::shared::ChainId;
use crate::observability::metrics;

/// Configuration for the position monitor service.
#[derive(Debug, Clone)]
pub struct PositionMonitorConfig {
    /// Whether position monitoring is enabled.
    pub enabled: bool,
    /// Reconcile interval per chain.
    pub tick_interval: Duration,
    /// How often the registry is scanned for new chains.
    pub supervisor_interval: Duration,
}

impl Default for PositionMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval: Duration::from_secs(5),
            supervisor_interval: Duration::from_secs(1),
        }
    }
}

/// Position monitor errors.
#[derive(Debug, Error)]
pub enum PositionMonitorError {
    /// Service is not enabled.
    #[error("position monitor is not enabled")]
    NotEnabled,

    /// `start` was called twice.
    #[error("position monitor already running")]
    AlreadyRunning,

    /// No live chain with this id.
    #[error("chain not found: {0}")]
    ChainNotFound(ChainId),

    /// Reconcile failed.
    #[error("tick failed: {0}")]
    Tick(#[from] ChainManagerError),
}

#[derive(Debug, Default)]
struct MonitorState {
    tasks: HashMap<ChainId, CancellationToken>,
    unprotected: HashSet<ChainId>,
}

/// Per-chain reconcile loops.
pub struct PositionMonitor<E: ?Sized> {
    config: PositionMonitorConfig,
    manager: Arc<ChainManager<E>>,
    state: Arc<Mutex<MonitorState>>,
    running: AtomicBool,
    shutdown: CancellationToken,
    report_tx: broadcast::Sender<TickReport>,
}

impl<E: ExchangePort + ?Sized + 'static> PositionMonitor<E> {
    /// Create a monitor with default configuration.
    #[must_use]
    pub fn new(manager: Arc<ChainManager<E>>, shutdown: CancellationToken) -> Self {
        Self::with_config(PositionMonitorConfig::default(), manager, shutdown)
    }

    /// Create with custom configuration.
    #[must_use]
    pub fn with_config(
        config: PositionMonitorConfig,
        manager: Arc<ChainManager<E>>,
        shutdown: CancellationToken,
    ) -> Self {
        let (report_tx, _) = broadcast::channel(256);
        Self {
            config,
            manager,
            state: Arc::new(Mutex::new(MonitorState::default())),
            running: AtomicBool::new(false),
            shutdown,
            report_tx,
        }
    }

    /// Subscribe to tick reports.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TickReport> {
        self.report_tx.subscribe()
    }

    /// Chains with a running ticker.
    #[must_use]
    pub fn monitored(&self) -> Vec<ChainId> {
        let mut ids: Vec<ChainId> = self.state.lock().tasks.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Start the supervisor.
    ///
    /// # Errors
    ///
    /// Returns `NotEnabled` if monitoring is disabled, `AlreadyRunning` on a
    /// second call.
    pub fn start(&self) -> Result<(), PositionMonitorError> {
        if !self.config.enabled {
            return Err(PositionMonitorError::NotEnabled);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(PositionMonitorError::AlreadyRunning);
        }

        tracing::info!(
            tick_interval_ms = self.config.tick_interval.as_millis(),
            "Starting position monitor"
        );

        let manager = Arc::clone(&self.manager);
        let state = Arc::clone(&self.state);
        let report_tx = self.report_tx.clone();
        let shutdown = self.shutdown.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.supervisor_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        tracing::info!("Position monitor shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        supervise(&manager, &state, &report_tx, &shutdown, config.tick_interval);
                    }
                }
            }
        });

        Ok(())
    }

    /// Run one reconcile now and broadcast its report.
    ///
    /// # Errors
    ///
    /// Returns `ChainNotFound` for an unknown chain, `Tick` if the reconcile
    /// could not run.
    pub async fn tick_once(&self, chain_id: &ChainId) -> Result<TickReport, PositionMonitorError> {
        let report = match self.manager.reconcile(chain_id).await {
            Ok(report) => report,
            Err(ChainManagerError::ChainNotFound(id)) => {
                return Err(PositionMonitorError::ChainNotFound(id));
            }
            Err(e) => return Err(e.into()),
        };
        record_unprotected(&self.state, &report);
        publish(&self.report_tx, report.clone());
        Ok(report)
    }

    /// Stop every loop.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

fn supervise<E: ExchangePort + ?Sized + 'static>(
    manager: &Arc<ChainManager<E>>,
    state: &Arc<Mutex<MonitorState>>,
    report_tx: &broadcast::Sender<TickReport>,
    shutdown: &CancellationToken,
    tick_interval: Duration,
) {
    let live: HashSet<ChainId> = manager.registry().chain_ids().into_iter().collect();
    let mut guard = state.lock();

    guard.tasks.retain(|id, token| {
        let keep = live.contains(id);
        if !keep {
            token.cancel();
        }
        keep
    });
    guard.unprotected.retain(|id| live.contains(id));

    for chain_id in &live {
        if guard.tasks.contains_key(chain_id) {
            continue;
        }
        let token = shutdown.child_token();
        guard.tasks.insert(chain_id.clone(), token.clone());
        tracing::debug!(chain_id = %chain_id, "Monitoring chain");
        tokio::spawn(run_chain(
            Arc::clone(manager),
            chain_id.clone(),
            tick_interval,
            token,
            report_tx.clone(),
            Arc::clone(state),
        ));
    }

    metrics::set_chain_counts(live.len(), guard.unprotected.len());
}

async fn run_chain<E: ExchangePort + ?Sized + 'static>(
    manager: Arc<ChainManager<E>>,
    chain_id: ChainId,
    tick_interval: Duration,
    token: CancellationToken,
    report_tx: broadcast::Sender<TickReport>,
    state: Arc<Mutex<MonitorState>>,
) {
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = interval.tick() => {
                let started = Instant::now();
                match manager.reconcile(&chain_id).await {
                    Ok(report) => {
                        metrics::record_monitor_tick(report.outcome(), started.elapsed().as_secs_f64());
                        if !report.errors.is_empty() {
                            tracing::warn!(
                                chain_id = %chain_id,
                                errors = ?report.errors,
                                "Reconcile finished with errors"
                            );
                        }
                        record_unprotected(&state, &report);
                        let retired = report.retired;
                        publish(&report_tx, report);
                        if retired {
                            break;
                        }
                    }
                    Err(ChainManagerError::ChainNotFound(_)) => break,
                    Err(e) => {
                        metrics::record_monitor_tick("failed", started.elapsed().as_secs_f64());
                        tracing::warn!(chain_id = %chain_id, error = %e, "Reconcile failed");
                    }
                }
            }
        }
    }

    let mut guard = state.lock();
    guard.tasks.remove(&chain_id);
    guard.unprotected.remove(&chain_id);
    tracing::debug!(chain_id = %chain_id, "Chain monitor stopped");
}

fn publish(report_tx: &broadcast::Sender<TickReport>, report: TickReport) {
    if let Err(e) = report_tx.send(report) {
        tracing::debug!(chain_id = %e.0.chain_id, "No tick report subscribers");
    }
}

fn record_unprotected(state: &Mutex<MonitorState>, report: &TickReport) {
    let mut guard = state.lock();
    if report.protection.is_unprotected() && !report.retired {
        guard.unprotected.insert(report.chain_id.clone());
    } else {
        guard.unprotected.remove(&report.chain_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::NoOpEventPublisher;
    use crate::application::services::chain_manager::ChainManagerConfig;
    use crate::domain::order_chain::TradingMode;
    use crate::domain::risk_management::{DecisionAction, TradeDecision};
    use crate::domain::shared::Symbol;
    use crate::infrastructure::exchange::{ManualPriceSource, PaperExchange};
    use rust_decimal_macros::dec;

    type Paper = PaperExchange<Arc<ManualPriceSource>>;

    fn setup() -> (Arc<ManualPriceSource>, Arc<ChainManager<Paper>>) {
        let prices = Arc::new(ManualPriceSource::new());
        prices.set_price(&Symbol::new("BTCUSDT"), dec!(100));
        let exchange = Arc::new(PaperExchange::new(Arc::clone(&prices)));
        let manager = Arc::new(ChainManager::new(
            exchange,
            Arc::new(NoOpEventPublisher),
            ChainManagerConfig::default(),
        ));
        (prices, manager)
    }

    fn open_long() -> TradeDecision {
        TradeDecision {
            symbol: Symbol::new("BTCUSDT"),
            action: DecisionAction::OpenLong,
            proposed_size_usd: dec!(100),
            proposed_leverage: 2,
            entry_zone: None,
            stop_loss_percent: Some(dec!(2)),
            take_profit_percent: None,
            averaging_allowed: false,
            max_average_count: 0,
            confidence: dec!(0.8),
            priority: 0,
        }
    }

    #[tokio::test]
    async fn disabled_monitor_refuses_to_start() {
        let (_, manager) = setup();
        let config = PositionMonitorConfig {
            enabled: false,
            ..PositionMonitorConfig::default()
        };
        let monitor = PositionMonitor::with_config(config, manager, CancellationToken::new());
        assert!(matches!(monitor.start(), Err(PositionMonitorError::NotEnabled)));
    }

    #[tokio::test]
    async fn second_start_is_refused() {
        let (_, manager) = setup();
        let shutdown = CancellationToken::new();
        let monitor = PositionMonitor::new(manager, shutdown.clone());
        monitor.start().unwrap();
        assert!(matches!(monitor.start(), Err(PositionMonitorError::AlreadyRunning)));
        shutdown.cancel();
    }

    #[tokio::test]
    async fn tick_once_reports_stop_out_and_retires_chain() {
        let (prices, manager) = setup();
        let monitor = PositionMonitor::new(Arc::clone(&manager), CancellationToken::new());
        let mut reports = monitor.subscribe();

        let chain_id = manager
            .open_chain(&open_long(), TradingMode::Scalp)
            .await
            .unwrap();

        let report = monitor.tick_once(&chain_id).await.unwrap();
        assert_eq!(report.outcome(), "ok");
        assert!(!report.retired);

        prices.set_price(&Symbol::new("BTCUSDT"), dec!(97));
        let report = monitor.tick_once(&chain_id).await.unwrap();
        assert!(report.retired);
        assert!(manager.registry().is_empty());

        assert_eq!(reports.recv().await.unwrap().chain_id, chain_id);
        assert!(matches!(
            monitor.tick_once(&chain_id).await,
            Err(PositionMonitorError::ChainNotFound(_))
        ));
    }

    #[tokio::test]
    async fn tick_once_without_subscribers_still_reports() {
        let (_, manager) = setup();
        let monitor = PositionMonitor::new(Arc::clone(&manager), CancellationToken::new());
        let chain_id = manager
            .open_chain(&open_long(), TradingMode::Scalp)
            .await
            .unwrap();

        let report = monitor.tick_once(&chain_id).await.unwrap();
        assert_eq!(report.chain_id, chain_id);
        assert!(!report.retired);

        let mut reports = monitor.subscribe();
        monitor.tick_once(&chain_id).await.unwrap();
        assert_eq!(reports.recv().await.unwrap().chain_id, chain_id);
    }

    #[tokio::test]
    async fn supervisor_picks_up_new_chains() {
        let (_, manager) = setup();
        let shutdown = CancellationToken::new();
        let config = PositionMonitorConfig {
            enabled: true,
            tick_interval: Duration::from_millis(20),
            supervisor_interval: Duration::from_millis(10),
        };
        let monitor = PositionMonitor::with_config(config, Arc::clone(&manager), shutdown.clone());
        let mut reports = monitor.subscribe();
        monitor.start().unwrap();

        let chain_id = manager
            .open_chain(&open_long(), TradingMode::Scalp)
            .await
            .unwrap();

        let report = tokio::time::timeout(Duration::from_secs(2), reports.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.chain_id, chain_id);
        assert_eq!(monitor.monitored(), vec![chain_id]);
        monitor.stop();
    }
}
