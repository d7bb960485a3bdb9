//! Wires every long-running agent task into the cadence/event-driven shape
//! `spec.md` §5 requires: the Scanner cadence is the only timed driver, the
//! Position Manager and Coherence Monitor run on their own logical subtasks
//! so a slow signal path never starves them, and the Closure Listener is
//! driven off the broker's own push channel. Grounded in the teacher's
//! `bootstrap::agents::AgentsBootstrap::init` shape: one call returning an
//! `AgentsHandle` of channels/join-handles, every agent spawned as its own
//! `tokio::spawn`.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::agents::{
    scanner::{ScanOutput, Scanner, ScannerConfig},
    shadow_jury::ShadowJury,
    signal_factory::SignalFactory,
    virtual_book::VirtualTradeBook,
    Executor, PositionManager, TradeClosureListener,
};
use crate::application::monitoring::CoherenceMonitor;
use crate::application::optimization::EdgeTuner;
use crate::application::risk_management::sizing_engine::determine_conversion;
use crate::application::strategies::{DualMovingAverageStrategy, Strategy};
use crate::config::Config;
use crate::domain::market::{RegimeLabel, RegimeSample, Timeframe};
use crate::domain::ports::NotificationKind;
use crate::domain::trading::{ExecutionMode, Signal};
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::persistence::Persistence;

use super::services::ServicesHandle;

/// The timeframe strategies evaluate and signals are generated on.
const ENTRY_TIMEFRAME: Timeframe = Timeframe::M15;
/// The timeframe the Trifecta post-filter reads its multi-timeframe context
/// from, per `spec.md` §4.3.
const HIGHER_TIMEFRAME: Timeframe = Timeframe::H4;

/// Every long-running task this bootstrap spawns, plus the broadcast
/// handle used to signal a graceful shutdown.
pub struct AgentsHandle {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl AgentsHandle {
    /// Drains in-flight trace ids and waits for every task to exit.
    /// `spec.md` §6: "graceful shutdown drains in-flight trace ids,
    /// persists all in-memory mutations, and closes broker connections."
    /// Every write this system performs is already committed at the
    /// instant it's issued, so draining here is a bounded wait, not a
    /// flush of unwritten state.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                warn!(error = %err, "agent task ended with a join error during shutdown");
            }
        }
    }
}

fn build_strategies(config: &Config) -> Vec<Box<dyn Strategy>> {
    vec![Box::new(DualMovingAverageStrategy::new(
        config.fast_sma_period,
        config.slow_sma_period,
        config.atr_multiplier,
    ))]
}

/// Resolves the cross-currency conversion rate case 4 of `spec.md` §4.5
/// needs: neither the quote nor base currency of the pair matches the
/// account currency, so we triangulate through whichever of the
/// `QUOTE+ACCT` / `ACCT+QUOTE` pairs the broker actually quotes, inverting
/// the latter so the sizer always multiplies. Returns `None` if the broker
/// has neither pair visible; the sizer then reports a typed rejection
/// rather than guessing.
async fn resolve_conversion_rate(
    broker: &Arc<dyn crate::domain::ports::BrokerConnector>,
    quote_currency: &str,
    account_currency: &str,
) -> Option<Decimal> {
    let direct = format!("{quote_currency}{account_currency}");
    if let Ok(tick) = broker.get_tick(&direct).await {
        return Some((tick.bid + tick.ask) / Decimal::TWO);
    }
    let inverse = format!("{account_currency}{quote_currency}");
    if let Ok(tick) = broker.get_tick(&inverse).await {
        let mid = (tick.bid + tick.ask) / Decimal::TWO;
        if !mid.is_zero() {
            return Some(Decimal::ONE / mid);
        }
    }
    None
}

pub struct AgentsBootstrap;

impl AgentsBootstrap {
    pub fn spawn(
        config: &Config,
        persistence: Arc<Persistence>,
        services: &ServicesHandle,
    ) -> AgentsHandle {
        let (shutdown_tx, _) = broadcast::channel(4);
        let mut tasks = Vec::new();

        let regime_cache: Arc<RwLock<HashMap<(String, Timeframe), RegimeSample>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let (scan_tx, scan_rx) = mpsc::channel::<ScanOutput>(256);
        tasks.push(spawn_scanner(config, services, shutdown_tx.subscribe(), scan_tx));
        tasks.push(spawn_pipeline(
            config,
            Arc::clone(&persistence),
            services,
            Arc::clone(&regime_cache),
            scan_rx,
            shutdown_tx.subscribe(),
        ));

        tasks.push(spawn_position_manager(
            config,
            Arc::clone(&persistence),
            services,
            Arc::clone(&regime_cache),
            shutdown_tx.subscribe(),
        ));

        tasks.push(spawn_coherence_monitor(
            config,
            Arc::clone(&persistence),
            services,
            shutdown_tx.subscribe(),
        ));

        tasks.push(spawn_closure_listener(
            config,
            Arc::clone(&persistence),
            services,
            shutdown_tx.subscribe(),
        ));

        tasks.push(spawn_heartbeat_watchdog(services, shutdown_tx.subscribe()));

        AgentsHandle { shutdown_tx, tasks }
    }
}

/// Scanner cadence task — `spec.md` §4.1. Wraps `Scanner::run`, which
/// already owns its own coalescing/worker-pool logic; this just supplies
/// the output channel the pipeline task reads from.
fn spawn_scanner(
    config: &Config,
    services: &ServicesHandle,
    shutdown_rx: broadcast::Receiver<()>,
    out_tx: mpsc::Sender<ScanOutput>,
) -> JoinHandle<()> {
    let scanner_config = ScannerConfig {
        symbols: config.symbols.clone(),
        timeframes: vec![ENTRY_TIMEFRAME, HIGHER_TIMEFRAME],
        cadence: std::time::Duration::from_secs(config.scanner_cadence_secs),
        worker_pool_cap: config.scanner_worker_pool_cap,
        provider_timeout: std::time::Duration::from_secs(config.provider_timeout_secs),
        lookback: 200,
    };
    let mut scanner = Scanner::new(scanner_config, Arc::clone(&services.market_data), services.agent_status.clone());
    let params = Arc::clone(&services.dynamic_params);

    tokio::spawn(async move {
        scanner.run(params, out_tx, shutdown_rx).await;
    })
}

/// Signal Factory → Shadow Jury → (virtual book | Risk Manager/Executor)
/// pipeline — `spec.md` §4.3-§4.6. One task per process; symbols fan out
/// inside the Scanner, not here, so this stays single-threaded with
/// respect to the shared `ShadowJury`/`VirtualTradeBook` state it owns.
#[allow(clippy::too_many_arguments)]
fn spawn_pipeline(
    config: &Config,
    persistence: Arc<Persistence>,
    services: &ServicesHandle,
    regime_cache: Arc<RwLock<HashMap<(String, Timeframe), RegimeSample>>>,
    mut scan_rx: mpsc::Receiver<ScanOutput>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let strategies = build_strategies(config);
    let factory = SignalFactory::new(
        strategies,
        Arc::clone(&persistence.signals),
        Arc::clone(&persistence.coherence_events),
    );
    let executor = Executor::new(
        Arc::clone(&services.broker),
        Arc::clone(&persistence.positions),
        Arc::clone(&persistence.signals),
        Arc::clone(&persistence.coherence_events),
        Arc::clone(&services.risk_manager),
        config.max_positions_per_symbol,
    );
    let broker = Arc::clone(&services.broker);
    let notifier = Arc::clone(&services.notifier);
    let metrics = services.metrics.clone();
    let account_currency = config.account_currency.clone();

    let mut shadow_jury = ShadowJury::new();
    let mut virtual_book = VirtualTradeBook::new();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                maybe_output = scan_rx.recv() => {
                    let Some(output) = maybe_output else { break };
                    regime_cache
                        .write()
                        .await
                        .insert((output.symbol.clone(), output.timeframe), output.regime.clone());

                    if output.timeframe != ENTRY_TIMEFRAME {
                        // Higher-timeframe scans only feed the cache; signals
                        // are generated off the entry timeframe below.
                        continue;
                    }

                    if let Some(last_candle) = output.candles.last() {
                        for closed in virtual_book.mark_to_market(&output.symbol, last_candle.close, chrono::Utc::now()) {
                            let regime_drifted = shadow_jury
                                .status_of(&closed.strategy, &closed.symbol)
                                != crate::application::agents::shadow_jury::StrategyStatus::Real;
                            shadow_jury.record_trade_result(&closed.strategy, &closed.symbol, closed.trade, regime_drifted);
                        }
                    }

                    let higher_timeframe = regime_cache
                        .read()
                        .await
                        .get(&(output.symbol.clone(), HIGHER_TIMEFRAME))
                        .cloned();

                    let emitted = match factory
                        .generate(&output.symbol, &output.candles, &output.regime, higher_timeframe.as_ref())
                        .await
                    {
                        Ok(signals) => signals,
                        Err(err) => {
                            warn!(symbol = %output.symbol, error = %err, "signal factory failed");
                            continue;
                        }
                    };

                    for mut signal in emitted {
                        metrics
                            .signals_emitted_total
                            .with_label_values(&[&signal.strategy, &signal.symbol])
                            .inc();
                        notifier
                            .notify(
                                NotificationKind::SignalEmitted,
                                serde_json::json!({ "trace_id": signal.trace_id, "symbol": signal.symbol }),
                            )
                            .await;

                        let mode = shadow_jury.route(&signal.strategy, &signal.symbol);
                        signal.execution_mode = mode;
                        if let Err(err) = persistence.signals.update(&signal).await {
                            warn!(trace_id = %signal.trace_id, error = %err, "failed to persist execution mode");
                            continue;
                        }

                        match mode {
                            ExecutionMode::Virtual => {
                                virtual_book.open_from_signal(&signal);
                            }
                            ExecutionMode::Real => {
                                if let Err(err) = handle_real_signal(
                                    &mut signal,
                                    &persistence,
                                    &executor,
                                    &broker,
                                    &notifier,
                                    &metrics,
                                    &account_currency,
                                )
                                .await
                                {
                                    warn!(trace_id = %signal.trace_id, error = %err, "executor pipeline failed");
                                }
                            }
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("signal pipeline draining in-flight work before shutdown");
                    break;
                }
            }
        }
    })
}

async fn handle_real_signal(
    signal: &mut Signal,
    persistence: &Persistence,
    executor: &Executor,
    broker: &Arc<dyn crate::domain::ports::BrokerConnector>,
    notifier: &Arc<dyn crate::domain::ports::Notifier>,
    metrics: &Metrics,
    account_currency: &str,
) -> anyhow::Result<()> {
    let Some(profile) = persistence.asset_profiles.get(&signal.symbol).await? else {
        // `spec.md` §3: a signal for an unprofiled symbol is rejected.
        signal.reject("unprofiled_symbol: no AssetProfile on record");
        persistence.signals.update(signal).await?;
        return Ok(());
    };

    let conversion_rate = match determine_conversion(&profile, account_currency, None) {
        Ok(_) => None,
        Err(_) => resolve_conversion_rate(broker, &profile.quote_currency, account_currency).await,
    };

    let local_open_positions = persistence.positions.list_open().await?;
    let risk_state = persistence.risk_state.get().await?;

    let outcome = executor
        .execute(
            signal,
            account_currency,
            conversion_rate,
            &profile,
            &local_open_positions,
            &risk_state,
        )
        .await?;

    match outcome {
        crate::application::agents::executor::ExecutionOutcome::Executed { ticket } => {
            metrics
                .trades_executed_total
                .with_label_values(&[&signal.symbol, &format!("{:?}", signal.direction)])
                .inc();
            notifier
                .notify(
                    NotificationKind::TradeExecuted,
                    serde_json::json!({ "trace_id": signal.trace_id, "ticket": ticket }),
                )
                .await;
        }
        crate::application::agents::executor::ExecutionOutcome::Rejected { guard, reason } => {
            info!(trace_id = %signal.trace_id, guard, reason, "signal rejected");
        }
    }
    Ok(())
}

/// Position Manager cadence — `spec.md` §4.7. Runs on its own subtask so a
/// slow signal pipeline never starves supervision of open positions.
fn spawn_position_manager(
    config: &Config,
    persistence: Arc<Persistence>,
    services: &ServicesHandle,
    regime_cache: Arc<RwLock<HashMap<(String, Timeframe), RegimeSample>>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let manager = PositionManager::new(Arc::clone(&services.broker), Arc::clone(&persistence.positions));
    let broker = Arc::clone(&services.broker);
    let asset_profiles = Arc::clone(&persistence.asset_profiles);
    let symbols = config.symbols.clone();
    let cadence = std::time::Duration::from_secs(config.position_manager_cadence_secs);
    let status = services.agent_status.clone();

    tokio::spawn(async move {
        status.register("position_manager", chrono::Duration::from_std(cadence).unwrap()).await;
        let mut ticker = tokio::time::interval(cadence);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    status.heartbeat("position_manager").await;
                    let inputs = build_supervision_inputs(&symbols, &broker, &asset_profiles, &regime_cache).await;
                    if inputs.is_empty() {
                        continue;
                    }
                    match manager.supervise_cycle(&inputs).await {
                        Ok(actions) => {
                            for (ticket, action) in actions {
                                tracing::debug!(ticket, ?action, "position supervised");
                            }
                        }
                        Err(err) => warn!(error = %err, "position manager cycle failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("position manager shutting down");
                    break;
                }
            }
        }
    })
}

async fn build_supervision_inputs(
    symbols: &[String],
    broker: &Arc<dyn crate::domain::ports::BrokerConnector>,
    asset_profiles: &Arc<dyn crate::domain::repositories::AssetProfileRepository>,
    regime_cache: &Arc<RwLock<HashMap<(String, Timeframe), RegimeSample>>>,
) -> HashMap<String, crate::application::agents::position_manager::SupervisionInput> {
    let mut inputs = HashMap::new();
    let cache = regime_cache.read().await;

    for symbol in symbols {
        let Ok(Some(profile)) = asset_profiles.get(symbol).await else {
            continue;
        };
        let Ok(tick) = broker.get_tick(symbol).await else {
            continue;
        };
        let sample = cache.get(&(symbol.clone(), ENTRY_TIMEFRAME));
        let label = sample.map(|s| s.label).unwrap_or(RegimeLabel::Normal);
        let atr = sample
            .and_then(|s| Decimal::from_f64(s.atr))
            .unwrap_or(Decimal::ZERO);

        inputs.insert(
            symbol.clone(),
            crate::application::agents::position_manager::SupervisionInput {
                current_regime: label,
                price: (tick.bid + tick.ask) / Decimal::TWO,
                atr,
                freeze_level: profile.freeze_level,
                contract_size: profile.contract_size,
                commission: Decimal::ZERO,
                swap: Decimal::ZERO,
                spread: tick.ask - tick.bid,
                pip_value: profile.pip_size,
            },
        );
    }

    inputs
}

/// Coherence Monitor periodic sweep — `spec.md` §4.9.
fn spawn_coherence_monitor(
    config: &Config,
    persistence: Arc<Persistence>,
    services: &ServicesHandle,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let monitor = CoherenceMonitor::new(Arc::clone(&persistence.signals), Arc::clone(&persistence.coherence_events));
    let notifier = Arc::clone(&services.notifier);
    let metrics = services.metrics.clone();
    let cadence = std::time::Duration::from_secs(config.coherence_sweep_cadence_secs);
    let status = services.agent_status.clone();

    tokio::spawn(async move {
        status.register("coherence_monitor", chrono::Duration::from_std(cadence).unwrap()).await;
        let mut ticker = tokio::time::interval(cadence);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    status.heartbeat("coherence_monitor").await;
                    match monitor.sweep(chrono::Utc::now()).await {
                        Ok(emitted) if emitted > 0 => {
                            metrics.coherence_events_total.with_label_values(&["sweep"]).inc_by(emitted as f64);
                            notifier
                                .notify(NotificationKind::CoherenceFault, serde_json::json!({ "emitted": emitted }))
                                .await;
                        }
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "coherence sweep failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("coherence monitor shutting down");
                    break;
                }
            }
        }
    })
}

/// Trade Closure Listener + Edge Tuner — `spec.md` §4.8. Driven off the
/// broker's own push channel of `ClosedTradeEvent`s rather than polling;
/// idempotent on `event.ticket` so a reconnect replay is a safe no-op.
fn spawn_closure_listener(
    config: &Config,
    persistence: Arc<Persistence>,
    services: &ServicesHandle,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let listener = TradeClosureListener::new(Arc::clone(&persistence.trade_results), Arc::clone(&persistence.risk_state));
    let mut edge_tuner = EdgeTuner::new(Arc::clone(&persistence.dynamic_params), Arc::clone(&persistence.tuning_log));
    let broker = Arc::clone(&services.broker);
    let notifier = Arc::clone(&services.notifier);
    let metrics = services.metrics.clone();
    let dynamic_params = Arc::clone(&services.dynamic_params);
    let trade_results = Arc::clone(&persistence.trade_results);
    let status = services.agent_status.clone();
    let retune_window: usize = config.scanner_worker_pool_cap.max(20);

    tokio::spawn(async move {
        status.register("closure_listener", chrono::Duration::hours(1)).await;

        let mut closed_rx = match broker.subscribe_closed_trades().await {
            Ok(rx) => rx,
            Err(err) => {
                warn!(error = %err, "broker does not support a closed-trade push channel; listener idle");
                let (_tx, rx) = broadcast::channel(1);
                rx
            }
        };

        loop {
            tokio::select! {
                event = closed_rx.recv() => {
                    let event = match event {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "closure listener lagged the broker's push channel");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    status.heartbeat("closure_listener").await;

                    let symbol = event.symbol.clone();
                    let result = event.result;
                    let pnl = event.pnl;

                    match listener.handle_trade_closed(event).await {
                        Ok(lockdown_just_engaged) => {
                            metrics
                                .trades_closed_total
                                .with_label_values(&[&symbol, &format!("{result:?}")])
                                .inc();
                            notifier
                                .notify(NotificationKind::TradeClosed, serde_json::json!({ "symbol": symbol, "pnl": pnl }))
                                .await;

                            if lockdown_just_engaged {
                                metrics.lockdown_status.set(1.0);
                                notifier.notify(NotificationKind::Lockdown, serde_json::json!({ "symbol": symbol })).await;
                            }

                            let recent = trade_results.recent(retune_window).await.unwrap_or_default();
                            if let Some(trigger) = edge_tuner.on_trade_closed(lockdown_just_engaged) {
                                let current = dynamic_params.read().await.clone();
                                match edge_tuner.retune(&current, &recent, trigger).await {
                                    Ok(next) => {
                                        metrics.tuning_events_total.with_label_values(&["retune"]).inc();
                                        *dynamic_params.write().await = next;
                                    }
                                    Err(err) => warn!(error = %err, "edge tuner retune failed"),
                                }
                            }
                        }
                        Err(err) => warn!(error = %err, "trade closure handling failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("closure listener shutting down");
                    break;
                }
            }
        }
    })
}

/// Watches `AgentStatusRegistry` for stale heartbeats and raises a
/// `HEARTBEAT_LOST` notification — `spec.md` §4.1: "stale heartbeat (>3
/// cycles) raises a health fault."
fn spawn_heartbeat_watchdog(services: &ServicesHandle, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
    let status = services.agent_status.clone();
    let notifier = Arc::clone(&services.notifier);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let stale = status.stale_agents(chrono::Utc::now()).await;
                    for agent in stale {
                        warn!(agent, "heartbeat lost");
                        notifier
                            .notify(NotificationKind::HeartbeatLost, serde_json::json!({ "agent": agent }))
                            .await;
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    })
}
