//! Scanner — `spec.md` §4.1. Kept the teacher's
//! `agents::scanner::MarketScanner` cadence + heartbeat `tokio::select!`
//! shape; generalized from "fetch top movers" to fan-out OHLC+indicator
//! fetch across a bounded worker pool (cap 8) per enabled (symbol,
//! timeframe), coalescing a cycle that hasn't finished by the next tick, and
//! marking a symbol `STALE` after three consecutive provider failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use ta::indicators::{AverageDirectionalIndex, AverageTrueRange, SimpleMovingAverage};
use ta::{DataItem, Next};

use crate::application::monitoring::AgentStatusRegistry;
use crate::domain::market::{classify, RegimeInputs, RegimeSample, Timeframe};
use crate::domain::ports::{Candle, MarketDataProvider};
use crate::domain::risk::DynamicParams;

/// Consecutive provider failures before a (symbol, timeframe) is marked
/// `STALE` and skipped until it recovers.
pub const STALE_AFTER_FAILURES: u8 = 3;

#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
    pub regime: RegimeSample,
}

pub struct ScannerConfig {
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    pub cadence: std::time::Duration,
    pub worker_pool_cap: usize,
    pub provider_timeout: std::time::Duration,
    pub lookback: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            symbols: vec![],
            timeframes: vec![Timeframe::M15],
            cadence: std::time::Duration::from_secs(60),
            worker_pool_cap: 8,
            provider_timeout: std::time::Duration::from_secs(10),
            lookback: 200,
        }
    }
}

pub struct Scanner {
    config: ScannerConfig,
    market_data: Arc<dyn MarketDataProvider>,
    status: AgentStatusRegistry,
    failure_counts: HashMap<(String, Timeframe), u8>,
    cycle_in_flight: Arc<AtomicBool>,
}

impl Scanner {
    pub fn new(
        config: ScannerConfig,
        market_data: Arc<dyn MarketDataProvider>,
        status: AgentStatusRegistry,
    ) -> Self {
        Self {
            config,
            market_data,
            status,
            failure_counts: HashMap::new(),
            cycle_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    fn is_stale(&self, key: &(String, Timeframe)) -> bool {
        self.failure_counts.get(key).copied().unwrap_or(0) >= STALE_AFTER_FAILURES
    }

    fn record_failure(&mut self, key: (String, Timeframe)) {
        let count = self.failure_counts.entry(key).or_insert(0);
        *count = count.saturating_add(1);
    }

    fn record_success(&mut self, key: &(String, Timeframe)) {
        self.failure_counts.remove(key);
    }

    /// Runs the cadence loop until `shutdown` resolves, sending one
    /// `ScanOutput` per successfully scanned (symbol, timeframe) pair per
    /// cycle on `out_tx`.
    pub async fn run(
        &mut self,
        params: Arc<tokio::sync::RwLock<DynamicParams>>,
        out_tx: mpsc::Sender<ScanOutput>,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) {
        self.status
            .register("scanner", chrono::Duration::from_std(self.config.cadence).unwrap())
            .await;
        let mut ticker = tokio::time::interval(self.config.cadence);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.status.heartbeat("scanner").await;
                    if self.cycle_in_flight.load(Ordering::SeqCst) {
                        // Previous cycle still running; coalesce by skipping this tick.
                        tracing::debug!("scanner cycle coalesced: previous cycle still in flight");
                        continue;
                    }
                    self.run_one_cycle(Arc::clone(&params), out_tx.clone()).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("scanner shutting down, draining in-flight cycle");
                    break;
                }
            }
        }
    }

    async fn run_one_cycle(
        &mut self,
        params: Arc<tokio::sync::RwLock<DynamicParams>>,
        out_tx: mpsc::Sender<ScanOutput>,
    ) {
        self.cycle_in_flight.store(true, Ordering::SeqCst);
        let semaphore = Arc::new(Semaphore::new(self.config.worker_pool_cap));
        let current_params = params.read().await.clone();

        let mut handles = Vec::new();
        for symbol in &self.config.symbols {
            for timeframe in &self.config.timeframes {
                let key = (symbol.clone(), *timeframe);
                if self.is_stale(&key) {
                    continue;
                }

                let semaphore = Arc::clone(&semaphore);
                let market_data = Arc::clone(&self.market_data);
                let out_tx = out_tx.clone();
                let symbol = symbol.clone();
                let timeframe = *timeframe;
                let lookback = self.config.lookback;
                let timeout = self.config.provider_timeout;
                let params = current_params.clone();

                handles.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire().await.expect("semaphore not closed");
                    let fetch = tokio::time::timeout(
                        timeout,
                        market_data.get_ohlc(&symbol, timeframe, lookback),
                    )
                    .await;

                    let result = match fetch {
                        Ok(Ok(candles)) => scan_one(&symbol, timeframe, candles, &params),
                        Ok(Err(err)) => Err(err),
                        Err(_) => Err(anyhow::anyhow!("provider timeout for {symbol} {timeframe}")),
                    };

                    if let Ok(output) = &result {
                        let _ = out_tx.send(output.clone()).await;
                    }
                    (key, result)
                }));
            }
        }

        for handle in handles {
            if let Ok((key, result)) = handle.await {
                match result {
                    Ok(_) => self.record_success(&key),
                    Err(err) => {
                        tracing::warn!(symbol = %key.0, timeframe = %key.1, error = %err, "scan failed");
                        self.record_failure(key);
                    }
                }
            }
        }

        self.cycle_in_flight.store(false, Ordering::SeqCst);
    }
}

/// Computes indicators from `candles` and classifies the regime for one
/// (symbol, timeframe) pair. Pure with respect to its inputs so it can be
/// tested without a live provider.
pub fn scan_one(
    symbol: &str,
    timeframe: Timeframe,
    candles: Vec<Candle>,
    params: &DynamicParams,
) -> anyhow::Result<ScanOutput> {
    let inputs = compute_regime_inputs(&candles)
        .ok_or_else(|| anyhow::anyhow!("insufficient candle history for {symbol} {timeframe}"))?;
    let label = classify(inputs, params);

    let regime = RegimeSample {
        symbol: symbol.to_string(),
        timeframe: timeframe.to_string(),
        label,
        adx: inputs.adx,
        atr: inputs.atr,
        sma_short: inputs.sma_short,
        sma_long: inputs.sma_long,
        slope_short: inputs.slope_short,
        timestamp: chrono::Utc::now(),
    };

    Ok(ScanOutput {
        symbol: symbol.to_string(),
        timeframe,
        candles,
        regime,
    })
}

const SMA_SHORT_PERIOD: usize = 20;
const SMA_LONG_PERIOD: usize = 200;
const ADX_PERIOD: usize = 14;
const ATR_PERIOD: usize = 14;
const ROLLING_ATR_PERIOD: usize = 30;

/// Feeds `candles` (oldest first) through the `ta` crate's streaming
/// indicators to produce one `RegimeInputs` snapshot as of the last candle.
fn compute_regime_inputs(candles: &[Candle]) -> Option<RegimeInputs> {
    if candles.len() < SMA_LONG_PERIOD.max(ROLLING_ATR_PERIOD + ATR_PERIOD) {
        return None;
    }

    let mut sma_short = SimpleMovingAverage::new(SMA_SHORT_PERIOD).ok()?;
    let mut sma_long = SimpleMovingAverage::new(SMA_LONG_PERIOD).ok()?;
    let mut atr = AverageTrueRange::new(ATR_PERIOD).ok()?;
    let mut adx = AverageDirectionalIndex::new(ADX_PERIOD).ok()?;

    let mut sma_short_history: Vec<f64> = Vec::new();
    let mut atr_pct_history: Vec<f64> = Vec::new();

    let mut last_sma_short = 0.0;
    let mut last_sma_long = 0.0;
    let mut last_adx = 0.0;
    let mut last_atr = 0.0;
    let mut last_price = 0.0;

    for candle in candles {
        let item = match DataItem::builder()
            .open(to_f64(candle.open))
            .high(to_f64(candle.high))
            .low(to_f64(candle.low))
            .close(to_f64(candle.close))
            .volume(to_f64(candle.volume))
            .build()
        {
            Ok(item) => item,
            Err(_) => continue,
        };

        last_sma_short = sma_short.next(&item);
        last_sma_long = sma_long.next(&item);
        last_atr = atr.next(&item);
        last_adx = adx.next(&item).adx;
        last_price = to_f64(candle.close);

        sma_short_history.push(last_sma_short);
        if last_price != 0.0 {
            atr_pct_history.push((last_atr / last_price) * 100.0);
        }
    }

    let slope_short = if sma_short_history.len() >= 6 {
        let recent = sma_short_history[sma_short_history.len() - 1];
        let earlier = sma_short_history[sma_short_history.len() - 6];
        if earlier != 0.0 {
            (recent - earlier) / earlier
        } else {
            0.0
        }
    } else {
        0.0
    };

    let rolling_avg_atr_pct = if atr_pct_history.len() >= ROLLING_ATR_PERIOD {
        let window = &atr_pct_history[atr_pct_history.len() - ROLLING_ATR_PERIOD..];
        window.iter().sum::<f64>() / window.len() as f64
    } else if !atr_pct_history.is_empty() {
        atr_pct_history.iter().sum::<f64>() / atr_pct_history.len() as f64
    } else {
        0.0
    };

    Some(RegimeInputs {
        adx: last_adx,
        atr: last_atr,
        price: last_price,
        sma_short: last_sma_short,
        sma_long: last_sma_long,
        slope_short,
        rolling_avg_atr_pct,
    })
}

fn to_f64(value: rust_decimal::Decimal) -> f64 {
    value.to_string().parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(i: i64, base: f64) -> Candle {
        let price = base + (i as f64) * 0.01;
        Candle {
            symbol: "EURUSD".into(),
            open: rust_decimal::Decimal::try_from(price).unwrap(),
            high: rust_decimal::Decimal::try_from(price + 0.02).unwrap(),
            low: rust_decimal::Decimal::try_from(price - 0.02).unwrap(),
            close: rust_decimal::Decimal::try_from(price).unwrap(),
            volume: dec!(1000),
            timestamp: chrono::Utc::now(),
        }
    }

    fn trending_candles(n: usize) -> Vec<Candle> {
        (0..n as i64).map(|i| candle(i, 1.0)).collect()
    }

    #[test]
    fn insufficient_history_returns_none() {
        let candles = trending_candles(10);
        assert!(compute_regime_inputs(&candles).is_none());
    }

    #[test]
    fn sufficient_history_produces_regime_inputs() {
        let candles = trending_candles(250);
        let inputs = compute_regime_inputs(&candles).unwrap();
        assert!(inputs.sma_short > 0.0);
        assert!(inputs.sma_long > 0.0);
    }

    #[test]
    fn scan_one_classifies_a_regime() {
        let candles = trending_candles(250);
        let params = DynamicParams::default();
        let output = scan_one("EURUSD", Timeframe::M15, candles, &params).unwrap();
        assert_eq!(output.symbol, "EURUSD");
    }

    #[test]
    fn stale_tracking_trips_after_threshold() {
        let config = ScannerConfig::default();
        let status = AgentStatusRegistry::new();
        struct NoopProvider;
        #[async_trait::async_trait]
        impl MarketDataProvider for NoopProvider {
            async fn get_ohlc(
                &self,
                _symbol: &str,
                _timeframe: Timeframe,
                _lookback: usize,
            ) -> anyhow::Result<Vec<Candle>> {
                Ok(vec![])
            }
        }
        let mut scanner = Scanner::new(config, Arc::new(NoopProvider), status);
        let key = ("EURUSD".to_string(), Timeframe::M15);
        for _ in 0..STALE_AFTER_FAILURES {
            scanner.record_failure(key.clone());
        }
        assert!(scanner.is_stale(&key));
    }
}
