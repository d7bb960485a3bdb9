//! Signal Factory — `spec.md` §4.3. Kept the teacher's strategy-plugin
//! trait and symbol-normalization helper (`domain::trading::symbol`),
//! generalized to every asset class; adds the Trifecta post-filter and a
//! recency-window dedup pass with no direct teacher analog.

use std::sync::Arc;

use uuid::Uuid;

use crate::application::strategies::{
    trifecta_post_filter, HigherTimeframeContext, Strategy, TrifectaInputs,
};
use crate::domain::coherence::{CoherenceEvent, CoherenceKind};
use crate::domain::market::RegimeSample;
use crate::domain::ports::Candle;
use crate::domain::repositories::{CoherenceEventRepository, SignalRepository};
use crate::domain::trading::{symbol, Signal};

/// A pending signal is deduplicated against others on the same (symbol,
/// direction, strategy, timeframe) within this recency window, narrowed for
/// fast-moving regimes.
fn recency_window(regime: &RegimeSample) -> chrono::Duration {
    use crate::domain::market::RegimeLabel;
    match regime.label {
        RegimeLabel::Shock | RegimeLabel::Crash => chrono::Duration::minutes(5),
        RegimeLabel::Volatile => chrono::Duration::minutes(15),
        _ => chrono::Duration::hours(1),
    }
}

pub struct SignalFactory {
    strategies: Vec<Box<dyn Strategy>>,
    signals: Arc<dyn SignalRepository>,
    coherence_events: Arc<dyn CoherenceEventRepository>,
}

impl SignalFactory {
    pub fn new(
        strategies: Vec<Box<dyn Strategy>>,
        signals: Arc<dyn SignalRepository>,
        coherence_events: Arc<dyn CoherenceEventRepository>,
    ) -> Self {
        Self {
            strategies,
            signals,
            coherence_events,
        }
    }

    /// `spec.md` §4.3 `generate(symbol, bars, regime)`. Runs every
    /// registered strategy, normalizes the symbol, applies the Trifecta
    /// post-filter, deduplicates, and persists survivors as PENDING.
    /// `higher_timeframe` is the most recent regime sample from this
    /// symbol's configured higher timeframe, when one has been scanned yet;
    /// `None` puts the Trifecta filter in degraded mode.
    pub async fn generate(
        &self,
        raw_symbol: &str,
        candles: &[Candle],
        regime: &RegimeSample,
        higher_timeframe: Option<&RegimeSample>,
    ) -> anyhow::Result<Vec<Signal>> {
        // `normalize_symbol` is itself idempotent, so its own output always
        // passes `is_canonical`; the real failure mode this check exists for
        // is a raw symbol with no alphanumeric characters at all (e.g. a
        // malformed provider feed), which normalizes to the empty string.
        let canonical = symbol::normalize_symbol(raw_symbol);
        if canonical.is_empty() {
            let event = CoherenceEvent::new(
                Uuid::new_v4(),
                raw_symbol,
                "signal_factory",
                CoherenceKind::UnnormalizedSymbol,
                serde_json::json!({ "raw_symbol": raw_symbol }),
            );
            self.coherence_events.insert(&event).await?;
            return Ok(vec![]);
        }

        let higher_timeframe_ctx = higher_timeframe.map(HigherTimeframeContext::from_regime_sample);

        let mut emitted = Vec::new();
        for strategy in &self.strategies {
            let Some(candidate) = strategy.evaluate(candles, regime) else {
                continue;
            };

            let filtered = trifecta_post_filter(TrifectaInputs {
                higher_timeframe: higher_timeframe_ctx,
                current_regime: regime.label,
                hour_of_day_utc: {
                    use chrono::Timelike;
                    chrono::Utc::now().hour()
                },
                candidate: &candidate,
            });
            let Some(candidate) = filtered else {
                continue;
            };

            let existing = self
                .signals
                .find_pending(&canonical, candidate.direction, strategy.name(), &regime.timeframe)
                .await?;
            let window = recency_window(regime);
            let now = chrono::Utc::now();
            let duplicate = existing
                .iter()
                .any(|s| now.signed_duration_since(s.generated_at) < window);
            if duplicate {
                continue;
            }

            let signal = Signal::new(
                Uuid::new_v4(),
                canonical.clone(),
                candidate.direction,
                candidate.entry,
                candidate.stop_loss,
                candidate.take_profit,
                strategy.name().to_string(),
                regime.timeframe.clone(),
                now,
                candidate.score,
                format!("{:?}", regime.label).to_uppercase(),
            )?;

            self.signals.insert(&signal).await?;
            emitted.push(signal);
        }

        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::strategies::StrategyCandidate;
    use crate::domain::market::RegimeLabel;
    use crate::domain::trading::Direction;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct AlwaysBuyStrategy;
    impl Strategy for AlwaysBuyStrategy {
        fn name(&self) -> &'static str {
            "always_buy"
        }
        fn evaluate(&self, _candles: &[Candle], _regime: &RegimeSample) -> Option<StrategyCandidate> {
            Some(StrategyCandidate {
                direction: Direction::Buy,
                entry: dec!(1.08),
                stop_loss: dec!(1.075),
                take_profit: dec!(1.09),
                score: 80,
            })
        }
    }

    #[derive(Default)]
    struct MemSignals {
        pending: Mutex<Vec<Signal>>,
    }

    #[async_trait]
    impl SignalRepository for MemSignals {
        async fn insert(&self, signal: &Signal) -> anyhow::Result<()> {
            self.pending.lock().unwrap().push(signal.clone());
            Ok(())
        }
        async fn update(&self, _signal: &Signal) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get(&self, _trace_id: Uuid) -> anyhow::Result<Option<Signal>> {
            Ok(None)
        }
        async fn find_pending(
            &self,
            symbol: &str,
            direction: Direction,
            strategy: &str,
            timeframe: &str,
        ) -> anyhow::Result<Vec<Signal>> {
            Ok(self
                .pending
                .lock()
                .unwrap()
                .iter()
                .filter(|s| {
                    s.symbol == symbol
                        && s.direction == direction
                        && s.strategy == strategy
                        && s.timeframe == timeframe
                })
                .cloned()
                .collect())
        }
        async fn list_pending_older_than(
            &self,
            _cutoff: chrono::DateTime<chrono::Utc>,
        ) -> anyhow::Result<Vec<Signal>> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct MemEvents;
    #[async_trait]
    impl CoherenceEventRepository for MemEvents {
        async fn insert(&self, _event: &CoherenceEvent) -> anyhow::Result<()> {
            Ok(())
        }
        async fn recent(&self, _limit: usize) -> anyhow::Result<Vec<CoherenceEvent>> {
            Ok(vec![])
        }
    }

    fn sample_regime() -> RegimeSample {
        RegimeSample {
            symbol: "EURUSD".into(),
            timeframe: "M15".into(),
            label: RegimeLabel::Trend,
            adx: 30.0,
            atr: 0.01,
            sma_short: 1.02,
            sma_long: 1.0,
            slope_short: 0.01,
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn unnormalizable_symbol_is_rejected_with_coherence_event() {
        let signals = Arc::new(MemSignals::default());
        let events = Arc::new(MemEvents::default());
        let factory = SignalFactory::new(vec![Box::new(AlwaysBuyStrategy)], signals, events);

        let result = factory
            .generate("---", &[], &sample_regime(), None)
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn emits_and_persists_a_signal_for_a_canonical_symbol() {
        let signals = Arc::new(MemSignals::default());
        let events = Arc::new(MemEvents::default());
        let factory = SignalFactory::new(vec![Box::new(AlwaysBuyStrategy)], signals.clone(), events);

        let result = factory
            .generate("EURUSD", &[], &sample_regime(), None)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(signals.pending.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_within_recency_window_is_suppressed() {
        let signals = Arc::new(MemSignals::default());
        let events = Arc::new(MemEvents::default());
        let factory = SignalFactory::new(vec![Box::new(AlwaysBuyStrategy)], signals.clone(), events);

        let regime = sample_regime();
        factory.generate("EURUSD", &[], &regime, None).await.unwrap();
        let second = factory.generate("EURUSD", &[], &regime, None).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(signals.pending.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn higher_timeframe_trap_zone_rejects_even_a_qualifying_candidate() {
        let signals = Arc::new(MemSignals::default());
        let events = Arc::new(MemEvents::default());
        let factory = SignalFactory::new(vec![Box::new(AlwaysBuyStrategy)], signals.clone(), events);

        let mut higher = sample_regime();
        higher.timeframe = "H4".into();
        higher.label = RegimeLabel::Trend;
        higher.sma_short = 0.95; // downtrend on the higher timeframe
        higher.sma_long = 1.0;

        let result = factory
            .generate("EURUSD", &[], &sample_regime(), Some(&higher))
            .await
            .unwrap();
        assert!(result.is_empty());
        assert!(signals.pending.lock().unwrap().is_empty());
    }
}
