//! Coherence Monitor — `spec.md` §4.9. No direct teacher analog; grounded
//! in the periodic per-cycle sweep pattern of `agent_status` above,
//! re-targeted to emit `CoherenceEvent`s instead of health records.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::coherence::{CoherenceEvent, CoherenceKind};
use crate::domain::market::Timeframe;
use crate::domain::repositories::{CoherenceEventRepository, SignalRepository};
use crate::domain::trading::{symbol, SignalStatus};

pub struct CoherenceMonitor {
    signals: Arc<dyn SignalRepository>,
    events: Arc<dyn CoherenceEventRepository>,
}

impl CoherenceMonitor {
    pub fn new(
        signals: Arc<dyn SignalRepository>,
        events: Arc<dyn CoherenceEventRepository>,
    ) -> Self {
        Self { signals, events }
    }

    /// One sweep. Scans pending signals older than `cutoff` for each of the
    /// four disagreement kinds `spec.md` §4.9 names and persists any it
    /// finds. Module-toggle mismatch is reported by whichever component
    /// notices it (bootstrap/config reload), not discovered here; this sweep
    /// covers the remaining three kinds plus the executed-without-ticket
    /// check, which is reported inline by the Executor when it happens but
    /// is also re-swept here as a defense in depth.
    pub async fn sweep(&self, now: chrono::DateTime<chrono::Utc>) -> anyhow::Result<usize> {
        let mut emitted = 0usize;

        // Widest possible window first (longest timeframe's timeout), then
        // each signal is re-checked against its own timeframe's deadline —
        // `spec.md` §4.9 calls this timeout "timeframe-dependent".
        let widest_cutoff = now - Timeframe::D1.pending_signal_timeout();
        let candidates = self.signals.list_pending_older_than(widest_cutoff).await?;

        for signal in &candidates {
            let timeout = Timeframe::parse(&signal.timeframe)
                .map(Timeframe::pending_signal_timeout)
                .unwrap_or_else(|| Timeframe::M15.pending_signal_timeout());
            if now - signal.generated_at < timeout {
                continue;
            }

            let event = CoherenceEvent::new(
                signal.trace_id,
                signal.symbol.clone(),
                signal.strategy.clone(),
                CoherenceKind::PendingTimeout,
                serde_json::json!({ "generated_at": signal.generated_at }),
            );
            self.events.insert(&event).await?;
            emitted += 1;

            if !symbol::is_canonical(&signal.symbol) {
                let event = CoherenceEvent::new(
                    signal.trace_id,
                    signal.symbol.clone(),
                    signal.strategy.clone(),
                    CoherenceKind::UnnormalizedSymbol,
                    serde_json::json!({ "raw_symbol": signal.symbol }),
                );
                self.events.insert(&event).await?;
                emitted += 1;
            }

            if signal.status == SignalStatus::Executed {
                // An executed signal reaching this sweep means it never got
                // its ticket back-written, or the Executor failed to report
                // it inline.
                let event = CoherenceEvent::new(
                    signal.trace_id,
                    signal.symbol.clone(),
                    signal.strategy.clone(),
                    CoherenceKind::ExecutedWithoutTicket,
                    serde_json::json!({ "trace_id": signal.trace_id }),
                );
                self.events.insert(&event).await?;
                emitted += 1;
            }
        }

        Ok(emitted)
    }

    /// Reports a module-toggle inconsistency directly, for callers
    /// (bootstrap, config reload) that detect it inline rather than through
    /// the periodic sweep.
    pub async fn report_module_mismatch(
        &self,
        module: &str,
        detail: serde_json::Value,
    ) -> anyhow::Result<()> {
        let event = CoherenceEvent::new(
            Uuid::new_v4(),
            "*",
            module,
            CoherenceKind::ModuleMismatch,
            detail,
        );
        self.events.insert(&event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::{Direction, Signal};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemorySignals {
        pending: Mutex<Vec<Signal>>,
    }

    #[async_trait]
    impl SignalRepository for InMemorySignals {
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
            _symbol: &str,
            _direction: Direction,
            _strategy: &str,
            _timeframe: &str,
        ) -> anyhow::Result<Vec<Signal>> {
            Ok(vec![])
        }
        async fn list_pending_older_than(
            &self,
            _cutoff: chrono::DateTime<chrono::Utc>,
        ) -> anyhow::Result<Vec<Signal>> {
            Ok(self.pending.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct InMemoryEvents {
        recorded: Mutex<Vec<CoherenceEvent>>,
    }

    #[async_trait]
    impl CoherenceEventRepository for InMemoryEvents {
        async fn insert(&self, event: &CoherenceEvent) -> anyhow::Result<()> {
            self.recorded.lock().unwrap().push(event.clone());
            Ok(())
        }
        async fn recent(&self, _limit: usize) -> anyhow::Result<Vec<CoherenceEvent>> {
            Ok(self.recorded.lock().unwrap().clone())
        }
    }

    fn sample_signal(symbol: &str) -> Signal {
        Signal::new(
            Uuid::new_v4(),
            symbol.into(),
            Direction::Buy,
            dec!(1.08),
            dec!(1.075),
            dec!(1.09),
            "dual_sma".into(),
            "M15".into(),
            chrono::Utc::now() - chrono::Duration::hours(1),
            70,
            "TREND".into(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn flags_non_canonical_symbol_on_stale_pending_signal() {
        let signals = Arc::new(InMemorySignals::default());
        let events = Arc::new(InMemoryEvents::default());
        signals.insert(&sample_signal("eur-usd")).await.unwrap();

        let monitor = CoherenceMonitor::new(signals, events.clone());
        let emitted = monitor.sweep(chrono::Utc::now()).await.unwrap();

        assert!(emitted >= 2); // PendingTimeout + UnnormalizedSymbol
        let recorded = events.recorded.lock().unwrap();
        assert!(recorded
            .iter()
            .any(|e| e.kind == CoherenceKind::UnnormalizedSymbol));
    }

    #[tokio::test]
    async fn module_mismatch_reported_directly() {
        let signals = Arc::new(InMemorySignals::default());
        let events = Arc::new(InMemoryEvents::default());
        let monitor = CoherenceMonitor::new(signals, events.clone());

        monitor
            .report_module_mismatch("signal_factory", serde_json::json!({"expected": true}))
            .await
            .unwrap();

        assert_eq!(events.recorded.lock().unwrap().len(), 1);
    }
}
