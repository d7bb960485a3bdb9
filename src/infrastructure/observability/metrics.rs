//! Prometheus metrics — kept from the teacher's `infrastructure::observability::metrics`
//! shape (a struct of pre-registered gauges/counters behind one `Registry`),
//! re-pointed at this system's own signals: pipeline cadence, risk lockdown,
//! coherence faults, tuning events.

use prometheus::{
    core::{AtomicF64, GenericGauge},
    CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    pub signals_emitted_total: CounterVec,
    pub trades_executed_total: CounterVec,
    pub trades_closed_total: CounterVec,
    pub coherence_events_total: CounterVec,
    pub lockdown_status: GenericGauge<AtomicF64>,
    pub account_equity: GenericGauge<AtomicF64>,
    pub scan_cycle_seconds: HistogramVec,
    pub tuning_events_total: CounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let signals_emitted_total = CounterVec::new(
            Opts::new(
                "aethelgard_signals_emitted_total",
                "Signals emitted by the Signal Factory",
            ),
            &["strategy", "symbol"],
        )?;
        registry.register(Box::new(signals_emitted_total.clone()))?;

        let trades_executed_total = CounterVec::new(
            Opts::new(
                "aethelgard_trades_executed_total",
                "Signals the Executor turned into live trades",
            ),
            &["symbol", "direction"],
        )?;
        registry.register(Box::new(trades_executed_total.clone()))?;

        let trades_closed_total = CounterVec::new(
            Opts::new(
                "aethelgard_trades_closed_total",
                "Closed trades recorded by the Trade Closure Listener",
            ),
            &["symbol", "result"],
        )?;
        registry.register(Box::new(trades_closed_total.clone()))?;

        let coherence_events_total = CounterVec::new(
            Opts::new(
                "aethelgard_coherence_events_total",
                "Coherence faults emitted by the Coherence Monitor",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(coherence_events_total.clone()))?;

        let lockdown_status = Gauge::with_opts(Opts::new(
            "aethelgard_lockdown_status",
            "1 if RiskState.lockdown is engaged, else 0",
        ))?;
        registry.register(Box::new(lockdown_status.clone()))?;

        let account_equity = Gauge::with_opts(Opts::new(
            "aethelgard_account_equity",
            "Current tracked account equity",
        ))?;
        registry.register(Box::new(account_equity.clone()))?;

        let scan_cycle_seconds = HistogramVec::new(
            HistogramOpts::new(
                "aethelgard_scan_cycle_seconds",
                "Wall-clock duration of one scanner cycle",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(scan_cycle_seconds.clone()))?;

        let tuning_events_total = CounterVec::new(
            Opts::new(
                "aethelgard_tuning_events_total",
                "Edge Tuner retune events by trigger",
            ),
            &["trigger"],
        )?;
        registry.register(Box::new(tuning_events_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            signals_emitted_total,
            trades_executed_total,
            trades_closed_total,
            coherence_events_total,
            lockdown_status,
            account_equity,
            scan_cycle_seconds,
            tuning_events_total,
        })
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("failed to build default Metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_namespace_prefix() {
        let metrics = Metrics::new().unwrap();
        assert!(metrics.render().contains("aethelgard_"));
    }

    #[test]
    fn lockdown_gauge_reflects_set_value() {
        let metrics = Metrics::new().unwrap();
        metrics.lockdown_status.set(1.0);
        assert!(metrics.render().contains("aethelgard_lockdown_status 1"));
    }
}
