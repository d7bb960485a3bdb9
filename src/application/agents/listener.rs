//! Trade Closure Listener — `spec.md` §4.8, first half. No direct teacher
//! analog; grounded in the teacher's retry-with-backoff shape used
//! elsewhere for transient persistence contention, generalized to the
//! idempotent close-event handling this specification requires.

use std::sync::Arc;
use std::time::Duration;

use crate::application::optimization::EdgeTuner;
use crate::domain::ports::ClosedTradeEvent;
use crate::domain::repositories::{RiskStateRepository, TradeResultRepository};
use crate::domain::trading::Trade;

/// Backoff schedule for transient persistence contention: 0.5s, 1.0s, 1.5s.
const RETRY_DELAYS_MS: [u64; 3] = [500, 1000, 1500];

pub struct TradeClosureListener {
    trade_results: Arc<dyn TradeResultRepository>,
    risk_state: Arc<dyn RiskStateRepository>,
}

impl TradeClosureListener {
    pub fn new(
        trade_results: Arc<dyn TradeResultRepository>,
        risk_state: Arc<dyn RiskStateRepository>,
    ) -> Self {
        Self {
            trade_results,
            risk_state,
        }
    }

    /// `spec.md` §4.8 `handle_trade_closed`. Idempotent on `event.ticket`;
    /// folds the outcome into `RiskState` and tells the caller whether
    /// lockdown just engaged, so the Edge Tuner's trigger policy can fire
    /// immediately rather than waiting for the trade-count interval.
    pub async fn handle_trade_closed(&self, event: ClosedTradeEvent) -> anyhow::Result<bool> {
        if self.with_retry(|| self.trade_results.exists(&event.ticket)).await? {
            return Ok(false);
        }

        let trade = Trade {
            ticket: event.ticket.clone(),
            symbol: event.symbol.clone(),
            entry: event.entry,
            exit: event.exit,
            entry_time: event.entry_time,
            exit_time: event.exit_time,
            pips: event.pips,
            pnl: event.pnl,
            result: event.result,
            exit_reason: event.exit_reason.clone(),
            broker_id: event.broker_id.clone(),
            signal_id: event.signal_id,
        };
        self.with_retry(|| self.trade_results.insert(&trade)).await?;

        let mut state = self.risk_state.get().await?;
        let was_locked_down = state.lockdown;
        state.record_trade_result(event.result, event.pnl);
        self.risk_state.set(&state).await?;

        Ok(state.lockdown && !was_locked_down)
    }

    /// Bounded exponential backoff for transient DB contention:
    /// `spec.md` §4.8 names exactly 3 attempts at 0.5, 1.0, 1.5 s.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        let mut last_err = None;
        for delay_ms in RETRY_DELAYS_MS {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::warn!(error = %err, delay_ms, "transient persistence error, retrying");
                    last_err = Some(err);
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
        match op().await {
            Ok(value) => Ok(value),
            Err(_) => Err(last_err.unwrap()),
        }
    }

    /// Folds a listener result into the Edge Tuner's trigger policy and, if
    /// it fires, re-tunes and persists the new `DynamicParams`.
    pub async fn drive_edge_tuner(
        &self,
        edge_tuner: &mut EdgeTuner,
        lockdown_just_engaged: bool,
        current_params: &crate::domain::risk::DynamicParams,
        recent_trades: &[Trade],
    ) -> anyhow::Result<()> {
        if let Some(trigger) = edge_tuner.on_trade_closed(lockdown_just_engaged) {
            edge_tuner.retune(current_params, recent_trades, trigger).await?;
        }
        Ok(())
    }
}
