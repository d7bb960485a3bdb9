//! Edge Tuner — `spec.md` §4.8, second half. Grounded in the teacher's
//! `application::optimization::adaptive_optimization_service`'s periodic
//! re-evaluation pattern; its backtest-driven model is replaced with the
//! trigger policy and bounded-output rule this specification mandates.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::repositories::{DynamicParamsRepository, TuningLogEntry, TuningLogRepository};
use crate::domain::risk::dynamic_params::ParamBounds;
use crate::domain::risk::DynamicParams;
use crate::domain::trading::{Trade, TradeResult};

/// Re-tune every N closed trades by default.
pub const DEFAULT_RETUNE_INTERVAL: u64 = 5;

pub enum TuningTrigger {
    TradeCountElapsed,
    Lockdown,
}

pub struct EdgeTuner {
    params_repo: Arc<dyn DynamicParamsRepository>,
    tuning_log: Arc<dyn TuningLogRepository>,
    bounds: ParamBounds,
    retune_interval: u64,
    trades_since_last_tune: u64,
}

impl EdgeTuner {
    pub fn new(
        params_repo: Arc<dyn DynamicParamsRepository>,
        tuning_log: Arc<dyn TuningLogRepository>,
    ) -> Self {
        Self {
            params_repo,
            tuning_log,
            bounds: ParamBounds::default(),
            retune_interval: DEFAULT_RETUNE_INTERVAL,
            trades_since_last_tune: 0,
        }
    }

    /// Called once per closed trade. Returns `Some(trigger)` if this trade
    /// caused a retune to fire.
    pub fn on_trade_closed(&mut self, lockdown_engaged: bool) -> Option<TuningTrigger> {
        self.trades_since_last_tune += 1;
        if lockdown_engaged {
            self.trades_since_last_tune = 0;
            return Some(TuningTrigger::Lockdown);
        }
        if self.trades_since_last_tune >= self.retune_interval {
            self.trades_since_last_tune = 0;
            return Some(TuningTrigger::TradeCountElapsed);
        }
        None
    }

    /// Produces a retuned `DynamicParams` from recent trade history, bounded
    /// to `ParamBounds`, and persists it atomically alongside a tuning-log
    /// entry.
    pub async fn retune(
        &self,
        current: &DynamicParams,
        recent_trades: &[Trade],
        trigger: TuningTrigger,
    ) -> anyhow::Result<DynamicParams> {
        let mut next = current.clone();

        if !recent_trades.is_empty() {
            let wins = recent_trades
                .iter()
                .filter(|t| t.result == TradeResult::Win)
                .count();
            let win_rate = wins as f64 / recent_trades.len() as f64;

            // A losing edge (win rate below 40%) tightens the score floor
            // and trims risk per trade; a strong edge (above 60%) loosens
            // both slightly. Either way the result is clamped to hard
            // bounds below, so this never runs away.
            if win_rate < 0.4 {
                next.minimum_score = next.minimum_score.saturating_add(5);
                next.per_trade_risk_fraction *= Decimal::new(90, 2); // x0.90
            } else if win_rate > 0.6 {
                next.minimum_score = next.minimum_score.saturating_sub(5);
                next.per_trade_risk_fraction *= Decimal::new(105, 2); // x1.05
            }
        }

        next.clamp_to(&self.bounds);

        self.params_repo.set(&next).await?;

        let reason = match trigger {
            TuningTrigger::TradeCountElapsed => "TRADE_COUNT_ELAPSED".to_string(),
            TuningTrigger::Lockdown => "LOCKDOWN".to_string(),
        };
        let entry = TuningLogEntry {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            params: next.clone(),
            trigger_reason: reason,
        };
        self.tuning_log.insert(&entry).await?;

        Ok(next)
    }
}
