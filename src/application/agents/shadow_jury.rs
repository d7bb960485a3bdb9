//! Shadow Jury — `spec.md` §4.4. No direct teacher analog; grounded in the
//! teacher's win-rate-tracking (`application::optimization::win_rate_provider`)
//! and agent-health registry patterns for the promotion/demotion state
//! machine itself, built fresh in the teacher's idiom.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::domain::market::RegimeLabel;
use crate::domain::trading::{ExecutionMode, Trade, TradeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyStatus {
    Virtual,
    Real,
    /// A formerly-REAL strategy demoted back to VIRTUAL; distinct from a
    /// strategy that has never been promoted, purely for observability.
    Quarantined,
}

/// Rolling performance for one (strategy, symbol) pair over the windows
/// `spec.md` §4.4 names (last 24h and last 20 virtual trades).
#[derive(Debug, Clone, Default)]
pub struct RollingPerformance {
    pub recent_trades: Vec<Trade>,
    pub consecutive_wins: u32,
    pub consecutive_losses: u32,
    pub peak_equity: Decimal,
    pub running_equity: Decimal,
}

impl RollingPerformance {
    pub fn record(&mut self, trade: Trade) {
        match trade.result {
            TradeResult::Win => {
                self.consecutive_wins += 1;
                self.consecutive_losses = 0;
            }
            TradeResult::Loss => {
                self.consecutive_losses += 1;
                self.consecutive_wins = 0;
            }
            TradeResult::Breakeven => {
                self.consecutive_wins = 0;
                self.consecutive_losses = 0;
            }
        }
        self.running_equity += trade.pnl;
        if self.running_equity > self.peak_equity {
            self.peak_equity = self.running_equity;
        }
        self.recent_trades.push(trade);
        if self.recent_trades.len() > 20 {
            self.recent_trades.remove(0);
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.recent_trades.is_empty() {
            return 0.0;
        }
        let wins = self
            .recent_trades
            .iter()
            .filter(|t| t.result == TradeResult::Win)
            .count();
        wins as f64 / self.recent_trades.len() as f64
    }

    /// Gross winning PnL divided by gross losing PnL.
    pub fn profit_factor(&self) -> f64 {
        let gross_win: Decimal = self
            .recent_trades
            .iter()
            .filter(|t| t.pnl > Decimal::ZERO)
            .map(|t| t.pnl)
            .sum();
        let gross_loss: Decimal = self
            .recent_trades
            .iter()
            .filter(|t| t.pnl < Decimal::ZERO)
            .map(|t| -t.pnl)
            .sum();
        if gross_loss.is_zero() {
            return if gross_win.is_zero() { 0.0 } else { f64::INFINITY };
        }
        (gross_win / gross_loss).to_string().parse().unwrap_or(0.0)
    }

    /// Drawdown from the running peak, as a fraction.
    pub fn drawdown(&self) -> Decimal {
        if self.peak_equity.is_zero() {
            return Decimal::ZERO;
        }
        ((self.peak_equity - self.running_equity) / self.peak_equity).max(Decimal::ZERO)
    }

    fn qualifies_for_promotion(&self) -> bool {
        self.win_rate() > 0.55
            && self.profit_factor() > 1.5
            && (self.consecutive_wins >= 5 || self.recent_trades.len() >= 20)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StrategyKey {
    strategy: String,
    symbol: String,
}

pub struct ShadowJury {
    performance: HashMap<StrategyKey, RollingPerformance>,
    status: HashMap<StrategyKey, StrategyStatus>,
}

impl ShadowJury {
    pub fn new() -> Self {
        Self {
            performance: HashMap::new(),
            status: HashMap::new(),
        }
    }

    fn key(strategy: &str, symbol: &str) -> StrategyKey {
        StrategyKey {
            strategy: strategy.to_string(),
            symbol: symbol.to_string(),
        }
    }

    /// `spec.md` §4.4: decide REAL or VIRTUAL for a new signal from
    /// `strategy` on `symbol`. Never modifies entry/SL/TP.
    pub fn route(&mut self, strategy: &str, symbol: &str) -> ExecutionMode {
        let key = Self::key(strategy, symbol);
        match self.status.get(&key).copied().unwrap_or(StrategyStatus::Virtual) {
            StrategyStatus::Real => ExecutionMode::Real,
            StrategyStatus::Virtual | StrategyStatus::Quarantined => ExecutionMode::Virtual,
        }
    }

    /// Folds a closed trade into this (strategy, symbol)'s rolling
    /// performance and re-evaluates promotion/demotion.
    pub fn record_trade_result(
        &mut self,
        strategy: &str,
        symbol: &str,
        trade: Trade,
        regime_drifted: bool,
    ) {
        let key = Self::key(strategy, symbol);
        let perf = self.performance.entry(key.clone()).or_default();
        perf.record(trade);

        let current = self.status.get(&key).copied().unwrap_or(StrategyStatus::Virtual);
        let next = match current {
            StrategyStatus::Virtual | StrategyStatus::Quarantined => {
                if perf.qualifies_for_promotion() {
                    StrategyStatus::Real
                } else {
                    current
                }
            }
            StrategyStatus::Real => {
                let demote = perf.drawdown() > Decimal::new(3, 2) // 3%
                    || perf.consecutive_losses >= 3
                    || (regime_drifted && !perf.qualifies_for_promotion());
                if demote {
                    StrategyStatus::Quarantined
                } else {
                    StrategyStatus::Real
                }
            }
        };
        self.status.insert(key, next);
    }

    pub fn status_of(&self, strategy: &str, symbol: &str) -> StrategyStatus {
        self.status
            .get(&Self::key(strategy, symbol))
            .copied()
            .unwrap_or(StrategyStatus::Virtual)
    }
}

impl Default for ShadowJury {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
fn regime_label_is_favorable(label: RegimeLabel) -> bool {
    !matches!(label, RegimeLabel::Shock | RegimeLabel::Crash)
}
