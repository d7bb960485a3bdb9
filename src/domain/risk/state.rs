//! `RiskState` — process-wide shared state mutated only through the
//! Persistence component under serialized writes. Kept as the persisted
//! analog of the teacher's `domain::risk::state::RiskState`, generalized
//! with the lockdown state machine `spec.md` §4.5 requires.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::trading::TradeResult;

/// Consecutive losses at which lockdown engages, per `spec.md` §4.5.
pub const DEFAULT_N_LOCKDOWN: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub account_equity: Decimal,
    pub consecutive_losses: usize,
    pub lockdown: bool,
    pub per_trade_risk_fraction: Decimal,
    pub max_account_risk_fraction: Decimal,
    pub last_trade_outcome: Option<TradeResult>,
    pub n_lockdown: usize,
}

impl RiskState {
    pub fn new(account_equity: Decimal) -> Self {
        use rust_decimal_macros::dec;
        Self {
            account_equity,
            consecutive_losses: 0,
            lockdown: false,
            per_trade_risk_fraction: dec!(0.015),
            max_account_risk_fraction: dec!(0.06),
            last_trade_outcome: None,
            n_lockdown: DEFAULT_N_LOCKDOWN,
        }
    }

    /// Transactionally folds a closed-trade outcome into the state,
    /// updating the consecutive-loss counter and the lockdown flag.
    /// `spec.md` §4.5 `record_trade_result`.
    pub fn record_trade_result(&mut self, outcome: TradeResult, pnl: Decimal) {
        self.account_equity += pnl;
        self.last_trade_outcome = Some(outcome);

        match outcome {
            TradeResult::Loss => {
                self.consecutive_losses += 1;
                if self.consecutive_losses >= self.n_lockdown {
                    self.lockdown = true;
                }
            }
            TradeResult::Win | TradeResult::Breakeven => {
                self.consecutive_losses = 0;
            }
        }
    }

    /// Explicit operator/Edge-Tuner reset. Per `spec.md` §9, lockdown does
    /// NOT auto-clear on sustained recovery unless this is called — the
    /// source ships that path disabled, and we preserve that.
    pub fn clear_lockdown(&mut self) {
        self.lockdown = false;
        self.consecutive_losses = 0;
    }
}
