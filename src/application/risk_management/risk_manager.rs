//! `RiskManager` — final veto on REAL signals and the home of
//! `record_trade_result`. Kept as the teacher's command-dispatch
//! `RiskManager` struct (a `RiskCommand` enum routed through
//! `handle_command`), composing the validator pipeline from `filters` and
//! the authoritative sizer from `sizing_engine`.

use rust_decimal::Decimal;

use crate::domain::risk::RiskState;
use crate::domain::trading::{Position, Signal, TradeResult};

use super::filters::{default_pipeline, run_pipeline, RiskValidator, ValidationContext, ValidationResult};
use super::sizing_engine::{Sizer, SizingError, SizingInput};

/// Commands the rest of the system issues to the Risk Manager. Mirrors the
/// teacher's `RiskCommand` enum, generalized to this specification's two
/// operations.
pub enum RiskCommand {
    EvaluateSignal {
        signal: Signal,
        open_positions: Vec<Position>,
    },
    RecordTradeResult {
        outcome: TradeResult,
        pnl: Decimal,
    },
}

pub enum RiskCommandOutcome {
    SignalApproved,
    SignalRejected { reason: String },
    TradeResultRecorded,
}

pub struct RiskManager {
    validators: Vec<Box<dyn RiskValidator>>,
    max_positions_per_symbol_timeframe: usize,
}

impl RiskManager {
    pub fn new(max_positions_per_symbol_timeframe: usize) -> Self {
        Self {
            validators: default_pipeline(),
            max_positions_per_symbol_timeframe,
        }
    }

    /// `spec.md` §4.5 `can_take_new_trade`.
    pub fn can_take_new_trade(
        &self,
        signal: &Signal,
        open_positions: &[Position],
        risk_state: &RiskState,
        signal_risk: Decimal,
    ) -> ValidationResult {
        let ctx = ValidationContext {
            signal,
            open_positions,
            risk_state,
            signal_risk,
            max_account_risk_fraction: risk_state.max_account_risk_fraction,
            max_positions_per_symbol_timeframe: self.max_positions_per_symbol_timeframe,
        };
        run_pipeline(&self.validators, &ctx)
    }

    /// `spec.md` §4.5 `calculate_position_size`, delegated to the one
    /// authoritative sizer.
    pub fn calculate_position_size(
        &self,
        input: &SizingInput,
        contract_size: Decimal,
        volume_step: Decimal,
    ) -> Result<Decimal, SizingError> {
        Sizer::calculate_position_size(input, contract_size, volume_step)
    }

    /// `spec.md` §4.5 `record_trade_result`. Mutates the caller-owned
    /// `RiskState` transactionally with persistence — the caller persists
    /// the returned state under the same write that's already serialized
    /// through the Persistence facade.
    pub fn record_trade_result(
        &self,
        risk_state: &mut RiskState,
        outcome: TradeResult,
        pnl: Decimal,
    ) {
        risk_state.record_trade_result(outcome, pnl);
    }

    pub async fn handle_command(
        &self,
        command: RiskCommand,
        risk_state: &mut RiskState,
    ) -> RiskCommandOutcome {
        match command {
            RiskCommand::EvaluateSignal {
                signal,
                open_positions,
            } => {
                let signal_risk = Decimal::ZERO; // caller supplies a sized risk via can_take_new_trade directly in practice
                match self.can_take_new_trade(&signal, &open_positions, risk_state, signal_risk) {
                    ValidationResult::Approved => RiskCommandOutcome::SignalApproved,
                    ValidationResult::Rejected { reason } => {
                        RiskCommandOutcome::SignalRejected { reason }
                    }
                }
            }
            RiskCommand::RecordTradeResult { outcome, pnl } => {
                self.record_trade_result(risk_state, outcome, pnl);
                RiskCommandOutcome::TradeResultRecorded
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::Direction;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn sample_signal() -> Signal {
        Signal::new(
            Uuid::new_v4(),
            "EURUSD".into(),
            Direction::Buy,
            dec!(1.08),
            dec!(1.075),
            dec!(1.09),
            "dual_sma".into(),
            "M15".into(),
            chrono::Utc::now(),
            70,
            "TREND".into(),
        )
        .unwrap()
    }

    #[test]
    fn lockdown_vetoes_before_any_other_check() {
        let manager = RiskManager::new(2);
        let mut state = RiskState::new(dec!(10000));
        state.lockdown = true;
        let signal = sample_signal();
        let result = manager.can_take_new_trade(&signal, &[], &state, dec!(100));
        assert_eq!(
            result,
            ValidationResult::Rejected {
                reason: "LOCKDOWN".to_string()
            }
        );
    }

    #[test]
    fn approves_a_clean_signal() {
        let manager = RiskManager::new(2);
        let state = RiskState::new(dec!(10000));
        let signal = sample_signal();
        let result = manager.can_take_new_trade(&signal, &[], &state, dec!(100));
        assert!(result.is_approved());
    }

    #[tokio::test]
    async fn record_trade_result_command_updates_state() {
        let manager = RiskManager::new(2);
        let mut state = RiskState::new(dec!(10000));
        let outcome = manager
            .handle_command(
                RiskCommand::RecordTradeResult {
                    outcome: TradeResult::Loss,
                    pnl: dec!(-100),
                },
                &mut state,
            )
            .await;
        assert!(matches!(outcome, RiskCommandOutcome::TradeResultRecorded));
        assert_eq!(state.consecutive_losses, 1);
    }
}
