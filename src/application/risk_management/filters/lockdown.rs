use super::{RiskValidator, ValidationContext, ValidationResult};

/// Check (a): not in lockdown.
pub struct LockdownValidator;

impl RiskValidator for LockdownValidator {
    fn name(&self) -> &'static str {
        "lockdown"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ValidationResult {
        if ctx.risk_state.lockdown {
            ValidationResult::Rejected {
                reason: "LOCKDOWN".to_string(),
            }
        } else {
            ValidationResult::Approved
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::risk::RiskState;
    use crate::domain::trading::{Direction, Signal};
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
    fn rejects_when_locked_down() {
        let mut state = RiskState::new(dec!(10000));
        state.lockdown = true;
        let signal = sample_signal();
        let ctx = ValidationContext {
            signal: &signal,
            open_positions: &[],
            risk_state: &state,
            signal_risk: dec!(100),
            max_account_risk_fraction: dec!(0.06),
            max_positions_per_symbol_timeframe: 1,
        };
        assert_eq!(
            LockdownValidator.validate(&ctx),
            ValidationResult::Rejected {
                reason: "LOCKDOWN".to_string()
            }
        );
    }

    #[test]
    fn approves_when_not_locked_down() {
        let state = RiskState::new(dec!(10000));
        let signal = sample_signal();
        let ctx = ValidationContext {
            signal: &signal,
            open_positions: &[],
            risk_state: &state,
            signal_risk: dec!(100),
            max_account_risk_fraction: dec!(0.06),
            max_positions_per_symbol_timeframe: 1,
        };
        assert!(LockdownValidator.validate(&ctx).is_approved());
    }
}
