use super::{RiskValidator, ValidationContext, ValidationResult};

/// Check (b): `Σ current_position_risk + signal_risk ≤ max_account_risk_pct · equity`.
/// Open-position risk is approximated by each position's `initial_risk`,
/// the figure fixed at open by the same sizer that would size this signal.
pub struct AccountRiskValidator;

impl RiskValidator for AccountRiskValidator {
    fn name(&self) -> &'static str {
        "account_risk"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ValidationResult {
        let committed: rust_decimal::Decimal = ctx
            .open_positions
            .iter()
            .map(|p| p.initial_risk)
            .sum();
        let projected = committed + ctx.signal_risk;
        let cap = ctx.risk_state.account_equity * ctx.max_account_risk_fraction;

        if projected > cap {
            ValidationResult::Rejected {
                reason: format!(
                    "ACCOUNT_RISK_EXCEEDED: projected={projected} cap={cap}"
                ),
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
    use crate::domain::trading::{Direction, Position, Signal};
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

    fn sample_position(risk: rust_decimal::Decimal) -> Position {
        Position::new(
            "T1",
            "GBPUSD",
            Direction::Buy,
            dec!(0.1),
            dec!(1.25),
            dec!(1.245),
            dec!(1.26),
            chrono::Utc::now(),
            "TREND",
            risk,
            "dual_sma",
        )
    }

    #[test]
    fn rejects_when_projected_risk_exceeds_cap() {
        let state = RiskState::new(dec!(10000)); // max_account_risk_fraction = 0.06 -> cap 600
        let signal = sample_signal();
        let open = vec![sample_position(dec!(550))];
        let ctx = ValidationContext {
            signal: &signal,
            open_positions: &open,
            risk_state: &state,
            signal_risk: dec!(100),
            max_account_risk_fraction: state.max_account_risk_fraction,
            max_positions_per_symbol_timeframe: 1,
        };
        assert!(!AccountRiskValidator.validate(&ctx).is_approved());
    }

    #[test]
    fn approves_when_within_cap() {
        let state = RiskState::new(dec!(10000));
        let signal = sample_signal();
        let open = vec![sample_position(dec!(100))];
        let ctx = ValidationContext {
            signal: &signal,
            open_positions: &open,
            risk_state: &state,
            signal_risk: dec!(100),
            max_account_risk_fraction: state.max_account_risk_fraction,
            max_positions_per_symbol_timeframe: 1,
        };
        assert!(AccountRiskValidator.validate(&ctx).is_approved());
    }
}
