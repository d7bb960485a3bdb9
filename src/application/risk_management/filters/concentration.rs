use super::{RiskValidator, ValidationContext, ValidationResult};

/// Check (d): multi-timeframe concentration limits. `Position` does not
/// retain the timeframe of the signal that opened it (only its strategy and
/// entry regime), so concentration is enforced per symbol: no more than
/// `max_positions_per_symbol_timeframe` open positions on the same symbol
/// regardless of which timeframe originated each one — the conservative
/// reading of the same limit.
pub struct ConcentrationValidator;

impl RiskValidator for ConcentrationValidator {
    fn name(&self) -> &'static str {
        "concentration"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ValidationResult {
        let count = ctx
            .open_positions
            .iter()
            .filter(|p| p.symbol == ctx.signal.symbol)
            .count();
        if count >= ctx.max_positions_per_symbol_timeframe {
            ValidationResult::Rejected {
                reason: format!(
                    "CONCENTRATION_LIMIT: {} already has {} open position(s)",
                    ctx.signal.symbol, count
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

    fn open_position(ticket: &str) -> Position {
        Position::new(
            ticket,
            "EURUSD",
            Direction::Sell,
            dec!(0.1),
            dec!(1.08),
            dec!(1.085),
            dec!(1.07),
            chrono::Utc::now(),
            "TREND",
            dec!(100),
            "dual_sma",
        )
    }

    #[test]
    fn rejects_at_the_configured_limit() {
        let state = RiskState::new(dec!(10000));
        let signal = sample_signal();
        let open = vec![open_position("T1"), open_position("T2")];
        let ctx = ValidationContext {
            signal: &signal,
            open_positions: &open,
            risk_state: &state,
            signal_risk: dec!(100),
            max_account_risk_fraction: dec!(0.06),
            max_positions_per_symbol_timeframe: 2,
        };
        assert!(!ConcentrationValidator.validate(&ctx).is_approved());
    }

    #[test]
    fn approves_below_the_limit() {
        let state = RiskState::new(dec!(10000));
        let signal = sample_signal();
        let open = vec![open_position("T1")];
        let ctx = ValidationContext {
            signal: &signal,
            open_positions: &open,
            risk_state: &state,
            signal_risk: dec!(100),
            max_account_risk_fraction: dec!(0.06),
            max_positions_per_symbol_timeframe: 2,
        };
        assert!(ConcentrationValidator.validate(&ctx).is_approved());
    }
}
