use super::{RiskValidator, ValidationContext, ValidationResult};

/// Check (c): no duplicate open position on the same (symbol, direction).
pub struct DuplicatePositionValidator;

impl RiskValidator for DuplicatePositionValidator {
    fn name(&self) -> &'static str {
        "duplicate_position"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ValidationResult {
        let duplicate = ctx.open_positions.iter().any(|p| {
            p.symbol == ctx.signal.symbol && p.direction == ctx.signal.direction
        });
        if duplicate {
            ValidationResult::Rejected {
                reason: format!(
                    "DUPLICATE_POSITION: {} {:?} already open",
                    ctx.signal.symbol, ctx.signal.direction
                ),
            }
        } else {
            ValidationResult::Approved
        }
    }
}
