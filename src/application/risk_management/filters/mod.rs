//! Validator/pipeline pattern for `can_take_new_trade` — kept from the
//! teacher's `risk_management::risk_manager::{RiskValidator,
//! RiskValidationPipeline}` shape; each check below is one boxed validator
//! run in priority order, first rejection wins.

mod account_risk;
mod concentration;
mod duplicate_position;
mod lockdown;

pub use account_risk::AccountRiskValidator;
pub use concentration::ConcentrationValidator;
pub use duplicate_position::DuplicatePositionValidator;
pub use lockdown::LockdownValidator;

use rust_decimal::Decimal;

use crate::domain::risk::RiskState;
use crate::domain::trading::{Position, Signal};

/// Everything a validator needs to judge a candidate signal. Bundled so
/// adding a new check never changes every validator's signature.
pub struct ValidationContext<'a> {
    pub signal: &'a Signal,
    pub open_positions: &'a [Position],
    pub risk_state: &'a RiskState,
    pub signal_risk: Decimal,
    pub max_account_risk_fraction: Decimal,
    pub max_positions_per_symbol_timeframe: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Approved,
    Rejected { reason: String },
}

impl ValidationResult {
    pub fn is_approved(&self) -> bool {
        matches!(self, ValidationResult::Approved)
    }
}

/// One named check in the `can_take_new_trade` pipeline. Priority is the
/// pipeline's declaration order, not a field on the trait — mirrors the
/// teacher's `Vec<Box<dyn RiskValidator>>` construction in
/// `RiskManager::new`.
pub trait RiskValidator: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, ctx: &ValidationContext<'_>) -> ValidationResult;
}

/// Runs every validator in order, stopping at the first rejection.
pub fn run_pipeline(
    validators: &[Box<dyn RiskValidator>],
    ctx: &ValidationContext<'_>,
) -> ValidationResult {
    for validator in validators {
        let result = validator.validate(ctx);
        if !result.is_approved() {
            return result;
        }
    }
    ValidationResult::Approved
}

/// The four checks `spec.md` §4.5 names, in the order it names them.
pub fn default_pipeline() -> Vec<Box<dyn RiskValidator>> {
    vec![
        Box::new(LockdownValidator),
        Box::new(AccountRiskValidator),
        Box::new(DuplicatePositionValidator),
        Box::new(ConcentrationValidator),
    ]
}
