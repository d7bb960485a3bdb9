//! The authoritative position sizer — `spec.md` §4.5 `calculate_position_size`.
//!
//! Kept the teacher's `SizingEngine` shape (a struct exposing static
//! calculation methods, grounded in `risk_management::sizing_engine`), but
//! replaced the equity-percentage share-count formula with the
//! stop-distance / broker-contract-size / currency-triangulation sizer the
//! specification requires. There is exactly one code path that produces a
//! volume or an initial-risk figure — `calculate_position_size` and
//! `initial_risk` below both route through `risk_per_unit_volume`, satisfying
//! Testable Property 6 (the sizer is a pure function of its inputs, with a
//! single implementation regardless of call site).

use rust_decimal::Decimal;

use crate::domain::trading::{AssetProfile, Direction, Signal};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SizingError {
    #[error("cross-currency conversion rate required but not supplied for {quote}/{account}")]
    MissingConversionRate { quote: String, account: String },
    #[error("realized risk {realized} exceeds 1.10x target risk {target}")]
    RealizedRiskExceedsTolerance { realized: Decimal, target: Decimal },
    #[error("broker volume step must be positive")]
    ZeroVolumeStep,
}

/// How the quote-currency risk figure is converted into account currency.
/// The four cases from `spec.md` §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrencyConversion {
    /// Case 1 & 3: quote currency == account currency, or an index already
    /// denominated in the account currency. No conversion.
    None,
    /// Case 2: base currency == account currency. Divide by current price.
    DivideByPrice,
    /// Case 4: neither leg is the account currency. `rate` is pre-resolved
    /// by the caller to "account currency per unit of quote currency",
    /// whether sourced from a QUOTE+ACCT pair (multiply) or an ACCT+QUOTE
    /// pair (the caller inverts it before passing it in, so this sizer
    /// always multiplies) — keeping exactly one arithmetic path here.
    Triangulated { rate: Decimal },
}

/// Determines which of the four conversion cases applies for this profile.
pub fn determine_conversion(
    profile: &AssetProfile,
    account_currency: &str,
    conversion_rate: Option<Decimal>,
) -> Result<CurrencyConversion, SizingError> {
    use crate::domain::trading::AssetClass;

    if profile.quote_currency.eq_ignore_ascii_case(account_currency) {
        return Ok(CurrencyConversion::None);
    }
    if profile.asset_class == AssetClass::Index
        && profile.quote_currency.eq_ignore_ascii_case(account_currency)
    {
        return Ok(CurrencyConversion::None);
    }
    if profile.base_currency.eq_ignore_ascii_case(account_currency) {
        return Ok(CurrencyConversion::DivideByPrice);
    }
    match conversion_rate {
        Some(rate) => Ok(CurrencyConversion::Triangulated { rate }),
        None => Err(SizingError::MissingConversionRate {
            quote: profile.quote_currency.clone(),
            account: account_currency.to_string(),
        }),
    }
}

/// Input bundle for the sizer. Everything it needs is in here — no hidden
/// state, no global lookups, satisfying the "dependency-injected broker
/// interface" redesign note in `spec.md` §9.
#[derive(Debug, Clone, Copy)]
pub struct SizingInput {
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub equity: Decimal,
    pub risk_fraction: Decimal,
    pub conversion: CurrencyConversion,
}

impl SizingInput {
    pub fn from_signal(
        signal: &Signal,
        equity: Decimal,
        risk_fraction: Decimal,
        conversion: CurrencyConversion,
    ) -> Self {
        Self {
            entry: signal.entry,
            stop_loss: signal.stop_loss,
            equity,
            risk_fraction,
            conversion,
        }
    }
}

pub struct Sizer;

impl Sizer {
    fn stop_distance(input: &SizingInput) -> Decimal {
        (input.entry - input.stop_loss).abs()
    }

    /// Risk, in account currency, incurred by holding exactly one unit of
    /// broker volume (one lot/contract) at this stop distance. The single
    /// conversion code path used by both `calculate_position_size` and
    /// `initial_risk`.
    pub fn risk_per_unit_volume(input: &SizingInput, contract_size: Decimal) -> Decimal {
        let risk_in_quote = Self::stop_distance(input) * contract_size;
        match input.conversion {
            CurrencyConversion::None => risk_in_quote,
            CurrencyConversion::DivideByPrice => {
                if input.entry.is_zero() {
                    Decimal::ZERO
                } else {
                    risk_in_quote / input.entry
                }
            }
            CurrencyConversion::Triangulated { rate } => risk_in_quote * rate,
        }
    }

    /// `spec.md` §4.5 `calculate_position_size`: the one authoritative
    /// sizing function in the system. Floor-rounds to the broker's volume
    /// step so actual risk never exceeds target, then asserts the 1.10x
    /// tolerance as a defensive post-check.
    pub fn calculate_position_size(
        input: &SizingInput,
        contract_size: Decimal,
        volume_step: Decimal,
    ) -> Result<Decimal, SizingError> {
        if volume_step <= Decimal::ZERO {
            return Err(SizingError::ZeroVolumeStep);
        }

        let target_risk = input.equity * input.risk_fraction;
        let risk_per_unit = Self::risk_per_unit_volume(input, contract_size);
        if risk_per_unit <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }

        let raw_volume = target_risk / risk_per_unit;
        let steps = (raw_volume / volume_step).floor();
        let volume = steps * volume_step;

        let realized_risk = volume * risk_per_unit;
        let tolerance = target_risk * Decimal::new(110, 2); // 1.10
        if realized_risk > tolerance {
            return Err(SizingError::RealizedRiskExceedsTolerance {
                realized: realized_risk,
                target: target_risk,
            });
        }

        Ok(volume)
    }

    /// Computes the initial risk, in account currency, for a position that
    /// will be opened with `volume` lots — the same `risk_per_unit_volume`
    /// path `calculate_position_size` used, so the figure persisted on
    /// `Position::initial_risk` is guaranteed consistent with the size that
    /// produced it.
    pub fn initial_risk(input: &SizingInput, contract_size: Decimal, volume: Decimal) -> Decimal {
        Self::risk_per_unit_volume(input, contract_size) * volume
    }
}

#[allow(dead_code)]
fn direction_of(signal: &Signal) -> Direction {
    signal.direction
}
