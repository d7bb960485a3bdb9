//! `DynamicParams` — read by strategies and the Regime Classifier, written
//! only by the Edge Tuner. Kept as a single Persistence-owned value with
//! read-copy semantics at cycle boundaries (`spec.md` §9: replaces
//! "background mutation of shared dicts" with this pattern).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicParams {
    pub adx_threshold: f64,
    pub atr_multiplier: f64,
    pub minimum_score: u8,
    pub per_trade_risk_fraction: Decimal,
    pub slope_min_pct: f64,
    pub high_vol_atr_pct_cutoff: f64,
    pub range_narrow_band_pct: f64,
    pub shock_slope_threshold: f64,
    pub breakeven_atr_threshold: Decimal,
}

impl Default for DynamicParams {
    fn default() -> Self {
        use rust_decimal_macros::dec;
        Self {
            adx_threshold: 25.0,
            atr_multiplier: 2.0,
            minimum_score: 50,
            per_trade_risk_fraction: dec!(0.015),
            slope_min_pct: 0.005,
            high_vol_atr_pct_cutoff: 2.0,
            range_narrow_band_pct: 0.3,
            shock_slope_threshold: 0.5,
            breakeven_atr_threshold: dec!(1.0),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DynamicParamsError {
    #[error("{field} out of bounds: {value} not in [{min}, {max}]")]
    OutOfBounds {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Hard bounds the Edge Tuner may never exceed when writing new parameters.
pub struct ParamBounds {
    pub adx_threshold: (f64, f64),
    pub minimum_score: (u8, u8),
    pub per_trade_risk_fraction: (Decimal, Decimal),
}

impl Default for ParamBounds {
    fn default() -> Self {
        use rust_decimal_macros::dec;
        Self {
            adx_threshold: (10.0, 40.0),
            minimum_score: (20, 90),
            per_trade_risk_fraction: (dec!(0.001), dec!(0.03)),
        }
    }
}

impl DynamicParams {
    pub fn clamp_to(&mut self, bounds: &ParamBounds) {
        self.adx_threshold = self
            .adx_threshold
            .clamp(bounds.adx_threshold.0, bounds.adx_threshold.1);
        self.minimum_score = self
            .minimum_score
            .clamp(bounds.minimum_score.0, bounds.minimum_score.1);
        self.per_trade_risk_fraction = self
            .per_trade_risk_fraction
            .clamp(bounds.per_trade_risk_fraction.0, bounds.per_trade_risk_fraction.1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn clamp_enforces_hard_limits() {
        let mut params = DynamicParams {
            adx_threshold: 100.0,
            per_trade_risk_fraction: dec!(0.5),
            minimum_score: 255,
            ..DynamicParams::default()
        };
        params.clamp_to(&ParamBounds::default());
        assert_eq!(params.adx_threshold, 40.0);
        assert_eq!(params.per_trade_risk_fraction, dec!(0.03));
        assert_eq!(params.minimum_score, 90);
    }
}
