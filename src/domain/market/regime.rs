//! Regime classification — `spec.md` §4.2.
//!
//! Kept the teacher's `MarketRegime`/`MarketRegimeDetector` struct shape
//! (label + confidence-bearing sample, a small detector with configurable
//! thresholds) but replaced the classification algorithm itself with the
//! ADX/ATR/SMA priority-ordered rules the specification mandates.

use serde::{Deserialize, Serialize};

use crate::domain::risk::dynamic_params::DynamicParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegimeLabel {
    Trend,
    Range,
    Volatile,
    Shock,
    Crash,
    Normal,
}

impl RegimeLabel {
    /// Regime-specific maximum position age, per `spec.md` §4.7.
    pub fn max_position_age(self) -> chrono::Duration {
        match self {
            RegimeLabel::Trend => chrono::Duration::hours(72),
            RegimeLabel::Range => chrono::Duration::hours(4),
            RegimeLabel::Volatile => chrono::Duration::hours(2),
            RegimeLabel::Shock | RegimeLabel::Crash => chrono::Duration::hours(1),
            RegimeLabel::Normal => chrono::Duration::hours(72),
        }
    }

    /// Trailing-stop ATR multiplier per regime, per `spec.md` §4.7 step 6.
    pub fn trailing_atr_multiplier(self) -> rust_decimal::Decimal {
        use rust_decimal_macros::dec;
        match self {
            RegimeLabel::Trend => dec!(3.0),
            RegimeLabel::Range => dec!(2.0),
            RegimeLabel::Volatile => dec!(1.5),
            RegimeLabel::Shock | RegimeLabel::Crash => dec!(1.5),
            RegimeLabel::Normal => dec!(2.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeSample {
    pub symbol: String,
    pub timeframe: String,
    pub label: RegimeLabel,
    pub adx: f64,
    pub atr: f64,
    pub sma_short: f64,
    pub sma_long: f64,
    pub slope_short: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Raw indicator inputs for one (symbol, timeframe) classification pass.
#[derive(Debug, Clone, Copy)]
pub struct RegimeInputs {
    pub adx: f64,
    pub atr: f64,
    pub price: f64,
    pub sma_short: f64,
    pub sma_long: f64,
    /// Slope of SMA(short) over the last 5 bars.
    pub slope_short: f64,
    /// Rolling 30-period average of ATR as a percentage of price.
    pub rolling_avg_atr_pct: f64,
}

/// Classifies one (symbol, timeframe) sample against `DynamicParams`
/// thresholds, following the strict priority order from `spec.md` §4.2:
/// SHOCK/CRASH → VOLATILE → TREND → RANGE → NORMAL. Ties are broken by the
/// earlier rule winning.
pub fn classify(inputs: RegimeInputs, params: &DynamicParams) -> RegimeLabel {
    let atr_pct = if inputs.price != 0.0 {
        (inputs.atr / inputs.price) * 100.0
    } else {
        0.0
    };

    // 1. SHOCK/CRASH: ATR% jumps >= 3x its rolling-30 average.
    if inputs.rolling_avg_atr_pct > 0.0 && atr_pct >= 3.0 * inputs.rolling_avg_atr_pct {
        return if inputs.slope_short <= -params.shock_slope_threshold {
            RegimeLabel::Crash
        } else {
            RegimeLabel::Shock
        };
    }

    // 2. VOLATILE: low trend strength but elevated volatility.
    if inputs.adx < params.adx_threshold && atr_pct > params.high_vol_atr_pct_cutoff {
        return RegimeLabel::Volatile;
    }

    let sma_sep_pct = if inputs.sma_long != 0.0 {
        ((inputs.sma_short - inputs.sma_long) / inputs.sma_long).abs() * 100.0
    } else {
        0.0
    };

    // 3. TREND: strong ADX, meaningful slope, adaptive SMA separation.
    if inputs.adx >= params.adx_threshold
        && inputs.slope_short.abs() >= params.slope_min_pct
        && sma_sep_pct >= 0.3 * atr_pct
    {
        return RegimeLabel::Trend;
    }

    // 4. RANGE: weak ADX, SMAs within a narrow band.
    if inputs.adx < params.adx_threshold && sma_sep_pct < params.range_narrow_band_pct {
        return RegimeLabel::Range;
    }

    // 5. Otherwise NORMAL.
    RegimeLabel::Normal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_params() -> DynamicParams {
        DynamicParams::default()
    }

    fn base_inputs() -> RegimeInputs {
        RegimeInputs {
            adx: 15.0,
            atr: 1.0,
            price: 100.0,
            sma_short: 100.0,
            sma_long: 100.0,
            slope_short: 0.0,
            rolling_avg_atr_pct: 1.0,
        }
    }

    #[test]
    fn shock_wins_even_when_trend_conditions_also_hold() {
        let params = base_params();
        let inputs = RegimeInputs {
            adx: 40.0,
            atr: 5.0, // atr_pct = 5% vs rolling avg 1% -> 5x jump
            price: 100.0,
            sma_short: 110.0,
            sma_long: 100.0,
            slope_short: 0.01,
            rolling_avg_atr_pct: 1.0,
        };
        assert_eq!(classify(inputs, &params), RegimeLabel::Shock);
    }

    #[test]
    fn crash_when_shock_conditions_with_sharp_negative_slope() {
        let params = base_params();
        let inputs = RegimeInputs {
            slope_short: -1.0,
            atr: 5.0,
            rolling_avg_atr_pct: 1.0,
            ..base_inputs()
        };
        assert_eq!(classify(inputs, &params), RegimeLabel::Crash);
    }

    #[test]
    fn volatile_when_low_adx_high_volatility() {
        let params = base_params();
        let inputs = RegimeInputs {
            adx: 10.0,
            atr: 3.0,
            price: 100.0,
            rolling_avg_atr_pct: 1.0,
            ..base_inputs()
        };
        assert_eq!(classify(inputs, &params), RegimeLabel::Volatile);
    }

    #[test]
    fn trend_when_strong_adx_and_slope_and_separation() {
        let params = base_params();
        let inputs = RegimeInputs {
            adx: 30.0,
            atr: 1.0,
            price: 100.0,
            sma_short: 103.0,
            sma_long: 100.0,
            slope_short: 0.01,
            rolling_avg_atr_pct: 1.0,
        };
        assert_eq!(classify(inputs, &params), RegimeLabel::Trend);
    }

    #[test]
    fn range_when_weak_adx_and_narrow_sma_band() {
        let params = base_params();
        let inputs = RegimeInputs {
            adx: 10.0,
            atr: 1.0,
            price: 100.0,
            sma_short: 100.05,
            sma_long: 100.0,
            slope_short: 0.0,
            rolling_avg_atr_pct: 1.0,
        };
        assert_eq!(classify(inputs, &params), RegimeLabel::Range);
    }

    #[test]
    fn normal_when_nothing_else_matches() {
        let params = base_params();
        let inputs = RegimeInputs {
            adx: 10.0,
            atr: 1.0,
            price: 100.0,
            sma_short: 101.5,
            sma_long: 100.0,
            slope_short: 0.0,
            rolling_avg_atr_pct: 1.0,
        };
        assert_eq!(classify(inputs, &params), RegimeLabel::Normal);
    }

    #[test]
    fn earlier_rule_wins_on_tie_shock_over_trend() {
        let params = base_params();
        // Satisfies both SHOCK and TREND numerically; SHOCK must win.
        let inputs = RegimeInputs {
            adx: 30.0,
            atr: 5.0,
            price: 100.0,
            sma_short: 110.0,
            sma_long: 100.0,
            slope_short: 0.01,
            rolling_avg_atr_pct: 1.0,
        };
        assert_eq!(classify(inputs, &params), RegimeLabel::Shock);
    }
}
