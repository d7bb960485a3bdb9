//! A concrete strategy plug-in — kept in spirit from the teacher's
//! `application::strategies::dual_sma` strategy, applicable in trending
//! regimes: enters on a fast/slow SMA crossover confirmed by the regime
//! classifier's own slope measurement, sized to one ATR on each side.

use rust_decimal::Decimal;

use crate::domain::market::{RegimeLabel, RegimeSample};
use crate::domain::ports::Candle;
use crate::domain::trading::Direction;

use super::{Strategy, StrategyCandidate};

pub struct DualMovingAverageStrategy {
    pub fast_period: usize,
    pub slow_period: usize,
    pub atr_multiplier: Decimal,
}

impl DualMovingAverageStrategy {
    pub fn new(fast_period: usize, slow_period: usize, atr_multiplier: Decimal) -> Self {
        Self {
            fast_period,
            slow_period,
            atr_multiplier,
        }
    }

    fn sma(candles: &[Candle], period: usize) -> Option<Decimal> {
        if candles.len() < period {
            return None;
        }
        let window = &candles[candles.len() - period..];
        let sum: Decimal = window.iter().map(|c| c.close).sum();
        Some(sum / Decimal::from(period))
    }

    fn average_true_range(candles: &[Candle], period: usize) -> Option<Decimal> {
        if candles.len() < period + 1 {
            return None;
        }
        let window = &candles[candles.len() - period..];
        let sum: Decimal = window.iter().map(|c| c.high - c.low).sum();
        Some(sum / Decimal::from(period))
    }
}

impl Strategy for DualMovingAverageStrategy {
    fn name(&self) -> &'static str {
        "dual_sma"
    }

    fn evaluate(&self, candles: &[Candle], regime: &RegimeSample) -> Option<StrategyCandidate> {
        // Only fires in a trend or ranging regime; it has no edge in
        // shock/crash/volatile conditions.
        if matches!(
            regime.label,
            RegimeLabel::Shock | RegimeLabel::Crash | RegimeLabel::Volatile
        ) {
            return None;
        }

        let fast = Self::sma(candles, self.fast_period)?;
        let slow = Self::sma(candles, self.slow_period)?;
        let atr = Self::average_true_range(candles, self.slow_period)?;
        let entry = candles.last()?.close;

        let direction = if fast > slow {
            Direction::Buy
        } else if fast < slow {
            Direction::Sell
        } else {
            return None;
        };

        let offset = atr * self.atr_multiplier;
        let (stop_loss, take_profit) = match direction {
            Direction::Buy => (entry - offset, entry + offset + offset),
            Direction::Sell => (entry + offset, entry - offset - offset),
        };

        // A crude score: how far the fast/slow SMAs have diverged, relative
        // to ATR, clamped to [0, 100].
        let divergence = ((fast - slow).abs() / atr.max(Decimal::new(1, 6))) * Decimal::from(20);
        let score = divergence.to_string().parse::<f64>().unwrap_or(0.0).min(100.0) as u8;

        Some(StrategyCandidate {
            direction,
            entry,
            stop_loss,
            take_profit,
            score,
        })
    }
}
