//! Strategy plug-ins — kept from the teacher's `application::strategies`
//! trait-object registry. Each strategy looks at a `RegimeSample` plus a
//! recent candle window and either emits a candidate bracket or stays
//! silent; the Signal Factory normalizes the symbol, applies the Trifecta
//! post-filter, and dedups before persisting.

mod dual_moving_average;
mod trifecta;

pub use dual_moving_average::DualMovingAverageStrategy;
pub use trifecta::{trifecta_post_filter, HigherTimeframeContext, TrifectaInputs};

use rust_decimal::Decimal;

use crate::domain::market::RegimeSample;
use crate::domain::ports::Candle;
use crate::domain::trading::Direction;

/// A candidate bracket before it becomes a full `Signal` (before trace id,
/// timestamps, and regime-at-generation are stamped on by the factory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyCandidate {
    pub direction: Direction,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub score: u8,
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `candles` is ordered oldest-to-newest; `regime` is the current
    /// classification for this (symbol, timeframe).
    fn evaluate(&self, candles: &[Candle], regime: &RegimeSample) -> Option<StrategyCandidate>;
}
