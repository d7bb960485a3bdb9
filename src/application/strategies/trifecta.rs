//! Trifecta post-filter — `spec.md` §4.3. No direct teacher analog; built
//! in the filter-chaining style of the teacher's signal-processing agents,
//! each adjustment applied to the candidate's score in sequence rather than
//! as a hard veto (except trap-zone rejection, which is a hard veto).

use crate::domain::market::{RegimeLabel, RegimeSample};
use crate::domain::trading::Direction;

use super::StrategyCandidate;

/// Higher-timeframe context, when available. `None` puts the filter in
/// degraded mode: it passes candidates through with a neutral score instead
/// of blocking on missing data.
#[derive(Debug, Clone, Copy)]
pub struct HigherTimeframeContext {
    pub trend_direction: Direction,
    pub regime: RegimeLabel,
}

impl HigherTimeframeContext {
    /// Derives a higher-timeframe context from a regime sample taken on a
    /// longer timeframe. `RegimeSample` carries no direction field of its
    /// own, so trend direction is read off the short/long SMA relationship.
    pub fn from_regime_sample(sample: &RegimeSample) -> Self {
        let trend_direction = if sample.sma_short >= sample.sma_long {
            Direction::Buy
        } else {
            Direction::Sell
        };
        Self {
            trend_direction,
            regime: sample.label,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrifectaInputs<'a> {
    pub higher_timeframe: Option<HigherTimeframeContext>,
    pub current_regime: RegimeLabel,
    pub hour_of_day_utc: u32,
    pub candidate: &'a StrategyCandidate,
}

const NEUTRAL_SCORE_ADJUSTMENT: i16 = 0;
/// Hours considered low-liquidity/choppy for most instruments; a time-of-day
/// penalty applies inside this window.
const LOW_LIQUIDITY_HOURS: std::ops::Range<u32> = 21..24;

/// Runs the Trifecta post-filter. Returns `None` if the candidate is
/// hard-rejected (trap zone); otherwise returns the candidate with its score
/// adjusted.
pub fn trifecta_post_filter(inputs: TrifectaInputs<'_>) -> Option<StrategyCandidate> {
    let mut candidate = inputs.candidate.clone();
    let mut adjustment: i16 = NEUTRAL_SCORE_ADJUSTMENT;

    match inputs.higher_timeframe {
        None => {
            // Degraded mode: pass through untouched rather than block.
        }
        Some(htf) => {
            // Trap-zone rejection: price direction against the higher
            // timeframe's trend, while that trend is actually trending.
            if htf.regime == RegimeLabel::Trend && htf.trend_direction != candidate.direction {
                return None;
            }
            // Multi-timeframe alignment bonus.
            if htf.trend_direction == candidate.direction {
                adjustment += 10;
            }
        }
    }

    // Narrow-state bonus: ranging regimes reward mean-reversion entries.
    if inputs.current_regime == RegimeLabel::Range {
        adjustment += 5;
    }

    // Time-of-day penalty during low-liquidity hours.
    if LOW_LIQUIDITY_HOURS.contains(&inputs.hour_of_day_utc) {
        adjustment -= 10;
    }

    let adjusted = i16::from(candidate.score) + adjustment;
    candidate.score = adjusted.clamp(0, 100) as u8;
    Some(candidate)
}
