//! Trailing-stop and breakeven math — kept from the teacher's
//! `risk_management::trailing_stops::StopState` state machine, extended
//! with regime-specific ATR multipliers, real broker-cost breakeven, a
//! freeze-level safety margin, and the cooldown/daily-cap/`CONTESTED`
//! bookkeeping `spec.md` §4.7 steps 5 and 6 require.

use rust_decimal::Decimal;

use crate::domain::market::RegimeLabel;
use crate::domain::trading::Direction;

/// Per-position trailing/breakeven state. `NoStopMoved` is the initial
/// state for a freshly opened position; `BreakevenMoved` once step 5 has
/// fired; `Contested` once the broker has rejected enough consecutive
/// modification attempts that auto-modification pauses for this position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopState {
    NoStopMoved,
    BreakevenMoved,
    Contested,
}

/// Consecutive broker rejections before a position moves to `Contested`.
pub const CONTEST_THRESHOLD: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailingDecision {
    Hold,
    MoveStop { new_stop: Decimal },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TrailingError {
    #[error("proposed stop {proposed} violates freeze-level margin (distance {distance} < required {required})")]
    FreezeLevelViolation {
        proposed: Decimal,
        distance: Decimal,
        required: Decimal,
    },
    #[error("cooldown active: {remaining_secs}s remaining before another modification is allowed")]
    CooldownActive { remaining_secs: i64 },
}

pub const TRAILING_COOLDOWN_SECS: i64 = 5 * 60;
pub const BREAKEVEN_MIN_AGE_SECS: i64 = 15 * 60;

/// `spec.md` §4.7 step 5: real breakeven including broker costs, never the
/// entry price alone. `commission + swap + spread` are all expressed in
/// quote-currency units; dividing by `pip_value` converts that cost into a
/// price distance.
pub fn real_breakeven_stop(
    direction: Direction,
    entry: Decimal,
    commission: Decimal,
    swap: Decimal,
    spread: Decimal,
    pip_value: Decimal,
) -> Decimal {
    if pip_value.is_zero() {
        return entry;
    }
    let cost_distance = (commission + swap + spread) / pip_value;
    match direction {
        Direction::Buy => entry + cost_distance,
        Direction::Sell => entry - cost_distance,
    }
}

/// Whether the breakeven move should fire this cycle: strictly positive
/// unrealized profit, at least 15 minutes since open, and the candidate SL
/// genuinely improves on the current one.
pub fn should_move_to_breakeven(
    direction: Direction,
    unrealized_profit: Decimal,
    seconds_since_open: i64,
    candidate_stop: Decimal,
    current_stop: Decimal,
) -> bool {
    if unrealized_profit <= Decimal::ZERO {
        return false;
    }
    if seconds_since_open < BREAKEVEN_MIN_AGE_SECS {
        return false;
    }
    match direction {
        Direction::Buy => candidate_stop > current_stop,
        Direction::Sell => candidate_stop < current_stop,
    }
}

/// `spec.md` §4.7 step 6: regime-scaled trailing stop, ratcheted so it only
/// ever tightens.
pub fn trailing_stop_candidate(
    direction: Direction,
    price: Decimal,
    atr: Decimal,
    regime: RegimeLabel,
) -> Decimal {
    let offset = atr * regime.trailing_atr_multiplier();
    match direction {
        Direction::Buy => price - offset,
        Direction::Sell => price + offset,
    }
}

fn is_strictly_better(direction: Direction, candidate: Decimal, current: Decimal) -> bool {
    match direction {
        Direction::Buy => candidate > current,
        Direction::Sell => candidate < current,
    }
}

/// Validates a proposed stop move against the freeze-level margin and the
/// per-position cooldown, then decides whether it actually improves on the
/// current stop (the ratchet).
pub fn evaluate_trailing_move(
    direction: Direction,
    candidate_stop: Decimal,
    current_stop: Decimal,
    price: Decimal,
    freeze_level: Decimal,
    last_modification_time: Option<chrono::DateTime<chrono::Utc>>,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<TrailingDecision, TrailingError> {
    if let Some(last) = last_modification_time {
        let elapsed = (now - last).num_seconds();
        if elapsed < TRAILING_COOLDOWN_SECS {
            return Err(TrailingError::CooldownActive {
                remaining_secs: TRAILING_COOLDOWN_SECS - elapsed,
            });
        }
    }

    let required_distance = freeze_level * Decimal::new(110, 2); // 1.10 safety margin
    let distance = (price - candidate_stop).abs();
    if distance < required_distance {
        return Err(TrailingError::FreezeLevelViolation {
            proposed: candidate_stop,
            distance,
            required: required_distance,
        });
    }

    if is_strictly_better(direction, candidate_stop, current_stop) {
        Ok(TrailingDecision::MoveStop {
            new_stop: candidate_stop,
        })
    } else {
        Ok(TrailingDecision::Hold)
    }
}

/// Folds a broker modify-rejection into the position's stop state, tripping
/// `Contested` once `CONTEST_THRESHOLD` consecutive rejections accrue.
pub fn record_modification_rejection(
    state: StopState,
    consecutive_rejections: u32,
) -> (StopState, u32) {
    let next = consecutive_rejections + 1;
    if next >= CONTEST_THRESHOLD {
        (StopState::Contested, next)
    } else {
        (state, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn real_breakeven_adds_costs_for_buy_and_subtracts_for_sell() {
        let buy = real_breakeven_stop(Direction::Buy, dec!(1.08), dec!(0.5), dec!(0.1), dec!(0.2), dec!(10));
        assert_eq!(buy, dec!(1.08) + (dec!(0.8) / dec!(10)));

        let sell = real_breakeven_stop(Direction::Sell, dec!(1.08), dec!(0.5), dec!(0.1), dec!(0.2), dec!(10));
        assert_eq!(sell, dec!(1.08) - (dec!(0.8) / dec!(10)));
    }

    #[test]
    fn breakeven_requires_strictly_positive_profit_and_min_age() {
        assert!(!should_move_to_breakeven(
            Direction::Buy,
            dec!(0),
            BREAKEVEN_MIN_AGE_SECS,
            dec!(1.081),
            dec!(1.075)
        ));
        assert!(!should_move_to_breakeven(
            Direction::Buy,
            dec!(10),
            BREAKEVEN_MIN_AGE_SECS - 1,
            dec!(1.081),
            dec!(1.075)
        ));
        assert!(should_move_to_breakeven(
            Direction::Buy,
            dec!(10),
            BREAKEVEN_MIN_AGE_SECS,
            dec!(1.081),
            dec!(1.075)
        ));
    }

    #[test]
    fn trailing_multiplier_scales_with_regime() {
        let trend = trailing_stop_candidate(Direction::Buy, dec!(1.10), dec!(0.01), RegimeLabel::Trend);
        let range = trailing_stop_candidate(Direction::Buy, dec!(1.10), dec!(0.01), RegimeLabel::Range);
        assert!(trend < range); // wider (3.0x ATR) trails further below price than 2.0x
    }

    #[test]
    fn freeze_level_violation_is_rejected() {
        let result = evaluate_trailing_move(
            Direction::Buy,
            dec!(1.0995), // too close to price
            dec!(1.090),
            dec!(1.10),
            dec!(0.001), // freeze level tiny but required = 0.0011, distance here = 0.0005
            None,
            chrono::Utc::now(),
        );
        assert!(matches!(
            result,
            Err(TrailingError::FreezeLevelViolation { .. })
        ));
    }

    #[test]
    fn cooldown_blocks_repeat_modification() {
        let result = evaluate_trailing_move(
            Direction::Buy,
            dec!(1.095),
            dec!(1.090),
            dec!(1.10),
            dec!(0.0001),
            Some(chrono::Utc::now()),
            chrono::Utc::now(),
        );
        assert!(matches!(result, Err(TrailingError::CooldownActive { .. })));
    }

    #[test]
    fn ratchet_holds_when_candidate_is_not_better() {
        let decision = evaluate_trailing_move(
            Direction::Buy,
            dec!(1.089), // worse than current
            dec!(1.090),
            dec!(1.10),
            dec!(0.0001),
            None,
            chrono::Utc::now(),
        )
        .unwrap();
        assert_eq!(decision, TrailingDecision::Hold);
    }

    #[test]
    fn repeated_rejections_trip_contested() {
        let (state, count) = record_modification_rejection(StopState::NoStopMoved, 0);
        assert_eq!(state, StopState::NoStopMoved);
        assert_eq!(count, 1);
        let (state, count) = record_modification_rejection(state, count);
        assert_eq!(state, StopState::Contested);
        assert_eq!(count, 2);
    }
}
