//! `Position` — an open broker position under active supervision by the
//! Position Manager. `initial_risk` is fixed at open and never rewritten;
//! once the stop has moved past breakeven it may only move monotonically in
//! the favorable direction.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::signal::Direction;

pub const MAX_DAILY_MODIFICATIONS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Active,
    /// A broker rejected repeated modification attempts; auto-modification is
    /// paused until the next cycle after the cooldown.
    Contested,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticket_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub volume: Decimal,
    pub entry_price: Decimal,
    pub current_stop: Decimal,
    pub current_target: Decimal,
    pub open_time: chrono::DateTime<chrono::Utc>,
    pub last_modification_time: Option<chrono::DateTime<chrono::Utc>>,
    pub modification_count_today: u32,
    pub entry_regime: String,
    /// Fixed at open; never rewritten after construction.
    pub initial_risk: Decimal,
    pub strategy_origin: String,
    /// Set when metadata was reconstructed after the fact (orphan sync).
    pub orphan_sync: bool,
    pub state: PositionState,
    /// Set once the stop has been moved into profit-protecting territory;
    /// after this, stop moves are checked for monotonicity.
    pub breakeven_reached: bool,
    /// Consecutive broker rejections of a modification attempt; reset on the
    /// next accepted modification. Drives the `CONTESTED` transition.
    pub consecutive_modification_rejections: u32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PositionError {
    #[error("daily modification cap ({MAX_DAILY_MODIFICATIONS}) reached for position {ticket_id}")]
    DailyCapReached { ticket_id: String },
    #[error("stop move for {ticket_id} is not favorable: current={current} proposed={proposed}")]
    UnfavorableStopMove {
        ticket_id: String,
        current: Decimal,
        proposed: Decimal,
    },
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ticket_id: impl Into<String>,
        symbol: impl Into<String>,
        direction: Direction,
        volume: Decimal,
        entry_price: Decimal,
        initial_stop: Decimal,
        initial_target: Decimal,
        open_time: chrono::DateTime<chrono::Utc>,
        entry_regime: impl Into<String>,
        initial_risk: Decimal,
        strategy_origin: impl Into<String>,
    ) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            symbol: symbol.into(),
            direction,
            volume,
            entry_price,
            current_stop: initial_stop,
            current_target: initial_target,
            open_time,
            last_modification_time: None,
            modification_count_today: 0,
            entry_regime: entry_regime.into(),
            initial_risk,
            strategy_origin: strategy_origin.into(),
            orphan_sync: false,
            state: PositionState::Active,
            breakeven_reached: false,
            consecutive_modification_rejections: 0,
        }
    }

    /// Folds a broker modification rejection into this position, tripping
    /// `Contested` once enough consecutive rejections accrue.
    pub fn record_modification_rejection(&mut self, threshold: u32) {
        self.consecutive_modification_rejections += 1;
        if self.consecutive_modification_rejections >= threshold {
            self.state = PositionState::Contested;
        }
    }

    /// Resets the rejection streak after a modification the broker accepts.
    pub fn record_modification_accepted(&mut self) {
        self.consecutive_modification_rejections = 0;
    }

    /// Attempts to move the stop to `new_stop`. Enforces the daily
    /// modification cap and, once breakeven has been reached, monotonicity in
    /// the favorable direction.
    pub fn move_stop(
        &mut self,
        new_stop: Decimal,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), PositionError> {
        if self.modification_count_today >= MAX_DAILY_MODIFICATIONS {
            return Err(PositionError::DailyCapReached {
                ticket_id: self.ticket_id.clone(),
            });
        }

        if self.breakeven_reached {
            let favorable = match self.direction {
                Direction::Buy => new_stop >= self.current_stop,
                Direction::Sell => new_stop <= self.current_stop,
            };
            if !favorable {
                return Err(PositionError::UnfavorableStopMove {
                    ticket_id: self.ticket_id.clone(),
                    current: self.current_stop,
                    proposed: new_stop,
                });
            }
        }

        self.current_stop = new_stop;
        self.last_modification_time = Some(now);
        self.modification_count_today += 1;
        Ok(())
    }

    /// Attempts to move the take-profit target to `new_target`. Enforces the
    /// same daily modification cap as `move_stop`; targets have no
    /// monotonicity constraint, since a regime-bracket tightening is by
    /// definition a one-way move already checked by the caller.
    pub fn move_target(
        &mut self,
        new_target: Decimal,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), PositionError> {
        if self.modification_count_today >= MAX_DAILY_MODIFICATIONS {
            return Err(PositionError::DailyCapReached {
                ticket_id: self.ticket_id.clone(),
            });
        }

        self.current_target = new_target;
        self.last_modification_time = Some(now);
        self.modification_count_today += 1;
        Ok(())
    }

    pub fn mark_breakeven_reached(&mut self) {
        self.breakeven_reached = true;
    }

    pub fn reset_daily_modification_count(&mut self) {
        self.modification_count_today = 0;
    }

    pub fn unrealized_pnl(&self, current_price: Decimal, contract_size: Decimal) -> Decimal {
        let diff = match self.direction {
            Direction::Buy => current_price - self.entry_price,
            Direction::Sell => self.entry_price - current_price,
        };
        diff * self.volume * contract_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_position() -> Position {
        Position::new(
            "T1",
            "EURUSD",
            Direction::Buy,
            dec!(0.3),
            dec!(1.08),
            dec!(1.075),
            dec!(1.09),
            chrono::Utc::now(),
            "TREND",
            dec!(150),
            "dual_sma",
        )
    }

    #[test]
    fn initial_risk_is_immutable_field() {
        let p = sample_position();
        assert_eq!(p.initial_risk, dec!(150));
    }

    #[test]
    fn repeated_rejections_trip_contested_state() {
        let mut p = sample_position();
        p.record_modification_rejection(2);
        assert_eq!(p.state, PositionState::Active);
        p.record_modification_rejection(2);
        assert_eq!(p.state, PositionState::Contested);
    }

    #[test]
    fn accepted_modification_resets_rejection_streak() {
        let mut p = sample_position();
        p.record_modification_rejection(3);
        p.record_modification_accepted();
        assert_eq!(p.consecutive_modification_rejections, 0);
    }

    #[test]
    fn stop_move_before_breakeven_is_unconstrained() {
        let mut p = sample_position();
        // Before breakeven, even a "worse" stop move is allowed (e.g. widening
        // during a regime-based bracket adjustment).
        assert!(p.move_stop(dec!(1.07), chrono::Utc::now()).is_ok());
    }

    #[test]
    fn stop_move_after_breakeven_must_be_favorable_for_buy() {
        let mut p = sample_position();
        p.mark_breakeven_reached();
        p.current_stop = dec!(1.08);

        assert!(p.move_stop(dec!(1.081), chrono::Utc::now()).is_ok());
        assert!(matches!(
            p.move_stop(dec!(1.079), chrono::Utc::now()),
            Err(PositionError::UnfavorableStopMove { .. })
        ));
    }

    #[test]
    fn stop_move_after_breakeven_must_be_favorable_for_sell() {
        let mut p = sample_position();
        p.direction = Direction::Sell;
        p.mark_breakeven_reached();
        p.current_stop = dec!(1.08);

        assert!(p.move_stop(dec!(1.079), chrono::Utc::now()).is_ok());
        assert!(matches!(
            p.move_stop(dec!(1.081), chrono::Utc::now()),
            Err(PositionError::UnfavorableStopMove { .. })
        ));
    }

    #[test]
    fn daily_modification_cap_enforced() {
        let mut p = sample_position();
        for i in 0..MAX_DAILY_MODIFICATIONS {
            p.move_stop(dec!(1.075) + Decimal::from(i), chrono::Utc::now())
                .unwrap();
        }
        assert!(matches!(
            p.move_stop(dec!(2.0), chrono::Utc::now()),
            Err(PositionError::DailyCapReached { .. })
        ));
    }

    #[test]
    fn move_target_shares_the_daily_cap_with_move_stop() {
        let mut p = sample_position();
        for i in 0..MAX_DAILY_MODIFICATIONS {
            p.move_target(dec!(1.09) + Decimal::from(i), chrono::Utc::now())
                .unwrap();
        }
        assert!(matches!(
            p.move_target(dec!(1.2), chrono::Utc::now()),
            Err(PositionError::DailyCapReached { .. })
        ));
    }
}
