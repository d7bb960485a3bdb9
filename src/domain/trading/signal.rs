//! `Signal` — a candidate trade emitted by a strategy plug-in, flowing
//! Signal Factory → Shadow Jury → Risk Manager → Executor.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    Real,
    Virtual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStatus {
    Pending,
    Executed,
    Rejected,
    Expired,
}

impl SignalStatus {
    /// Status only ever advances forward; it never returns to `Pending`.
    pub fn can_transition_to(self, next: SignalStatus) -> bool {
        match (self, next) {
            (SignalStatus::Pending, SignalStatus::Pending) => true,
            (SignalStatus::Pending, _) => true,
            (_, SignalStatus::Pending) => false,
            (a, b) => a == b,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("stop/target on wrong side of entry for {direction:?}: entry={entry} sl={sl} tp={tp}")]
    InconsistentBracket {
        direction: Direction,
        entry: Decimal,
        sl: Decimal,
        tp: Decimal,
    },
    #[error("illegal status transition {from:?} -> {to:?}")]
    IllegalStatusTransition {
        from: SignalStatus,
        to: SignalStatus,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Unique per scanner cycle, carried end-to-end through every subsequent stage.
    pub trace_id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub strategy: String,
    pub timeframe: String,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    /// In [0, 100].
    pub score: u8,
    pub regime_at_generation: String,
    pub execution_mode: ExecutionMode,
    pub status: SignalStatus,
    pub rejection_reason: Option<String>,
}

impl Signal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trace_id: Uuid,
        symbol: String,
        direction: Direction,
        entry: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        strategy: String,
        timeframe: String,
        generated_at: chrono::DateTime<chrono::Utc>,
        score: u8,
        regime_at_generation: String,
    ) -> Result<Self, SignalError> {
        Self::validate_bracket(direction, entry, stop_loss, take_profit)?;
        Ok(Self {
            trace_id,
            symbol,
            direction,
            entry,
            stop_loss,
            take_profit,
            strategy,
            timeframe,
            generated_at,
            score: score.min(100),
            regime_at_generation,
            execution_mode: ExecutionMode::Virtual,
            status: SignalStatus::Pending,
            rejection_reason: None,
        })
    }

    fn validate_bracket(
        direction: Direction,
        entry: Decimal,
        sl: Decimal,
        tp: Decimal,
    ) -> Result<(), SignalError> {
        let consistent = match direction {
            Direction::Buy => sl < entry && entry < tp,
            Direction::Sell => tp < entry && entry < sl,
        };
        if consistent {
            Ok(())
        } else {
            Err(SignalError::InconsistentBracket {
                direction,
                entry,
                sl,
                tp,
            })
        }
    }

    pub fn transition(&mut self, next: SignalStatus) -> Result<(), SignalError> {
        if !self.status.can_transition_to(next) {
            return Err(SignalError::IllegalStatusTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn reject(&mut self, reason: impl Into<String>) {
        self.status = SignalStatus::Rejected;
        self.rejection_reason = Some(reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ts() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }

    #[test]
    fn buy_requires_sl_below_entry_below_tp() {
        let ok = Signal::new(
            Uuid::new_v4(),
            "EURUSD".into(),
            Direction::Buy,
            dec!(1.08),
            dec!(1.075),
            dec!(1.09),
            "dual_sma".into(),
            "M15".into(),
            ts(),
            70,
            "TREND".into(),
        );
        assert!(ok.is_ok());

        let bad = Signal::new(
            Uuid::new_v4(),
            "EURUSD".into(),
            Direction::Buy,
            dec!(1.08),
            dec!(1.09),
            dec!(1.07),
            "dual_sma".into(),
            "M15".into(),
            ts(),
            70,
            "TREND".into(),
        );
        assert!(bad.is_err());
    }

    #[test]
    fn sell_requires_tp_below_entry_below_sl() {
        let ok = Signal::new(
            Uuid::new_v4(),
            "EURUSD".into(),
            Direction::Sell,
            dec!(1.08),
            dec!(1.085),
            dec!(1.07),
            "dual_sma".into(),
            "M15".into(),
            ts(),
            70,
            "TREND".into(),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn status_never_returns_to_pending() {
        let mut s = Signal::new(
            Uuid::new_v4(),
            "EURUSD".into(),
            Direction::Buy,
            dec!(1.08),
            dec!(1.075),
            dec!(1.09),
            "dual_sma".into(),
            "M15".into(),
            ts(),
            70,
            "TREND".into(),
        )
        .unwrap();

        s.transition(SignalStatus::Executed).unwrap();
        assert!(s.transition(SignalStatus::Pending).is_err());
    }

    #[test]
    fn score_clamped_to_100() {
        let s = Signal::new(
            Uuid::new_v4(),
            "EURUSD".into(),
            Direction::Buy,
            dec!(1.08),
            dec!(1.075),
            dec!(1.09),
            "dual_sma".into(),
            "M15".into(),
            ts(),
            255,
            "TREND".into(),
        )
        .unwrap();
        assert_eq!(s.score, 100);
    }
}
