//! `Trade` — the persisted `trade_results` row produced once a position
//! closes. Built from a broker-agnostic `ClosedTradeEvent`
//! (see [`crate::domain::ports`]) by the Trade Closure Listener.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeResult {
    Win,
    Loss,
    Breakeven,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub ticket: String,
    pub symbol: String,
    pub entry: Decimal,
    pub exit: Decimal,
    pub entry_time: chrono::DateTime<chrono::Utc>,
    pub exit_time: chrono::DateTime<chrono::Utc>,
    pub pips: Decimal,
    pub pnl: Decimal,
    pub result: TradeResult,
    pub exit_reason: String,
    pub broker_id: String,
    pub signal_id: Option<uuid::Uuid>,
}

impl Trade {
    /// R-multiple: realized PnL divided by initial risk at open.
    pub fn r_multiple(&self, initial_risk: Decimal) -> Option<Decimal> {
        if initial_risk.is_zero() {
            None
        } else {
            Some(self.pnl / initial_risk)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Trade {
        Trade {
            ticket: "T1".into(),
            symbol: "EURUSD".into(),
            entry: dec!(1.08),
            exit: dec!(1.085),
            entry_time: chrono::Utc::now(),
            exit_time: chrono::Utc::now(),
            pips: dec!(50),
            pnl: dec!(150),
            result: TradeResult::Win,
            exit_reason: "TAKE_PROFIT".into(),
            broker_id: "mock".into(),
            signal_id: None,
        }
    }

    #[test]
    fn r_multiple_divides_pnl_by_initial_risk() {
        let t = sample();
        assert_eq!(t.r_multiple(dec!(100)), Some(dec!(1.5)));
    }

    #[test]
    fn r_multiple_none_for_zero_risk() {
        let t = sample();
        assert_eq!(t.r_multiple(dec!(0)), None);
    }
}
