//! Virtual trade recorder — `spec.md` §4.4: signals tagged VIRTUAL bypass
//! the Risk Manager and Executor but still need to be marked against their
//! stop-loss/take-profit so the Shadow Jury has real win/loss data to
//! promote or demote on. No teacher analog; built fresh alongside
//! `shadow_jury` in the same idiom.

use rust_decimal::Decimal;

use crate::domain::trading::{Direction, Signal, Trade, TradeResult};

#[derive(Debug, Clone)]
struct OpenVirtualTrade {
    ticket: String,
    symbol: String,
    strategy: String,
    direction: Direction,
    entry: Decimal,
    stop_loss: Decimal,
    take_profit: Decimal,
    opened_at: chrono::DateTime<chrono::Utc>,
}

/// One closed virtual trade, tagged with the (strategy, symbol) pair the
/// Shadow Jury indexes its rolling performance by.
pub struct ClosedVirtualTrade {
    pub strategy: String,
    pub symbol: String,
    pub trade: Trade,
}

#[derive(Default)]
pub struct VirtualTradeBook {
    open: Vec<OpenVirtualTrade>,
    next_id: u64,
}

impl VirtualTradeBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_from_signal(&mut self, signal: &Signal) {
        self.next_id += 1;
        self.open.push(OpenVirtualTrade {
            ticket: format!("VIRT-{}", self.next_id),
            symbol: signal.symbol.clone(),
            strategy: signal.strategy.clone(),
            direction: signal.direction,
            entry: signal.entry,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            opened_at: signal.generated_at,
        });
    }

    /// Checks every open virtual trade on `symbol` against `price`, closing
    /// and returning any whose stop-loss or take-profit has been crossed.
    pub fn mark_to_market(
        &mut self,
        symbol: &str,
        price: Decimal,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Vec<ClosedVirtualTrade> {
        let mut closed = Vec::new();
        let mut remaining = Vec::with_capacity(self.open.len());

        for trade in self.open.drain(..) {
            if trade.symbol != symbol {
                remaining.push(trade);
                continue;
            }

            let hit_tp = match trade.direction {
                Direction::Buy => price >= trade.take_profit,
                Direction::Sell => price <= trade.take_profit,
            };
            let hit_sl = match trade.direction {
                Direction::Buy => price <= trade.stop_loss,
                Direction::Sell => price >= trade.stop_loss,
            };

            if !hit_tp && !hit_sl {
                remaining.push(trade);
                continue;
            }

            let exit = if hit_tp { trade.take_profit } else { trade.stop_loss };
            let pnl = match trade.direction {
                Direction::Buy => exit - trade.entry,
                Direction::Sell => trade.entry - exit,
            };
            let result = if pnl > Decimal::ZERO {
                TradeResult::Win
            } else if pnl < Decimal::ZERO {
                TradeResult::Loss
            } else {
                TradeResult::Breakeven
            };

            closed.push(ClosedVirtualTrade {
                strategy: trade.strategy.clone(),
                symbol: trade.symbol.clone(),
                trade: Trade {
                    ticket: trade.ticket.clone(),
                    symbol: trade.symbol.clone(),
                    entry: trade.entry,
                    exit,
                    entry_time: trade.opened_at,
                    exit_time: now,
                    pips: (exit - trade.entry).abs() * Decimal::from(10000),
                    pnl,
                    result,
                    exit_reason: if hit_tp { "TAKE_PROFIT".to_string() } else { "STOP_LOSS".to_string() },
                    broker_id: "virtual".to_string(),
                    signal_id: None,
                },
            });
        }

        self.open = remaining;
        closed
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}
