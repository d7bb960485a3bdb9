//! The one concrete `BrokerConnector`/`MarketDataProvider` pair kept in this
//! repository, per `domain::ports`'s own doc comment. Grounded in the
//! teacher's `infrastructure::mock::{MockMarketDataService, MockExecutionService}`:
//! an in-memory fill simulator behind the same lock-guarded state shape,
//! generalized to this system's broker port instead of a stock-exchange one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

use crate::domain::market::Timeframe;
use crate::domain::ports::{
    BrokerConnector, Candle, ClosedTradeEvent, MarketDataProvider, OrderResult, SymbolInfo, Tick,
};
use crate::domain::trading::{Direction, Position};

/// In-memory broker simulator: every order fills instantly at the quoted
/// mid, positions live in a `RwLock<HashMap>`, closes are only ever produced
/// by `close_position` (there is no background price walk to trigger stops).
pub struct MockBroker {
    positions: RwLock<HashMap<String, Position>>,
    closed_tx: broadcast::Sender<ClosedTradeEvent>,
    next_ticket: AtomicU64,
    base_price: Decimal,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
            closed_tx: broadcast::channel(100).0,
            next_ticket: AtomicU64::new(1),
            base_price: dec!(1.08),
        }
    }

    fn next_ticket_id(&self) -> String {
        format!("MOCK-{}", self.next_ticket.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerConnector for MockBroker {
    async fn initialize(&self) -> anyhow::Result<()> {
        info!("MockBroker: initialized");
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        info!("MockBroker: shutdown");
        Ok(())
    }

    async fn get_symbol_info(&self, _symbol: &str) -> anyhow::Result<SymbolInfo> {
        Ok(SymbolInfo {
            trade_contract_size: dec!(100_000),
            tick_size: dec!(0.00001),
            digits: 5,
            freeze_level: dec!(0),
            volume_step: dec!(0.01),
            visible: true,
        })
    }

    async fn ensure_visible(&self, _symbol: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get_tick(&self, _symbol: &str) -> anyhow::Result<Tick> {
        Ok(Tick {
            bid: self.base_price,
            ask: self.base_price + dec!(0.0002),
            time: chrono::Utc::now(),
        })
    }

    async fn get_open_positions(&self) -> anyhow::Result<Vec<Position>> {
        Ok(self.positions.read().await.values().cloned().collect())
    }

    async fn execute_order(
        &self,
        symbol: &str,
        direction: Direction,
        volume: Decimal,
        sl: Decimal,
        tp: Decimal,
        comment: &str,
    ) -> anyhow::Result<OrderResult> {
        let ticket = self.next_ticket_id();
        let entry_price = match direction {
            Direction::Buy => self.base_price + dec!(0.0002),
            Direction::Sell => self.base_price,
        };

        let position = Position::new(
            ticket.clone(),
            symbol,
            direction,
            volume,
            entry_price,
            sl,
            tp,
            chrono::Utc::now(),
            "UNKNOWN",
            (entry_price - sl).abs() * volume,
            comment,
        );
        self.positions
            .write()
            .await
            .insert(ticket.clone(), position);

        info!(symbol, ticket, "MockBroker: order filled");
        Ok(OrderResult {
            ok: true,
            ticket: Some(ticket),
            error: None,
        })
    }

    async fn modify_position(&self, ticket: &str, sl: Decimal, tp: Decimal) -> anyhow::Result<()> {
        let mut positions = self.positions.write().await;
        match positions.get_mut(ticket) {
            Some(position) => {
                position.current_stop = sl;
                position.current_target = tp;
                Ok(())
            }
            None => anyhow::bail!("MockBroker: no open position {ticket}"),
        }
    }

    async fn close_position(&self, ticket: &str, reason: &str) -> anyhow::Result<()> {
        let position = {
            let mut positions = self.positions.write().await;
            positions
                .remove(ticket)
                .ok_or_else(|| anyhow::anyhow!("MockBroker: no open position {ticket}"))?
        };

        let exit_price = self.base_price;
        let pnl = position.unrealized_pnl(exit_price, dec!(100_000));
        let result = if pnl > Decimal::ZERO {
            crate::domain::trading::TradeResult::Win
        } else if pnl < Decimal::ZERO {
            crate::domain::trading::TradeResult::Loss
        } else {
            crate::domain::trading::TradeResult::Breakeven
        };

        let event = ClosedTradeEvent {
            ticket: position.ticket_id.clone(),
            symbol: position.symbol.clone(),
            entry: position.entry_price,
            exit: exit_price,
            entry_time: position.open_time,
            exit_time: chrono::Utc::now(),
            pips: (exit_price - position.entry_price).abs() * dec!(10000),
            pnl,
            result,
            exit_reason: reason.to_string(),
            broker_id: "mock".to_string(),
            signal_id: None,
        };

        let _ = self.closed_tx.send(event);
        Ok(())
    }

    async fn reconcile_closed_trades(
        &self,
        _since: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<Vec<ClosedTradeEvent>> {
        // The mock never loses a close event to a dropped connection, so
        // there is nothing to reconcile.
        Ok(vec![])
    }

    async fn subscribe_closed_trades(
        &self,
    ) -> anyhow::Result<broadcast::Receiver<ClosedTradeEvent>> {
        Ok(self.closed_tx.subscribe())
    }
}

/// Deterministic synthetic candle generator: a flat random walk seeded by
/// `symbol`/`timeframe`, sufficient to exercise the scanner and strategy
/// pipeline without a live feed.
pub struct MockMarketDataProvider {
    base_prices: RwLock<HashMap<String, Decimal>>,
}

impl MockMarketDataProvider {
    pub fn new() -> Self {
        Self {
            base_prices: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MockMarketDataProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketDataProvider {
    async fn get_ohlc(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        lookback: usize,
    ) -> anyhow::Result<Vec<Candle>> {
        let base = {
            let mut prices = self.base_prices.write().await;
            *prices.entry(symbol.to_string()).or_insert(dec!(1.08))
        };

        let mut candles = Vec::with_capacity(lookback);
        let now = chrono::Utc::now();
        for i in 0..lookback {
            let drift = Decimal::from(i as i64 % 7) * dec!(0.0001);
            let open = base + drift;
            let close = open + dec!(0.0001);
            candles.push(Candle {
                symbol: symbol.to_string(),
                open,
                high: open.max(close) + dec!(0.0001),
                low: open.min(close) - dec!(0.0001),
                close,
                volume: dec!(1000),
                timestamp: now - chrono::Duration::minutes((lookback - i) as i64),
            });
        }
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn execute_then_close_emits_a_closed_trade_event() {
        let broker = MockBroker::new();
        let mut closed = broker.subscribe_closed_trades().await.unwrap();

        let result = broker
            .execute_order("EURUSD", Direction::Buy, dec!(0.1), dec!(1.07), dec!(1.09), "test")
            .await
            .unwrap();
        assert!(result.ok);
        let ticket = result.ticket.unwrap();

        broker.close_position(&ticket, "manual").await.unwrap();
        let event = closed.recv().await.unwrap();
        assert_eq!(event.ticket, ticket);
    }

    #[tokio::test]
    async fn ohlc_lookback_returns_requested_length() {
        let provider = MockMarketDataProvider::new();
        let candles = provider
            .get_ohlc("EURUSD", Timeframe::M15, 50)
            .await
            .unwrap();
        assert_eq!(candles.len(), 50);
    }
}
