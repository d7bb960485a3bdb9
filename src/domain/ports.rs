//! External interfaces — `spec.md` §6. These traits are the core's entire
//! contract with the outside world; concrete broker SDKs, notification
//! transports, and data providers are out of scope and supplied by whoever
//! embeds this crate. `infrastructure::broker::mock` and
//! `infrastructure::notifier::log` are the one concrete implementation of
//! each kept in this repository, to exercise the pipeline end to end.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::market::Timeframe;
use crate::domain::trading::{Direction, Position, TradeResult};

#[derive(Debug, Clone, Copy)]
pub struct SymbolInfo {
    pub trade_contract_size: Decimal,
    pub tick_size: Decimal,
    pub digits: u32,
    pub freeze_level: Decimal,
    pub volume_step: Decimal,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub bid: Decimal,
    pub ask: Decimal,
    pub time: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct OrderResult {
    pub ok: bool,
    pub ticket: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Candle {
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Broker-agnostic close event; each broker connector owns an adapter that
/// maps its native event format to this record.
#[derive(Debug, Clone)]
pub struct ClosedTradeEvent {
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

#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn initialize(&self) -> anyhow::Result<()>;
    async fn shutdown(&self) -> anyhow::Result<()>;
    async fn get_symbol_info(&self, symbol: &str) -> anyhow::Result<SymbolInfo>;
    async fn ensure_visible(&self, symbol: &str) -> anyhow::Result<()>;
    async fn get_tick(&self, symbol: &str) -> anyhow::Result<Tick>;
    async fn get_open_positions(&self) -> anyhow::Result<Vec<Position>>;
    #[allow(clippy::too_many_arguments)]
    async fn execute_order(
        &self,
        symbol: &str,
        direction: Direction,
        volume: Decimal,
        sl: Decimal,
        tp: Decimal,
        comment: &str,
    ) -> anyhow::Result<OrderResult>;
    async fn modify_position(&self, ticket: &str, sl: Decimal, tp: Decimal) -> anyhow::Result<()>;
    async fn close_position(&self, ticket: &str, reason: &str) -> anyhow::Result<()>;
    async fn reconcile_closed_trades(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<Vec<ClosedTradeEvent>>;
    /// A push channel of `ClosedTradeEvent`, if the broker supports one.
    async fn subscribe_closed_trades(
        &self,
    ) -> anyhow::Result<tokio::sync::broadcast::Receiver<ClosedTradeEvent>>;
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_ohlc(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> anyhow::Result<Vec<Candle>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    SignalEmitted,
    TradeExecuted,
    TradeClosed,
    Lockdown,
    CoherenceFault,
    HeartbeatLost,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, kind: NotificationKind, payload: serde_json::Value);
}
