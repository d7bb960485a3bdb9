//! Sqlx-backed repository implementations, one per trait in
//! `domain::repositories`. Kept in the teacher's
//! `infrastructure::persistence::repositories` shape: a thin struct wrapping
//! a cloned `SqlitePool`, decimals/timestamps round-tripped as strings via
//! `to_string()`/`Decimal::from_str`, rows mapped by column name.

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::coherence::{CoherenceEvent, CoherenceKind};
use crate::domain::repositories::{
    AssetProfileRepository, CoherenceEventRepository, DynamicParamsRepository, PositionRepository,
    RiskStateRepository, SignalRepository, TradeResultRepository, TuningLogEntry,
    TuningLogRepository,
};
use crate::domain::risk::{DynamicParams, RiskState};
use crate::domain::trading::asset_profile::AssetClass;
use crate::domain::trading::position::PositionState;
use crate::domain::trading::{
    AssetProfile, Direction, ExecutionMode, Position, Signal, SignalStatus, Trade, TradeResult,
};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or_default()
}

fn asset_class_to_str(c: AssetClass) -> &'static str {
    match c {
        AssetClass::Forex => "FOREX",
        AssetClass::Metal => "METAL",
        AssetClass::Crypto => "CRYPTO",
        AssetClass::Index => "INDEX",
    }
}

fn asset_class_from_str(s: &str) -> AssetClass {
    match s {
        "METAL" => AssetClass::Metal,
        "CRYPTO" => AssetClass::Crypto,
        "INDEX" => AssetClass::Index,
        _ => AssetClass::Forex,
    }
}

fn direction_to_str(d: Direction) -> &'static str {
    match d {
        Direction::Buy => "BUY",
        Direction::Sell => "SELL",
    }
}

fn direction_from_str(s: &str) -> Direction {
    if s == "SELL" {
        Direction::Sell
    } else {
        Direction::Buy
    }
}

fn execution_mode_to_str(m: ExecutionMode) -> &'static str {
    match m {
        ExecutionMode::Real => "REAL",
        ExecutionMode::Virtual => "VIRTUAL",
    }
}

fn execution_mode_from_str(s: &str) -> ExecutionMode {
    if s == "REAL" {
        ExecutionMode::Real
    } else {
        ExecutionMode::Virtual
    }
}

fn signal_status_to_str(s: SignalStatus) -> &'static str {
    match s {
        SignalStatus::Pending => "PENDING",
        SignalStatus::Executed => "EXECUTED",
        SignalStatus::Rejected => "REJECTED",
        SignalStatus::Expired => "EXPIRED",
    }
}

fn signal_status_from_str(s: &str) -> SignalStatus {
    match s {
        "EXECUTED" => SignalStatus::Executed,
        "REJECTED" => SignalStatus::Rejected,
        "EXPIRED" => SignalStatus::Expired,
        _ => SignalStatus::Pending,
    }
}

fn position_state_to_str(s: &PositionState) -> &'static str {
    match s {
        PositionState::Active => "ACTIVE",
        PositionState::Contested => "CONTESTED",
        PositionState::Closed => "CLOSED",
    }
}

fn position_state_from_str(s: &str) -> PositionState {
    match s {
        "CONTESTED" => PositionState::Contested,
        "CLOSED" => PositionState::Closed,
        _ => PositionState::Active,
    }
}

fn trade_result_to_str(r: TradeResult) -> &'static str {
    match r {
        TradeResult::Win => "WIN",
        TradeResult::Loss => "LOSS",
        TradeResult::Breakeven => "BREAKEVEN",
    }
}

fn trade_result_from_str(s: &str) -> TradeResult {
    match s {
        "LOSS" => TradeResult::Loss,
        "BREAKEVEN" => TradeResult::Breakeven,
        _ => TradeResult::Win,
    }
}

fn coherence_kind_to_str(k: CoherenceKind) -> &'static str {
    match k {
        CoherenceKind::UnnormalizedSymbol => "UNNORMALIZED_SYMBOL",
        CoherenceKind::ExecutedWithoutTicket => "EXECUTED_WITHOUT_TICKET",
        CoherenceKind::PendingTimeout => "PENDING_TIMEOUT",
        CoherenceKind::ModuleMismatch => "MODULE_MISMATCH",
    }
}

fn coherence_kind_from_str(s: &str) -> CoherenceKind {
    match s {
        "EXECUTED_WITHOUT_TICKET" => CoherenceKind::ExecutedWithoutTicket,
        "PENDING_TIMEOUT" => CoherenceKind::PendingTimeout,
        "MODULE_MISMATCH" => CoherenceKind::ModuleMismatch,
        _ => CoherenceKind::UnnormalizedSymbol,
    }
}

pub struct SqliteAssetProfileRepository {
    pool: SqlitePool,
}

impl SqliteAssetProfileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetProfileRepository for SqliteAssetProfileRepository {
    async fn get(&self, symbol: &str) -> Result<Option<AssetProfile>> {
        let row = sqlx::query("SELECT * FROM asset_profiles WHERE symbol = ?")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await
            .context("fetching asset profile")?;
        row.map(map_asset_profile).transpose()
    }

    async fn upsert(&self, profile: &AssetProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO asset_profiles
                (symbol, asset_class, contract_size, tick_size, digits, pip_size,
                 freeze_level, broker_native_symbol, volume_step, quote_currency, base_currency)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                asset_class = excluded.asset_class,
                contract_size = excluded.contract_size,
                tick_size = excluded.tick_size,
                digits = excluded.digits,
                pip_size = excluded.pip_size,
                freeze_level = excluded.freeze_level,
                broker_native_symbol = excluded.broker_native_symbol,
                volume_step = excluded.volume_step,
                quote_currency = excluded.quote_currency,
                base_currency = excluded.base_currency
            "#,
        )
        .bind(&profile.symbol)
        .bind(asset_class_to_str(profile.asset_class))
        .bind(profile.contract_size.to_string())
        .bind(profile.tick_size.to_string())
        .bind(profile.digits)
        .bind(profile.pip_size.to_string())
        .bind(profile.freeze_level.to_string())
        .bind(&profile.broker_native_symbol)
        .bind(profile.volume_step.to_string())
        .bind(&profile.quote_currency)
        .bind(&profile.base_currency)
        .execute(&self.pool)
        .await
        .context("upserting asset profile")?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<AssetProfile>> {
        let rows = sqlx::query("SELECT * FROM asset_profiles")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(map_asset_profile).collect()
    }
}

fn map_asset_profile(row: sqlx::sqlite::SqliteRow) -> Result<AssetProfile> {
    Ok(AssetProfile::new(
        row.try_get::<String, _>("symbol")?,
        asset_class_from_str(&row.try_get::<String, _>("asset_class")?),
        dec(&row.try_get::<String, _>("contract_size")?),
        dec(&row.try_get::<String, _>("tick_size")?),
        row.try_get::<i64, _>("digits")? as u32,
        dec(&row.try_get::<String, _>("pip_size")?),
        dec(&row.try_get::<String, _>("freeze_level")?),
        row.try_get::<String, _>("broker_native_symbol")?,
        dec(&row.try_get::<String, _>("volume_step")?),
        row.try_get::<String, _>("quote_currency")?,
        row.try_get::<String, _>("base_currency")?,
    ))
}

pub struct SqliteSignalRepository {
    pool: SqlitePool,
}

impl SqliteSignalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SignalRepository for SqliteSignalRepository {
    async fn insert(&self, signal: &Signal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signals
                (trace_id, symbol, direction, entry, stop_loss, take_profit, strategy,
                 timeframe, generated_at, score, regime_at_generation, execution_mode,
                 status, rejection_reason)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(signal.trace_id.to_string())
        .bind(&signal.symbol)
        .bind(direction_to_str(signal.direction))
        .bind(signal.entry.to_string())
        .bind(signal.stop_loss.to_string())
        .bind(signal.take_profit.to_string())
        .bind(&signal.strategy)
        .bind(&signal.timeframe)
        .bind(signal.generated_at)
        .bind(signal.score as i64)
        .bind(&signal.regime_at_generation)
        .bind(execution_mode_to_str(signal.execution_mode))
        .bind(signal_status_to_str(signal.status))
        .bind(&signal.rejection_reason)
        .execute(&self.pool)
        .await
        .context("inserting signal")?;
        Ok(())
    }

    async fn update(&self, signal: &Signal) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE signals SET
                execution_mode = ?, status = ?, rejection_reason = ?
            WHERE trace_id = ?
            "#,
        )
        .bind(execution_mode_to_str(signal.execution_mode))
        .bind(signal_status_to_str(signal.status))
        .bind(&signal.rejection_reason)
        .bind(signal.trace_id.to_string())
        .execute(&self.pool)
        .await
        .context("updating signal")?;
        Ok(())
    }

    async fn get(&self, trace_id: Uuid) -> Result<Option<Signal>> {
        let row = sqlx::query("SELECT * FROM signals WHERE trace_id = ?")
            .bind(trace_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(map_signal).transpose()
    }

    async fn find_pending(
        &self,
        symbol: &str,
        direction: Direction,
        strategy: &str,
        timeframe: &str,
    ) -> Result<Vec<Signal>> {
        let rows = sqlx::query(
            "SELECT * FROM signals WHERE symbol = ? AND direction = ? AND strategy = ? \
             AND timeframe = ? AND status = 'PENDING'",
        )
        .bind(symbol)
        .bind(direction_to_str(direction))
        .bind(strategy)
        .bind(timeframe)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_signal).collect()
    }

    async fn list_pending_older_than(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Signal>> {
        let rows = sqlx::query("SELECT * FROM signals WHERE status = 'PENDING' AND generated_at < ?")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(map_signal).collect()
    }
}

fn map_signal(row: sqlx::sqlite::SqliteRow) -> Result<Signal> {
    Ok(Signal {
        trace_id: Uuid::parse_str(&row.try_get::<String, _>("trace_id")?)?,
        symbol: row.try_get("symbol")?,
        direction: direction_from_str(&row.try_get::<String, _>("direction")?),
        entry: dec(&row.try_get::<String, _>("entry")?),
        stop_loss: dec(&row.try_get::<String, _>("stop_loss")?),
        take_profit: dec(&row.try_get::<String, _>("take_profit")?),
        strategy: row.try_get("strategy")?,
        timeframe: row.try_get("timeframe")?,
        generated_at: row.try_get("generated_at")?,
        score: row.try_get::<i64, _>("score")? as u8,
        regime_at_generation: row.try_get("regime_at_generation")?,
        execution_mode: execution_mode_from_str(&row.try_get::<String, _>("execution_mode")?),
        status: signal_status_from_str(&row.try_get::<String, _>("status")?),
        rejection_reason: row.try_get("rejection_reason")?,
    })
}

pub struct SqlitePositionRepository {
    pool: SqlitePool,
}

impl SqlitePositionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PositionRepository for SqlitePositionRepository {
    async fn upsert(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions
                (ticket_id, symbol, direction, volume, entry_price, current_stop,
                 current_target, open_time, last_modification_time, modification_count_today,
                 entry_regime, initial_risk, strategy_origin, orphan_sync, state,
                 breakeven_reached, consecutive_modification_rejections)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticket_id) DO UPDATE SET
                current_stop = excluded.current_stop,
                current_target = excluded.current_target,
                last_modification_time = excluded.last_modification_time,
                modification_count_today = excluded.modification_count_today,
                orphan_sync = excluded.orphan_sync,
                state = excluded.state,
                breakeven_reached = excluded.breakeven_reached,
                consecutive_modification_rejections = excluded.consecutive_modification_rejections
            "#,
        )
        .bind(&position.ticket_id)
        .bind(&position.symbol)
        .bind(direction_to_str(position.direction))
        .bind(position.volume.to_string())
        .bind(position.entry_price.to_string())
        .bind(position.current_stop.to_string())
        .bind(position.current_target.to_string())
        .bind(position.open_time)
        .bind(position.last_modification_time)
        .bind(position.modification_count_today as i64)
        .bind(&position.entry_regime)
        .bind(position.initial_risk.to_string())
        .bind(&position.strategy_origin)
        .bind(position.orphan_sync as i64)
        .bind(position_state_to_str(&position.state))
        .bind(position.breakeven_reached as i64)
        .bind(position.consecutive_modification_rejections as i64)
        .execute(&self.pool)
        .await
        .context("upserting position")?;
        Ok(())
    }

    async fn get(&self, ticket_id: &str) -> Result<Option<Position>> {
        let row = sqlx::query("SELECT * FROM positions WHERE ticket_id = ?")
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(map_position).transpose()
    }

    async fn list_open(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query("SELECT * FROM positions WHERE state != 'CLOSED'")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(map_position).collect()
    }

    async fn remove(&self, ticket_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM positions WHERE ticket_id = ?")
            .bind(ticket_id)
            .execute(&self.pool)
            .await
            .context("removing position")?;
        Ok(())
    }
}

fn map_position(row: sqlx::sqlite::SqliteRow) -> Result<Position> {
    let mut position = Position::new(
        row.try_get::<String, _>("ticket_id")?,
        row.try_get::<String, _>("symbol")?,
        direction_from_str(&row.try_get::<String, _>("direction")?),
        dec(&row.try_get::<String, _>("volume")?),
        dec(&row.try_get::<String, _>("entry_price")?),
        dec(&row.try_get::<String, _>("current_stop")?),
        dec(&row.try_get::<String, _>("current_target")?),
        row.try_get("open_time")?,
        row.try_get::<String, _>("entry_regime")?,
        dec(&row.try_get::<String, _>("initial_risk")?),
        row.try_get::<String, _>("strategy_origin")?,
    );
    position.last_modification_time = row.try_get("last_modification_time")?;
    position.modification_count_today = row.try_get::<i64, _>("modification_count_today")? as u32;
    position.orphan_sync = row.try_get::<i64, _>("orphan_sync")? != 0;
    position.state = position_state_from_str(&row.try_get::<String, _>("state")?);
    position.breakeven_reached = row.try_get::<i64, _>("breakeven_reached")? != 0;
    position.consecutive_modification_rejections =
        row.try_get::<i64, _>("consecutive_modification_rejections")? as u32;
    Ok(position)
}

pub struct SqliteTradeResultRepository {
    pool: SqlitePool,
}

impl SqliteTradeResultRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TradeResultRepository for SqliteTradeResultRepository {
    async fn insert(&self, trade: &Trade) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trade_results
                (ticket, symbol, entry, exit, entry_time, exit_time, pips, pnl,
                 result, exit_reason, broker_id, signal_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticket) DO NOTHING
            "#,
        )
        .bind(&trade.ticket)
        .bind(&trade.symbol)
        .bind(trade.entry.to_string())
        .bind(trade.exit.to_string())
        .bind(trade.entry_time)
        .bind(trade.exit_time)
        .bind(trade.pips.to_string())
        .bind(trade.pnl.to_string())
        .bind(trade_result_to_str(trade.result))
        .bind(&trade.exit_reason)
        .bind(&trade.broker_id)
        .bind(trade.signal_id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await
        .context("inserting trade result")?;
        Ok(())
    }

    async fn exists(&self, ticket: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM trade_results WHERE ticket = ?")
            .bind(ticket)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count > 0)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Trade>> {
        let rows = sqlx::query("SELECT * FROM trade_results ORDER BY exit_time DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(map_trade).collect()
    }
}

fn map_trade(row: sqlx::sqlite::SqliteRow) -> Result<Trade> {
    let signal_id: Option<String> = row.try_get("signal_id")?;
    Ok(Trade {
        ticket: row.try_get("ticket")?,
        symbol: row.try_get("symbol")?,
        entry: dec(&row.try_get::<String, _>("entry")?),
        exit: dec(&row.try_get::<String, _>("exit")?),
        entry_time: row.try_get("entry_time")?,
        exit_time: row.try_get("exit_time")?,
        pips: dec(&row.try_get::<String, _>("pips")?),
        pnl: dec(&row.try_get::<String, _>("pnl")?),
        result: trade_result_from_str(&row.try_get::<String, _>("result")?),
        exit_reason: row.try_get("exit_reason")?,
        broker_id: row.try_get("broker_id")?,
        signal_id: signal_id.map(|s| Uuid::parse_str(&s)).transpose()?,
    })
}

pub struct SqliteCoherenceEventRepository {
    pool: SqlitePool,
}

impl SqliteCoherenceEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CoherenceEventRepository for SqliteCoherenceEventRepository {
    async fn insert(&self, event: &CoherenceEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO coherence_events (trace_id, symbol, strategy, kind, detail, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.trace_id.to_string())
        .bind(&event.symbol)
        .bind(&event.strategy)
        .bind(coherence_kind_to_str(event.kind))
        .bind(event.detail.to_string())
        .bind(event.timestamp)
        .execute(&self.pool)
        .await
        .context("inserting coherence event")?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<CoherenceEvent>> {
        let rows = sqlx::query("SELECT * FROM coherence_events ORDER BY timestamp DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(map_coherence_event).collect()
    }
}

fn map_coherence_event(row: sqlx::sqlite::SqliteRow) -> Result<CoherenceEvent> {
    Ok(CoherenceEvent {
        trace_id: Uuid::parse_str(&row.try_get::<String, _>("trace_id")?)?,
        symbol: row.try_get("symbol")?,
        strategy: row.try_get("strategy")?,
        kind: coherence_kind_from_str(&row.try_get::<String, _>("kind")?),
        detail: serde_json::from_str(&row.try_get::<String, _>("detail")?)
            .unwrap_or(serde_json::Value::Null),
        timestamp: row.try_get("timestamp")?,
    })
}

pub struct SqliteDynamicParamsRepository {
    pool: SqlitePool,
}

impl SqliteDynamicParamsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DynamicParamsRepository for SqliteDynamicParamsRepository {
    async fn get(&self) -> Result<DynamicParams> {
        let row = sqlx::query("SELECT * FROM dynamic_params WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(DynamicParams {
                adx_threshold: row.try_get("adx_threshold")?,
                atr_multiplier: row.try_get("atr_multiplier")?,
                minimum_score: row.try_get::<i64, _>("minimum_score")? as u8,
                per_trade_risk_fraction: dec(&row.try_get::<String, _>("per_trade_risk_fraction")?),
                slope_min_pct: row.try_get("slope_min_pct")?,
                high_vol_atr_pct_cutoff: row.try_get("high_vol_atr_pct_cutoff")?,
                range_narrow_band_pct: row.try_get("range_narrow_band_pct")?,
                shock_slope_threshold: row.try_get("shock_slope_threshold")?,
                breakeven_atr_threshold: dec(&row.try_get::<String, _>("breakeven_atr_threshold")?),
            }),
            None => {
                let defaults = DynamicParams::default();
                self.set(&defaults).await?;
                Ok(defaults)
            }
        }
    }

    async fn set(&self, params: &DynamicParams) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dynamic_params
                (id, adx_threshold, atr_multiplier, minimum_score, per_trade_risk_fraction,
                 slope_min_pct, high_vol_atr_pct_cutoff, range_narrow_band_pct,
                 shock_slope_threshold, breakeven_atr_threshold)
            VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                adx_threshold = excluded.adx_threshold,
                atr_multiplier = excluded.atr_multiplier,
                minimum_score = excluded.minimum_score,
                per_trade_risk_fraction = excluded.per_trade_risk_fraction,
                slope_min_pct = excluded.slope_min_pct,
                high_vol_atr_pct_cutoff = excluded.high_vol_atr_pct_cutoff,
                range_narrow_band_pct = excluded.range_narrow_band_pct,
                shock_slope_threshold = excluded.shock_slope_threshold,
                breakeven_atr_threshold = excluded.breakeven_atr_threshold
            "#,
        )
        .bind(params.adx_threshold)
        .bind(params.atr_multiplier)
        .bind(params.minimum_score as i64)
        .bind(params.per_trade_risk_fraction.to_string())
        .bind(params.slope_min_pct)
        .bind(params.high_vol_atr_pct_cutoff)
        .bind(params.range_narrow_band_pct)
        .bind(params.shock_slope_threshold)
        .bind(params.breakeven_atr_threshold.to_string())
        .execute(&self.pool)
        .await
        .context("upserting dynamic params")?;
        Ok(())
    }
}

pub struct SqliteRiskStateRepository {
    pool: SqlitePool,
}

impl SqliteRiskStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RiskStateRepository for SqliteRiskStateRepository {
    async fn get(&self) -> Result<RiskState> {
        let row = sqlx::query("SELECT * FROM risk_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let last_trade_outcome: Option<String> = row.try_get("last_trade_outcome")?;
                Ok(RiskState {
                    account_equity: dec(&row.try_get::<String, _>("account_equity")?),
                    consecutive_losses: row.try_get::<i64, _>("consecutive_losses")? as usize,
                    lockdown: row.try_get::<i64, _>("lockdown")? != 0,
                    per_trade_risk_fraction: dec(&row.try_get::<String, _>("per_trade_risk_fraction")?),
                    max_account_risk_fraction: dec(
                        &row.try_get::<String, _>("max_account_risk_fraction")?,
                    ),
                    last_trade_outcome: last_trade_outcome.as_deref().map(trade_result_from_str),
                    n_lockdown: row.try_get::<i64, _>("n_lockdown")? as usize,
                })
            }
            None => {
                let defaults = RiskState::new(Decimal::from(10_000));
                self.set(&defaults).await?;
                Ok(defaults)
            }
        }
    }

    async fn set(&self, state: &RiskState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO risk_state
                (id, account_equity, consecutive_losses, lockdown, per_trade_risk_fraction,
                 max_account_risk_fraction, last_trade_outcome, n_lockdown)
            VALUES (1, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                account_equity = excluded.account_equity,
                consecutive_losses = excluded.consecutive_losses,
                lockdown = excluded.lockdown,
                per_trade_risk_fraction = excluded.per_trade_risk_fraction,
                max_account_risk_fraction = excluded.max_account_risk_fraction,
                last_trade_outcome = excluded.last_trade_outcome,
                n_lockdown = excluded.n_lockdown
            "#,
        )
        .bind(state.account_equity.to_string())
        .bind(state.consecutive_losses as i64)
        .bind(state.lockdown as i64)
        .bind(state.per_trade_risk_fraction.to_string())
        .bind(state.max_account_risk_fraction.to_string())
        .bind(state.last_trade_outcome.map(trade_result_to_str))
        .bind(state.n_lockdown as i64)
        .execute(&self.pool)
        .await
        .context("upserting risk state")?;
        Ok(())
    }
}

pub struct SqliteTuningLogRepository {
    pool: SqlitePool,
}

impl SqliteTuningLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TuningLogRepository for SqliteTuningLogRepository {
    async fn insert(&self, entry: &TuningLogEntry) -> Result<()> {
        let params_json = serde_json::to_string(&entry.params)?;
        sqlx::query(
            r#"
            INSERT INTO tuning_log (id, timestamp, params, trigger_reason)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.timestamp)
        .bind(params_json)
        .bind(&entry.trigger_reason)
        .execute(&self.pool)
        .await
        .context("inserting tuning log entry")?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<TuningLogEntry>> {
        let rows = sqlx::query("SELECT * FROM tuning_log ORDER BY timestamp DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let params: DynamicParams = serde_json::from_str(&row.try_get::<String, _>("params")?)?;
                Ok(TuningLogEntry {
                    id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
                    timestamp: row.try_get("timestamp")?,
                    params,
                    trigger_reason: row.try_get("trigger_reason")?,
                })
            })
            .collect()
    }
}
