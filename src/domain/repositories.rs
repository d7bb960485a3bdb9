//! Persistence repository traits — one per logical table from `spec.md` §6.
//! Callers never embed storage-engine idioms; every state-modifying
//! operation is a method here. Generalizes the teacher's
//! `domain::repositories::{CandleRepository, RiskStateRepository,
//! TradeRepository}` split to the tables this specification names.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::coherence::CoherenceEvent;
use crate::domain::risk::{DynamicParams, RiskState};
use crate::domain::trading::{AssetProfile, Position, Signal, Trade};

#[async_trait]
pub trait AssetProfileRepository: Send + Sync {
    async fn get(&self, symbol: &str) -> anyhow::Result<Option<AssetProfile>>;
    async fn upsert(&self, profile: &AssetProfile) -> anyhow::Result<()>;
    async fn list_all(&self) -> anyhow::Result<Vec<AssetProfile>>;
}

#[async_trait]
pub trait SignalRepository: Send + Sync {
    async fn insert(&self, signal: &Signal) -> anyhow::Result<()>;
    async fn update(&self, signal: &Signal) -> anyhow::Result<()>;
    async fn get(&self, trace_id: Uuid) -> anyhow::Result<Option<Signal>>;
    /// Pending signals matching (symbol, direction, strategy, timeframe), for
    /// deduplication and the Coherence Monitor's pending-timeout sweep.
    async fn find_pending(
        &self,
        symbol: &str,
        direction: crate::domain::trading::Direction,
        strategy: &str,
        timeframe: &str,
    ) -> anyhow::Result<Vec<Signal>>;
    async fn list_pending_older_than(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<Vec<Signal>>;
}

#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn upsert(&self, position: &Position) -> anyhow::Result<()>;
    async fn get(&self, ticket_id: &str) -> anyhow::Result<Option<Position>>;
    async fn list_open(&self) -> anyhow::Result<Vec<Position>>;
    async fn remove(&self, ticket_id: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait TradeResultRepository: Send + Sync {
    async fn insert(&self, trade: &Trade) -> anyhow::Result<()>;
    async fn exists(&self, ticket: &str) -> anyhow::Result<bool>;
    async fn recent(&self, limit: usize) -> anyhow::Result<Vec<Trade>>;
}

#[async_trait]
pub trait CoherenceEventRepository: Send + Sync {
    async fn insert(&self, event: &CoherenceEvent) -> anyhow::Result<()>;
    async fn recent(&self, limit: usize) -> anyhow::Result<Vec<CoherenceEvent>>;
}

#[async_trait]
pub trait DynamicParamsRepository: Send + Sync {
    async fn get(&self) -> anyhow::Result<DynamicParams>;
    async fn set(&self, params: &DynamicParams) -> anyhow::Result<()>;
}

#[async_trait]
pub trait RiskStateRepository: Send + Sync {
    async fn get(&self) -> anyhow::Result<RiskState>;
    async fn set(&self, state: &RiskState) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct TuningLogEntry {
    pub id: Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub params: DynamicParams,
    pub trigger_reason: String,
}

#[async_trait]
pub trait TuningLogRepository: Send + Sync {
    async fn insert(&self, entry: &TuningLogEntry) -> anyhow::Result<()>;
    async fn recent(&self, limit: usize) -> anyhow::Result<Vec<TuningLogEntry>>;
}
