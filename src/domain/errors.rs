//! Error taxonomy — `spec.md` §7. Generalizes the teacher's
//! `TradingError`/`RiskViolation`/`MarketDataError`/`PortfolioError` split
//! into the four policy-bearing kinds the specification names.

use thiserror::Error;

/// Broker timeout, database contention, data-provider gap. Policy: bounded
/// retry with backoff; if the budget is exhausted, the caller receives this
/// typed failure — the system does not crash.
#[derive(Debug, Error)]
pub enum TransientError {
    #[error("broker call to {operation} timed out after {timeout_ms}ms")]
    BrokerTimeout { operation: String, timeout_ms: u64 },

    #[error("database contention on {table}: {detail}")]
    DatabaseContention { table: String, detail: String },

    #[error("data provider gap for {symbol} {timeframe}: {detail}")]
    ProviderGap {
        symbol: String,
        timeframe: String,
        detail: String,
    },
}

/// Signal fails risk, position fails freeze level, account risk exceeded.
/// Policy: record as REJECTED with the specific reason; no retry. These are
/// normal outcomes, not errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct InvariantRejection {
    pub reason: String,
}

impl InvariantRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// State across subsystems disagrees (e.g. the local DB shows an open
/// position the broker does not). Policy: the broker view wins for live
/// positions; the local view is reconciled and orphan-sync runs. For
/// lockdown/risk, the safer local state wins until the operator intervenes.
#[derive(Debug, Error)]
#[error("coherence fault: {0:?}")]
pub struct CoherenceFault(pub crate::domain::coherence::CoherenceEvent);

/// Schema migration failure, missing `AssetProfile` for a traded symbol,
/// corrupted `DynamicParams`. Policy: refuse to start trading; run in
/// read-only/diagnostic mode until repaired.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("schema migration failed: {0}")]
    MigrationFailed(String),

    #[error("missing AssetProfile for traded symbol {0}")]
    MissingAssetProfile(String),

    #[error("DynamicParams store is corrupted: {0}")]
    CorruptedDynamicParams(String),
}
