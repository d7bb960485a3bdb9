pub mod database;
pub mod repositories;

use std::sync::Arc;

pub use database::Database;

use crate::domain::repositories::{
    AssetProfileRepository, CoherenceEventRepository, DynamicParamsRepository, PositionRepository,
    RiskStateRepository, SignalRepository, TradeResultRepository, TuningLogRepository,
};
use repositories::{
    SqliteAssetProfileRepository, SqliteCoherenceEventRepository, SqliteDynamicParamsRepository,
    SqlitePositionRepository, SqliteRiskStateRepository, SqliteSignalRepository,
    SqliteTradeResultRepository, SqliteTuningLogRepository,
};

/// All writes funnel through this facade; callers never hold a raw pool.
/// Grounded in the teacher's `PersistenceBootstrap::init` returning one
/// `PersistenceHandle` struct of `Arc`-wrapped repositories.
pub struct Persistence {
    pub db: Database,
    pub asset_profiles: Arc<dyn AssetProfileRepository>,
    pub signals: Arc<dyn SignalRepository>,
    pub positions: Arc<dyn PositionRepository>,
    pub trade_results: Arc<dyn TradeResultRepository>,
    pub coherence_events: Arc<dyn CoherenceEventRepository>,
    pub dynamic_params: Arc<dyn DynamicParamsRepository>,
    pub risk_state: Arc<dyn RiskStateRepository>,
    pub tuning_log: Arc<dyn TuningLogRepository>,
}

impl Persistence {
    pub async fn init(database_url: &str) -> anyhow::Result<Self> {
        let db = Database::new(database_url).await?;
        let pool = db.pool.clone();

        Ok(Self {
            db,
            asset_profiles: Arc::new(SqliteAssetProfileRepository::new(pool.clone())),
            signals: Arc::new(SqliteSignalRepository::new(pool.clone())),
            positions: Arc::new(SqlitePositionRepository::new(pool.clone())),
            trade_results: Arc::new(SqliteTradeResultRepository::new(pool.clone())),
            coherence_events: Arc::new(SqliteCoherenceEventRepository::new(pool.clone())),
            dynamic_params: Arc::new(SqliteDynamicParamsRepository::new(pool.clone())),
            risk_state: Arc::new(SqliteRiskStateRepository::new(pool.clone())),
            tuning_log: Arc::new(SqliteTuningLogRepository::new(pool)),
        })
    }
}
