//! Wires the shared, long-lived services every agent task borrows:
//! broker/market-data adapters, the notifier, metrics, the heartbeat
//! registry, and the in-memory risk/tuning state loaded from
//! persistence. Grounded in the teacher's `ServicesBootstrap::init`
//! returning one `ServicesHandle` of `Arc`-wrapped singletons.

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use crate::domain::ports::{BrokerConnector, MarketDataProvider, Notifier};
use crate::domain::risk::{DynamicParams, RiskState};
use crate::domain::trading::asset_profile::AssetClass;
use crate::domain::trading::AssetProfile;
use crate::infrastructure::broker::{MockBroker, MockMarketDataProvider};
use crate::infrastructure::notifier::LogNotifier;
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::persistence::Persistence;

use crate::application::monitoring::AgentStatusRegistry;
use crate::application::risk_management::RiskManager;

pub struct ServicesHandle {
    pub broker: Arc<dyn BrokerConnector>,
    pub market_data: Arc<dyn MarketDataProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub metrics: Metrics,
    pub agent_status: AgentStatusRegistry,
    pub risk_manager: Arc<RiskManager>,
    pub dynamic_params: Arc<RwLock<DynamicParams>>,
}

pub struct ServicesBootstrap;

impl ServicesBootstrap {
    pub async fn init(config: &Config, persistence: &Persistence) -> anyhow::Result<ServicesHandle> {
        let broker: Arc<dyn BrokerConnector> = Arc::new(MockBroker::new());
        let market_data: Arc<dyn MarketDataProvider> = Arc::new(MockMarketDataProvider::new());
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier::new());
        let metrics = Metrics::new()?;
        let agent_status = AgentStatusRegistry::new();

        broker.initialize().await?;

        preload_asset_profiles(&config.symbols, &broker, persistence).await?;

        let dynamic_params = persistence.dynamic_params.get().await?;
        let risk_state = load_or_seed_risk_state(persistence, config.initial_account_equity).await?;

        metrics
            .account_equity
            .set(risk_state.account_equity.to_f64().unwrap_or(0.0));
        metrics
            .lockdown_status
            .set(if risk_state.lockdown { 1.0 } else { 0.0 });

        let risk_manager = Arc::new(RiskManager::new(config.max_positions_per_symbol));

        Ok(ServicesHandle {
            broker,
            market_data,
            notifier,
            metrics,
            agent_status,
            risk_manager,
            dynamic_params: Arc::new(RwLock::new(dynamic_params)),
        })
    }
}

/// `RiskState::get` self-seeds a hardcoded equity if the row is missing,
/// which would silently ignore a configured starting balance on a fresh
/// database. Seed from `config.initial_account_equity` ourselves the first
/// time, then defer to the repository on every later boot.
async fn load_or_seed_risk_state(
    persistence: &Persistence,
    initial_equity: Decimal,
) -> anyhow::Result<RiskState> {
    let existing: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM risk_state WHERE id = 1")
        .fetch_one(&persistence.db.pool)
        .await?;

    if existing.0 == 0 {
        let seeded = RiskState::new(initial_equity);
        persistence.risk_state.set(&seeded).await?;
        Ok(seeded)
    } else {
        persistence.risk_state.get().await
    }
}

/// Classifies a canonical symbol by name since the mock broker's
/// `SymbolInfo` carries no asset-class field of its own.
fn classify_asset(symbol: &str) -> AssetClass {
    if symbol.starts_with("XAU") || symbol.starts_with("XAG") {
        AssetClass::Metal
    } else if symbol.starts_with("BTC") || symbol.starts_with("ETH") {
        AssetClass::Crypto
    } else if symbol.ends_with("USD30") || symbol.ends_with("SPX") || symbol.ends_with("NAS100") {
        AssetClass::Index
    } else {
        AssetClass::Forex
    }
}

fn split_currency_pair(symbol: &str) -> (String, String) {
    if symbol.len() == 6 {
        (symbol[0..3].to_string(), symbol[3..6].to_string())
    } else {
        (symbol.to_string(), "USD".to_string())
    }
}

async fn preload_asset_profiles(
    symbols: &[String],
    broker: &Arc<dyn BrokerConnector>,
    persistence: &Persistence,
) -> anyhow::Result<()> {
    for symbol in symbols {
        if persistence.asset_profiles.get(symbol).await?.is_some() {
            continue;
        }

        broker.ensure_visible(symbol).await?;
        let info = broker.get_symbol_info(symbol).await?;
        let (base_currency, quote_currency) = split_currency_pair(symbol);
        let asset_class = classify_asset(symbol);
        let pip_size = if matches!(info.digits, 3 | 5) {
            info.tick_size * dec!(10)
        } else {
            info.tick_size
        };

        let profile = AssetProfile::new(
            symbol.clone(),
            asset_class,
            info.trade_contract_size,
            info.tick_size,
            info.digits,
            pip_size,
            info.freeze_level,
            symbol.clone(),
            info.volume_step,
            quote_currency,
            base_currency,
        );

        persistence.asset_profiles.upsert(&profile).await?;
        info!(symbol, "preloaded asset profile");
    }
    Ok(())
}
