//! Top-level orchestrator. Grounded in the teacher's `Application`
//! (`build` + `start`): one type that owns the full boot sequence
//! (persistence, services, agents) and tears it down again on shutdown.
//! The teacher's variant also wires a native UI; that surface is out of
//! scope here, so `System` stops at the headless agent fleet.

use crate::application::bootstrap::{
    AgentsBootstrap, AgentsHandle, PersistenceBootstrap, ServicesBootstrap, ServicesHandle,
};
use crate::config::Config;
use crate::infrastructure::persistence::Persistence;

use std::sync::Arc;

pub struct System {
    persistence: Arc<Persistence>,
    services: ServicesHandle,
    agents: AgentsHandle,
}

impl System {
    pub async fn start(config: &Config) -> anyhow::Result<Self> {
        let persistence = Arc::new(PersistenceBootstrap::init(&config.database_url).await?);
        let services = ServicesBootstrap::init(config, &persistence).await?;
        let agents = AgentsBootstrap::spawn(config, Arc::clone(&persistence), &services);

        Ok(Self {
            persistence,
            services,
            agents,
        })
    }

    pub fn metrics(&self) -> &crate::infrastructure::observability::Metrics {
        &self.services.metrics
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.agents.shutdown().await;
        self.persistence.db.pool.close().await;
        Ok(())
    }
}
