//! Thin wrapper matching the teacher's `PersistenceBootstrap::init` shape:
//! one call that opens the pool, runs migrations, and hands back the
//! `Persistence` facade every later bootstrap stage composes against.

use crate::infrastructure::persistence::Persistence;

pub struct PersistenceBootstrap;

impl PersistenceBootstrap {
    pub async fn init(database_url: &str) -> anyhow::Result<Persistence> {
        Persistence::init(database_url).await
    }
}
