//! `Database` — pool construction and migration application. Kept from the
//! teacher's `infrastructure::persistence::database::Database` (WAL-mode
//! SQLite, bounded pool, create-if-missing), replacing its ad hoc inline
//! `CREATE TABLE IF NOT EXISTS` calls with a tracked `sqlx::migrate!()` run,
//! matching the transactional-migration language this system specifies.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        if let Some(path) = db_url.strip_prefix("sqlite://") {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).ok();
                }
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid DATABASE_URL: {db_url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect to sqlite pool")?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to apply database migrations")?;
        Ok(())
    }
}
