//! Database connection pool setup and store selection.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;
use crate::error::Result;
use crate::store::{MemoryStore, PgStore, Store};

/// Create a new database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Apply the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Open the store named by `DATABASE_URL`, migrating Postgres on the way.
pub async fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    if config.uses_memory_store() {
        tracing::warn!("Using in-memory store; all data is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Connected to database");
    run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");
    Ok(Arc::new(PgStore::new(pool)))
}
