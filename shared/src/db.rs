//! Postgres connection pool for the analytics store

use anyhow::{Context, Result};
use clickstream_config::DbConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

/// Database connection pool type
pub type DbPool = Pool<Postgres>;

/// Create a PostgreSQL connection pool
pub async fn create_pool(database_url: &str, db_config: &DbConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .min_connections(db_config.min_connections)
        .max_connections(db_config.max_connections)
        .acquire_timeout(Duration::from_secs(db_config.acquire_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(db_config.idle_timeout_secs)))
        .test_before_acquire(true)
        .connect(database_url)
        .await
        .context("Failed to connect to Postgres")?;

    Ok(pool)
}
