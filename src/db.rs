use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::config::AppConfig;

/// Opens the connection pool. Called once at startup; the handle is
/// passed explicitly to whoever needs it.
pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("connect to database")?;
    info!("database pool established");
    Ok(pool)
}

/// Drains and closes the pool on shutdown.
pub async fn close(pool: &PgPool) {
    pool.close().await;
    info!("database pool closed");
}
