//! Postgres access for the user table and the monitoring stats log.
//!
//! Schema lives in the workspace `migrations/` directory and is embedded at
//! build time, so `cwatch db migrate` needs no files at runtime.

pub mod cycle_stats;
pub mod users;

use std::time::Duration;

use cwatch_core::AppConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

pub use cycle_stats::{count_sessions_between, insert_cycle_stats, CycleStatsRow, NewCycleStats};
pub use users::{apply_user_update, list_users, list_validation_candidates, update_query, UserRow};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Error)]
pub enum DbError {
    #[error("user not found")]
    NotFound,
    #[error("failed to encode cycle results: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Pool sizing taken from the `CWATCH_DB_*` settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections.min(config.db_max_connections),
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }

    fn options(self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
    }
}

/// Opens the pool described by `config`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] when no connection can be established.
pub async fn connect(config: &AppConfig) -> Result<PgPool, DbError> {
    let pool_config = PoolConfig::from_app_config(config);
    tracing::debug!(
        max_connections = pool_config.max_connections,
        min_connections = pool_config.min_connections,
        "connecting to postgres"
    );
    Ok(pool_config.options().connect(&config.database_url).await?)
}

/// Brings the schema up to date. Already-applied migrations are skipped.
///
/// # Errors
///
/// Returns [`DbError::Migration`] if a migration fails or was edited after
/// being applied.
pub async fn migrate(pool: &PgPool) -> Result<(), DbError> {
    MIGRATOR.run(pool).await?;
    tracing::debug!(known = MIGRATOR.iter().count(), "schema up to date");
    Ok(())
}

/// Round-trips a trivial query.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the database does not answer.
pub async fn ping(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_migrations_are_embedded() {
        let versions: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1]);
    }
}
