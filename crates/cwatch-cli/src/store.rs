//! Store seams between the cycle orchestrators and Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cwatch_core::{CycleStats, CycleType, UserRecord, UserUpdate};
use sqlx::PgPool;

#[async_trait]
pub(crate) trait UserStore: Send + Sync {
    async fn monitor_users(&self) -> anyhow::Result<Vec<UserRecord>>;

    async fn validation_candidates(&self) -> anyhow::Result<Vec<UserRecord>>;

    async fn apply(&self, update: &UserUpdate) -> anyhow::Result<()>;
}

#[async_trait]
pub(crate) trait StatsStore: Send + Sync {
    async fn sessions_between(
        &self,
        cycle_type: CycleType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<i64>;

    async fn record(
        &self,
        stats: &CycleStats,
        local_datetime: &str,
        scrape_duration: &str,
    ) -> anyhow::Result<()>;
}

pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn monitor_users(&self) -> anyhow::Result<Vec<UserRecord>> {
        Ok(cwatch_db::list_users(&self.pool).await?)
    }

    async fn validation_candidates(&self) -> anyhow::Result<Vec<UserRecord>> {
        Ok(cwatch_db::list_validation_candidates(&self.pool).await?)
    }

    async fn apply(&self, update: &UserUpdate) -> anyhow::Result<()> {
        Ok(cwatch_db::apply_user_update(&self.pool, update).await?)
    }
}

#[async_trait]
impl StatsStore for PgStore {
    async fn sessions_between(
        &self,
        cycle_type: CycleType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        Ok(cwatch_db::count_sessions_between(&self.pool, cycle_type, start, end).await?)
    }

    async fn record(
        &self,
        stats: &CycleStats,
        local_datetime: &str,
        scrape_duration: &str,
    ) -> anyhow::Result<()> {
        let row = cwatch_db::insert_cycle_stats(
            &self.pool,
            &cwatch_db::NewCycleStats {
                stats,
                local_datetime,
                scrape_duration,
            },
        )
        .await?;
        tracing::debug!(id = row.id, public_id = %row.public_id, "cycle stats stored");
        Ok(())
    }
}
