//! Database operations for `monitoring_stats`.

use chrono::{DateTime, Utc};
use cwatch_core::{CycleStats, CycleType};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `monitoring_stats` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CycleStatsRow {
    pub id: i64,
    pub public_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub local_datetime: String,
    pub cycle_type: String,
    pub session_number: i32,
    pub success_count: i32,
    pub fail_count: i32,
    pub duration_seconds: f64,
    pub scrape_duration: String,
    pub results: serde_json::Value,
}

/// A finished cycle plus its human-readable renderings.
#[derive(Debug, Clone)]
pub struct NewCycleStats<'a> {
    pub stats: &'a CycleStats,
    /// Local wall-clock stamp, e.g. `16-10-2026 | 08:00:00 WIB`.
    pub local_datetime: &'a str,
    /// `HH:MM:SS`.
    pub scrape_duration: &'a str,
}

/// Appends one cycle record and returns it.
///
/// # Errors
///
/// Returns [`DbError::Encode`] if the per-target results cannot be encoded,
/// or [`DbError::Sqlx`] if the insert fails.
pub async fn insert_cycle_stats(
    pool: &PgPool,
    new: &NewCycleStats<'_>,
) -> Result<CycleStatsRow, DbError> {
    let stats = new.stats;
    let results = serde_json::to_value(&stats.per_target_results)?;

    let row = sqlx::query_as::<_, CycleStatsRow>(
        "INSERT INTO monitoring_stats \
             (public_id, recorded_at, local_datetime, cycle_type, session_number, \
              success_count, fail_count, duration_seconds, scrape_duration, results) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING id, public_id, recorded_at, local_datetime, cycle_type, session_number, \
                   success_count, fail_count, duration_seconds, scrape_duration, results",
    )
    .bind(Uuid::new_v4())
    .bind(stats.timestamp)
    .bind(new.local_datetime)
    .bind(stats.cycle_type.as_str())
    .bind(stats.session_number)
    .bind(i32::try_from(stats.success_count).unwrap_or(i32::MAX))
    .bind(i32::try_from(stats.fail_count).unwrap_or(i32::MAX))
    .bind(stats.duration_seconds)
    .bind(new.scrape_duration)
    .bind(results)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Number of cycles of `cycle_type` recorded in `[start, end)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_sessions_between(
    pool: &PgPool,
    cycle_type: CycleType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM monitoring_stats \
         WHERE cycle_type = $1 AND recorded_at >= $2 AND recorded_at < $3",
    )
    .bind(cycle_type.as_str())
    .bind(start)
    .bind(end)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
