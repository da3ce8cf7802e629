//! Reads and partial writes against the `users` table.

use cwatch_core::{Platform, UserRecord, UserUpdate};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// The columns of `users` this service reads.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub role: Option<String>,
    pub is_admin: bool,
    pub instagram_handle: Option<String>,
    pub tiktok_handle: Option<String>,
    pub instagram_validation_status: Option<String>,
    pub tiktok_validation_status: Option<String>,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        UserRecord {
            id: row.id,
            instagram_handle: row.instagram_handle,
            tiktok_handle: row.tiktok_handle,
            instagram_status: row.instagram_validation_status,
            tiktok_status: row.tiktok_validation_status,
        }
    }
}

const USER_COLUMNS: &str = "id, role, is_admin, instagram_handle, tiktok_handle, \
                            instagram_validation_status, tiktok_validation_status";

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Every user, in creation order. Monitoring scrapes all declared handles.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_users(pool: &PgPool) -> Result<Vec<UserRecord>, DbError> {
    let rows = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at, id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(UserRecord::from).collect())
}

/// Non-admin users with at least one non-blank handle.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_validation_candidates(pool: &PgPool) -> Result<Vec<UserRecord>, DbError> {
    let rows = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users \
         WHERE is_admin = FALSE \
           AND COALESCE(LOWER(role), '') <> 'admin' \
           AND (NULLIF(BTRIM(instagram_handle), '') IS NOT NULL \
                OR NULLIF(BTRIM(tiktok_handle), '') IS NOT NULL) \
         ORDER BY created_at, id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(UserRecord::from).collect())
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

fn columns(platform: Platform) -> (&'static str, &'static str, &'static str) {
    match platform {
        Platform::Instagram => (
            "instagram_followers",
            "instagram_posts",
            "instagram_validation_status",
        ),
        Platform::Tiktok => ("tiktok_followers", "tiktok_posts", "tiktok_validation_status"),
    }
}

/// Builds the `UPDATE` for the fields present in `update`. `None` when there
/// is nothing to write.
#[must_use]
pub fn update_query(update: &UserUpdate) -> Option<QueryBuilder<'static, Postgres>> {
    if update.is_empty() {
        return None;
    }
    let (followers_col, posts_col, status_col) = columns(update.platform);

    let mut builder = QueryBuilder::<Postgres>::new("UPDATE users SET ");
    let mut fields = builder.separated(", ");
    if let Some(followers) = update.followers {
        fields.push(format!("{followers_col} = "));
        fields.push_bind_unseparated(followers);
    }
    if let Some(posts) = update.posts {
        fields.push(format!("{posts_col} = "));
        fields.push_bind_unseparated(posts);
    }
    if let Some(status) = update.status {
        fields.push(format!("{status_col} = "));
        fields.push_bind_unseparated(status.as_str());
    }
    builder.push(" WHERE id = ");
    builder.push_bind(update.user_id);
    Some(builder)
}

/// Writes only the fields present in `update`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has the id, or [`DbError::Sqlx`]
/// if the update fails.
pub async fn apply_user_update(pool: &PgPool, update: &UserUpdate) -> Result<(), DbError> {
    let Some(mut builder) = update_query(update) else {
        return Ok(());
    };
    let result = builder.build().execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use cwatch_core::ValidationStatus;

    use super::*;

    #[test]
    fn monitoring_update_writes_both_counters() {
        let update = UserUpdate::counts(Uuid::nil(), Platform::Tiktok, Some(10), None);
        let builder = update_query(&update).expect("update has fields");
        assert_eq!(
            builder.sql(),
            "UPDATE users SET tiktok_followers = $1, tiktok_posts = $2 WHERE id = $3"
        );
    }

    #[test]
    fn invalid_handle_update_writes_status_only() {
        let update = UserUpdate::validation(
            Uuid::nil(),
            Platform::Instagram,
            ValidationStatus::Invalid,
            None,
            Some(4),
        );
        let builder = update_query(&update).expect("update has fields");
        assert_eq!(
            builder.sql(),
            "UPDATE users SET instagram_validation_status = $1 WHERE id = $2"
        );
    }

    #[test]
    fn empty_update_builds_nothing() {
        let update = UserUpdate {
            user_id: Uuid::nil(),
            platform: Platform::Instagram,
            followers: None,
            posts: None,
            status: None,
        };
        assert!(update_query(&update).is_none());
    }

    #[test]
    fn row_maps_validation_columns_to_record() {
        let row = UserRow {
            id: Uuid::nil(),
            role: Some("member".to_owned()),
            is_admin: false,
            instagram_handle: Some("@john".to_owned()),
            tiktok_handle: None,
            instagram_validation_status: Some("benar".to_owned()),
            tiktok_validation_status: None,
        };
        let record = UserRecord::from(row);
        assert_eq!(record.handle(Platform::Instagram).as_deref(), Some("john"));
        assert_eq!(record.status(Platform::Instagram), Some(ValidationStatus::Valid));
    }
}
