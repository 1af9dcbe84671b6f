use sqlx::{Row, SqlitePool};
use srs_core::model::UserId;

use super::{SqliteRepository, conn_err, mapping::user_id_i64};
use crate::repository::{StorageError, UserStreakProvider};

pub(super) async fn upsert_streak(
    pool: &SqlitePool,
    user_id: UserId,
    days: u32,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
        INSERT INTO user_streaks (user_id, streak_days)
        VALUES (?1, ?2)
        ON CONFLICT(user_id) DO UPDATE SET streak_days = excluded.streak_days
        ",
    )
    .bind(user_id_i64(user_id)?)
    .bind(i64::from(days))
    .execute(pool)
    .await
    .map_err(conn_err)?;
    Ok(())
}

#[async_trait::async_trait]
impl UserStreakProvider for SqliteRepository {
    async fn streak_days(&self, user_id: UserId) -> Result<u32, StorageError> {
        let row = sqlx::query("SELECT streak_days FROM user_streaks WHERE user_id = ?1")
            .bind(user_id_i64(user_id)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn_err)?;

        let Some(row) = row else {
            return Ok(0);
        };
        let days: i64 = row
            .try_get("streak_days")
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        u32::try_from(days)
            .map_err(|_| StorageError::Serialization(format!("invalid streak_days: {days}")))
    }
}
