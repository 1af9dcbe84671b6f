use sqlx::Row;
use srs_core::model::{NewReviewEvent, ReviewEvent, ReviewEventId, UserId, WordId, WordProgress};

use super::{
    SqliteRepository, conn_err,
    mapping::{count_u64, map_event_row, to_i64, user_id_i64, word_id_i64},
};
use crate::repository::{
    ReviewEventRepository, ReviewPersistence, ReviewTotals, StorageError,
};

#[async_trait::async_trait]
impl ReviewEventRepository for SqliteRepository {
    async fn events_for_word(
        &self,
        user_id: UserId,
        word_id: WordId,
    ) -> Result<Vec<ReviewEvent>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    id, user_id, word_id, quality,
                    old_srs_level, new_srs_level, old_interval_days, new_interval_days,
                    old_ease_factor, new_ease_factor, review_time_seconds, reviewed_at
                FROM review_events
                WHERE user_id = ?1 AND word_id = ?2
                ORDER BY reviewed_at ASC, id ASC
            ",
        )
        .bind(user_id_i64(user_id)?)
        .bind(word_id_i64(word_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        rows.iter().map(map_event_row).collect()
    }

    async fn review_totals(&self, user_id: UserId) -> Result<ReviewTotals, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    COUNT(*) AS total,
                    COALESCE(SUM(CASE WHEN quality >= 3 THEN 1 ELSE 0 END), 0) AS correct
                FROM review_events
                WHERE user_id = ?1
            ",
        )
        .bind(user_id_i64(user_id)?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn_err)?;

        let ser = |e: sqlx::Error| StorageError::Serialization(e.to_string());
        Ok(ReviewTotals {
            total: count_u64(row.try_get("total").map_err(ser)?)?,
            correct: count_u64(row.try_get("correct").map_err(ser)?)?,
        })
    }
}

#[async_trait::async_trait]
impl ReviewPersistence for SqliteRepository {
    async fn apply_review(
        &self,
        progress: &WordProgress,
        event: NewReviewEvent,
    ) -> Result<ReviewEvent, StorageError> {
        if event.user_id != progress.user_id() || event.word_id != progress.word_id() {
            return Err(StorageError::Conflict);
        }

        let user_id = user_id_i64(progress.user_id())?;
        let word_id = word_id_i64(progress.word_id())?;
        let expected_version = to_i64("version", progress.version())?;

        let mut tx = self.pool.begin().await.map_err(conn_err)?;

        let updated = sqlx::query(
            r"
            UPDATE word_progress SET
                srs_level = ?3,
                ease_factor = ?4,
                interval_days = ?5,
                next_review_at = ?6,
                total_reviews = ?7,
                correct_reviews = ?8,
                last_reviewed_at = ?9,
                version = version + 1
            WHERE user_id = ?1 AND word_id = ?2 AND version = ?10
            ",
        )
        .bind(user_id)
        .bind(word_id)
        .bind(i64::from(progress.srs_level()))
        .bind(progress.ease_factor())
        .bind(i64::from(progress.interval_days()))
        .bind(progress.next_review_at())
        .bind(i64::from(progress.total_reviews()))
        .bind(i64::from(progress.correct_reviews()))
        .bind(progress.last_reviewed_at())
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(conn_err)?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM word_progress WHERE user_id = ?1 AND word_id = ?2")
                .bind(user_id)
                .bind(word_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(conn_err)?
                .is_some();
            tx.rollback().await.map_err(conn_err)?;
            return Err(if exists {
                StorageError::Conflict
            } else {
                StorageError::NotFound
            });
        }

        let res = sqlx::query(
            r"
                INSERT INTO review_events (
                    user_id, word_id, quality,
                    old_srs_level, new_srs_level, old_interval_days, new_interval_days,
                    old_ease_factor, new_ease_factor, review_time_seconds, reviewed_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
        )
        .bind(user_id)
        .bind(word_id)
        .bind(i64::from(event.quality.value()))
        .bind(i64::from(event.before.srs_level))
        .bind(i64::from(event.after.srs_level))
        .bind(i64::from(event.before.interval_days))
        .bind(i64::from(event.after.interval_days))
        .bind(event.before.ease_factor)
        .bind(event.after.ease_factor)
        .bind(i64::from(event.review_time_seconds))
        .bind(event.reviewed_at)
        .execute(&mut *tx)
        .await
        .map_err(conn_err)?;

        tx.commit().await.map_err(conn_err)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("review event id sign overflow".into()))?;
        Ok(event.with_id(ReviewEventId::new(id)))
    }
}
