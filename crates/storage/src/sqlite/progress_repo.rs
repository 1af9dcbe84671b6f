use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::Row;
use srs_core::model::{UserId, WordId, WordProgress};

use super::{
    SqliteRepository, conn_err,
    mapping::{PROGRESS_COLUMNS, count_u64, map_progress_row, to_i64, user_id_i64, word_id_i64},
};
use crate::repository::{
    DueQuery, MistakeQuery, ProgressRepository, ProgressTotals, StorageError,
};

fn ser(e: sqlx::Error) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn map_rows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<WordProgress>, StorageError> {
    rows.iter().map(map_progress_row).collect()
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        user_id: UserId,
        word_id: WordId,
    ) -> Result<Option<WordProgress>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM word_progress p WHERE p.user_id = ?1 AND p.word_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(user_id_i64(user_id)?)
            .bind(word_id_i64(word_id)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn_err)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn get_or_create_progress(
        &self,
        fresh: &WordProgress,
    ) -> Result<WordProgress, StorageError> {
        sqlx::query(
            r"
            INSERT INTO word_progress (
                user_id, word_id, srs_level, ease_factor, interval_days, next_review_at,
                total_reviews, correct_reviews, last_reviewed_at, created_at, version
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(user_id, word_id) DO NOTHING
            ",
        )
        .bind(user_id_i64(fresh.user_id())?)
        .bind(word_id_i64(fresh.word_id())?)
        .bind(i64::from(fresh.srs_level()))
        .bind(fresh.ease_factor())
        .bind(i64::from(fresh.interval_days()))
        .bind(fresh.next_review_at())
        .bind(i64::from(fresh.total_reviews()))
        .bind(i64::from(fresh.correct_reviews()))
        .bind(fresh.last_reviewed_at())
        .bind(fresh.created_at())
        .bind(to_i64("version", fresh.version())?)
        .execute(&self.pool)
        .await
        .map_err(conn_err)?;

        self.get_progress(fresh.user_id(), fresh.word_id())
            .await?
            .ok_or(StorageError::NotFound)
    }

    async fn due_progress(&self, query: &DueQuery) -> Result<Vec<WordProgress>, StorageError> {
        let sql = format!(
            r"
            SELECT {PROGRESS_COLUMNS}
            FROM word_progress p
            JOIN words w ON w.id = p.word_id
            WHERE p.user_id = ?1
              AND p.srs_level > 0
              AND p.next_review_at IS NOT NULL
              AND p.next_review_at <= ?2
              AND (?3 IS NULL OR w.hsk_level = ?3)
            ORDER BY p.next_review_at ASC, p.ease_factor ASC, p.word_id ASC
            LIMIT ?4
            "
        );
        let rows = sqlx::query(&sql)
            .bind(user_id_i64(query.user_id)?)
            .bind(query.now)
            .bind(query.hsk_level.map(i64::from))
            .bind(i64::from(query.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn_err)?;

        map_rows(&rows)
    }

    async fn mistake_progress(
        &self,
        query: &MistakeQuery,
    ) -> Result<Vec<WordProgress>, StorageError> {
        let sql = format!(
            r"
            SELECT {PROGRESS_COLUMNS}
            FROM word_progress p
            JOIN words w ON w.id = p.word_id
            WHERE p.user_id = ?1
              AND p.total_reviews >= 1
              AND (
                    p.srs_level <= ?2
                    OR CAST(p.correct_reviews AS REAL) / p.total_reviews < ?3
                  )
              AND (?4 IS NULL OR w.hsk_level = ?4)
            ORDER BY p.srs_level ASC, p.total_reviews DESC, p.word_id ASC
            LIMIT ?5
            "
        );
        let rows = sqlx::query(&sql)
            .bind(user_id_i64(query.user_id)?)
            .bind(i64::from(query.max_srs_level))
            .bind(query.accuracy_below)
            .bind(query.hsk_level.map(i64::from))
            .bind(i64::from(query.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn_err)?;

        map_rows(&rows)
    }

    async fn count_due(
        &self,
        user_id: UserId,
        until: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS n
            FROM word_progress
            WHERE user_id = ?1
              AND srs_level > 0
              AND next_review_at IS NOT NULL
              AND next_review_at <= ?2
            ",
        )
        .bind(user_id_i64(user_id)?)
        .bind(until)
        .fetch_one(&self.pool)
        .await
        .map_err(conn_err)?;

        count_u64(row.try_get("n").map_err(ser)?)
    }

    async fn count_scheduled_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS n
            FROM word_progress
            WHERE user_id = ?1
              AND next_review_at IS NOT NULL
              AND next_review_at >= ?2
              AND next_review_at < ?3
            ",
        )
        .bind(user_id_i64(user_id)?)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await
        .map_err(conn_err)?;

        count_u64(row.try_get("n").map_err(ser)?)
    }

    async fn count_by_level(&self, user_id: UserId) -> Result<BTreeMap<u32, u64>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT srs_level, COUNT(*) AS n
            FROM word_progress
            WHERE user_id = ?1
            GROUP BY srs_level
            ",
        )
        .bind(user_id_i64(user_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        let mut levels = BTreeMap::new();
        for row in rows {
            let level: i64 = row.try_get("srs_level").map_err(ser)?;
            let level = u32::try_from(level)
                .map_err(|_| StorageError::Serialization(format!("invalid srs_level: {level}")))?;
            levels.insert(level, count_u64(row.try_get("n").map_err(ser)?)?);
        }
        Ok(levels)
    }

    async fn progress_totals(&self, user_id: UserId) -> Result<ProgressTotals, StorageError> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS words, COALESCE(SUM(total_reviews), 0) AS reviews
            FROM word_progress
            WHERE user_id = ?1
            ",
        )
        .bind(user_id_i64(user_id)?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn_err)?;

        Ok(ProgressTotals {
            words: count_u64(row.try_get("words").map_err(ser)?)?,
            reviews: count_u64(row.try_get("reviews").map_err(ser)?)?,
        })
    }
}
