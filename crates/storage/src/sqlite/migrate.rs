use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS words (
            id INTEGER PRIMARY KEY,
            hanzi TEXT NOT NULL,
            pinyin TEXT NOT NULL,
            hsk_level INTEGER NOT NULL CHECK (hsk_level BETWEEN 1 AND 9)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS word_progress (
            user_id INTEGER NOT NULL,
            word_id INTEGER NOT NULL,
            srs_level INTEGER NOT NULL CHECK (srs_level >= 0),
            ease_factor REAL NOT NULL,
            interval_days INTEGER NOT NULL CHECK (interval_days >= 0),
            next_review_at TEXT,
            total_reviews INTEGER NOT NULL CHECK (total_reviews >= 0),
            correct_reviews INTEGER NOT NULL
                CHECK (correct_reviews >= 0 AND correct_reviews <= total_reviews),
            last_reviewed_at TEXT,
            created_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, word_id),
            FOREIGN KEY (word_id) REFERENCES words(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS review_events (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            word_id INTEGER NOT NULL,
            quality INTEGER NOT NULL CHECK (quality BETWEEN 0 AND 5),
            old_srs_level INTEGER NOT NULL,
            new_srs_level INTEGER NOT NULL,
            old_interval_days INTEGER NOT NULL,
            new_interval_days INTEGER NOT NULL,
            old_ease_factor REAL NOT NULL,
            new_ease_factor REAL NOT NULL,
            review_time_seconds INTEGER NOT NULL CHECK (review_time_seconds >= 0),
            reviewed_at TEXT NOT NULL,
            FOREIGN KEY (user_id, word_id)
                REFERENCES word_progress(user_id, word_id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS user_streaks (
            user_id INTEGER PRIMARY KEY,
            streak_days INTEGER NOT NULL CHECK (streak_days >= 0)
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_word_progress_user_next_review
            ON word_progress (user_id, next_review_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_word_progress_user_level
            ON word_progress (user_id, srs_level, total_reviews);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_review_events_user_word_reviewed_at
            ON review_events (user_id, word_id, reviewed_at);
    ",
];

/// Applies pending schema versions, each inside its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
