use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use srs_core::model::{
    PersistedProgress, Quality, ReviewEvent, ReviewEventId, SrsSnapshot, UserId, Word, WordId,
    WordProgress,
};

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn column_u32(row: &SqliteRow, field: &'static str) -> Result<u32, StorageError> {
    to_u32(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

pub(crate) fn user_id_i64(id: UserId) -> Result<i64, StorageError> {
    to_i64("user_id", id.value())
}

pub(crate) fn word_id_i64(id: WordId) -> Result<i64, StorageError> {
    to_i64("word_id", id.value())
}

pub(crate) fn count_u64(v: i64) -> Result<u64, StorageError> {
    to_u64("count", v)
}

/// Columns selected by every progress query, in `map_progress_row` order.
pub(crate) const PROGRESS_COLUMNS: &str = r"
    p.user_id, p.word_id, p.srs_level, p.ease_factor, p.interval_days, p.next_review_at,
    p.total_reviews, p.correct_reviews, p.last_reviewed_at, p.created_at, p.version
";

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<WordProgress, StorageError> {
    let next_review_at: Option<DateTime<Utc>> = row.try_get("next_review_at").map_err(ser)?;
    let last_reviewed_at: Option<DateTime<Utc>> = row.try_get("last_reviewed_at").map_err(ser)?;

    WordProgress::from_persisted(PersistedProgress {
        user_id: UserId::new(to_u64("user_id", row.try_get("user_id").map_err(ser)?)?),
        word_id: WordId::new(to_u64("word_id", row.try_get("word_id").map_err(ser)?)?),
        srs_level: column_u32(row, "srs_level")?,
        ease_factor: row.try_get("ease_factor").map_err(ser)?,
        interval_days: column_u32(row, "interval_days")?,
        next_review_at,
        total_reviews: column_u32(row, "total_reviews")?,
        correct_reviews: column_u32(row, "correct_reviews")?,
        last_reviewed_at,
        created_at: row.try_get("created_at").map_err(ser)?,
        version: to_u64("version", row.try_get("version").map_err(ser)?)?,
    })
    .map_err(ser)
}

pub(crate) fn map_word_row(row: &SqliteRow) -> Result<Word, StorageError> {
    let hsk: i64 = row.try_get("hsk_level").map_err(ser)?;
    let hsk_level = u8::try_from(hsk)
        .map_err(|_| StorageError::Serialization(format!("invalid hsk_level: {hsk}")))?;

    Word::new(
        WordId::new(to_u64("id", row.try_get("id").map_err(ser)?)?),
        row.try_get::<String, _>("hanzi").map_err(ser)?,
        row.try_get::<String, _>("pinyin").map_err(ser)?,
        hsk_level,
    )
    .map_err(ser)
}

pub(crate) fn map_event_row(row: &SqliteRow) -> Result<ReviewEvent, StorageError> {
    let quality = Quality::new(row.try_get::<i64, _>("quality").map_err(ser)?).map_err(ser)?;

    Ok(ReviewEvent {
        id: ReviewEventId::new(to_u64("id", row.try_get("id").map_err(ser)?)?),
        user_id: UserId::new(to_u64("user_id", row.try_get("user_id").map_err(ser)?)?),
        word_id: WordId::new(to_u64("word_id", row.try_get("word_id").map_err(ser)?)?),
        quality,
        before: SrsSnapshot {
            srs_level: column_u32(row, "old_srs_level")?,
            interval_days: column_u32(row, "old_interval_days")?,
            ease_factor: row.try_get("old_ease_factor").map_err(ser)?,
        },
        after: SrsSnapshot {
            srs_level: column_u32(row, "new_srs_level")?,
            interval_days: column_u32(row, "new_interval_days")?,
            ease_factor: row.try_get("new_ease_factor").map_err(ser)?,
        },
        review_time_seconds: column_u32(row, "review_time_seconds")?,
        reviewed_at: row.try_get("reviewed_at").map_err(ser)?,
    })
}
