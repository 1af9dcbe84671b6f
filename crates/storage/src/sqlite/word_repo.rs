use srs_core::model::{Word, WordId};

use super::{
    SqliteRepository, conn_err,
    mapping::{map_word_row, word_id_i64},
};
use crate::repository::{StorageError, WordRepository};

#[async_trait::async_trait]
impl WordRepository for SqliteRepository {
    async fn upsert_word(&self, word: &Word) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO words (id, hanzi, pinyin, hsk_level)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                hanzi = excluded.hanzi,
                pinyin = excluded.pinyin,
                hsk_level = excluded.hsk_level
            ",
        )
        .bind(word_id_i64(word.id())?)
        .bind(word.hanzi())
        .bind(word.pinyin())
        .bind(i64::from(word.hsk_level()))
        .execute(&self.pool)
        .await
        .map_err(conn_err)?;

        Ok(())
    }

    async fn get_word(&self, id: WordId) -> Result<Option<Word>, StorageError> {
        let row = sqlx::query("SELECT id, hanzi, pinyin, hsk_level FROM words WHERE id = ?1")
            .bind(word_id_i64(id)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn_err)?;

        row.as_ref().map(map_word_row).transpose()
    }
}
