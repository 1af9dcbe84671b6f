use std::sync::Arc;

use serde::{Deserialize, Serialize};
use srs_core::{
    model::{HskLevel, UserId, WordProgress},
    time::Clock,
};
use storage::repository::{DueQuery, MistakeQuery, ProgressRepository};

use crate::error::SrsServiceError;

/// Batch sizes and the mistake thresholds used when none are given.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub review_batch_size: u32,
    pub mistake_batch_size: u32,
    /// Words answered correctly less often than this are mistakes.
    pub mistake_accuracy_threshold: f64,
    /// Words at or below this level with at least one review are mistakes.
    pub mistake_max_level: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            review_batch_size: 10,
            mistake_batch_size: 20,
            mistake_accuracy_threshold: 0.70,
            mistake_max_level: 2,
        }
    }
}

/// Selects the words a learner should study next.
pub struct QueueService {
    clock: Clock,
    config: QueueConfig,
    progress: Arc<dyn ProgressRepository>,
}

impl QueueService {
    #[must_use]
    pub fn new(clock: Clock, progress: Arc<dyn ProgressRepository>) -> Self {
        Self {
            clock,
            config: QueueConfig::default(),
            progress,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Words due for review: level above 0 and scheduled no later than now.
    ///
    /// Ordered by review date, then lowest ease first. `batch_size` defaults
    /// to the configured review batch; a size of zero yields nothing.
    ///
    /// # Errors
    ///
    /// Returns storage errors if the queue cannot be read.
    pub async fn get_srs_batch(
        &self,
        user_id: UserId,
        batch_size: Option<u32>,
        hsk_level: Option<HskLevel>,
    ) -> Result<Vec<WordProgress>, SrsServiceError> {
        let limit = batch_size.unwrap_or(self.config.review_batch_size);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query = DueQuery {
            user_id,
            now: self.clock.now(),
            hsk_level,
            limit,
        };
        let batch = self.progress.due_progress(&query).await?;
        tracing::debug!(user = %user_id, ?hsk_level, count = batch.len(), "built review batch");
        Ok(batch)
    }

    /// Words the learner struggles with, weakest first.
    ///
    /// A word qualifies once reviewed if its level is low or its accuracy
    /// is below the configured threshold, regardless of due date.
    ///
    /// # Errors
    ///
    /// Returns storage errors if the queue cannot be read.
    pub async fn get_mistakes_batch(
        &self,
        user_id: UserId,
        batch_size: Option<u32>,
        hsk_level: Option<HskLevel>,
    ) -> Result<Vec<WordProgress>, SrsServiceError> {
        let limit = batch_size.unwrap_or(self.config.mistake_batch_size);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query = MistakeQuery {
            user_id,
            hsk_level,
            limit,
            max_srs_level: self.config.mistake_max_level,
            accuracy_below: self.config.mistake_accuracy_threshold,
        };
        let batch = self.progress.mistake_progress(&query).await?;
        tracing::debug!(user = %user_id, ?hsk_level, count = batch.len(), "built mistakes batch");
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use srs_core::model::{PersistedProgress, Word, WordId};
    use srs_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, WordRepository};

    const USER: UserId = UserId::new(3);

    struct Row {
        word: u64,
        hsk: u8,
        level: u32,
        ease: f64,
        next_in_hours: Option<i64>,
        total: u32,
        correct: u32,
    }

    async fn seed(repo: &InMemoryRepository, rows: &[Row]) {
        for row in rows {
            let word = Word::new(WordId::new(row.word), "词", "cí", row.hsk).unwrap();
            repo.upsert_word(&word).await.unwrap();
            let progress = WordProgress::from_persisted(PersistedProgress {
                user_id: USER,
                word_id: WordId::new(row.word),
                srs_level: row.level,
                ease_factor: row.ease,
                interval_days: row.level,
                next_review_at: row.next_in_hours.map(|h| fixed_now() + Duration::hours(h)),
                total_reviews: row.total,
                correct_reviews: row.correct,
                last_reviewed_at: None,
                created_at: fixed_now() - Duration::days(30),
                version: 0,
            })
            .unwrap();
            repo.get_or_create_progress(&progress).await.unwrap();
        }
    }

    fn service(repo: &InMemoryRepository) -> QueueService {
        QueueService::new(Clock::fixed(fixed_now()), Arc::new(repo.clone()))
    }

    fn ids(batch: &[WordProgress]) -> Vec<u64> {
        batch.iter().map(|p| p.word_id().value()).collect()
    }

    #[tokio::test]
    async fn srs_batch_excludes_new_and_future_words() {
        let repo = InMemoryRepository::new();
        seed(
            &repo,
            &[
                Row { word: 1, hsk: 1, level: 3, ease: 2.5, next_in_hours: Some(-1), total: 3, correct: 3 },
                Row { word: 2, hsk: 1, level: 0, ease: 2.3, next_in_hours: Some(-10), total: 1, correct: 0 },
                Row { word: 3, hsk: 1, level: 2, ease: 2.5, next_in_hours: Some(5), total: 2, correct: 2 },
                Row { word: 4, hsk: 1, level: 0, ease: 2.5, next_in_hours: None, total: 0, correct: 0 },
                Row { word: 5, hsk: 2, level: 1, ease: 1.9, next_in_hours: Some(-1), total: 1, correct: 1 },
                Row { word: 6, hsk: 1, level: 2, ease: 2.5, next_in_hours: Some(-30), total: 2, correct: 2 },
            ],
        )
        .await;

        let batch = service(&repo).get_srs_batch(USER, None, None).await.unwrap();
        assert_eq!(ids(&batch), vec![6, 5, 1]);
        assert!(batch.iter().all(|p| p.srs_level() > 0 && p.is_due(fixed_now())));
    }

    #[tokio::test]
    async fn srs_batch_respects_size_and_hsk_filter() {
        let repo = InMemoryRepository::new();
        seed(
            &repo,
            &[
                Row { word: 1, hsk: 1, level: 1, ease: 2.5, next_in_hours: Some(-3), total: 1, correct: 1 },
                Row { word: 2, hsk: 2, level: 1, ease: 2.5, next_in_hours: Some(-2), total: 1, correct: 1 },
                Row { word: 3, hsk: 1, level: 1, ease: 2.5, next_in_hours: Some(-1), total: 1, correct: 1 },
            ],
        )
        .await;
        let service = service(&repo);

        let one = service.get_srs_batch(USER, Some(1), None).await.unwrap();
        assert_eq!(ids(&one), vec![1]);

        let hsk1 = service.get_srs_batch(USER, None, Some(1)).await.unwrap();
        assert_eq!(ids(&hsk1), vec![1, 3]);

        assert!(service.get_srs_batch(USER, Some(0), None).await.unwrap().is_empty());
        assert!(
            service
                .get_srs_batch(UserId::new(99), None, None)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn mistakes_batch_orders_weakest_first() {
        let repo = InMemoryRepository::new();
        seed(
            &repo,
            &[
                // level 1, 33% accuracy
                Row { word: 1, hsk: 1, level: 1, ease: 2.5, next_in_hours: Some(48), total: 3, correct: 1 },
                // high level but 50% accuracy
                Row { word: 2, hsk: 1, level: 6, ease: 2.5, next_in_hours: Some(48), total: 10, correct: 5 },
                // high level, 90% accuracy
                Row { word: 3, hsk: 1, level: 6, ease: 2.5, next_in_hours: Some(48), total: 10, correct: 9 },
                // never reviewed
                Row { word: 4, hsk: 1, level: 0, ease: 2.5, next_in_hours: None, total: 0, correct: 0 },
                // level 0 after lapses
                Row { word: 5, hsk: 2, level: 0, ease: 2.1, next_in_hours: Some(24), total: 4, correct: 2 },
                // level 2 with good accuracy still counts
                Row { word: 6, hsk: 1, level: 2, ease: 2.6, next_in_hours: Some(48), total: 2, correct: 2 },
            ],
        )
        .await;
        let service = service(&repo);

        let batch = service.get_mistakes_batch(USER, None, None).await.unwrap();
        assert_eq!(ids(&batch), vec![5, 1, 6, 2]);

        let hsk1 = service.get_mistakes_batch(USER, Some(2), Some(1)).await.unwrap();
        assert_eq!(ids(&hsk1), vec![1, 6]);
    }

    #[test]
    fn default_config_matches_documented_sizes() {
        let config = QueueConfig::default();
        assert_eq!(config.review_batch_size, 10);
        assert_eq!(config.mistake_batch_size, 20);
        assert!((config.mistake_accuracy_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.mistake_max_level, 2);
    }
}
