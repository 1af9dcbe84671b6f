use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use srs_core::{
    model::{Quality, ReviewEvent, UserId, Word, WordId, WordProgress},
    scheduler::Sm2Scheduler,
    time::Clock,
};
use storage::repository::{
    ProgressRepository, ReviewEventRepository, ReviewPersistence, StorageError, WordRepository,
};

use crate::error::SrsServiceError;

/// Progress after a persisted review together with the audit event written for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewedWord {
    pub progress: WordProgress,
    pub event: ReviewEvent,
}

/// Applies SM-2 reviews and owns the lifecycle of progress records.
pub struct ReviewService {
    clock: Clock,
    scheduler: Sm2Scheduler,
    words: Arc<dyn WordRepository>,
    progress: Arc<dyn ProgressRepository>,
    events: Arc<dyn ReviewEventRepository>,
    reviews: Arc<dyn ReviewPersistence>,
}

impl ReviewService {
    #[must_use]
    pub fn new(
        clock: Clock,
        words: Arc<dyn WordRepository>,
        progress: Arc<dyn ProgressRepository>,
        events: Arc<dyn ReviewEventRepository>,
        reviews: Arc<dyn ReviewPersistence>,
    ) -> Self {
        Self {
            clock,
            scheduler: Sm2Scheduler::new(),
            words,
            progress,
            events,
            reviews,
        }
    }

    /// Replace the default SM-2 scheduler.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Sm2Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Store a vocabulary item so progress can be created for it.
    ///
    /// # Errors
    ///
    /// Returns storage errors if the word cannot be written.
    pub async fn register_word(&self, word: &Word) -> Result<(), SrsServiceError> {
        self.words.upsert_word(word).await?;
        tracing::debug!(word = %word.id(), hsk_level = word.hsk_level(), "registered word");
        Ok(())
    }

    /// Get-or-create the progress record of `user_id` on `word_id`.
    ///
    /// An existing record is returned unchanged; otherwise a fresh one
    /// (level 0, the scheduler's initial ease, interval 0, unscheduled) is stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the word is unknown, or other storage errors.
    pub async fn initialize_word_progress(
        &self,
        user_id: UserId,
        word_id: WordId,
    ) -> Result<WordProgress, SrsServiceError> {
        if self.words.get_word(word_id).await?.is_none() {
            return Err(StorageError::NotFound.into());
        }

        let fresh = self.scheduler.fresh_progress(user_id, word_id, self.now());
        let progress = self.progress.get_or_create_progress(&fresh).await?;
        if progress == fresh {
            tracing::info!(user = %user_id, word = %word_id, "initialized word progress");
        }
        Ok(progress)
    }

    /// Apply one review to `progress` and persist it together with its audit event.
    ///
    /// `progress` must be the stored state (its version is checked). On success
    /// it holds the new state; if anything fails it is left untouched.
    ///
    /// # Errors
    ///
    /// - `Scheduler` if the next review date cannot be represented
    /// - `Storage(Conflict)` if the row changed since it was loaded
    /// - other storage errors if persistence fails
    pub async fn update_srs(
        &self,
        progress: &mut WordProgress,
        quality: Quality,
        review_time_seconds: u32,
    ) -> Result<ReviewEvent, SrsServiceError> {
        let reviewed_at = self.now();
        let applied =
            self.scheduler
                .apply_review(progress, quality, reviewed_at, review_time_seconds)?;

        let mut next = progress.clone();
        next.apply_review(quality, &applied.outcome, reviewed_at);

        let event = match self.reviews.apply_review(&next, applied.event).await {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(
                    user = %progress.user_id(),
                    word = %progress.word_id(),
                    error = %err,
                    "failed to persist review"
                );
                return Err(err.into());
            }
        };

        next.advance_version();
        *progress = next;

        tracing::debug!(
            user = %progress.user_id(),
            word = %progress.word_id(),
            quality = quality.value(),
            srs_level = progress.srs_level(),
            interval_days = progress.interval_days(),
            ease_factor = progress.ease_factor(),
            "applied review"
        );
        Ok(event)
    }

    /// Load the stored progress, validate the raw quality and apply the review.
    ///
    /// # Errors
    ///
    /// - `Quality` if `quality` is outside `0..=5`
    /// - `Storage(NotFound)` if the word was never initialized for the user
    /// - anything `update_srs` returns
    pub async fn update_srs_by_word(
        &self,
        user_id: UserId,
        word_id: WordId,
        quality: i64,
        review_time_seconds: u32,
    ) -> Result<ReviewedWord, SrsServiceError> {
        let quality = Quality::new(quality)?;
        let mut progress = self
            .progress
            .get_progress(user_id, word_id)
            .await?
            .ok_or(StorageError::NotFound)?;

        let event = self
            .update_srs(&mut progress, quality, review_time_seconds)
            .await?;
        Ok(ReviewedWord { progress, event })
    }

    /// Grade a right/wrong answer (4 or 1) for a word the user is studying.
    ///
    /// Returns `None` without touching storage if the user has no progress on the word.
    ///
    /// # Errors
    ///
    /// Propagates scheduler and storage errors from `update_srs`.
    pub async fn record_answer(
        &self,
        user_id: UserId,
        word_id: WordId,
        is_correct: bool,
        review_time_seconds: u32,
    ) -> Result<Option<ReviewedWord>, SrsServiceError> {
        let Some(mut progress) = self.progress.get_progress(user_id, word_id).await? else {
            tracing::debug!(user = %user_id, word = %word_id, "answer for untracked word ignored");
            return Ok(None);
        };

        let quality = Quality::from_correctness(is_correct);
        let event = self
            .update_srs(&mut progress, quality, review_time_seconds)
            .await?;
        Ok(Some(ReviewedWord { progress, event }))
    }

    /// Review events for one word, oldest first.
    ///
    /// # Errors
    ///
    /// Returns storage errors if the events cannot be read.
    pub async fn review_history(
        &self,
        user_id: UserId,
        word_id: WordId,
    ) -> Result<Vec<ReviewEvent>, SrsServiceError> {
        Ok(self.events.events_for_word(user_id, word_id).await?)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
