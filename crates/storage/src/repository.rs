use async_trait::async_trait;
use chrono::{DateTime, Utc};
use srs_core::model::{
    HskLevel, NewReviewEvent, ReviewEvent, ReviewEventId, UserId, Word, WordId, WordProgress,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// The stored row changed since it was read, or the write targets a different row.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── QUERIES ───────────────────────────────────────────────────────────────────
//

/// Words whose review is due: `srs_level > 0 AND next_review_at <= now`.
///
/// Ordered by `next_review_at`, then lowest ease first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DueQuery {
    pub user_id: UserId,
    pub now: DateTime<Utc>,
    pub hsk_level: Option<HskLevel>,
    pub limit: u32,
}

impl DueQuery {
    #[must_use]
    pub fn matches(&self, progress: &WordProgress) -> bool {
        progress.user_id() == self.user_id && progress.srs_level() > 0 && progress.is_due(self.now)
    }
}

/// Words the learner struggles with:
/// `total_reviews >= 1 AND (srs_level <= max_srs_level OR accuracy < accuracy_below)`.
///
/// Ordered by `srs_level` ascending, then most reviewed first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MistakeQuery {
    pub user_id: UserId,
    pub hsk_level: Option<HskLevel>,
    pub limit: u32,
    pub max_srs_level: u32,
    pub accuracy_below: f64,
}

impl MistakeQuery {
    #[must_use]
    pub fn matches(&self, progress: &WordProgress) -> bool {
        progress.user_id() == self.user_id
            && progress.total_reviews() >= 1
            && (progress.srs_level() <= self.max_srs_level
                || progress.accuracy() < self.accuracy_below)
    }
}

/// Sums over every progress row of a learner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressTotals {
    pub words: u64,
    pub reviews: u64,
}

/// Sums over every review event of a learner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewTotals {
    pub total: u64,
    pub correct: u64,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait WordRepository: Send + Sync {
    /// Persist or update a word.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the word cannot be stored.
    async fn upsert_word(&self, word: &Word) -> Result<(), StorageError>;

    /// Fetch a word by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; a missing word is `Ok(None)`.
    async fn get_word(&self, id: WordId) -> Result<Option<Word>, StorageError>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the progress of one learner on one word.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; a missing row is `Ok(None)`.
    async fn get_progress(
        &self,
        user_id: UserId,
        word_id: WordId,
    ) -> Result<Option<WordProgress>, StorageError>;

    /// Insert `fresh` unless a row for the same (user, word) already exists,
    /// and return whichever row is stored afterwards.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be written or read back.
    async fn get_or_create_progress(
        &self,
        fresh: &WordProgress,
    ) -> Result<WordProgress, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn due_progress(&self, query: &DueQuery) -> Result<Vec<WordProgress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn mistake_progress(
        &self,
        query: &MistakeQuery,
    ) -> Result<Vec<WordProgress>, StorageError>;

    /// Count rows with `srs_level > 0` and `next_review_at <= until`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn count_due(&self, user_id: UserId, until: DateTime<Utc>)
    -> Result<u64, StorageError>;

    /// Count rows (any level) with `from <= next_review_at < to`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn count_scheduled_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    /// Row counts keyed by SRS level; levels with no rows are absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn count_by_level(&self, user_id: UserId) -> Result<BTreeMap<u32, u64>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn progress_totals(&self, user_id: UserId) -> Result<ProgressTotals, StorageError>;
}

#[async_trait]
pub trait ReviewEventRepository: Send + Sync {
    /// Events for one (user, word), oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn events_for_word(
        &self,
        user_id: UserId,
        word_id: WordId,
    ) -> Result<Vec<ReviewEvent>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn review_totals(&self, user_id: UserId) -> Result<ReviewTotals, StorageError>;
}

/// Atomic write of a reviewed progress row plus its audit event.
#[async_trait]
pub trait ReviewPersistence: Send + Sync {
    /// Store `progress` and append `event` in one transaction.
    ///
    /// `progress.version()` must equal the stored version; the stored version
    /// becomes `progress.version() + 1`.
    ///
    /// # Errors
    ///
    /// - `StorageError::NotFound` if no row exists for the progress' (user, word)
    /// - `StorageError::Conflict` if the stored version differs or the event
    ///   refers to another (user, word)
    /// - other storage errors on backend failures (nothing is written)
    async fn apply_review(
        &self,
        progress: &WordProgress,
        event: NewReviewEvent,
    ) -> Result<ReviewEvent, StorageError>;
}

/// Read-only view of the learner's study streak, owned by another part of the app.
#[async_trait]
pub trait UserStreakProvider: Send + Sync {
    /// Current streak in days, 0 if the learner has none recorded.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn streak_days(&self, user_id: UserId) -> Result<u32, StorageError>;
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    words: HashMap<WordId, Word>,
    progress: HashMap<(UserId, WordId), WordProgress>,
    events: Vec<ReviewEvent>,
    streaks: HashMap<UserId, u32>,
    next_event_id: u64,
}

impl MemoryState {
    fn hsk_matches(&self, progress: &WordProgress, hsk_level: Option<HskLevel>) -> bool {
        match hsk_level {
            None => true,
            Some(level) => self
                .words
                .get(&progress.word_id())
                .is_some_and(|w| w.hsk_level() == level),
        }
    }

    fn user_progress(&self, user_id: UserId) -> impl Iterator<Item = &WordProgress> {
        self.progress.values().filter(move |p| p.user_id() == user_id)
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// A single mutex guards all tables, so `apply_review` is atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Record a learner's streak.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the state lock is poisoned.
    pub fn set_streak_days(&self, user_id: UserId, days: u32) -> Result<(), StorageError> {
        self.lock()?.streaks.insert(user_id, days);
        Ok(())
    }
}

fn limit_len(limit: u32) -> usize {
    usize::try_from(limit).unwrap_or(usize::MAX)
}

#[async_trait]
impl WordRepository for InMemoryRepository {
    async fn upsert_word(&self, word: &Word) -> Result<(), StorageError> {
        self.lock()?.words.insert(word.id(), word.clone());
        Ok(())
    }

    async fn get_word(&self, id: WordId) -> Result<Option<Word>, StorageError> {
        Ok(self.lock()?.words.get(&id).cloned())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        user_id: UserId,
        word_id: WordId,
    ) -> Result<Option<WordProgress>, StorageError> {
        Ok(self.lock()?.progress.get(&(user_id, word_id)).cloned())
    }

    async fn get_or_create_progress(
        &self,
        fresh: &WordProgress,
    ) -> Result<WordProgress, StorageError> {
        let mut guard = self.lock()?;
        let stored = guard
            .progress
            .entry((fresh.user_id(), fresh.word_id()))
            .or_insert_with(|| fresh.clone());
        Ok(stored.clone())
    }

    async fn due_progress(&self, query: &DueQuery) -> Result<Vec<WordProgress>, StorageError> {
        let guard = self.lock()?;
        let mut due: Vec<WordProgress> = guard
            .user_progress(query.user_id)
            .filter(|p| query.matches(p) && guard.hsk_matches(p, query.hsk_level))
            .cloned()
            .collect();

        due.sort_by(|a, b| {
            a.next_review_at()
                .cmp(&b.next_review_at())
                .then(a.ease_factor().total_cmp(&b.ease_factor()))
                .then(a.word_id().cmp(&b.word_id()))
        });
        due.truncate(limit_len(query.limit));
        Ok(due)
    }

    async fn mistake_progress(
        &self,
        query: &MistakeQuery,
    ) -> Result<Vec<WordProgress>, StorageError> {
        let guard = self.lock()?;
        let mut mistakes: Vec<WordProgress> = guard
            .user_progress(query.user_id)
            .filter(|p| query.matches(p) && guard.hsk_matches(p, query.hsk_level))
            .cloned()
            .collect();

        mistakes.sort_by(|a, b| {
            a.srs_level()
                .cmp(&b.srs_level())
                .then(b.total_reviews().cmp(&a.total_reviews()))
                .then(a.word_id().cmp(&b.word_id()))
        });
        mistakes.truncate(limit_len(query.limit));
        Ok(mistakes)
    }

    async fn count_due(
        &self,
        user_id: UserId,
        until: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let guard = self.lock()?;
        let count = guard
            .user_progress(user_id)
            .filter(|p| p.srs_level() > 0 && p.is_due(until))
            .count();
        Ok(count as u64)
    }

    async fn count_scheduled_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let guard = self.lock()?;
        let count = guard
            .user_progress(user_id)
            .filter(|p| p.next_review_at().is_some_and(|at| from <= at && at < to))
            .count();
        Ok(count as u64)
    }

    async fn count_by_level(&self, user_id: UserId) -> Result<BTreeMap<u32, u64>, StorageError> {
        let guard = self.lock()?;
        let mut levels = BTreeMap::new();
        for p in guard.user_progress(user_id) {
            *levels.entry(p.srs_level()).or_insert(0) += 1;
        }
        Ok(levels)
    }

    async fn progress_totals(&self, user_id: UserId) -> Result<ProgressTotals, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .user_progress(user_id)
            .fold(ProgressTotals::default(), |acc, p| ProgressTotals {
                words: acc.words + 1,
                reviews: acc.reviews + u64::from(p.total_reviews()),
            }))
    }
}

#[async_trait]
impl ReviewEventRepository for InMemoryRepository {
    async fn events_for_word(
        &self,
        user_id: UserId,
        word_id: WordId,
    ) -> Result<Vec<ReviewEvent>, StorageError> {
        let guard = self.lock()?;
        let mut events: Vec<ReviewEvent> = guard
            .events
            .iter()
            .filter(|e| e.user_id == user_id && e.word_id == word_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.reviewed_at.cmp(&b.reviewed_at).then(a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn review_totals(&self, user_id: UserId) -> Result<ReviewTotals, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .events
            .iter()
            .filter(|e| e.user_id == user_id)
            .fold(ReviewTotals::default(), |acc, e| ReviewTotals {
                total: acc.total + 1,
                correct: acc.correct + u64::from(e.is_correct()),
            }))
    }
}

#[async_trait]
impl ReviewPersistence for InMemoryRepository {
    async fn apply_review(
        &self,
        progress: &WordProgress,
        event: NewReviewEvent,
    ) -> Result<ReviewEvent, StorageError> {
        if event.user_id != progress.user_id() || event.word_id != progress.word_id() {
            return Err(StorageError::Conflict);
        }

        let mut guard = self.lock()?;
        let key = (progress.user_id(), progress.word_id());
        let stored = guard.progress.get(&key).ok_or(StorageError::NotFound)?;
        if stored.version() != progress.version() {
            return Err(StorageError::Conflict);
        }

        let mut updated = progress.clone();
        updated.advance_version();
        guard.progress.insert(key, updated);

        guard.next_event_id += 1;
        let event = event.with_id(ReviewEventId::new(guard.next_event_id));
        guard.events.push(event.clone());
        Ok(event)
    }
}

#[async_trait]
impl UserStreakProvider for InMemoryRepository {
    async fn streak_days(&self, user_id: UserId) -> Result<u32, StorageError> {
        Ok(self.lock()?.streaks.get(&user_id).copied().unwrap_or(0))
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub words: Arc<dyn WordRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub review_events: Arc<dyn ReviewEventRepository>,
    pub reviews: Arc<dyn ReviewPersistence>,
    pub streaks: Arc<dyn UserStreakProvider>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_backend(InMemoryRepository::new())
    }

    /// Use one backend value for every repository role.
    #[must_use]
    pub fn from_backend<R>(repo: R) -> Self
    where
        R: WordRepository
            + ProgressRepository
            + ReviewEventRepository
            + ReviewPersistence
            + UserStreakProvider
            + Clone
            + 'static,
    {
        Self {
            words: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            review_events: Arc::new(repo.clone()),
            reviews: Arc::new(repo.clone()),
            streaks: Arc::new(repo),
        }
    }
}
