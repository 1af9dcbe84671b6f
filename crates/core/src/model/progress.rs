use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::ids::{UserId, WordId};
use crate::model::review::{Quality, ReviewOutcome, SrsSnapshot};

/// Ease factor assigned to a freshly introduced word.
pub const INITIAL_EASE_FACTOR: f64 = 2.5;
/// Lower bound the ease factor can never drop below.
pub const MIN_EASE_FACTOR: f64 = 1.3;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProgressError {
    #[error("invalid persisted progress: {0}")]
    InvalidPersistedState(String),
}

/// Raw column values for a stored progress row.
///
/// Storage adapters fill this in and hand it to [`WordProgress::from_persisted`],
/// which checks the invariants before producing a domain value.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedProgress {
    pub user_id: UserId,
    pub word_id: WordId,
    pub srs_level: u32,
    pub ease_factor: f64,
    pub interval_days: u32,
    pub next_review_at: Option<DateTime<Utc>>,
    pub total_reviews: u32,
    pub correct_reviews: u32,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

/// Scheduling state of one word for one learner.
///
/// Only [`WordProgress::apply_review`] moves the SM-2 fields forward; storage
/// bumps `version` each time it persists a review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordProgress {
    user_id: UserId,
    word_id: WordId,
    srs_level: u32,
    ease_factor: f64,
    interval_days: u32,
    next_review_at: Option<DateTime<Utc>>,
    total_reviews: u32,
    correct_reviews: u32,
    last_reviewed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    version: u64,
}

impl WordProgress {
    /// Fresh, never-reviewed progress for a word that was just introduced.
    #[must_use]
    pub fn new(user_id: UserId, word_id: WordId, created_at: DateTime<Utc>) -> Self {
        Self::with_initial_ease(user_id, word_id, created_at, INITIAL_EASE_FACTOR)
    }

    /// Fresh progress starting at `initial_ease`, clamped to [`MIN_EASE_FACTOR`].
    #[must_use]
    pub fn with_initial_ease(
        user_id: UserId,
        word_id: WordId,
        created_at: DateTime<Utc>,
        initial_ease: f64,
    ) -> Self {
        Self {
            user_id,
            word_id,
            srs_level: 0,
            ease_factor: initial_ease.max(MIN_EASE_FACTOR),
            interval_days: 0,
            next_review_at: None,
            total_reviews: 0,
            correct_reviews: 0,
            last_reviewed_at: None,
            created_at,
            version: 0,
        }
    }

    /// Rehydrate a stored row.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidPersistedState` if the ease factor is below
    /// the floor (or not finite) or if more correct reviews than reviews are recorded.
    pub fn from_persisted(row: PersistedProgress) -> Result<Self, ProgressError> {
        if !row.ease_factor.is_finite() || row.ease_factor < MIN_EASE_FACTOR {
            return Err(ProgressError::InvalidPersistedState(format!(
                "ease factor {} below {MIN_EASE_FACTOR}",
                row.ease_factor
            )));
        }
        if row.correct_reviews > row.total_reviews {
            return Err(ProgressError::InvalidPersistedState(format!(
                "correct_reviews {} exceeds total_reviews {}",
                row.correct_reviews, row.total_reviews
            )));
        }

        Ok(Self {
            user_id: row.user_id,
            word_id: row.word_id,
            srs_level: row.srs_level,
            ease_factor: row.ease_factor,
            interval_days: row.interval_days,
            next_review_at: row.next_review_at,
            total_reviews: row.total_reviews,
            correct_reviews: row.correct_reviews,
            last_reviewed_at: row.last_reviewed_at,
            created_at: row.created_at,
            version: row.version,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn word_id(&self) -> WordId {
        self.word_id
    }

    #[must_use]
    pub fn srs_level(&self) -> u32 {
        self.srs_level
    }

    #[must_use]
    pub fn ease_factor(&self) -> f64 {
        self.ease_factor
    }

    #[must_use]
    pub fn interval_days(&self) -> u32 {
        self.interval_days
    }

    #[must_use]
    pub fn next_review_at(&self) -> Option<DateTime<Utc>> {
        self.next_review_at
    }

    #[must_use]
    pub fn total_reviews(&self) -> u32 {
        self.total_reviews
    }

    #[must_use]
    pub fn correct_reviews(&self) -> u32 {
        self.correct_reviews
    }

    #[must_use]
    pub fn last_reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.last_reviewed_at
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Optimistic concurrency token; matches the stored row when freshly loaded.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Share of reviews answered with a passing quality, 0.0 when never reviewed.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.total_reviews == 0 {
            0.0
        } else {
            f64::from(self.correct_reviews) / f64::from(self.total_reviews)
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SrsSnapshot {
        SrsSnapshot {
            srs_level: self.srs_level,
            interval_days: self.interval_days,
            ease_factor: self.ease_factor,
        }
    }

    /// Due means scheduled and past its review time. Unscheduled words are never due.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at.is_some_and(|at| at <= now)
    }

    /// Move the SM-2 state to `outcome` and update the review counters.
    pub fn apply_review(
        &mut self,
        quality: Quality,
        outcome: &ReviewOutcome,
        reviewed_at: DateTime<Utc>,
    ) {
        self.srs_level = outcome.next.srs_level;
        self.interval_days = outcome.next.interval_days;
        self.ease_factor = outcome.next.ease_factor.max(MIN_EASE_FACTOR);
        self.next_review_at = Some(outcome.next_review_at);

        self.total_reviews = self.total_reviews.saturating_add(1);
        if quality.is_pass() {
            self.correct_reviews = self.correct_reviews.saturating_add(1);
        }
        self.last_reviewed_at = Some(reviewed_at);
    }

    /// Record that storage accepted a write at the current version.
    pub fn advance_version(&mut self) {
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn persisted() -> PersistedProgress {
        PersistedProgress {
            user_id: UserId::new(1),
            word_id: WordId::new(2),
            srs_level: 3,
            ease_factor: 2.36,
            interval_days: 15,
            next_review_at: Some(fixed_now()),
            total_reviews: 4,
            correct_reviews: 3,
            last_reviewed_at: Some(fixed_now() - Duration::days(15)),
            created_at: fixed_now() - Duration::days(30),
            version: 4,
        }
    }

    #[test]
    fn new_progress_has_defaults() {
        let p = WordProgress::new(UserId::new(1), WordId::new(2), fixed_now());
        assert_eq!(p.srs_level(), 0);
        assert!((p.ease_factor() - 2.5).abs() < f64::EPSILON);
        assert_eq!(p.interval_days(), 0);
        assert_eq!(p.next_review_at(), None);
        assert_eq!(p.total_reviews(), 0);
        assert_eq!(p.version(), 0);
        assert!(!p.is_due(fixed_now()));
    }

    #[test]
    fn accuracy_is_zero_without_reviews() {
        let p = WordProgress::new(UserId::new(1), WordId::new(2), fixed_now());
        assert_eq!(p.accuracy(), 0.0);
    }

    #[test]
    fn accuracy_is_ratio_of_correct_reviews() {
        let p = WordProgress::from_persisted(persisted()).unwrap();
        assert!((p.accuracy() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn from_persisted_rejects_low_ease() {
        let mut row = persisted();
        row.ease_factor = 1.1;
        assert!(matches!(
            WordProgress::from_persisted(row),
            Err(ProgressError::InvalidPersistedState(_))
        ));
    }

    #[test]
    fn from_persisted_rejects_more_correct_than_total() {
        let mut row = persisted();
        row.correct_reviews = 5;
        assert!(WordProgress::from_persisted(row).is_err());
    }

    #[test]
    fn apply_review_counts_only_passing_answers() {
        let mut p = WordProgress::new(UserId::new(1), WordId::new(2), fixed_now());
        let outcome = ReviewOutcome {
            next: SrsSnapshot {
                srs_level: 0,
                interval_days: 1,
                ease_factor: 2.3,
            },
            next_review_at: fixed_now() + Duration::days(1),
        };
        p.apply_review(Quality::new(1).unwrap(), &outcome, fixed_now());

        assert_eq!(p.total_reviews(), 1);
        assert_eq!(p.correct_reviews(), 0);
        assert_eq!(p.last_reviewed_at(), Some(fixed_now()));
        assert!(p.is_due(fixed_now() + Duration::days(1)));
    }

    #[test]
    fn due_includes_exact_review_time() {
        let p = WordProgress::from_persisted(persisted()).unwrap();
        assert!(p.is_due(fixed_now()));
        assert!(!p.is_due(fixed_now() - Duration::seconds(1)));
    }
}
