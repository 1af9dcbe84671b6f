use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ReviewEventId, UserId, WordId};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors that can occur while building a quality rating.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QualityError {
    #[error("quality rating must be between 0 and 5, got {0}")]
    OutOfRange(i64),
}

//
// ─── QUALITY ──────────────────────────────────────────────────────────────────
//

/// SM-2 recall quality rating (0-5).
///
/// - 5: perfect response
/// - 4: correct after a short hesitation
/// - 3: correct with difficulty
/// - 2: incorrect, but remembered with a hint
/// - 1: incorrect, but recognized the answer
/// - 0: complete blackout
///
/// Ratings of 3 and above count as a successful review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub const MAX: u8 = 5;
    pub const PASS_THRESHOLD: u8 = 3;

    /// Quality recorded for a correct multiple-choice answer.
    pub const CORRECT_ANSWER: Quality = Quality(4);
    /// Quality recorded for an incorrect multiple-choice answer.
    pub const INCORRECT_ANSWER: Quality = Quality(1);

    /// Builds a rating from a raw number.
    ///
    /// # Errors
    ///
    /// Returns `QualityError::OutOfRange` if the value is not in `0..=5`.
    pub fn new(value: i64) -> Result<Self, QualityError> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= Self::MAX)
            .map(Self)
            .ok_or(QualityError::OutOfRange(value))
    }

    /// Maps a right/wrong answer onto the SM-2 scale.
    #[must_use]
    pub fn from_correctness(is_correct: bool) -> Self {
        if is_correct {
            Self::CORRECT_ANSWER
        } else {
            Self::INCORRECT_ANSWER
        }
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_pass(self) -> bool {
        self.0 >= Self::PASS_THRESHOLD
    }
}

impl TryFrom<i64> for Quality {
    type Error = QualityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quality> for u8 {
    fn from(q: Quality) -> Self {
        q.0
    }
}

//
// ─── REVIEW EVENTS ────────────────────────────────────────────────────────────
//

/// Scheduling state captured on either side of a review.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SrsSnapshot {
    pub srs_level: u32,
    pub interval_days: u32,
    pub ease_factor: f64,
}

/// A review that has been computed but not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewReviewEvent {
    pub user_id: UserId,
    pub word_id: WordId,
    pub quality: Quality,
    pub before: SrsSnapshot,
    pub after: SrsSnapshot,
    pub review_time_seconds: u32,
    pub reviewed_at: DateTime<Utc>,
}

impl NewReviewEvent {
    #[must_use]
    pub fn with_id(self, id: ReviewEventId) -> ReviewEvent {
        ReviewEvent {
            id,
            user_id: self.user_id,
            word_id: self.word_id,
            quality: self.quality,
            before: self.before,
            after: self.after,
            review_time_seconds: self.review_time_seconds,
            reviewed_at: self.reviewed_at,
        }
    }
}

/// Immutable audit record of a single review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewEvent {
    pub id: ReviewEventId,
    pub user_id: UserId,
    pub word_id: WordId,
    pub quality: Quality,
    pub before: SrsSnapshot,
    pub after: SrsSnapshot,
    pub review_time_seconds: u32,
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewEvent {
    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.quality.is_pass()
    }
}

//
// ─── REVIEW OUTCOME ──────────────────────────────────────────────────────────
//

/// Output of the SM-2 scheduler for a single review.
///
/// - `next`: level, interval and ease after the review
/// - `next_review_at`: when the word becomes due again
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReviewOutcome {
    pub next: SrsSnapshot,
    pub next_review_at: DateTime<Utc>,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
