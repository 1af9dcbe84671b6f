use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    INITIAL_EASE_FACTOR, MIN_EASE_FACTOR, NewReviewEvent, Quality, ReviewOutcome, SrsSnapshot,
    UserId, WordId, WordProgress,
};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("ease bounds must satisfy 1.3 <= min ease <= initial ease, got min {min}, initial {initial}")]
    InvalidEaseBounds { min: f64, initial: f64 },
    #[error("next review date overflows after {interval_days} days")]
    IntervalOverflow { interval_days: u32 },
}

//
// ─── PARAMETERS ────────────────────────────────────────────────────────────────
//

/// Tunable constants of the SM-2 variant.
///
/// The defaults reproduce classic SuperMemo-2: first interval 1 day, second
/// interval 6 days, ease starting at 2.5 with a floor of 1.3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sm2Params {
    pub initial_ease: f64,
    pub min_ease: f64,
    /// Ease subtracted on a failed review.
    pub failure_ease_penalty: f64,
    pub first_interval_days: u32,
    pub second_interval_days: u32,
    /// Interval given to a word after a failed review.
    pub relearn_interval_days: u32,
}

impl Default for Sm2Params {
    fn default() -> Self {
        Self {
            initial_ease: INITIAL_EASE_FACTOR,
            min_ease: MIN_EASE_FACTOR,
            failure_ease_penalty: 0.2,
            first_interval_days: 1,
            second_interval_days: 6,
            relearn_interval_days: 1,
        }
    }
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// Result of scheduling a review: the new state and the audit event to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedReview {
    pub outcome: ReviewOutcome,
    pub event: NewReviewEvent,
}

/// Pure SM-2 scheduler. It never touches storage; callers persist the result.
///
/// # Examples
///
/// ```
/// # use srs_core::model::{Quality, UserId, WordId, WordProgress};
/// # use srs_core::scheduler::Sm2Scheduler;
/// # use srs_core::time::fixed_now;
/// let scheduler = Sm2Scheduler::new();
/// let mut progress = WordProgress::new(UserId::new(1), WordId::new(1), fixed_now());
///
/// let quality = Quality::new(4)?;
/// let applied = scheduler.apply_review(&progress, quality, fixed_now(), 5)?;
/// progress.apply_review(quality, &applied.outcome, fixed_now());
///
/// assert_eq!(progress.srs_level(), 1);
/// assert_eq!(progress.interval_days(), 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Sm2Scheduler {
    params: Sm2Params,
}

impl Sm2Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a scheduler with custom parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEaseBounds` if `min_ease` is below [`MIN_EASE_FACTOR`] (stored
    /// progress never goes lower) or exceeds `initial_ease`.
    pub fn with_params(params: Sm2Params) -> Result<Self, SchedulerError> {
        if !(params.min_ease >= MIN_EASE_FACTOR
            && params.initial_ease.is_finite()
            && params.min_ease <= params.initial_ease)
        {
            return Err(SchedulerError::InvalidEaseBounds {
                min: params.min_ease,
                initial: params.initial_ease,
            });
        }
        Ok(Self { params })
    }

    #[must_use]
    pub fn params(&self) -> &Sm2Params {
        &self.params
    }

    /// Unreviewed progress starting at the configured initial ease.
    #[must_use]
    pub fn fresh_progress(
        &self,
        user_id: UserId,
        word_id: WordId,
        created_at: DateTime<Utc>,
    ) -> WordProgress {
        WordProgress::with_initial_ease(user_id, word_id, created_at, self.params.initial_ease)
    }

    /// SM-2 ease update: `EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))`, floored.
    #[must_use]
    pub fn next_ease(&self, ease: f64, quality: Quality) -> f64 {
        let miss = f64::from(Quality::MAX - quality.value());
        let delta = 0.1 - miss * (0.08 + miss * 0.02);
        (ease + delta).max(self.params.min_ease)
    }

    /// Compute the state that follows `progress` after a review graded `quality`.
    ///
    /// Failed reviews (quality < 3) reset the level to 0, schedule the word for
    /// tomorrow and lower the ease by the failure penalty. Passing reviews raise
    /// the level and grow the interval: 1 day, 6 days, then the previous
    /// interval times the updated ease.
    ///
    /// # Errors
    ///
    /// Returns `IntervalOverflow` if the next review date cannot be represented.
    pub fn apply_review(
        &self,
        progress: &WordProgress,
        quality: Quality,
        reviewed_at: DateTime<Utc>,
        review_time_seconds: u32,
    ) -> Result<AppliedReview, SchedulerError> {
        let before = progress.snapshot();

        let next = if quality.is_pass() {
            let srs_level = before.srs_level.saturating_add(1);
            let ease_factor = self.next_ease(before.ease_factor, quality);
            let interval_days = match srs_level {
                1 => self.params.first_interval_days,
                2 => self.params.second_interval_days,
                _ => scale_interval(before.interval_days, ease_factor),
            };
            SrsSnapshot {
                srs_level,
                interval_days,
                ease_factor,
            }
        } else {
            SrsSnapshot {
                srs_level: 0,
                interval_days: self.params.relearn_interval_days,
                ease_factor: (before.ease_factor - self.params.failure_ease_penalty)
                    .max(self.params.min_ease),
            }
        };

        let next_review_at = reviewed_at
            .checked_add_signed(Duration::days(i64::from(next.interval_days)))
            .ok_or(SchedulerError::IntervalOverflow {
                interval_days: next.interval_days,
            })?;

        Ok(AppliedReview {
            outcome: ReviewOutcome {
                next,
                next_review_at,
            },
            event: NewReviewEvent {
                user_id: progress.user_id(),
                word_id: progress.word_id(),
                quality,
                before,
                after: next,
                review_time_seconds,
                reviewed_at,
            },
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_interval(interval_days: u32, ease: f64) -> u32 {
    // Halves go to the even neighbour: 77 * 2.5 schedules 192 days.
    let scaled = (f64::from(interval_days) * ease).round_ties_even();
    if scaled >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        scaled as u32
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PersistedProgress;
    use crate::time::fixed_now;

    fn q(value: i64) -> Quality {
        Quality::new(value).unwrap()
    }

    fn fresh() -> WordProgress {
        WordProgress::new(UserId::new(1), WordId::new(1), fixed_now())
    }

    fn at_level(srs_level: u32, interval_days: u32, ease_factor: f64) -> WordProgress {
        WordProgress::from_persisted(PersistedProgress {
            user_id: UserId::new(1),
            word_id: WordId::new(1),
            srs_level,
            ease_factor,
            interval_days,
            next_review_at: Some(fixed_now()),
            total_reviews: srs_level,
            correct_reviews: srs_level,
            last_reviewed_at: None,
            created_at: fixed_now(),
            version: 0,
        })
        .unwrap()
    }

    fn review(s: &Sm2Scheduler, p: &mut WordProgress, quality: Quality) -> AppliedReview {
        let applied = s.apply_review(p, quality, fixed_now(), 3).unwrap();
        p.apply_review(quality, &applied.outcome, fixed_now());
        applied
    }

    #[test]
    fn ease_delta_matches_sm2_table() {
        let s = Sm2Scheduler::new();
        assert!((s.next_ease(2.5, q(5)) - 2.6).abs() < 1e-9);
        assert!((s.next_ease(2.5, q(4)) - 2.5).abs() < 1e-9);
        assert!((s.next_ease(2.5, q(3)) - 2.36).abs() < 1e-9);
    }

    #[test]
    fn first_success_schedules_one_day() {
        let s = Sm2Scheduler::new();
        let mut p = fresh();
        let applied = review(&s, &mut p, q(4));

        assert_eq!(p.srs_level(), 1);
        assert_eq!(p.interval_days(), 1);
        assert!((p.ease_factor() - 2.5).abs() < 1e-9);
        assert_eq!(p.next_review_at(), Some(fixed_now() + Duration::days(1)));
        assert_eq!(applied.event.before.srs_level, 0);
        assert_eq!(applied.event.after.srs_level, 1);
    }

    #[test]
    fn three_perfect_reviews_follow_one_six_then_scaled() {
        let s = Sm2Scheduler::new();
        let mut p = fresh();
        let mut levels = Vec::new();
        let mut intervals = Vec::new();

        for _ in 0..3 {
            review(&s, &mut p, q(5));
            levels.push(p.srs_level());
            intervals.push(p.interval_days());
        }

        assert_eq!(levels, vec![1, 2, 3]);
        // ease after three q=5 reviews: 2.5 + 3 * 0.1 = 2.8; round(6 * 2.8) = 17
        let expected = (6.0 * p.ease_factor()).round() as u32;
        assert_eq!(intervals, vec![1, 6, expected]);
        assert_eq!(expected, 17);
    }

    #[test]
    fn failure_resets_level_and_interval() {
        let s = Sm2Scheduler::new();
        for quality in 0..=2 {
            let mut p = at_level(6, 120, 2.2);
            let applied = review(&s, &mut p, q(quality));

            assert_eq!(p.srs_level(), 0);
            assert_eq!(p.interval_days(), 1);
            assert!((p.ease_factor() - 2.0).abs() < 1e-9);
            assert_eq!(p.next_review_at(), Some(fixed_now() + Duration::days(1)));
            assert_eq!(applied.event.before.interval_days, 120);
        }
    }

    #[test]
    fn ease_never_drops_below_floor() {
        let s = Sm2Scheduler::new();
        let mut p = fresh();
        for quality in [3, 0, 3, 1, 3, 2, 0, 0, 3, 3, 3, 0, 3] {
            review(&s, &mut p, q(quality));
            assert!(p.ease_factor() >= MIN_EASE_FACTOR);
        }
        assert!((p.ease_factor() - MIN_EASE_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn pass_then_fail_scenario() {
        let s = Sm2Scheduler::new();
        let mut p = fresh();

        review(&s, &mut p, q(4));
        assert_eq!((p.srs_level(), p.interval_days()), (1, 1));
        assert_eq!((p.total_reviews(), p.correct_reviews()), (1, 1));

        review(&s, &mut p, q(2));
        assert_eq!((p.srs_level(), p.interval_days()), (0, 1));
        assert!((p.ease_factor() - 2.3).abs() < 1e-9);
        assert_eq!((p.total_reviews(), p.correct_reviews()), (2, 1));
    }

    #[test]
    fn level_three_uses_previous_interval_and_new_ease() {
        let s = Sm2Scheduler::new();
        let mut p = at_level(2, 6, 2.5);
        review(&s, &mut p, q(3));

        // ease 2.5 -> 2.36, interval round(6 * 2.36) = 14
        assert_eq!(p.srs_level(), 3);
        assert_eq!(p.interval_days(), 14);
    }

    #[test]
    fn event_records_quality_and_review_time() {
        let s = Sm2Scheduler::new();
        let p = fresh();
        let applied = s.apply_review(&p, q(5), fixed_now(), 42).unwrap();

        assert_eq!(applied.event.quality, q(5));
        assert_eq!(applied.event.review_time_seconds, 42);
        assert_eq!(applied.event.reviewed_at, fixed_now());
        assert_eq!(applied.event.user_id, p.user_id());
    }

    #[test]
    fn huge_interval_overflows_cleanly() {
        let s = Sm2Scheduler::new();
        let p = at_level(10, u32::MAX, 2.5);
        let err = s.apply_review(&p, q(5), fixed_now(), 0).unwrap_err();
        assert!(matches!(err, SchedulerError::IntervalOverflow { .. }));
    }

    #[test]
    fn half_day_intervals_round_to_even() {
        let s = Sm2Scheduler::new();
        let mut p = fresh();
        let mut trail = Vec::new();
        for quality in [0, 4, 4, 4, 4, 5, 5] {
            review(&s, &mut p, q(quality));
            trail.push(p.interval_days());
        }

        // last step: ease 2.5, round(77 * 2.5 = 192.5) = 192
        assert_eq!(trail, vec![1, 1, 6, 14, 32, 77, 192]);
        assert!((p.ease_factor() - 2.5).abs() < 1e-9);
        assert_eq!(scale_interval(3, 2.5), 8);
        assert_eq!(scale_interval(5, 2.5), 12);
    }

    #[test]
    fn with_params_rejects_floor_below_stored_minimum() {
        let params = Sm2Params {
            min_ease: 1.0,
            ..Sm2Params::default()
        };
        assert!(matches!(
            Sm2Scheduler::with_params(params),
            Err(SchedulerError::InvalidEaseBounds { .. })
        ));
    }

    #[test]
    fn event_snapshot_matches_progress_at_custom_floor() {
        let s = Sm2Scheduler::with_params(Sm2Params {
            min_ease: 1.8,
            ..Sm2Params::default()
        })
        .unwrap();
        let mut p = fresh();
        for _ in 0..8 {
            let applied = review(&s, &mut p, q(0));
            assert_eq!(applied.event.after, p.snapshot());
        }
        assert!((p.ease_factor() - 1.8).abs() < 1e-9);
    }

    #[test]
    fn fresh_progress_uses_configured_initial_ease() {
        let s = Sm2Scheduler::with_params(Sm2Params {
            initial_ease: 2.0,
            ..Sm2Params::default()
        })
        .unwrap();
        let p = s.fresh_progress(UserId::new(1), WordId::new(2), fixed_now());
        assert!((p.ease_factor() - 2.0).abs() < 1e-9);
        assert_eq!(p.srs_level(), 0);
        assert_eq!(p.next_review_at(), None);

        let default = Sm2Scheduler::new().fresh_progress(UserId::new(1), WordId::new(2), fixed_now());
        assert!((default.ease_factor() - INITIAL_EASE_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn with_params_rejects_inverted_bounds() {
        let params = Sm2Params {
            min_ease: 3.0,
            ..Sm2Params::default()
        };
        assert!(matches!(
            Sm2Scheduler::with_params(params),
            Err(SchedulerError::InvalidEaseBounds { .. })
        ));
    }
}
