use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use srs_core::{
    model::{
        UserId,
        stats::{
            DueCounts, MASTERED_LEVEL, MAX_REPORTED_LEVEL, SrsStats, UPCOMING_DAYS,
            UpcomingReviews, ratio, round_to,
        },
    },
    time::{Clock, end_of_day, start_of_day},
};
use storage::repository::{ProgressRepository, ReviewEventRepository, UserStreakProvider};

use crate::error::SrsServiceError;

/// Read-only aggregates over a learner's progress and review history.
pub struct StatsService {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
    events: Arc<dyn ReviewEventRepository>,
    streaks: Arc<dyn UserStreakProvider>,
}

impl StatsService {
    #[must_use]
    pub fn new(
        clock: Clock,
        progress: Arc<dyn ProgressRepository>,
        events: Arc<dyn ReviewEventRepository>,
        streaks: Arc<dyn UserStreakProvider>,
    ) -> Self {
        Self {
            clock,
            progress,
            events,
            streaks,
        }
    }

    /// Review workload right now, by the end of today and within a week.
    ///
    /// # Errors
    ///
    /// Returns storage errors if counts cannot be read.
    pub async fn get_due_count(&self, user_id: UserId) -> Result<DueCounts, SrsServiceError> {
        let now = self.clock.now();

        let due_now = self.progress.count_due(user_id, now).await?;
        let due_today = self.progress.count_due(user_id, end_of_day(now)).await?;
        let due_this_week = self
            .progress
            .count_due(user_id, now + Duration::days(7))
            .await?;

        let levels = self.progress.count_by_level(user_id).await?;
        let (total_learning, total_mastered) =
            levels
                .iter()
                .fold((0, 0), |(learning, mastered), (&level, &count)| {
                    if level >= MASTERED_LEVEL {
                        (learning, mastered + count)
                    } else if level >= 1 {
                        (learning + count, mastered)
                    } else {
                        (learning, mastered)
                    }
                });

        Ok(DueCounts {
            due_now,
            due_today,
            due_this_week,
            total_learning,
            total_mastered,
        })
    }

    /// Level distribution, retention, streak and the next week's forecast.
    ///
    /// # Errors
    ///
    /// Returns storage errors if any aggregate cannot be read.
    pub async fn get_srs_stats(&self, user_id: UserId) -> Result<SrsStats, SrsServiceError> {
        let now = self.clock.now();

        let counted = self.progress.count_by_level(user_id).await?;
        let by_srs_level: BTreeMap<u32, u64> = (0..=MAX_REPORTED_LEVEL)
            .map(|level| (level, counted.get(&level).copied().unwrap_or(0)))
            .collect();

        let reviews = self.events.review_totals(user_id).await?;
        let totals = self.progress.progress_totals(user_id).await?;
        let streak_days = self.streaks.streak_days(user_id).await?;

        let today = now.date_naive();
        let mut upcoming_reviews = Vec::with_capacity(UPCOMING_DAYS);
        for offset in (0_i64..).take(UPCOMING_DAYS) {
            let date = today + Duration::days(offset);
            let from = start_of_day(date);
            let count = self
                .progress
                .count_scheduled_between(user_id, from, from + Duration::days(1))
                .await?;
            upcoming_reviews.push(UpcomingReviews { date, count });
        }

        tracing::debug!(
            user = %user_id,
            total_words = totals.words,
            total_reviews = reviews.total,
            "computed srs stats"
        );

        Ok(SrsStats {
            total_words: totals.words,
            by_srs_level,
            retention_rate: round_to(ratio(reviews.correct, reviews.total), 2),
            avg_reviews_per_word: round_to(ratio(totals.reviews, totals.words), 1),
            streak_days,
            upcoming_reviews,
        })
    }
}
