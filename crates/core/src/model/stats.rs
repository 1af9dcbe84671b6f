use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

/// Highest SRS level reported individually in [`SrsStats::by_srs_level`].
pub const MAX_REPORTED_LEVEL: u32 = 8;
/// Levels from here on count as mastered.
pub const MASTERED_LEVEL: u32 = 5;
/// Number of days covered by [`SrsStats::upcoming_reviews`].
pub const UPCOMING_DAYS: usize = 7;

/// Review workload for a learner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DueCounts {
    pub due_now: u64,
    pub due_today: u64,
    pub due_this_week: u64,
    /// Words at levels 1-4.
    pub total_learning: u64,
    /// Words at level 5 or above.
    pub total_mastered: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpcomingReviews {
    pub date: NaiveDate,
    pub count: u64,
}

/// Detailed SRS statistics for a learner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SrsStats {
    pub total_words: u64,
    /// Word counts for levels `0..=8`; every level is present.
    pub by_srs_level: BTreeMap<u32, u64>,
    /// Share of passing reviews, rounded to two decimals.
    pub retention_rate: f64,
    /// Rounded to one decimal.
    pub avg_reviews_per_word: f64,
    pub streak_days: u32,
    pub upcoming_reviews: Vec<UpcomingReviews>,
}

/// Round half away from zero to `places` decimals.
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}

/// Divide or fall back to 0.0 when the denominator is zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_two_places() {
        assert!((round_to(2.0 / 3.0, 2) - 0.67).abs() < 1e-9);
        assert!((round_to(0.125, 1) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn ratio_handles_zero_denominator() {
        assert_eq!(ratio(3, 0), 0.0);
        assert!((ratio(1, 4) - 0.25).abs() < 1e-9);
    }
}
