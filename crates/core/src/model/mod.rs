mod ids;
mod progress;
mod review;
pub mod stats;
mod word;

pub use ids::{ParseIdError, ReviewEventId, UserId, WordId};

pub use progress::{
    INITIAL_EASE_FACTOR, MIN_EASE_FACTOR, PersistedProgress, ProgressError, WordProgress,
};
pub use review::{NewReviewEvent, Quality, QualityError, ReviewEvent, ReviewOutcome, SrsSnapshot};
pub use stats::{DueCounts, SrsStats, UpcomingReviews};
pub use word::{HskLevel, Word, WordError};
