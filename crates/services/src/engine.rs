use std::sync::Arc;

use srs_core::scheduler::{Sm2Params, Sm2Scheduler};
use storage::repository::Storage;

use crate::Clock;
use crate::error::EngineInitError;
use crate::queue_service::{QueueConfig, QueueService};
use crate::review_service::ReviewService;
use crate::stats_service::StatsService;

/// Assembles the review, queue and stats services over one storage backend.
#[derive(Clone)]
pub struct SrsEngine {
    clock: Clock,
    reviews: Arc<ReviewService>,
    queue: Arc<QueueService>,
    stats: Arc<StatsService>,
}

impl SrsEngine {
    /// Build the engine over an existing storage aggregate with default settings.
    #[must_use]
    pub fn new(storage: &Storage, clock: Clock) -> Self {
        Self::with_settings(storage, clock, Sm2Scheduler::new(), QueueConfig::default())
    }

    /// Build the engine with custom SM-2 parameters and queue sizes.
    ///
    /// # Errors
    ///
    /// Returns `EngineInitError::Scheduler` if the SM-2 parameters are inconsistent.
    pub fn with_config(
        storage: &Storage,
        clock: Clock,
        params: Sm2Params,
        queue: QueueConfig,
    ) -> Result<Self, EngineInitError> {
        let scheduler = Sm2Scheduler::with_params(params)?;
        Ok(Self::with_settings(storage, clock, scheduler, queue))
    }

    /// Build the engine backed by `SQLite` storage, running migrations first.
    ///
    /// # Errors
    ///
    /// Returns `EngineInitError` if storage initialization fails.
    pub async fn sqlite(db_url: &str, clock: Clock) -> Result<Self, EngineInitError> {
        let storage = Storage::sqlite(db_url).await?;
        tracing::info!(db_url, fixed_clock = clock.is_fixed(), "srs engine ready");
        Ok(Self::new(&storage, clock))
    }

    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::new(&Storage::in_memory(), clock)
    }

    fn with_settings(
        storage: &Storage,
        clock: Clock,
        scheduler: Sm2Scheduler,
        queue: QueueConfig,
    ) -> Self {
        let reviews = Arc::new(
            ReviewService::new(
                clock,
                Arc::clone(&storage.words),
                Arc::clone(&storage.progress),
                Arc::clone(&storage.review_events),
                Arc::clone(&storage.reviews),
            )
            .with_scheduler(scheduler),
        );
        let queue =
            Arc::new(QueueService::new(clock, Arc::clone(&storage.progress)).with_config(queue));
        let stats = Arc::new(StatsService::new(
            clock,
            Arc::clone(&storage.progress),
            Arc::clone(&storage.review_events),
            Arc::clone(&storage.streaks),
        ));

        Self {
            clock,
            reviews,
            queue,
            stats,
        }
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    #[must_use]
    pub fn reviews(&self) -> Arc<ReviewService> {
        Arc::clone(&self.reviews)
    }

    #[must_use]
    pub fn queue(&self) -> Arc<QueueService> {
        Arc::clone(&self.queue)
    }

    #[must_use]
    pub fn stats(&self) -> Arc<StatsService> {
        Arc::clone(&self.stats)
    }
}
