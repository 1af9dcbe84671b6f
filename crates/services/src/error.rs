//! Shared error types for the services crate.

use thiserror::Error;

use srs_core::model::QualityError;
use srs_core::scheduler::SchedulerError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the SRS services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SrsServiceError {
    #[error(transparent)]
    Quality(#[from] QualityError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping the engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineInitError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}
