#![forbid(unsafe_code)]

pub mod engine;
pub mod error;
pub mod queue_service;
pub mod review_service;
pub mod stats_service;

pub use srs_core::Clock;

pub use engine::SrsEngine;
pub use error::{EngineInitError, SrsServiceError};
pub use queue_service::{QueueConfig, QueueService};
pub use review_service::{ReviewService, ReviewedWord};
pub use stats_service::StatsService;
