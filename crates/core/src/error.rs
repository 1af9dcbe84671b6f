use thiserror::Error;

use crate::model::{ProgressError, QualityError, WordError};

/// Any validation failure raised by the domain layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Quality(#[from] QualityError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Word(#[from] WordError),
}
