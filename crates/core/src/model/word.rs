use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::WordId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WordError {
    #[error("hanzi must not be empty")]
    EmptyHanzi,
    #[error("HSK level must be between 1 and 9, got {0}")]
    InvalidHskLevel(u8),
}

/// HSK curriculum tier. Only ever compared for equality by the scheduler.
pub type HskLevel = u8;

/// Vocabulary item a learner can study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    id: WordId,
    hanzi: String,
    pinyin: String,
    hsk_level: HskLevel,
}

impl Word {
    /// Builds a word after trimming and validating its fields.
    ///
    /// # Errors
    ///
    /// Returns `WordError` if `hanzi` is blank or the HSK level is outside `1..=9`.
    pub fn new(
        id: WordId,
        hanzi: impl Into<String>,
        pinyin: impl Into<String>,
        hsk_level: HskLevel,
    ) -> Result<Self, WordError> {
        let hanzi = hanzi.into().trim().to_owned();
        if hanzi.is_empty() {
            return Err(WordError::EmptyHanzi);
        }
        if !(1..=9).contains(&hsk_level) {
            return Err(WordError::InvalidHskLevel(hsk_level));
        }
        Ok(Self {
            id,
            hanzi,
            pinyin: pinyin.into().trim().to_owned(),
            hsk_level,
        })
    }

    #[must_use]
    pub fn id(&self) -> WordId {
        self.id
    }

    #[must_use]
    pub fn hanzi(&self) -> &str {
        &self.hanzi
    }

    #[must_use]
    pub fn pinyin(&self) -> &str {
        &self.pinyin
    }

    #[must_use]
    pub fn hsk_level(&self) -> HskLevel {
        self.hsk_level
    }
}
