#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    DueQuery, InMemoryRepository, MistakeQuery, ProgressRepository, ProgressTotals,
    ReviewEventRepository, ReviewPersistence, ReviewTotals, Storage, StorageError,
    UserStreakProvider, WordRepository,
};
