//! Store error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("migration {version} failed: {message}")]
    Migration { version: u32, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("another indexing run holds the advisory lock (owner: {owner})")]
    ConcurrentRun { owner: String },

    #[error("unknown config key: {0}")]
    UnknownConfigKey(String),
}

impl StoreError {
    pub fn migration(version: u32, message: impl Into<String>) -> Self {
        StoreError::Migration { version, message: message.into() }
    }

    pub fn concurrent_run(owner: impl Into<String>) -> Self {
        StoreError::ConcurrentRun { owner: owner.into() }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
