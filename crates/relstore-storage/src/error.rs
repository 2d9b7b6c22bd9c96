//! Storage error types for relstore-storage.
//!
//! [`StorageError`] covers every failure mode of a durable backend:
//! serialization, SQLite and migration failures, integrity violations found
//! while decoding stored rows, and commits a backend refuses outright.

use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The SQLite driver reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// A stored row disagrees with the key it is stored under.
    #[error("integrity error: {reason}")]
    IntegrityError { reason: String },

    /// The backend refused to apply a commit batch.
    #[error("commit rejected: {reason}")]
    CommitRejected { reason: String },
}
