//! Error types for the update path.
//!
//! [`SourceError`] is what `Source::update` and friends return. Operation
//! failures keep their [`CoreError`] unchanged so callers can match on
//! not-found and validation errors directly; persistence failures during a
//! commit are wrapped as [`SourceError::Transaction`].

use thiserror::Error;

use relstore_core::CoreError;
use relstore_storage::StorageError;

/// Errors produced by the source facade and the transaction coordinator.
#[derive(Debug, Error)]
pub enum SourceError {
    /// An operation was rejected; nothing was applied.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The durable store failed to commit; the cache was rolled back.
    #[error("transaction failed: {source}")]
    Transaction {
        #[source]
        source: StorageError,
    },

    /// Loading from or clearing the durable store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A transform with this id has already been committed.
    #[error("transform already applied: {id}")]
    AlreadyApplied { id: String },
}

impl SourceError {
    /// True for the not-found class of failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::Core(e) if e.is_not_found())
    }

    /// The operation error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            SourceError::Core(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relstore_core::Identity;

    #[test]
    fn core_errors_display_unchanged() {
        let err: SourceError = CoreError::RecordNotFound {
            identity: Identity::new("moon", "phobos"),
        }
        .into();
        assert_eq!(err.to_string(), "Record not found: moon:phobos");
        assert!(err.is_not_found());
    }

    #[test]
    fn transaction_error_keeps_cause() {
        let err = SourceError::Transaction {
            source: StorageError::CommitRejected {
                reason: "disk full".into(),
            },
        };
        assert_eq!(err.to_string(), "transaction failed: commit rejected: disk full");
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_not_found());
    }
}
