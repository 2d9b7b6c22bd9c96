//! The [`RecordStore`] trait defining the durable storage contract.
//!
//! The store is a transactional key-value surface: records are keyed by
//! identity and grouped by type, and secondary keys live beside them. All
//! writes of one transform arrive as a single [`CommitBatch`] and must be
//! applied atomically.

use relstore_core::{Identity, Record};

use crate::error::StorageError;
use crate::types::{CommitBatch, StoredState};

/// The storage contract for records.
///
/// The trait is synchronous; the async layer above serializes access to it
/// behind a mutex.
pub trait RecordStore: Send {
    /// Loads every record and key mapping (warm start).
    fn load(&self) -> Result<StoredState, StorageError>;

    /// Retrieves one record, if stored.
    fn get_record(&self, identity: &Identity) -> Result<Option<Record>, StorageError>;

    /// Lists the records of one type, ordered by id.
    fn list_records(&self, type_name: &str) -> Result<Vec<Record>, StorageError>;

    /// Applies every write in `batch`, or none of them.
    fn commit(&mut self, batch: &CommitBatch) -> Result<(), StorageError>;

    /// Removes every record and key mapping.
    fn clear(&mut self) -> Result<(), StorageError>;
}
