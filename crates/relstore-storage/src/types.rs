//! Storage-layer types: commit batches and warm-start state.

use relstore_core::{Identity, KeyEntry, Record};

/// One durable write.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    /// Insert or overwrite a record.
    PutRecord(Record),
    /// Delete a record and every key that maps to it.
    DeleteRecord(Identity),
    /// Insert or overwrite a secondary-key mapping.
    PutKey(KeyEntry),
    /// Delete a secondary-key mapping.
    DeleteKey(KeyEntry),
}

/// Every durable write of one transform, applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitBatch {
    /// Id of the transform the writes belong to (for diagnostics).
    pub transform_id: String,
    pub writes: Vec<StoreWrite>,
}

impl CommitBatch {
    pub fn new(transform_id: impl Into<String>) -> Self {
        CommitBatch {
            transform_id: transform_id.into(),
            writes: Vec::new(),
        }
    }

    pub fn push(&mut self, write: StoreWrite) {
        self.writes.push(write);
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }
}

/// Everything a store holds, as loaded on warm start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredState {
    pub records: Vec<Record>,
    pub keys: Vec<KeyEntry>,
}
