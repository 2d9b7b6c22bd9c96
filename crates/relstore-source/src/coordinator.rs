//! Transaction coordinator: applies a transform as one atomic unit.
//!
//! [`run`] applies every operation of a transform to the record cache in
//! order, with the cache journal open. If any operation fails the journal is
//! rolled back and the operation's error is returned. Once every operation
//! has succeeded, the touched records and their secondary keys are written to
//! the durable store as one [`CommitBatch`]; a failing commit also rolls the
//! cache back. Only a committed transform updates the identity map and the
//! transform log.

use indexmap::IndexSet;

use relstore_core::{
    ChangeSet, IdentityMap, KeyChanges, Operation, Record, RecordCache, Transform,
};
use relstore_storage::{CommitBatch, RecordStore, StoreWrite};

use crate::error::SourceError;

/// Ids of transforms that have been committed, in commit order.
#[derive(Debug, Clone, Default)]
pub struct TransformLog {
    applied: IndexSet<String>,
}

impl TransformLog {
    pub fn new() -> Self {
        TransformLog::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.applied.contains(id)
    }

    pub fn push(&mut self, id: impl Into<String>) {
        self.applied.insert(id.into());
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    pub fn clear(&mut self) {
        self.applied.clear();
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.applied.iter().map(String::as_str)
    }
}

/// In-memory state owned by a source: the cache, the identity map and the
/// transform log. Guarded as one unit.
#[derive(Debug, Clone)]
pub struct SourceState {
    pub cache: RecordCache,
    pub keys: IdentityMap,
    pub log: TransformLog,
}

impl SourceState {
    pub fn new(cache: RecordCache, keys: IdentityMap) -> Self {
        SourceState {
            cache,
            keys,
            log: TransformLog::new(),
        }
    }
}

/// Result of a committed transform.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformReport {
    /// One slot per operation, aligned by index. `None` for removals and for
    /// skipped removals of missing records.
    pub results: Vec<Option<Record>>,
    /// Adjustments made to records other than the operation targets.
    pub inverse_patches: Vec<Operation>,
    /// Every record the transform touched.
    pub changes: ChangeSet,
}

/// Applies and persists `transform`, all or nothing.
pub fn run<S>(
    state: &mut SourceState,
    store: &mut S,
    transform: &Transform,
) -> Result<TransformReport, SourceError>
where
    S: RecordStore + ?Sized,
{
    if state.log.contains(&transform.id) {
        return Err(SourceError::AlreadyApplied {
            id: transform.id.clone(),
        });
    }

    let raise_not_found = transform.options.raises_not_found();
    let mut results = Vec::with_capacity(transform.len());
    let mut inverse_patches = Vec::new();

    state.cache.begin();
    for (index, operation) in transform.operations.iter().enumerate() {
        if operation.is_remove_record()
            && !raise_not_found
            && !state.cache.contains(operation.target())
        {
            tracing::debug!(
                transform = %transform.id,
                index,
                record = %operation.target(),
                "skipping removal of missing record"
            );
            results.push(None);
            continue;
        }

        match state.cache.apply(operation) {
            Ok(applied) => {
                results.push(applied.primary);
                inverse_patches.extend(applied.inverse_patches);
            }
            Err(e) => {
                state.cache.rollback();
                tracing::warn!(
                    transform = %transform.id,
                    index,
                    op = operation.name(),
                    error = %e,
                    "operation rejected, transform rolled back"
                );
                return Err(e.into());
            }
        }
    }

    let changes = state.cache.pending_changes();
    let (batch, key_changes) = build_batch(&transform.id, &changes, &state.keys);

    if !batch.is_empty() {
        if let Err(e) = store.commit(&batch) {
            state.cache.rollback();
            tracing::warn!(
                transform = %transform.id,
                writes = batch.len(),
                error = %e,
                "commit failed, transform rolled back"
            );
            return Err(SourceError::Transaction { source: e });
        }
    }

    state.cache.finish();
    for change in &key_changes {
        state.keys.apply(change);
    }
    state.log.push(transform.id.clone());

    tracing::info!(
        transform = %transform.id,
        operations = transform.len(),
        records = changes.len(),
        patches = inverse_patches.len(),
        "committed transform"
    );

    Ok(TransformReport {
        results,
        inverse_patches,
        changes,
    })
}

/// Turns a change set into durable writes, plus the identity-map changes to
/// apply once those writes are committed.
fn build_batch(
    transform_id: &str,
    changes: &ChangeSet,
    keys: &IdentityMap,
) -> (CommitBatch, Vec<KeyChanges>) {
    let mut batch = CommitBatch::new(transform_id);
    let mut key_changes = Vec::new();

    for change in &changes.changes {
        match &change.after {
            Some(record) => {
                batch.push(StoreWrite::PutRecord(record.clone()));
                let record_keys = keys.changes_for(record);
                for entry in &record_keys.retire {
                    batch.push(StoreWrite::DeleteKey(entry.clone()));
                }
                for entry in &record_keys.put {
                    batch.push(StoreWrite::PutKey(entry.clone()));
                }
                key_changes.push(record_keys);
            }
            None => {
                // The store drops a deleted record's keys itself.
                batch.push(StoreWrite::DeleteRecord(change.identity.clone()));
                key_changes.push(keys.changes_for_removal(&change.identity));
            }
        }
    }
    (batch, key_changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use relstore_core::{Identity, ModelDef, RelationshipDef, Schema, TransformOptions};
    use relstore_storage::{InMemoryStore, StorageError, StoredState};

    fn state() -> SourceState {
        let schema = Schema::new()
            .with_model(
                "planet",
                ModelDef::new()
                    .key("remoteId")
                    .relationship("moons", RelationshipDef::to_many(["moon"]).inverse("planet")),
            )
            .with_model(
                "moon",
                ModelDef::new()
                    .relationship("planet", RelationshipDef::to_one(["planet"]).inverse("moons")),
            );
        SourceState::new(RecordCache::new(Arc::new(schema)), IdentityMap::new())
    }

    /// Store that refuses every commit.
    struct RejectingStore;

    impl RecordStore for RejectingStore {
        fn load(&self) -> Result<StoredState, StorageError> {
            Ok(StoredState::default())
        }

        fn get_record(&self, _identity: &Identity) -> Result<Option<Record>, StorageError> {
            Ok(None)
        }

        fn list_records(&self, _type_name: &str) -> Result<Vec<Record>, StorageError> {
            Ok(Vec::new())
        }

        fn commit(&mut self, _batch: &CommitBatch) -> Result<(), StorageError> {
            Err(StorageError::CommitRejected {
                reason: "read-only".into(),
            })
        }

        fn clear(&mut self) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn commits_records_and_keys() {
        let mut state = state();
        let mut store = InMemoryStore::new();
        let transform = Transform::new(vec![
            Operation::AddRecord {
                record: Record::new("planet", "earth").with_key("remoteId", "r-3"),
            },
            Operation::AddRecord {
                record: Record::new("moon", "luna")
                    .with_related_record("planet", Some(Identity::new("planet", "earth"))),
            },
        ]);

        let report = run(&mut state, &mut store, &transform).unwrap();
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.inverse_patches.len(), 1);
        assert!(state.log.contains(&transform.id));
        assert_eq!(state.keys.id_for_key("planet", "remoteId", "r-3"), Some("earth"));

        let stored = store.load().unwrap();
        assert_eq!(stored.records.len(), 2);
        assert_eq!(stored.keys.len(), 1);
        let earth = store
            .get_record(&Identity::new("planet", "earth"))
            .unwrap()
            .unwrap();
        assert_eq!(
            earth.related_records("moons").map(|m| m.len()),
            Some(1)
        );
    }

    #[test]
    fn duplicate_transform_is_rejected() {
        let mut state = state();
        let mut store = InMemoryStore::new();
        let transform = Transform::new(vec![Operation::AddRecord {
            record: Record::new("planet", "earth"),
        }]);
        run(&mut state, &mut store, &transform).unwrap();
        let err = run(&mut state, &mut store, &transform).unwrap_err();
        assert!(matches!(err, SourceError::AlreadyApplied { .. }), "{err}");
        assert_eq!(store.commit_count(), 1);
        assert_eq!(state.log.ids().collect::<Vec<_>>(), vec![transform.id.as_str()]);
    }

    #[test]
    fn missing_removal_is_skipped_unless_raised() {
        let mut state = state();
        let mut store = InMemoryStore::new();
        let missing = Identity::new("planet", "vulcan");

        let transform = Transform::new(vec![Operation::RemoveRecord {
            record: missing.clone(),
        }]);
        let report = run(&mut state, &mut store, &transform).unwrap();
        assert_eq!(report.results, vec![None]);
        assert!(report.changes.is_empty());
        assert_eq!(store.commit_count(), 0);

        let transform = Transform::new(vec![Operation::RemoveRecord { record: missing }])
            .with_options(TransformOptions::new().with_raise_not_found_exceptions(true));
        let err = run(&mut state, &mut store, &transform).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Record not found: planet:vulcan");
        assert!(!state.log.contains(&transform.id));
    }

    #[test]
    fn failing_operation_rolls_back_earlier_ones() {
        let mut state = state();
        let mut store = InMemoryStore::new();
        let transform = Transform::new(vec![
            Operation::AddRecord {
                record: Record::new("planet", "earth"),
            },
            Operation::AddToRelatedRecords {
                record: Identity::new("planet", "earth"),
                relationship: "moons".into(),
                related_record: Identity::new("moon", "luna"),
            },
        ]);
        let err = run(&mut state, &mut store, &transform).unwrap_err();
        assert!(err.is_not_found());
        assert!(state.cache.is_empty());
        assert!(!state.cache.in_transaction());
        assert_eq!(store.commit_count(), 0);
    }

    #[test]
    fn failing_commit_rolls_back_cache() {
        let mut state = state();
        let mut store = InMemoryStore::new();
        run(
            &mut state,
            &mut store,
            &Transform::new(vec![Operation::AddRecord {
                record: Record::new("planet", "earth").with_key("remoteId", "r-3"),
            }]),
        )
        .unwrap();
        let before: Vec<Record> = state.cache.all_records().cloned().collect();

        let transform = Transform::new(vec![
            Operation::AddRecord {
                record: Record::new("moon", "luna")
                    .with_related_record("planet", Some(Identity::new("planet", "earth"))),
            },
            Operation::ReplaceKey {
                record: Identity::new("planet", "earth"),
                key: "remoteId".into(),
                value: "r-4".into(),
            },
        ]);
        let err = run(&mut state, &mut RejectingStore, &transform).unwrap_err();
        assert!(matches!(err, SourceError::Transaction { .. }), "{err}");

        let after: Vec<Record> = state.cache.all_records().cloned().collect();
        assert_eq!(before, after);
        assert_eq!(state.keys.id_for_key("planet", "remoteId", "r-3"), Some("earth"));
        assert_eq!(state.keys.id_for_key("planet", "remoteId", "r-4"), None);
        assert!(!state.log.contains(&transform.id));
    }

    #[test]
    fn removal_retires_keys() {
        let mut state = state();
        let mut store = InMemoryStore::new();
        run(
            &mut state,
            &mut store,
            &Transform::new(vec![Operation::AddRecord {
                record: Record::new("planet", "earth").with_key("remoteId", "r-3"),
            }]),
        )
        .unwrap();
        run(
            &mut state,
            &mut store,
            &Transform::new(vec![Operation::RemoveRecord {
                record: Identity::new("planet", "earth"),
            }]),
        )
        .unwrap();
        assert!(state.keys.is_empty());
        assert!(store.load().unwrap().keys.is_empty());
    }
}
