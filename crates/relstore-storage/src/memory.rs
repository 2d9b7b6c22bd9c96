//! In-memory implementation of [`RecordStore`].
//!
//! [`InMemoryStore`] is a first-class backend for tests and ephemeral
//! sessions. It keeps records as encoded JSON text, exactly what the SQLite
//! backend stores, so both backends accept and reject the same batches.

use std::collections::BTreeMap;

use relstore_core::{Identity, KeyEntry, Record};

use crate::convert::{decode_record, encode_record};
use crate::error::StorageError;
use crate::traits::RecordStore;
use crate::types::{CommitBatch, StoreWrite, StoredState};

/// In-memory implementation of [`RecordStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    /// Encoded records keyed by (type, id).
    records: BTreeMap<(String, String), String>,
    /// Secondary keys: (type, key, value) -> id.
    keys: BTreeMap<(String, String, String), String>,
    commits: u64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    /// Number of batches committed so far.
    pub fn commit_count(&self) -> u64 {
        self.commits
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    fn remove_keys_of(&mut self, identity: &Identity) {
        self.keys.retain(|(type_name, _, _), id| {
            !(type_name == &identity.type_name && id == &identity.id)
        });
    }
}

/// A write with its record already encoded.
enum Encoded<'a> {
    Put(&'a Identity, String),
    Delete(&'a Identity),
    PutKey(&'a KeyEntry),
    DeleteKey(&'a KeyEntry),
}

fn encode(write: &StoreWrite) -> Result<Encoded<'_>, StorageError> {
    Ok(match write {
        StoreWrite::PutRecord(record) => Encoded::Put(&record.identity, encode_record(record)?),
        StoreWrite::DeleteRecord(identity) => Encoded::Delete(identity),
        StoreWrite::PutKey(entry) => Encoded::PutKey(entry),
        StoreWrite::DeleteKey(entry) => Encoded::DeleteKey(entry),
    })
}

impl RecordStore for InMemoryStore {
    fn load(&self) -> Result<StoredState, StorageError> {
        let records = self
            .records
            .iter()
            .map(|((type_name, id), json)| decode_record(type_name, id, json))
            .collect::<Result<Vec<_>, _>>()?;
        let keys = self
            .keys
            .iter()
            .map(|((type_name, key, value), id)| KeyEntry {
                type_name: type_name.clone(),
                key: key.clone(),
                value: value.clone(),
                id: id.clone(),
            })
            .collect();
        Ok(StoredState { records, keys })
    }

    fn get_record(&self, identity: &Identity) -> Result<Option<Record>, StorageError> {
        self.records
            .get(&(identity.type_name.clone(), identity.id.clone()))
            .map(|json| decode_record(&identity.type_name, &identity.id, json))
            .transpose()
    }

    fn list_records(&self, type_name: &str) -> Result<Vec<Record>, StorageError> {
        self.records
            .iter()
            .filter(|((t, _), _)| t == type_name)
            .map(|((t, id), json)| decode_record(t, id, json))
            .collect()
    }

    fn commit(&mut self, batch: &CommitBatch) -> Result<(), StorageError> {
        // Encode everything first; nothing is applied unless all of it encodes.
        let encoded = batch
            .writes
            .iter()
            .map(encode)
            .collect::<Result<Vec<_>, StorageError>>()?;

        for write in encoded {
            match write {
                Encoded::Put(identity, json) => {
                    self.records
                        .insert((identity.type_name.clone(), identity.id.clone()), json);
                }
                Encoded::Delete(identity) => {
                    self.records
                        .remove(&(identity.type_name.clone(), identity.id.clone()));
                    self.remove_keys_of(identity);
                }
                Encoded::PutKey(entry) => {
                    self.keys.insert(
                        (entry.type_name.clone(), entry.key.clone(), entry.value.clone()),
                        entry.id.clone(),
                    );
                }
                Encoded::DeleteKey(entry) => {
                    let slot = (entry.type_name.clone(), entry.key.clone(), entry.value.clone());
                    if self.keys.get(&slot) == Some(&entry.id) {
                        self.keys.remove(&slot);
                    }
                }
            }
        }
        self.commits += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.records.clear();
        self.keys.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(type_name: &str, key: &str, value: &str, id: &str) -> KeyEntry {
        KeyEntry {
            type_name: type_name.into(),
            key: key.into(),
            value: value.into(),
            id: id.into(),
        }
    }

    #[test]
    fn commit_then_load() {
        let mut store = InMemoryStore::new();
        let earth = Record::new("planet", "earth").with_key("remoteId", "r-3");
        let mut batch = CommitBatch::new("t1");
        batch.push(StoreWrite::PutRecord(earth.clone()));
        batch.push(StoreWrite::PutRecord(Record::new("moon", "luna")));
        batch.push(StoreWrite::PutKey(key("planet", "remoteId", "r-3", "earth")));
        store.commit(&batch).unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.records.len(), 2);
        assert_eq!(state.keys, vec![key("planet", "remoteId", "r-3", "earth")]);
        assert_eq!(
            store.get_record(&Identity::new("planet", "earth")).unwrap(),
            Some(earth)
        );
        assert_eq!(store.list_records("moon").unwrap().len(), 1);
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn delete_record_drops_its_keys() {
        let mut store = InMemoryStore::new();
        let mut batch = CommitBatch::new("t1");
        batch.push(StoreWrite::PutRecord(Record::new("planet", "earth")));
        batch.push(StoreWrite::PutKey(key("planet", "remoteId", "r-3", "earth")));
        store.commit(&batch).unwrap();

        let mut batch = CommitBatch::new("t2");
        batch.push(StoreWrite::DeleteRecord(Identity::new("planet", "earth")));
        store.commit(&batch).unwrap();

        let state = store.load().unwrap();
        assert!(state.records.is_empty());
        assert!(state.keys.is_empty());
    }

    #[test]
    fn stale_key_delete_is_ignored() {
        let mut store = InMemoryStore::new();
        let mut batch = CommitBatch::new("t1");
        batch.push(StoreWrite::PutKey(key("planet", "remoteId", "r-3", "mars")));
        batch.push(StoreWrite::DeleteKey(key("planet", "remoteId", "r-3", "earth")));
        store.commit(&batch).unwrap();
        assert_eq!(store.load().unwrap().keys.len(), 1);
    }

    #[test]
    fn clear_empties_store() {
        let mut store = InMemoryStore::new();
        let mut batch = CommitBatch::new("t1");
        batch.push(StoreWrite::PutRecord(Record::new("planet", "earth")));
        store.commit(&batch).unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), StoredState::default());
    }
}
