//! Identity Map: secondary keys to canonical identities.
//!
//! Records may carry secondary keys (for example a remote id assigned by a
//! server). The map answers "which record of type T has key K = V" and the
//! reverse. The update path only reads it while operations are applied; new
//! keys are folded in after the transform that introduced them commits.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::id::Identity;
use crate::record::Record;

/// One persisted `(type, key, value) -> id` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyEntry {
    #[serde(rename = "type")]
    pub type_name: String,
    pub key: String,
    pub value: String,
    pub id: String,
}

impl KeyEntry {
    pub fn identity(&self) -> Identity {
        Identity::new(&self.type_name, &self.id)
    }
}

/// Key mappings a record would introduce or retire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyChanges {
    /// Mappings that are new or point somewhere else today.
    pub put: Vec<KeyEntry>,
    /// Mappings for values the record no longer carries.
    pub retire: Vec<KeyEntry>,
}

impl KeyChanges {
    pub fn is_empty(&self) -> bool {
        self.put.is_empty() && self.retire.is_empty()
    }
}

/// Bidirectional secondary-key index.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    by_key: HashMap<(String, String, String), String>,
    by_identity: HashMap<Identity, BTreeMap<String, String>>,
}

impl IdentityMap {
    pub fn new() -> Self {
        IdentityMap::default()
    }

    /// Builds a map from persisted entries.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = KeyEntry>,
    {
        let mut map = IdentityMap::new();
        for entry in entries {
            map.insert(entry);
        }
        map
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
        self.by_identity.clear();
    }

    /// Resolves a secondary key to the record id it names.
    pub fn id_for_key(&self, type_name: &str, key: &str, value: &str) -> Option<&str> {
        self.by_key
            .get(&(type_name.to_string(), key.to_string(), value.to_string()))
            .map(String::as_str)
    }

    /// Resolves a secondary key to a full identity.
    pub fn identity_for_key(&self, type_name: &str, key: &str, value: &str) -> Option<Identity> {
        self.id_for_key(type_name, key, value)
            .map(|id| Identity::new(type_name, id))
    }

    /// Returns the keys known for an identity.
    pub fn keys_for(&self, identity: &Identity) -> Option<&BTreeMap<String, String>> {
        self.by_identity.get(identity)
    }

    /// Computes the mappings `record`'s keys would add or retire, without
    /// touching the map.
    pub fn changes_for(&self, record: &Record) -> KeyChanges {
        let mut changes = KeyChanges::default();
        let known = self.by_identity.get(&record.identity);
        for (key, value) in &record.keys {
            let current = self.id_for_key(&record.identity.type_name, key, value);
            if current != Some(record.identity.id.as_str()) {
                changes.put.push(entry_for(&record.identity, key, value));
            }
            if let Some(old) = known.and_then(|k| k.get(key)) {
                if old != value {
                    changes.retire.push(entry_for(&record.identity, key, old));
                }
            }
        }
        // Keys the record dropped entirely.
        for (key, old) in known.into_iter().flatten() {
            if !record.keys.contains_key(key) {
                changes.retire.push(entry_for(&record.identity, key, old));
            }
        }
        changes
    }

    /// Mappings to retire when `identity` is removed.
    pub fn changes_for_removal(&self, identity: &Identity) -> KeyChanges {
        let retire = self
            .by_identity
            .get(identity)
            .map(|keys| {
                keys.iter()
                    .map(|(key, value)| entry_for(identity, key, value))
                    .collect()
            })
            .unwrap_or_default();
        KeyChanges {
            put: Vec::new(),
            retire,
        }
    }

    /// Applies previously computed changes.
    pub fn apply(&mut self, changes: &KeyChanges) {
        for entry in &changes.retire {
            self.remove(entry);
        }
        for entry in &changes.put {
            self.insert(entry.clone());
        }
    }

    /// Folds a record's keys into the map. Returns the number of mappings added.
    pub fn push_record(&mut self, record: &Record) -> usize {
        let changes = self.changes_for(record);
        let added = changes.put.len();
        self.apply(&changes);
        added
    }

    /// Every mapping, sorted for stable output.
    pub fn entries(&self) -> Vec<KeyEntry> {
        let mut entries: Vec<KeyEntry> = self
            .by_key
            .iter()
            .map(|((type_name, key, value), id)| KeyEntry {
                type_name: type_name.clone(),
                key: key.clone(),
                value: value.clone(),
                id: id.clone(),
            })
            .collect();
        entries.sort();
        entries
    }

    fn insert(&mut self, entry: KeyEntry) {
        let identity = entry.identity();
        // A value re-pointed to a new record stops belonging to the old one.
        let slot = (entry.type_name.clone(), entry.key.clone(), entry.value.clone());
        if let Some(previous) = self.by_key.insert(slot, entry.id.clone()) {
            if previous != entry.id {
                let prev_identity = Identity::new(&entry.type_name, previous);
                if let Some(keys) = self.by_identity.get_mut(&prev_identity) {
                    if keys.get(&entry.key) == Some(&entry.value) {
                        keys.remove(&entry.key);
                    }
                }
            }
        }
        self.by_identity
            .entry(identity)
            .or_default()
            .insert(entry.key, entry.value);
    }

    fn remove(&mut self, entry: &KeyEntry) {
        let slot = (entry.type_name.clone(), entry.key.clone(), entry.value.clone());
        if self.by_key.get(&slot) == Some(&entry.id) {
            self.by_key.remove(&slot);
        }
        if let Some(keys) = self.by_identity.get_mut(&entry.identity()) {
            if keys.get(&entry.key) == Some(&entry.value) {
                keys.remove(&entry.key);
            }
        }
    }
}

fn entry_for(identity: &Identity, key: &str, value: &str) -> KeyEntry {
    KeyEntry {
        type_name: identity.type_name.clone(),
        key: key.to_string(),
        value: value.to_string(),
        id: identity.id.clone(),
    }
}
