//! RecordCache: the authoritative in-memory projection of every record.
//!
//! [`RecordCache::apply`] applies one [`Operation`] and keeps inverse
//! relationships consistent as part of the same unit of work. Each operation
//! is first planned against a staging overlay (`Staging`) that sits on top of
//! the cache: all validation, inverse computation and removal cascades happen
//! there, and only a fully planned operation is written back. A rejected
//! operation therefore never leaves the cache mutated.
//!
//! # Inverse synchronization
//!
//! When a relationship with a declared inverse changes, the identities that
//! left the field are unlinked from the inverse field on their own records and
//! the identities that joined are linked into it. The inverse definition is
//! looked up on the related identity's concrete type, which is what makes
//! polymorphic relationships work. Linking into a to-one inverse that already
//! pointed elsewhere also unlinks the displaced record, so consistency holds
//! immediately after every operation.
//!
//! # Journal
//!
//! Between [`RecordCache::begin`] and [`RecordCache::finish`] the cache keeps
//! the before-image of every record it writes. [`RecordCache::rollback`]
//! restores them, which is how a transform that fails to persist is undone.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::error::CoreError;
use crate::id::Identity;
use crate::operation::Operation;
use crate::record::{Record, RelationshipData};
use crate::schema::{Dependent, RelationshipDef, RelationshipKind, Schema};

/// Outcome of applying one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// The record the operation produced, or `None` for a removal.
    pub primary: Option<Record>,
    /// Adjustments made to other records as a side effect.
    pub inverse_patches: Vec<Operation>,
}

/// One record touched while the journal was open.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChange {
    pub identity: Identity,
    pub before: Option<Record>,
    pub after: Option<Record>,
}

/// Every record touched between `begin` and `finish`, in first-touch order.
/// Records that ended up exactly as they started are left out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub changes: Vec<RecordChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Records that exist after the change.
    pub fn upserted(&self) -> impl Iterator<Item = &Record> {
        self.changes.iter().filter_map(|c| c.after.as_ref())
    }

    /// Identities that no longer exist after the change.
    pub fn removed(&self) -> impl Iterator<Item = &Identity> {
        self.changes
            .iter()
            .filter(|c| c.after.is_none())
            .map(|c| &c.identity)
    }
}

/// In-memory projection of all records, grouped by type and ordered by id.
#[derive(Debug, Clone)]
pub struct RecordCache {
    schema: Arc<Schema>,
    records: BTreeMap<String, BTreeMap<String, Record>>,
    journal: Option<IndexMap<Identity, Option<Record>>>,
}

impl RecordCache {
    /// Creates an empty cache for `schema`.
    pub fn new(schema: Arc<Schema>) -> Self {
        RecordCache {
            schema,
            records: BTreeMap::new(),
            journal: None,
        }
    }

    /// Creates a cache pre-populated with already-consistent records, as
    /// loaded from a durable store.
    pub fn with_records<I>(schema: Arc<Schema>, records: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut cache = RecordCache::new(schema);
        for record in records {
            cache.schema.model(&record.identity.type_name)?;
            cache.write(record.identity.clone(), Some(record));
        }
        Ok(cache)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    // ---------------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------------

    pub fn get(&self, identity: &Identity) -> Option<&Record> {
        self.records
            .get(&identity.type_name)
            .and_then(|t| t.get(&identity.id))
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.get(identity).is_some()
    }

    /// All records of one type, ordered by id.
    pub fn records(&self, type_name: &str) -> Vec<&Record> {
        self.records
            .get(type_name)
            .map(|t| t.values().collect())
            .unwrap_or_default()
    }

    /// Every record, grouped by type.
    pub fn all_records(&self) -> impl Iterator<Item = &Record> {
        self.records.values().flat_map(|t| t.values())
    }

    pub fn len(&self) -> usize {
        self.records.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The to-one target of a relationship.
    pub fn related_record(
        &self,
        identity: &Identity,
        relationship: &str,
    ) -> Result<Option<Identity>, CoreError> {
        let record = self.get(identity).ok_or_else(|| CoreError::not_found(identity))?;
        let def = self.schema.relationship(&identity.type_name, relationship)?;
        if def.kind != RelationshipKind::ToOne {
            return Err(CoreError::validation(format!(
                "relationship '{}.{}' is to-many",
                identity.type_name, relationship
            )));
        }
        Ok(record.related_record(relationship).cloned())
    }

    /// The to-many members of a relationship.
    pub fn related_records(
        &self,
        identity: &Identity,
        relationship: &str,
    ) -> Result<Vec<Identity>, CoreError> {
        let record = self.get(identity).ok_or_else(|| CoreError::not_found(identity))?;
        let def = self.schema.relationship(&identity.type_name, relationship)?;
        if def.kind != RelationshipKind::ToMany {
            return Err(CoreError::validation(format!(
                "relationship '{}.{}' is to-one",
                identity.type_name, relationship
            )));
        }
        Ok(linked(record, relationship))
    }

    /// Lists every broken invariant: dangling references and inverse fields
    /// that do not point back. Empty for a consistent cache.
    pub fn integrity_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        for record in self.all_records() {
            for (name, rel) in &record.relationships {
                let def = self.schema.relationship(&record.identity.type_name, name).ok();
                for target in rel.data.identities() {
                    let Some(target_record) = self.get(&target) else {
                        violations.push(format!(
                            "{}.{} references missing {}",
                            record.identity, name, target
                        ));
                        continue;
                    };
                    let Some(inverse) = def.and_then(|d| d.inverse.as_deref()) else {
                        continue;
                    };
                    let points_back = target_record
                        .relationship(inverse)
                        .is_some_and(|d| d.contains(&record.identity));
                    if !points_back {
                        violations.push(format!(
                            "{}.{} -> {} but {}.{} does not point back",
                            record.identity, name, target, target, inverse
                        ));
                    }
                }
            }
        }
        violations
    }

    // ---------------------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------------------

    /// Applies one operation, including its inverse side effects.
    ///
    /// Fails with [`CoreError::RecordNotFound`] when the target (or a related
    /// record) is missing, [`CoreError::RelationshipType`] when a related type
    /// is not allowed, and [`CoreError::Validation`] for malformed payloads.
    /// On failure the cache is unchanged.
    pub fn apply(&mut self, operation: &Operation) -> Result<Applied, CoreError> {
        let (primary, pending, inverse_patches) = {
            let mut staging = Staging::new(self);
            let primary = staging.apply(operation)?;
            (primary, staging.pending, staging.patches)
        };

        for (identity, record) in pending {
            self.write(identity, record);
        }

        tracing::debug!(
            op = operation.name(),
            record = %operation.target(),
            patches = inverse_patches.len(),
            "applied operation"
        );

        Ok(Applied {
            primary: primary.and_then(|id| self.get(&id).cloned()),
            inverse_patches,
        })
    }

    /// Drops every record. Does not touch the journal.
    pub fn clear(&mut self) {
        let identities: Vec<Identity> = self.all_records().map(|r| r.identity.clone()).collect();
        for identity in identities {
            self.write(identity, None);
        }
    }

    // ---------------------------------------------------------------------------
    // Journal
    // ---------------------------------------------------------------------------

    /// Starts recording before-images. A journal that is already open is kept.
    pub fn begin(&mut self) {
        if self.journal.is_none() {
            self.journal = Some(IndexMap::new());
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.journal.is_some()
    }

    /// Restores every record written since `begin` and closes the journal.
    pub fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        let restored = journal.len();
        for (identity, before) in journal.into_iter().rev() {
            self.store_raw(identity, before);
        }
        tracing::debug!(restored, "rolled back record cache");
    }

    /// Reports what changed since `begin` without closing the journal.
    pub fn pending_changes(&self) -> ChangeSet {
        match &self.journal {
            Some(journal) => self.collect_changes(journal),
            None => ChangeSet::default(),
        }
    }

    /// Closes the journal and reports what changed since `begin`.
    pub fn finish(&mut self) -> ChangeSet {
        match self.journal.take() {
            Some(journal) => self.collect_changes(&journal),
            None => ChangeSet::default(),
        }
    }

    fn collect_changes(&self, journal: &IndexMap<Identity, Option<Record>>) -> ChangeSet {
        let changes = journal
            .iter()
            .filter_map(|(identity, before)| {
                let after = self.get(identity).cloned();
                (*before != after).then(|| RecordChange {
                    identity: identity.clone(),
                    before: before.clone(),
                    after,
                })
            })
            .collect();
        ChangeSet { changes }
    }

    fn write(&mut self, identity: Identity, record: Option<Record>) {
        if let Some(journal) = self.journal.as_mut() {
            if !journal.contains_key(&identity) {
                let before = self
                    .records
                    .get(&identity.type_name)
                    .and_then(|t| t.get(&identity.id))
                    .cloned();
                journal.insert(identity.clone(), before);
            }
        }
        self.store_raw(identity, record);
    }

    fn store_raw(&mut self, identity: Identity, record: Option<Record>) {
        match record {
            Some(record) => {
                self.records
                    .entry(identity.type_name)
                    .or_default()
                    .insert(identity.id, record);
            }
            None => {
                if let Some(table) = self.records.get_mut(&identity.type_name) {
                    table.remove(&identity.id);
                    if table.is_empty() {
                        self.records.remove(&identity.type_name);
                    }
                }
            }
        }
    }
}

/// Identities currently held by a relationship field (empty if unset).
fn linked(record: &Record, relationship: &str) -> Vec<Identity> {
    record
        .relationship(relationship)
        .map(RelationshipData::identities)
        .unwrap_or_default()
}

/// Write overlay used to plan one operation without touching the cache.
struct Staging<'a> {
    cache: &'a RecordCache,
    schema: &'a Schema,
    /// Planned writes; `None` marks a removal.
    pending: IndexMap<Identity, Option<Record>>,
    patches: Vec<Operation>,
}

impl<'a> Staging<'a> {
    fn new(cache: &'a RecordCache) -> Self {
        Staging {
            cache,
            schema: &cache.schema,
            pending: IndexMap::new(),
            patches: Vec::new(),
        }
    }

    fn get(&self, identity: &Identity) -> Option<&Record> {
        match self.pending.get(identity) {
            Some(slot) => slot.as_ref(),
            None => self.cache.get(identity),
        }
    }

    fn require(&self, identity: &Identity) -> Result<&Record, CoreError> {
        self.get(identity).ok_or_else(|| CoreError::not_found(identity))
    }

    /// Copies a record into the overlay (once) and hands out the copy.
    fn edit(&mut self, identity: &Identity) -> Result<&mut Record, CoreError> {
        if !self.pending.contains_key(identity) {
            let current = self.cache.get(identity).cloned();
            self.pending.insert(identity.clone(), current);
        }
        self.pending
            .get_mut(identity)
            .and_then(Option::as_mut)
            .ok_or_else(|| CoreError::not_found(identity))
    }

    /// Live identities of one type, as seen through the overlay.
    fn identities_of(&self, type_name: &str) -> Vec<Identity> {
        let mut ids: IndexSet<Identity> = self
            .cache
            .records(type_name)
            .into_iter()
            .map(|r| r.identity.clone())
            .collect();
        ids.extend(
            self.pending
                .keys()
                .filter(|id| id.type_name == type_name)
                .cloned(),
        );
        ids.into_iter().filter(|id| self.get(id).is_some()).collect()
    }

    fn apply(&mut self, operation: &Operation) -> Result<Option<Identity>, CoreError> {
        match operation {
            Operation::AddRecord { record } => self.add_record(record).map(Some),
            Operation::UpdateRecord { record } => self.update_record(record).map(Some),
            Operation::RemoveRecord { record } => {
                self.remove_record(record)?;
                Ok(None)
            }
            Operation::ReplaceKey { record, key, value } => {
                self.require(record)?;
                self.schema.check_key(&record.type_name, key)?;
                self.check_key_unclaimed(record, key, value)?;
                self.edit(record)?.keys.insert(key.clone(), value.clone());
                Ok(Some(record.clone()))
            }
            Operation::ReplaceAttribute {
                record,
                attribute,
                value,
            } => {
                self.require(record)?;
                self.schema
                    .check_attribute(&record.type_name, attribute, value)?;
                self.edit(record)?
                    .attributes
                    .insert(attribute.clone(), value.clone());
                Ok(Some(record.clone()))
            }
            Operation::ReplaceRelatedRecord {
                record,
                relationship,
                related_record,
            } => {
                self.replace_related_record(record, relationship, related_record.as_ref())?;
                Ok(Some(record.clone()))
            }
            Operation::ReplaceRelatedRecords {
                record,
                relationship,
                related_records,
            } => {
                self.replace_related_records(record, relationship, related_records)?;
                Ok(Some(record.clone()))
            }
            Operation::AddToRelatedRecords {
                record,
                relationship,
                related_record,
            } => {
                self.add_to_related_records(record, relationship, related_record)?;
                Ok(Some(record.clone()))
            }
            Operation::RemoveFromRelatedRecords {
                record,
                relationship,
                related_record,
            } => {
                self.remove_from_related_records(record, relationship, related_record)?;
                Ok(Some(record.clone()))
            }
        }
    }

    // ---------------------------------------------------------------------------
    // Record operations
    // ---------------------------------------------------------------------------

    fn add_record(&mut self, record: &Record) -> Result<Identity, CoreError> {
        let schema = self.schema;
        let mut record = record.clone();
        if !record.identity.has_id() {
            record.identity.id = schema.generate_id();
        }
        self.validate_record(&record)?;

        let identity = record.identity.clone();
        let model = schema.model(&identity.type_name)?;
        let previous = self.get(&identity).cloned();
        self.pending.insert(identity.clone(), Some(record.clone()));

        for (name, def) in &model.relationships {
            if def.inverse.is_none() {
                continue;
            }
            let old = previous
                .as_ref()
                .map(|p| linked(p, name))
                .unwrap_or_default();
            let new = linked(&record, name);
            self.sync_inverse(&identity, def, &old, &new)?;
        }
        Ok(identity)
    }

    fn update_record(&mut self, patch: &Record) -> Result<Identity, CoreError> {
        let schema = self.schema;
        let identity = patch.identity.clone();
        let existing = self.require(&identity)?.clone();
        self.validate_record(patch)?;

        let mut merged = existing.clone();
        merged
            .keys
            .extend(patch.keys.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
            .attributes
            .extend(patch.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        for (name, rel) in &patch.relationships {
            merged.relationships.insert(name.clone(), rel.clone());
        }
        self.pending.insert(identity.clone(), Some(merged));

        for (name, rel) in &patch.relationships {
            let def = schema.relationship(&identity.type_name, name)?;
            let old = linked(&existing, name);
            self.sync_inverse(&identity, def, &old, &rel.data.identities())?;
        }
        Ok(identity)
    }

    /// Removes `identity`, cascading to `dependent: remove` relationships and
    /// clearing every reference held by other records.
    fn remove_record(&mut self, identity: &Identity) -> Result<(), CoreError> {
        let schema = self.schema;
        self.require(identity)?;

        let mut queue = vec![identity.clone()];
        let mut removed: HashSet<Identity> = HashSet::new();
        while let Some(next) = queue.pop() {
            if removed.contains(&next) {
                continue;
            }
            let Some(record) = self.get(&next).cloned() else {
                continue;
            };
            let model = schema.model(&next.type_name)?;
            for (name, def) in &model.relationships {
                if def.dependent == Some(Dependent::Remove) {
                    queue.extend(
                        linked(&record, name)
                            .into_iter()
                            .filter(|d| !removed.contains(d)),
                    );
                }
            }

            self.pending.insert(next.clone(), None);
            if &next != identity {
                self.patches.push(Operation::RemoveRecord {
                    record: next.clone(),
                });
            }
            self.clear_references(&next)?;
            removed.insert(next);
        }
        Ok(())
    }

    /// Unlinks `removed` from every field that may reference its type.
    fn clear_references(&mut self, removed: &Identity) -> Result<(), CoreError> {
        let schema = self.schema;
        for (model_name, field) in schema.referencing(&removed.type_name) {
            for holder in self.identities_of(model_name) {
                self.unlink(&holder, field, removed)?;
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Relationship operations
    // ---------------------------------------------------------------------------

    fn replace_related_record(
        &mut self,
        identity: &Identity,
        relationship: &str,
        related: Option<&Identity>,
    ) -> Result<(), CoreError> {
        let def = self.relationship_of(identity, relationship, RelationshipKind::ToOne)?;
        if let Some(related) = related {
            self.check_related(identity, relationship, def, related)?;
        }
        let old: Vec<Identity> = self
            .require(identity)?
            .related_record(relationship)
            .cloned()
            .into_iter()
            .collect();
        let new: Vec<Identity> = related.cloned().into_iter().collect();

        self.edit(identity)?
            .set_relationship(relationship, RelationshipData::ToOne(related.cloned()));
        self.sync_inverse(identity, def, &old, &new)
    }

    fn replace_related_records(
        &mut self,
        identity: &Identity,
        relationship: &str,
        related: &[Identity],
    ) -> Result<(), CoreError> {
        let def = self.relationship_of(identity, relationship, RelationshipKind::ToMany)?;
        for r in related {
            self.check_related(identity, relationship, def, r)?;
        }
        let old = linked(self.require(identity)?, relationship);
        let members: IndexSet<Identity> = related.iter().cloned().collect();
        let new: Vec<Identity> = members.iter().cloned().collect();

        self.edit(identity)?
            .set_relationship(relationship, RelationshipData::ToMany(members));
        self.sync_inverse(identity, def, &old, &new)
    }

    fn add_to_related_records(
        &mut self,
        identity: &Identity,
        relationship: &str,
        related: &Identity,
    ) -> Result<(), CoreError> {
        let def = self.relationship_of(identity, relationship, RelationshipKind::ToMany)?;
        self.check_related(identity, relationship, def, related)?;
        let mut members = match self.require(identity)?.relationship(relationship) {
            Some(RelationshipData::ToMany(set)) => set.clone(),
            _ => IndexSet::new(),
        };
        if !members.insert(related.clone()) {
            return Ok(());
        }

        self.edit(identity)?
            .set_relationship(relationship, RelationshipData::ToMany(members));
        self.sync_inverse(identity, def, &[], std::slice::from_ref(related))
    }

    fn remove_from_related_records(
        &mut self,
        identity: &Identity,
        relationship: &str,
        related: &Identity,
    ) -> Result<(), CoreError> {
        let def = self.relationship_of(identity, relationship, RelationshipKind::ToMany)?;
        if !def.allows(&related.type_name) {
            return Err(type_error(relationship, def, related));
        }
        let present = self
            .require(identity)?
            .relationship(relationship)
            .is_some_and(|d| d.contains(related));
        if !present {
            return Ok(());
        }

        if let Some(data) = self.edit(identity)?.relationship_mut(relationship) {
            data.unlink(related);
        }
        self.sync_inverse(identity, def, std::slice::from_ref(related), &[])
    }

    // ---------------------------------------------------------------------------
    // Inverse synchronization
    // ---------------------------------------------------------------------------

    /// Brings the inverse side of `def` in line with a change of the field
    /// on `source` from `old` to `new`.
    fn sync_inverse(
        &mut self,
        source: &Identity,
        def: &'a RelationshipDef,
        old: &[Identity],
        new: &[Identity],
    ) -> Result<(), CoreError> {
        let Some(inverse) = def.inverse.as_deref() else {
            return Ok(());
        };
        for gone in old.iter().filter(|i| !new.contains(i)) {
            self.unlink(gone, inverse, source)?;
        }
        for joined in new.iter().filter(|i| !old.contains(i)) {
            self.link_inverse(joined, inverse, source)?;
        }
        Ok(())
    }

    /// Makes `holder.field` point at `source`, on `holder`'s concrete type.
    fn link_inverse(
        &mut self,
        holder: &Identity,
        field: &str,
        source: &Identity,
    ) -> Result<(), CoreError> {
        let schema = self.schema;
        let def = schema.relationship(&holder.type_name, field)?;
        if !def.allows(&source.type_name) {
            return Err(type_error(field, def, source));
        }
        let current = self.require(holder)?.relationship(field).cloned();

        match def.kind {
            RelationshipKind::ToMany => {
                let mut members = match current {
                    Some(RelationshipData::ToMany(set)) => set,
                    _ => IndexSet::new(),
                };
                if !members.insert(source.clone()) {
                    return Ok(());
                }
                self.edit(holder)?
                    .set_relationship(field, RelationshipData::ToMany(members));
                self.patches.push(Operation::AddToRelatedRecords {
                    record: holder.clone(),
                    relationship: field.to_string(),
                    related_record: source.clone(),
                });
            }
            RelationshipKind::ToOne => {
                let displaced = match current {
                    Some(RelationshipData::ToOne(Some(previous))) => Some(previous),
                    _ => None,
                };
                if displaced.as_ref() == Some(source) {
                    return Ok(());
                }
                self.edit(holder)?
                    .set_relationship(field, RelationshipData::ToOne(Some(source.clone())));
                self.patches.push(Operation::ReplaceRelatedRecord {
                    record: holder.clone(),
                    relationship: field.to_string(),
                    related_record: Some(source.clone()),
                });
                // The record `holder` used to point at still links back to it.
                if let (Some(previous), Some(back)) = (displaced, def.inverse.as_deref()) {
                    self.unlink(&previous, back, holder)?;
                }
            }
        }
        Ok(())
    }

    /// Removes `target` from `holder.field`, recording the patch.
    fn unlink(
        &mut self,
        holder: &Identity,
        field: &str,
        target: &Identity,
    ) -> Result<(), CoreError> {
        let present = self
            .get(holder)
            .and_then(|r| r.relationship(field))
            .is_some_and(|d| d.contains(target));
        if !present {
            return Ok(());
        }

        let mut to_one = false;
        if let Some(data) = self.edit(holder)?.relationship_mut(field) {
            to_one = matches!(data, RelationshipData::ToOne(_));
            data.unlink(target);
        }
        self.patches.push(if to_one {
            Operation::ReplaceRelatedRecord {
                record: holder.clone(),
                relationship: field.to_string(),
                related_record: None,
            }
        } else {
            Operation::RemoveFromRelatedRecords {
                record: holder.clone(),
                relationship: field.to_string(),
                related_record: target.clone(),
            }
        });
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------------------

    /// Resolves the definition of a relationship on an existing record and
    /// checks its cardinality.
    fn relationship_of(
        &self,
        identity: &Identity,
        relationship: &str,
        kind: RelationshipKind,
    ) -> Result<&'a RelationshipDef, CoreError> {
        let schema = self.schema;
        self.require(identity)?;
        let def = schema.relationship(&identity.type_name, relationship)?;
        if def.kind != kind {
            return Err(CoreError::validation(format!(
                "relationship '{}.{}' is {}",
                identity.type_name,
                relationship,
                kind_label(def.kind)
            )));
        }
        Ok(def)
    }

    /// A related identity must be of an allowed type and must exist.
    fn check_related(
        &self,
        owner: &Identity,
        relationship: &str,
        def: &RelationshipDef,
        related: &Identity,
    ) -> Result<(), CoreError> {
        if !def.allows(&related.type_name) {
            return Err(type_error(relationship, def, related));
        }
        if related != owner {
            self.require(related)?;
        }
        Ok(())
    }

    /// A key value names at most one live record of a type.
    fn check_key_unclaimed(
        &self,
        owner: &Identity,
        key: &str,
        value: &str,
    ) -> Result<(), CoreError> {
        let holder = self
            .identities_of(&owner.type_name)
            .into_iter()
            .filter(|id| id != owner)
            .find(|id| {
                self.get(id)
                    .and_then(|r| r.keys.get(key))
                    .is_some_and(|v| v == value)
            });
        match holder {
            Some(holder) => Err(CoreError::validation(format!(
                "key '{}' = '{}' is already held by {}",
                key, value, holder
            ))),
            None => Ok(()),
        }
    }

    fn validate_record(&self, record: &Record) -> Result<(), CoreError> {
        let schema = self.schema;
        let type_name = &record.identity.type_name;
        let model = schema.model(type_name)?;

        for (key, value) in &record.keys {
            schema.check_key(type_name, key)?;
            self.check_key_unclaimed(&record.identity, key, value)?;
        }
        for (name, value) in &record.attributes {
            schema.check_attribute(type_name, name, value)?;
        }
        for (name, rel) in &record.relationships {
            let def = model.relationships.get(name).ok_or_else(|| {
                CoreError::validation(format!(
                    "relationship '{}' is not defined on model '{}'",
                    name, type_name
                ))
            })?;
            let shape_matches = matches!(
                (def.kind, &rel.data),
                (RelationshipKind::ToOne, RelationshipData::ToOne(_))
                    | (RelationshipKind::ToMany, RelationshipData::ToMany(_))
            );
            if !shape_matches {
                return Err(CoreError::validation(format!(
                    "relationship '{}.{}' is {}",
                    type_name,
                    name,
                    kind_label(def.kind)
                )));
            }
            for related in rel.data.identities() {
                self.check_related(&record.identity, name, def, &related)?;
            }
        }
        Ok(())
    }
}

fn type_error(relationship: &str, def: &RelationshipDef, found: &Identity) -> CoreError {
    CoreError::RelationshipType {
        relationship: relationship.to_string(),
        allowed: def.types.clone(),
        found: found.type_name.clone(),
    }
}

fn kind_label(kind: RelationshipKind) -> &'static str {
    match kind {
        RelationshipKind::ToOne => "to-one",
        RelationshipKind::ToMany => "to-many",
    }
}
