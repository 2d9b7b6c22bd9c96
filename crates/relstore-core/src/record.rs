//! Records and relationship payloads.
//!
//! A [`Record`] is an identity plus three maps: secondary keys, attributes
//! and relationships. Relationship data is either a single optional identity
//! (to-one) or an insertion-ordered set of identities (to-many).
//!
//! The JSON shape is `{ "type", "id", "keys", "attributes", "relationships":
//! { name: { "data": ... } } }`; empty maps are omitted.

use std::collections::BTreeMap;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::Identity;

/// Linkage held by one relationship field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    /// Ordered set of related identities.
    ToMany(IndexSet<Identity>),
    /// At most one related identity.
    ToOne(Option<Identity>),
}

impl RelationshipData {
    /// Returns every identity this field links to, in order.
    pub fn identities(&self) -> Vec<Identity> {
        match self {
            RelationshipData::ToMany(set) => set.iter().cloned().collect(),
            RelationshipData::ToOne(one) => one.iter().cloned().collect(),
        }
    }

    /// True if the field links to `identity`.
    pub fn contains(&self, identity: &Identity) -> bool {
        match self {
            RelationshipData::ToMany(set) => set.contains(identity),
            RelationshipData::ToOne(one) => one.as_ref() == Some(identity),
        }
    }

    /// Drops `identity` from the field. Returns true if anything changed.
    pub fn unlink(&mut self, identity: &Identity) -> bool {
        match self {
            RelationshipData::ToMany(set) => set.shift_remove(identity),
            RelationshipData::ToOne(one) => {
                if one.as_ref() == Some(identity) {
                    *one = None;
                    true
                } else {
                    false
                }
            }
        }
    }
}

/// A relationship field as it appears on a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub data: RelationshipData,
}

/// A typed entity with keys, attributes and relationship fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keys: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Relationship>,
}

impl Record {
    /// Creates an empty record. Pass an empty `id` to have one generated on add.
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Record::from_identity(Identity::new(type_name, id))
    }

    /// Creates an empty record for an existing identity.
    pub fn from_identity(identity: Identity) -> Self {
        Record {
            identity,
            keys: BTreeMap::new(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Builder: sets an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Builder: sets a secondary key.
    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.insert(name.into(), value.into());
        self
    }

    /// Builder: sets a to-one relationship.
    pub fn with_related_record(
        mut self,
        name: impl Into<String>,
        related: Option<Identity>,
    ) -> Self {
        self.set_relationship(name, RelationshipData::ToOne(related));
        self
    }

    /// Builder: sets a to-many relationship.
    pub fn with_related_records<I>(mut self, name: impl Into<String>, related: I) -> Self
    where
        I: IntoIterator<Item = Identity>,
    {
        self.set_relationship(name, RelationshipData::ToMany(related.into_iter().collect()));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipData> {
        self.relationships.get(name).map(|r| &r.data)
    }

    pub(crate) fn relationship_mut(&mut self, name: &str) -> Option<&mut RelationshipData> {
        self.relationships.get_mut(name).map(|r| &mut r.data)
    }

    /// Returns the to-one target of `name`, if set.
    pub fn related_record(&self, name: &str) -> Option<&Identity> {
        match self.relationship(name) {
            Some(RelationshipData::ToOne(one)) => one.as_ref(),
            _ => None,
        }
    }

    /// Returns the to-many targets of `name`, if the field is present.
    pub fn related_records(&self, name: &str) -> Option<&IndexSet<Identity>> {
        match self.relationship(name) {
            Some(RelationshipData::ToMany(set)) => Some(set),
            _ => None,
        }
    }

    pub fn set_relationship(&mut self, name: impl Into<String>, data: RelationshipData) {
        self.relationships.insert(name.into(), Relationship { data });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn relationship_data_json_shapes() {
        let one: Relationship = serde_json::from_value(json!({ "data": null })).unwrap();
        assert_eq!(one.data, RelationshipData::ToOne(None));

        let one: Relationship =
            serde_json::from_value(json!({ "data": { "type": "star", "id": "sun" } })).unwrap();
        assert_eq!(
            one.data,
            RelationshipData::ToOne(Some(Identity::new("star", "sun")))
        );

        let many: Relationship = serde_json::from_value(
            json!({ "data": [{ "type": "moon", "id": "io" }, { "type": "moon", "id": "europa" }] }),
        )
        .unwrap();
        assert_eq!(
            many.data.identities(),
            vec![Identity::new("moon", "io"), Identity::new("moon", "europa")]
        );
    }

    #[test]
    fn record_json_snapshot() {
        let record = Record::new("planet", "jupiter")
            .with_attribute("name", "Jupiter")
            .with_related_records("moons", [Identity::new("moon", "io")])
            .with_related_record("sun", None);

        insta::assert_json_snapshot!(record, @r###"
        {
          "type": "planet",
          "id": "jupiter",
          "attributes": {
            "name": "Jupiter"
          },
          "relationships": {
            "moons": {
              "data": [
                {
                  "type": "moon",
                  "id": "io"
                }
              ]
            },
            "sun": {
              "data": null
            }
          }
        }
        "###);
    }

    #[test]
    fn unlink_handles_both_kinds() {
        let io = Identity::new("moon", "io");
        let mut one = RelationshipData::ToOne(Some(io.clone()));
        assert!(one.unlink(&io));
        assert!(!one.unlink(&io));
        assert_eq!(one, RelationshipData::ToOne(None));

        let mut many = RelationshipData::ToMany([io.clone()].into_iter().collect());
        assert!(many.contains(&io));
        assert!(many.unlink(&io));
        assert!(many.identities().is_empty());
    }

    #[test]
    fn missing_maps_deserialize_as_empty() {
        let record: Record = serde_json::from_value(json!({ "type": "moon", "id": "io" })).unwrap();
        assert_eq!(record, Record::new("moon", "io"));
    }
}
