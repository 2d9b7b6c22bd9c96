//! Record operations.
//!
//! [`Operation`] is the closed set of mutations a transform may carry. Every
//! variant names the identity it targets; the cache dispatches on the variant
//! with an exhaustive match. The JSON form is tagged by `op`:
//!
//! ```json
//! { "op": "replaceRelatedRecord",
//!   "record": { "type": "planet", "id": "p1" },
//!   "relationship": "sun",
//!   "relatedRecord": { "type": "star", "id": "s1" } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::Identity;
use crate::record::Record;

/// One mutation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Operation {
    /// Adds a record, replacing any record with the same identity.
    AddRecord { record: Record },
    /// Merges keys and attributes into an existing record and replaces the
    /// relationships it names.
    UpdateRecord { record: Record },
    /// Removes a record and every reference to it.
    RemoveRecord { record: Identity },
    /// Sets one secondary key.
    ReplaceKey {
        record: Identity,
        key: String,
        value: String,
    },
    /// Sets one attribute.
    ReplaceAttribute {
        record: Identity,
        attribute: String,
        value: Value,
    },
    /// Sets (or clears) a to-one relationship.
    ReplaceRelatedRecord {
        record: Identity,
        relationship: String,
        related_record: Option<Identity>,
    },
    /// Replaces the full membership of a to-many relationship.
    ReplaceRelatedRecords {
        record: Identity,
        relationship: String,
        related_records: Vec<Identity>,
    },
    /// Adds one member to a to-many relationship.
    AddToRelatedRecords {
        record: Identity,
        relationship: String,
        related_record: Identity,
    },
    /// Removes one member from a to-many relationship.
    RemoveFromRelatedRecords {
        record: Identity,
        relationship: String,
        related_record: Identity,
    },
}

impl Operation {
    /// The identity this operation targets.
    pub fn target(&self) -> &Identity {
        match self {
            Operation::AddRecord { record } | Operation::UpdateRecord { record } => {
                &record.identity
            }
            Operation::RemoveRecord { record }
            | Operation::ReplaceKey { record, .. }
            | Operation::ReplaceAttribute { record, .. }
            | Operation::ReplaceRelatedRecord { record, .. }
            | Operation::ReplaceRelatedRecords { record, .. }
            | Operation::AddToRelatedRecords { record, .. }
            | Operation::RemoveFromRelatedRecords { record, .. } => record,
        }
    }

    /// Wire name of the operation, as used in the `op` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::AddRecord { .. } => "addRecord",
            Operation::UpdateRecord { .. } => "updateRecord",
            Operation::RemoveRecord { .. } => "removeRecord",
            Operation::ReplaceKey { .. } => "replaceKey",
            Operation::ReplaceAttribute { .. } => "replaceAttribute",
            Operation::ReplaceRelatedRecord { .. } => "replaceRelatedRecord",
            Operation::ReplaceRelatedRecords { .. } => "replaceRelatedRecords",
            Operation::AddToRelatedRecords { .. } => "addToRelatedRecords",
            Operation::RemoveFromRelatedRecords { .. } => "removeFromRelatedRecords",
        }
    }

    pub fn is_remove_record(&self) -> bool {
        matches!(self, Operation::RemoveRecord { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_json_is_tagged_camel_case() {
        let op = Operation::ReplaceRelatedRecord {
            record: Identity::new("planet", "p1"),
            relationship: "sun".into(),
            related_record: Some(Identity::new("star", "s1")),
        };
        insta::assert_json_snapshot!(op, @r###"
        {
          "op": "replaceRelatedRecord",
          "record": {
            "type": "planet",
            "id": "p1"
          },
          "relationship": "sun",
          "relatedRecord": {
            "type": "star",
            "id": "s1"
          }
        }
        "###);
    }

    #[test]
    fn operation_parses_from_json() {
        let op: Operation = serde_json::from_value(json!({
            "op": "addToRelatedRecords",
            "record": { "type": "planet", "id": "p1" },
            "relationship": "moons",
            "relatedRecord": { "type": "moon", "id": "m1" }
        }))
        .unwrap();
        assert_eq!(op.name(), "addToRelatedRecords");
        assert_eq!(op.target(), &Identity::new("planet", "p1"));
    }

    #[test]
    fn target_of_record_payloads() {
        let op = Operation::AddRecord {
            record: Record::new("moon", "io"),
        };
        assert_eq!(op.target(), &Identity::new("moon", "io"));
        assert!(!op.is_remove_record());
        assert!(Operation::RemoveRecord {
            record: Identity::new("moon", "io")
        }
        .is_remove_record());
    }
}
