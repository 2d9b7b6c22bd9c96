//! Transforms: ordered batches of operations with options.
//!
//! A [`Transform`] is what gets committed as one unit. Callers usually build
//! one through [`Transform::build`], whose callback receives a
//! [`TransformBuilder`] and returns one operation or a list of them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::Identity;
use crate::operation::Operation;
use crate::record::Record;

/// Options attached to a transform.
///
/// The two recognized options are optional so that a caller's options can be
/// layered over store defaults; everything else lands in `custom` and is only
/// meaningful to hooks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raise_not_found_exceptions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_response: Option<bool>,
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl TransformOptions {
    pub fn new() -> Self {
        TransformOptions::default()
    }

    pub fn with_raise_not_found_exceptions(mut self, raise: bool) -> Self {
        self.raise_not_found_exceptions = Some(raise);
        self
    }

    pub fn with_full_response(mut self, full: bool) -> Self {
        self.full_response = Some(full);
        self
    }

    /// Adds a caller-defined option for hooks to inspect.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    /// Whether removing a missing record fails the transform. Defaults to false.
    pub fn raises_not_found(&self) -> bool {
        self.raise_not_found_exceptions.unwrap_or(false)
    }

    /// Whether the caller asked for `{data, details, transform}`. Defaults to false.
    pub fn wants_full_response(&self) -> bool {
        self.full_response.unwrap_or(false)
    }

    /// Looks up a caller-defined option.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.custom.get(key)
    }

    /// Returns these options with unset values filled from `defaults`.
    pub fn layered_over(mut self, defaults: &TransformOptions) -> Self {
        if self.raise_not_found_exceptions.is_none() {
            self.raise_not_found_exceptions = defaults.raise_not_found_exceptions;
        }
        if self.full_response.is_none() {
            self.full_response = defaults.full_response;
        }
        for (key, value) in &defaults.custom {
            self.custom
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }
}

/// An ordered batch of operations committed as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub id: String,
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub options: TransformOptions,
}

impl Transform {
    /// Creates a transform with a fresh id.
    pub fn new(operations: Vec<Operation>) -> Self {
        Transform {
            id: uuid::Uuid::new_v4().to_string(),
            operations,
            options: TransformOptions::default(),
        }
    }

    /// Builds a transform from a callback over a [`TransformBuilder`].
    pub fn build<F, O>(build: F, options: TransformOptions) -> Self
    where
        F: FnOnce(&TransformBuilder) -> O,
        O: IntoOperations,
    {
        let operations = build(&TransformBuilder).into_operations();
        Transform::new(operations).with_options(options)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_options(mut self, options: TransformOptions) -> Self {
        self.options = options;
        self
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Anything a transform callback may return.
pub trait IntoOperations {
    fn into_operations(self) -> Vec<Operation>;
}

impl IntoOperations for Operation {
    fn into_operations(self) -> Vec<Operation> {
        vec![self]
    }
}

impl IntoOperations for Vec<Operation> {
    fn into_operations(self) -> Vec<Operation> {
        self
    }
}

impl<const N: usize> IntoOperations for [Operation; N] {
    fn into_operations(self) -> Vec<Operation> {
        self.into()
    }
}

/// Constructors for every [`Operation`] variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformBuilder;

impl TransformBuilder {
    pub fn add_record(&self, record: Record) -> Operation {
        Operation::AddRecord { record }
    }

    pub fn update_record(&self, record: Record) -> Operation {
        Operation::UpdateRecord { record }
    }

    pub fn remove_record(&self, record: Identity) -> Operation {
        Operation::RemoveRecord { record }
    }

    pub fn replace_key(
        &self,
        record: Identity,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Operation {
        Operation::ReplaceKey {
            record,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn replace_attribute(
        &self,
        record: Identity,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> Operation {
        Operation::ReplaceAttribute {
            record,
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn replace_related_record(
        &self,
        record: Identity,
        relationship: impl Into<String>,
        related_record: Option<Identity>,
    ) -> Operation {
        Operation::ReplaceRelatedRecord {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }

    pub fn replace_related_records(
        &self,
        record: Identity,
        relationship: impl Into<String>,
        related_records: Vec<Identity>,
    ) -> Operation {
        Operation::ReplaceRelatedRecords {
            record,
            relationship: relationship.into(),
            related_records,
        }
    }

    pub fn add_to_related_records(
        &self,
        record: Identity,
        relationship: impl Into<String>,
        related_record: Identity,
    ) -> Operation {
        Operation::AddToRelatedRecords {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }

    pub fn remove_from_related_records(
        &self,
        record: Identity,
        relationship: impl Into<String>,
        related_record: Identity,
    ) -> Operation {
        Operation::RemoveFromRelatedRecords {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_accepts_single_operation_or_list() {
        let one = Transform::build(
            |t| t.add_record(Record::new("moon", "io")),
            TransformOptions::new(),
        );
        assert_eq!(one.len(), 1);

        let many = Transform::build(
            |t| {
                vec![
                    t.add_record(Record::new("moon", "io")),
                    t.remove_record(Identity::new("moon", "europa")),
                ]
            },
            TransformOptions::new(),
        );
        assert_eq!(many.len(), 2);
        assert_ne!(one.id, many.id);
    }

    #[test]
    fn options_layer_over_defaults() {
        let defaults = TransformOptions::new()
            .with_raise_not_found_exceptions(true)
            .with_option("source", "remote");
        let options = TransformOptions::new()
            .with_full_response(true)
            .with_option("source", "local")
            .layered_over(&defaults);

        assert!(options.raises_not_found());
        assert!(options.wants_full_response());
        assert_eq!(options.get("source"), Some(&json!("local")));
    }

    #[test]
    fn options_json_flattens_custom_keys() {
        let options: TransformOptions = serde_json::from_value(json!({
            "raiseNotFoundExceptions": true,
            "fetchCanonical": "planet"
        }))
        .unwrap();
        assert!(options.raises_not_found());
        assert!(!options.wants_full_response());
        assert_eq!(options.get("fetchCanonical"), Some(&json!("planet")));
    }
}
