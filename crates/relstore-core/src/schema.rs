//! Schema registry: model definitions for every record type.
//!
//! A [`Schema`] maps type names to [`ModelDef`]s. Each model declares its
//! attributes (with a value kind), its secondary key names, and its
//! relationships. A relationship is to-one or to-many, lists the type(s) it
//! may point at (several types make it polymorphic), and optionally names the
//! inverse field on those types.
//!
//! Schemas can be assembled in Rust with the builder methods or deserialized
//! from JSON:
//!
//! ```json
//! { "models": {
//!     "planet": {
//!       "attributes": { "name": { "type": "string" } },
//!       "relationships": {
//!         "moons": { "kind": "hasMany", "type": "moon", "inverse": "planet" }
//!       }
//!     },
//!     "moon": {
//!       "relationships": {
//!         "planet": { "kind": "hasOne", "type": "planet", "inverse": "moons" }
//!       }
//!     }
//! } }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// Value kind accepted by an attribute. `null` is accepted by every kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    String,
    Number,
    Boolean,
    /// ISO-8601 date, carried as a string.
    Date,
    /// ISO-8601 timestamp, carried as a string.
    DateTime,
    Object,
    Array,
    #[default]
    Any,
}

impl AttributeKind {
    /// True if `value` is acceptable for this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (AttributeKind::Any, _) => true,
            (AttributeKind::String | AttributeKind::Date | AttributeKind::DateTime, v) => {
                v.is_string()
            }
            (AttributeKind::Number, v) => v.is_number(),
            (AttributeKind::Boolean, v) => v.is_boolean(),
            (AttributeKind::Object, v) => v.is_object(),
            (AttributeKind::Array, v) => v.is_array(),
        }
    }
}

/// Definition of one attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    #[serde(rename = "type", default)]
    pub kind: AttributeKind,
}

/// Cardinality of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    #[serde(rename = "hasOne")]
    ToOne,
    #[serde(rename = "hasMany")]
    ToMany,
}

/// What happens to related records when the owner is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dependent {
    /// Remove the related records as well.
    Remove,
}

/// Definition of one relationship field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub kind: RelationshipKind,
    /// Permitted target types. More than one makes the relationship polymorphic.
    #[serde(rename = "type", deserialize_with = "one_or_many")]
    pub types: Vec<String>,
    /// Name of the reciprocal field on every target type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependent: Option<Dependent>,
}

impl RelationshipDef {
    /// A to-one relationship to any of `types`.
    pub fn to_one<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RelationshipDef {
            kind: RelationshipKind::ToOne,
            types: types.into_iter().map(Into::into).collect(),
            inverse: None,
            dependent: None,
        }
    }

    /// A to-many relationship to any of `types`.
    pub fn to_many<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RelationshipDef {
            kind: RelationshipKind::ToMany,
            ..RelationshipDef::to_one(types)
        }
    }

    pub fn inverse(mut self, name: impl Into<String>) -> Self {
        self.inverse = Some(name.into());
        self
    }

    pub fn dependent_remove(mut self) -> Self {
        self.dependent = Some(Dependent::Remove);
        self
    }

    pub fn allows(&self, type_name: &str) -> bool {
        self.types.iter().any(|t| t == type_name)
    }

    pub fn is_polymorphic(&self) -> bool {
        self.types.len() > 1
    }
}

/// Definition of one record type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDef {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeDef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, RelationshipDef>,
    /// Secondary key names that map to this type's ids.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub keys: BTreeSet<String>,
}

impl ModelDef {
    pub fn new() -> Self {
        ModelDef::default()
    }

    pub fn attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.insert(name.into(), AttributeDef { kind });
        self
    }

    pub fn key(mut self, name: impl Into<String>) -> Self {
        self.keys.insert(name.into());
        self
    }

    pub fn relationship(mut self, name: impl Into<String>, def: RelationshipDef) -> Self {
        self.relationships.insert(name.into(), def);
        self
    }
}

/// The registry of all record types known to a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub models: BTreeMap<String, ModelDef>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    /// Builder: registers (or replaces) a model.
    pub fn with_model(mut self, name: impl Into<String>, model: ModelDef) -> Self {
        self.models.insert(name.into(), model);
        self
    }

    /// Parses a schema from its JSON form and validates it.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let schema: Schema = serde_json::from_str(json)
            .map_err(|e| CoreError::schema(format!("invalid schema JSON: {}", e)))?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn has_model(&self, type_name: &str) -> bool {
        self.models.contains_key(type_name)
    }

    /// Looks up a model, failing validation for unknown types.
    pub fn model(&self, type_name: &str) -> Result<&ModelDef, CoreError> {
        self.models
            .get(type_name)
            .ok_or_else(|| CoreError::validation(format!("unknown model '{}'", type_name)))
    }

    /// Looks up a relationship definition on a model.
    pub fn relationship(
        &self,
        type_name: &str,
        relationship: &str,
    ) -> Result<&RelationshipDef, CoreError> {
        self.model(type_name)?
            .relationships
            .get(relationship)
            .ok_or_else(|| {
                CoreError::validation(format!(
                    "relationship '{}' is not defined on model '{}'",
                    relationship, type_name
                ))
            })
    }

    /// Checks a single attribute value against the model.
    pub fn check_attribute(
        &self,
        type_name: &str,
        attribute: &str,
        value: &Value,
    ) -> Result<(), CoreError> {
        let def = self
            .model(type_name)?
            .attributes
            .get(attribute)
            .ok_or_else(|| {
                CoreError::validation(format!(
                    "attribute '{}' is not defined on model '{}'",
                    attribute, type_name
                ))
            })?;
        if !def.kind.accepts(value) {
            return Err(CoreError::validation(format!(
                "attribute '{}.{}' expects {:?}, got {}",
                type_name, attribute, def.kind, value
            )));
        }
        Ok(())
    }

    /// Checks that `key` is a declared secondary key of the model.
    pub fn check_key(&self, type_name: &str, key: &str) -> Result<(), CoreError> {
        if self.model(type_name)?.keys.contains(key) {
            Ok(())
        } else {
            Err(CoreError::validation(format!(
                "key '{}' is not defined on model '{}'",
                key, type_name
            )))
        }
    }

    /// Every `(model, relationship)` pair whose targets include `type_name`.
    ///
    /// This bounds the scan performed when a record of `type_name` is removed.
    pub fn referencing(&self, type_name: &str) -> Vec<(&str, &str)> {
        let mut found = Vec::new();
        for (model_name, model) in &self.models {
            for (rel_name, rel) in &model.relationships {
                if rel.allows(type_name) {
                    found.push((model_name.as_str(), rel_name.as_str()));
                }
            }
        }
        found
    }

    /// Generates a fresh record id.
    pub fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Verifies that every relationship target exists and that inverses are
    /// declared symmetrically on every target type.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (model_name, model) in &self.models {
            for (rel_name, rel) in &model.relationships {
                if rel.types.is_empty() {
                    return Err(CoreError::schema(format!(
                        "relationship '{}.{}' declares no target type",
                        model_name, rel_name
                    )));
                }
                for target in &rel.types {
                    let target_model = self.models.get(target).ok_or_else(|| {
                        CoreError::schema(format!(
                            "relationship '{}.{}' targets unknown model '{}'",
                            model_name, rel_name, target
                        ))
                    })?;

                    let Some(inverse) = &rel.inverse else {
                        continue;
                    };
                    let inverse_def =
                        target_model.relationships.get(inverse).ok_or_else(|| {
                            CoreError::schema(format!(
                                "inverse '{}.{}' of '{}.{}' is not defined",
                                target, inverse, model_name, rel_name
                            ))
                        })?;
                    if !inverse_def.allows(model_name) {
                        return Err(CoreError::schema(format!(
                            "inverse '{}.{}' does not accept '{}'",
                            target, inverse, model_name
                        )));
                    }
                    if inverse_def.inverse.as_deref() != Some(rel_name.as_str()) {
                        return Err(CoreError::schema(format!(
                            "inverse '{}.{}' must name '{}' as its inverse",
                            target, inverse, rel_name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Accepts `"type": "moon"` as well as `"type": ["moon", "asteroid"]`.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(one) => vec![one],
        OneOrMany::Many(many) => many,
    })
}
