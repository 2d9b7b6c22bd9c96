//! Record identity.
//!
//! An [`Identity`] is the `(type, id)` pair that names exactly one record in a
//! store. The type half doubles as the runtime tag used to resolve
//! polymorphic relationships against the concrete model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The `(type, id)` pair uniquely naming a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    /// Model name the record belongs to.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Record id, unique within its type.
    pub id: String,
}

impl Identity {
    /// Creates an identity from a type name and an id.
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Identity {
            type_name: type_name.into(),
            id: id.into(),
        }
    }

    /// True when the caller left the id for the store to generate.
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.id)
    }
}
