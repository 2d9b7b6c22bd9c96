//! Core error types for relstore-core.
//!
//! Uses `thiserror` for structured, matchable variants covering every way an
//! operation can be rejected before it touches the cache, plus schema
//! consistency failures.

use thiserror::Error;

use crate::id::Identity;

/// Errors produced by the schema registry and the record cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An operation targeted (or referenced) a record that is not cached.
    #[error("Record not found: {identity}")]
    RecordNotFound { identity: Identity },

    /// A record, attribute or relationship payload is malformed.
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// A relationship payload names a type the schema does not allow.
    #[error(
        "relationship type error: '{relationship}' accepts [{allowed}], got '{found}'",
        allowed = allowed.join(", ")
    )]
    RelationshipType {
        relationship: String,
        allowed: Vec<String>,
        found: String,
    },

    /// The schema itself is inconsistent.
    #[error("schema error: {reason}")]
    Schema { reason: String },
}

impl CoreError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        CoreError::Validation {
            reason: reason.into(),
        }
    }

    pub(crate) fn schema(reason: impl Into<String>) -> Self {
        CoreError::Schema {
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(identity: &Identity) -> Self {
        CoreError::RecordNotFound {
            identity: identity.clone(),
        }
    }

    /// True for the not-found class of failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::RecordNotFound { .. })
    }
}
