//! relstore-core: records, schema, operations and the in-memory record cache.
//!
//! Everything in this crate is synchronous and free of I/O. Durable storage
//! lives in `relstore-storage`; the async update path in `relstore-source`.

pub mod cache;
pub mod error;
pub mod id;
pub mod identity_map;
pub mod operation;
pub mod record;
pub mod schema;
pub mod transform;

// Re-export commonly used types
pub use cache::{Applied, ChangeSet, RecordCache, RecordChange};
pub use error::CoreError;
pub use id::Identity;
pub use identity_map::{IdentityMap, KeyChanges, KeyEntry};
pub use operation::Operation;
pub use record::{Record, Relationship, RelationshipData};
pub use schema::{
    AttributeDef, AttributeKind, Dependent, ModelDef, RelationshipDef, RelationshipKind, Schema,
};
pub use transform::{IntoOperations, Transform, TransformBuilder, TransformOptions};
