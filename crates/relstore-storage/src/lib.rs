//! Durable storage for relstore records.
//!
//! Provides the [`RecordStore`] trait defining the storage contract, plus
//! [`InMemoryStore`] and [`SqliteStore`] as first-class backends.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`types`]: CommitBatch, StoreWrite and StoredState
//! - [`traits`]: RecordStore trait definition
//! - [`convert`]: record <-> JSON text conversions
//! - [`memory`]: InMemoryStore implementation
//! - [`schema`]: SQL migrations and connection setup
//! - [`sqlite`]: SqliteStore implementation

pub mod convert;
pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;
pub mod types;

// Re-export key types for ergonomic use.
pub use error::StorageError;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::RecordStore;
pub use types::{CommitBatch, StoreWrite, StoredState};
