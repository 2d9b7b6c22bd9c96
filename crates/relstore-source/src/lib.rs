//! The async update path of relstore.
//!
//! [`Source`] is the entry point: it builds transforms, runs `before_update`
//! observers, drives the [`coordinator`] and resolves the caller-visible
//! result through [`hints`].
//!
//! # Modules
//!
//! - [`config`]: SourceConfig, read from the environment
//! - [`coordinator`]: atomic apply-and-commit of one transform
//! - [`error`]: SourceError
//! - [`hints`]: hint bundle, result shapes and resolution
//! - [`observer`]: lifecycle observers
//! - [`source`]: the Source facade

pub mod config;
pub mod coordinator;
pub mod error;
pub mod hints;
pub mod observer;
pub mod source;

pub use config::SourceConfig;
pub use coordinator::{SourceState, TransformLog, TransformReport};
pub use error::SourceError;
pub use hints::{FullResponse, HintValue, Hints, RecordOrAbsent, UpdateData, UpdateOutcome};
pub use observer::{on_before_update, ObserverList, UpdateObserver};
pub use source::Source;
