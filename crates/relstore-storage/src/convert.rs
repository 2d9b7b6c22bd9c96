//! Conversions between records and their stored JSON text.
//!
//! Records are stored whole as JSON. Decoding checks that the embedded
//! identity matches the row it was read from.

use relstore_core::{Identity, Record};

use crate::error::StorageError;

/// Serializes a record for storage.
pub fn encode_record(record: &Record) -> Result<String, StorageError> {
    Ok(serde_json::to_string(record)?)
}

/// Deserializes a stored record and checks it against the row's identity.
pub fn decode_record(type_name: &str, id: &str, json: &str) -> Result<Record, StorageError> {
    let record: Record = serde_json::from_str(json)?;
    if record.identity.type_name != type_name || record.identity.id != id {
        return Err(StorageError::IntegrityError {
            reason: format!(
                "row {} holds record {}",
                Identity::new(type_name, id),
                record.identity
            ),
        });
    }
    Ok(record)
}
