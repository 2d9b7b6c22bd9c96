//! SQLite implementation of [`RecordStore`].
//!
//! [`SqliteStore`] persists records in a SQLite database with WAL mode, one
//! transaction per commit batch, and automatic schema migrations. Records are
//! stored as JSON TEXT keyed by `(record_type, record_id)`.

use rusqlite::{params, Connection, OptionalExtension};

use relstore_core::{Identity, KeyEntry, Record};

use crate::convert::{decode_record, encode_record};
use crate::error::StorageError;
use crate::traits::RecordStore;
use crate::types::{CommitBatch, StoreWrite, StoredState};

/// SQLite-backed implementation of [`RecordStore`].
///
/// Every commit is wrapped in a transaction; if any statement fails the
/// transaction is dropped and rolled back.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path)?;
        Ok(SqliteStore { conn })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore { conn })
    }

    fn load_keys(&self) -> Result<Vec<KeyEntry>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT record_type, key_name, key_value, record_id FROM record_keys
             ORDER BY record_type, key_name, key_value",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(KeyEntry {
                type_name: row.get(0)?,
                key: row.get(1)?,
                value: row.get(2)?,
                id: row.get(3)?,
            })
        })?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
}

impl RecordStore for SqliteStore {
    fn load(&self) -> Result<StoredState, StorageError> {
        let records = {
            let mut stmt = self.conn.prepare_cached(
                "SELECT record_type, record_id, record_json FROM records
                 ORDER BY record_type, record_id",
            )?;
            let rows = stmt.query_map([], |row| {
                let record_type: String = row.get(0)?;
                let record_id: String = row.get(1)?;
                let record_json: String = row.get(2)?;
                Ok((record_type, record_id, record_json))
            })?;
            let mut result = Vec::new();
            for row in rows {
                let (record_type, record_id, record_json) = row?;
                result.push(decode_record(&record_type, &record_id, &record_json)?);
            }
            result
        };
        let keys = self.load_keys()?;
        Ok(StoredState { records, keys })
    }

    fn get_record(&self, identity: &Identity) -> Result<Option<Record>, StorageError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT record_json FROM records WHERE record_type = ?1 AND record_id = ?2",
                params![identity.type_name, identity.id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|json| decode_record(&identity.type_name, &identity.id, &json))
            .transpose()
    }

    fn list_records(&self, type_name: &str) -> Result<Vec<Record>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT record_id, record_json FROM records WHERE record_type = ?1
             ORDER BY record_id",
        )?;
        let rows = stmt.query_map(params![type_name], |row| {
            let record_id: String = row.get(0)?;
            let record_json: String = row.get(1)?;
            Ok((record_id, record_json))
        })?;
        let mut result = Vec::new();
        for row in rows {
            let (record_id, record_json) = row?;
            result.push(decode_record(type_name, &record_id, &record_json)?);
        }
        Ok(result)
    }

    fn commit(&mut self, batch: &CommitBatch) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        {
            let mut put_record = tx.prepare_cached(
                "INSERT OR REPLACE INTO records (record_type, record_id, record_json)
                 VALUES (?1, ?2, ?3)",
            )?;
            let mut delete_record = tx.prepare_cached(
                "DELETE FROM records WHERE record_type = ?1 AND record_id = ?2",
            )?;
            let mut delete_keys_of = tx.prepare_cached(
                "DELETE FROM record_keys WHERE record_type = ?1 AND record_id = ?2",
            )?;
            let mut put_key = tx.prepare_cached(
                "INSERT OR REPLACE INTO record_keys (record_type, key_name, key_value, record_id)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut delete_key = tx.prepare_cached(
                "DELETE FROM record_keys
                 WHERE record_type = ?1 AND key_name = ?2 AND key_value = ?3 AND record_id = ?4",
            )?;

            for write in &batch.writes {
                match write {
                    StoreWrite::PutRecord(record) => {
                        let json = encode_record(record)?;
                        put_record.execute(params![
                            record.identity.type_name,
                            record.identity.id,
                            json
                        ])?;
                    }
                    StoreWrite::DeleteRecord(identity) => {
                        delete_record.execute(params![identity.type_name, identity.id])?;
                        delete_keys_of.execute(params![identity.type_name, identity.id])?;
                    }
                    StoreWrite::PutKey(entry) => {
                        put_key.execute(params![
                            entry.type_name,
                            entry.key,
                            entry.value,
                            entry.id
                        ])?;
                    }
                    StoreWrite::DeleteKey(entry) => {
                        delete_key.execute(params![
                            entry.type_name,
                            entry.key,
                            entry.value,
                            entry.id
                        ])?;
                    }
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM record_keys", [])?;
        tx.execute("DELETE FROM records", [])?;
        tx.commit()?;
        Ok(())
    }
}
