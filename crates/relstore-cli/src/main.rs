//! Record store CLI.
//!
//! Provides the `relstore` binary for working with a SQLite-backed record
//! source from the shell. Every subcommand opens the source with the schema
//! given by `--schema`, so reads and writes go through the same cache and
//! validation the library uses.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Deserialize;

use relstore_core::{Identity, Operation, Schema, Transform, TransformOptions};
use relstore_source::{Source, SourceConfig, SourceError};
use relstore_storage::SqliteStore;

/// Schema-aware record store.
#[derive(Parser)]
#[command(name = "relstore", about = "Schema-aware transactional record store")]
struct Cli {
    /// Path to the schema JSON file.
    #[arg(short, long, global = true)]
    schema: Option<PathBuf>,

    /// Database file (default: RELSTORE_DB_PATH or ./relstore.db).
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Apply a transform read from a JSON file.
    Apply {
        /// A transform object or a bare array of operations.
        transform: PathBuf,

        /// Print `{data, details, transform}` instead of just the data.
        #[arg(long)]
        full_response: bool,

        /// Fail when a removed record does not exist.
        #[arg(long)]
        raise_not_found: bool,
    },
    /// Print one record.
    Get { type_name: String, id: String },
    /// Print every record of a type.
    List { type_name: String },
    /// Look a record up by secondary key.
    Find {
        type_name: String,
        key: String,
        value: String,
    },
    /// Delete every record and key.
    Reset,
}

/// Contents of a transform file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TransformFile {
    Operations(Vec<Operation>),
    Transform {
        #[serde(default)]
        id: Option<String>,
        operations: Vec<Operation>,
        #[serde(default)]
        options: TransformOptions,
    },
}

impl TransformFile {
    fn into_transform(self) -> Transform {
        match self {
            TransformFile::Operations(operations) => Transform::new(operations),
            TransformFile::Transform {
                id,
                operations,
                options,
            } => {
                let transform = Transform::new(operations).with_options(options);
                match id {
                    Some(id) => transform.with_id(id),
                    None => transform,
                }
            }
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = SourceConfig::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let Some(schema_path) = cli.schema else {
        eprintln!("Error: --schema <PATH> is required");
        process::exit(3);
    };
    let source = match open_source(&schema_path, config) {
        Ok(source) => source,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            process::exit(3);
        }
    };

    let exit_code = match cli.command {
        Commands::Apply {
            transform,
            full_response,
            raise_not_found,
        } => run_apply(&source, &transform, full_response, raise_not_found).await,
        Commands::Get { type_name, id } => run_get(&source, Identity::new(type_name, id)).await,
        Commands::List { type_name } => run_list(&source, &type_name).await,
        Commands::Find {
            type_name,
            key,
            value,
        } => run_find(&source, &type_name, &key, &value).await,
        Commands::Reset => run_reset(&source).await,
    };
    process::exit(exit_code);
}

fn read_schema(path: &Path) -> Result<Schema, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read schema '{}': {}", path.display(), e))?;
    Schema::from_json(&text).map_err(|e| format!("invalid schema '{}': {}", path.display(), e))
}

fn read_transform(path: &Path) -> Result<Transform, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read transform '{}': {}", path.display(), e))?;
    let file: TransformFile = serde_json::from_str(&text)
        .map_err(|e| format!("invalid transform '{}': {}", path.display(), e))?;
    Ok(file.into_transform())
}

fn open_source(schema_path: &Path, config: SourceConfig) -> Result<Source<SqliteStore>, String> {
    let schema = read_schema(schema_path)?;
    let store = SqliteStore::new(&config.db_path)
        .map_err(|e| format!("failed to open database '{}': {}", config.db_path, e))?;
    Source::open(schema, store, config).map_err(|e| e.to_string())
}

fn print_json<T: serde::Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
    println!("{}", json);
}

/// Execute the apply subcommand.
///
/// Returns exit code: 0 = committed, 1 = rejected by the cache,
/// 2 = removed record not found, 3 = I/O or storage error.
async fn run_apply(
    source: &Source<SqliteStore>,
    path: &Path,
    full_response: bool,
    raise_not_found: bool,
) -> i32 {
    let mut transform = match read_transform(path) {
        Ok(t) => t,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return 3;
        }
    };
    if full_response {
        transform.options.full_response = Some(true);
    }
    if raise_not_found {
        transform.options.raise_not_found_exceptions = Some(true);
    }
    tracing::debug!(
        transform = %transform.id,
        operations = transform.len(),
        file = %path.display(),
        "applying transform file"
    );

    match source.update_transform(transform).await {
        Ok(outcome) => {
            print_json(&outcome);
            0
        }
        Err(e @ (SourceError::Transaction { .. } | SourceError::Storage(_))) => {
            eprintln!("Storage error: {}", e);
            3
        }
        Err(e) if e.is_not_found() => {
            eprintln!("{}", e);
            2
        }
        Err(e) => {
            eprintln!("Update rejected: {}", e);
            1
        }
    }
}

async fn run_get(source: &Source<SqliteStore>, identity: Identity) -> i32 {
    match source.get(&identity).await {
        Some(record) => {
            print_json(&record);
            0
        }
        None => {
            eprintln!("Record not found: {}", identity);
            2
        }
    }
}

async fn run_list(source: &Source<SqliteStore>, type_name: &str) -> i32 {
    if !source.schema().has_model(type_name) {
        eprintln!("Error: unknown model '{}'", type_name);
        return 1;
    }
    print_json(&source.get_all(type_name).await);
    0
}

async fn run_find(source: &Source<SqliteStore>, type_name: &str, key: &str, value: &str) -> i32 {
    match source.find_by_key(type_name, key, value).await {
        Some(record) => {
            print_json(&record);
            0
        }
        None => {
            eprintln!("No {} with {} = {}", type_name, key, value);
            2
        }
    }
}

async fn run_reset(source: &Source<SqliteStore>) -> i32 {
    match source.reset().await {
        Ok(()) => {
            tracing::info!(db = %source.config().db_path, "database reset");
            0
        }
        Err(e) => {
            eprintln!("Storage error: {}", e);
            3
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"{
        "models": {
            "planet": {
                "attributes": { "name": { "type": "string" } },
                "relationships": {
                    "moons": { "kind": "hasMany", "type": "moon", "inverse": "planet" }
                }
            },
            "moon": {
                "relationships": {
                    "planet": { "kind": "hasOne", "type": "planet", "inverse": "moons" }
                }
            }
        }
    }"#;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn transform_file_accepts_bare_operations() {
        let file: TransformFile = serde_json::from_str(
            r#"[{ "op": "addRecord", "record": { "type": "planet", "id": "earth" } }]"#,
        )
        .unwrap();
        let transform = file.into_transform();
        assert_eq!(transform.len(), 1);
        assert!(!transform.id.is_empty());
    }

    #[test]
    fn transform_file_keeps_id_and_options() {
        let file: TransformFile = serde_json::from_str(
            r#"{
                "id": "t-1",
                "operations": [{ "op": "removeRecord", "record": { "type": "planet", "id": "pluto" } }],
                "options": { "raiseNotFoundExceptions": true }
            }"#,
        )
        .unwrap();
        let transform = file.into_transform();
        assert_eq!(transform.id, "t-1");
        assert!(transform.options.raises_not_found());
    }

    #[tokio::test]
    async fn apply_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let schema = write(dir.path(), "schema.json", SCHEMA);
        let ops = write(
            dir.path(),
            "ops.json",
            r#"[
                { "op": "addRecord", "record": { "type": "planet", "id": "earth",
                  "attributes": { "name": "Earth" } } },
                { "op": "addRecord", "record": { "type": "moon", "id": "luna",
                  "relationships": { "planet": { "data": { "type": "planet", "id": "earth" } } } } }
            ]"#,
        );
        let config = SourceConfig {
            db_path: dir.path().join("test.db").to_str().unwrap().to_string(),
            ..SourceConfig::default()
        };

        let source = open_source(&schema, config.clone()).unwrap();
        assert_eq!(run_apply(&source, &ops, false, false).await, 0);
        drop(source);

        let source = open_source(&schema, config).unwrap();
        let earth = source.get(&Identity::new("planet", "earth")).await.unwrap();
        assert_eq!(earth.related_records("moons").map(|m| m.len()), Some(1));
        assert_eq!(run_get(&source, Identity::new("moon", "ganymede")).await, 2);
        assert_eq!(run_list(&source, "comet").await, 1);
    }

    #[tokio::test]
    async fn missing_removal_exits_with_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let schema = write(dir.path(), "schema.json", SCHEMA);
        let ops = write(
            dir.path(),
            "ops.json",
            r#"[{ "op": "removeRecord", "record": { "type": "planet", "id": "vulcan" } }]"#,
        );
        let config = SourceConfig {
            db_path: dir.path().join("test.db").to_str().unwrap().to_string(),
            ..SourceConfig::default()
        };
        let source = open_source(&schema, config).unwrap();
        assert_eq!(run_apply(&source, &ops, false, true).await, 2);
        assert_eq!(run_apply(&source, &ops, false, false).await, 0);

        let bad = write(
            dir.path(),
            "bad.json",
            r#"[{ "op": "addRecord", "record": { "type": "comet", "id": "halley" } }]"#,
        );
        assert_eq!(run_apply(&source, &bad, false, false).await, 1);

        assert_eq!(run_reset(&source).await, 0);
        assert_eq!(source.record_count().await, 0);
    }
}
