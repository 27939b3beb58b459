//! SQLite persistence for datasets and harvest runs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use esgf_core::error::StorageError;
use esgf_core::{Dataset, Result, RunSnapshot};

/// Schema version written to `store_meta`.
const SCHEMA_VERSION: i64 = 1;

/// Default busy timeout.
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Transactional key/value tables for datasets and run snapshots.
///
/// Each call opens its own connection and transaction, so calls never
/// serialize on each other inside the process; SQLite's WAL journal and busy
/// timeout arbitrate between concurrent writers.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Database {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let db = Self {
            path,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        };
        let mut connection = db.connection()?;
        initialize_schema(&mut connection)?;
        debug!(path = %db.path.display(), "dataset database ready");
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========================================================================
    // Datasets
    // ========================================================================

    pub fn load_dataset(&self, instance_id: &str) -> Result<Option<Dataset>> {
        let connection = self.connection()?;
        let payload: Option<String> = connection
            .query_row(
                "SELECT payload FROM datasets WHERE instance_id = ?1",
                params![instance_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        payload.map(|json| decode(&json)).transpose()
    }

    pub fn save_dataset(&self, dataset: &Dataset) -> Result<()> {
        let payload = encode(dataset)?;
        self.in_transaction(|tx| {
            tx.execute(
                "INSERT INTO datasets (instance_id, payload, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(instance_id) DO UPDATE SET
                    payload = excluded.payload,
                    updated_at = excluded.updated_at",
                params![dataset.instance_id(), payload, Utc::now().to_rfc3339()],
            )
            .map_err(db_error)?;
            Ok(())
        })
    }

    /// Delete a dataset, returning the stored value.
    pub fn delete_dataset(&self, instance_id: &str) -> Result<Option<Dataset>> {
        self.in_transaction(|tx| {
            let payload: Option<String> = tx
                .query_row(
                    "SELECT payload FROM datasets WHERE instance_id = ?1",
                    params![instance_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_error)?;
            if payload.is_some() {
                tx.execute(
                    "DELETE FROM datasets WHERE instance_id = ?1",
                    params![instance_id],
                )
                .map_err(db_error)?;
            }
            payload.map(|json| decode(&json)).transpose()
        })
    }

    pub fn dataset_count(&self) -> Result<u64> {
        let connection = self.connection()?;
        let count: i64 = connection
            .query_row("SELECT COUNT(*) FROM datasets", [], |row| row.get(0))
            .map_err(db_error)?;
        Ok(count as u64)
    }

    // ========================================================================
    // Harvest Runs
    // ========================================================================

    pub fn save_run(&self, snapshot: &RunSnapshot) -> Result<()> {
        let payload = encode(snapshot)?;
        self.in_transaction(|tx| {
            tx.execute(
                "INSERT INTO harvest_runs (run_id, status, payload, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(run_id) DO UPDATE SET
                    status = excluded.status,
                    payload = excluded.payload,
                    updated_at = excluded.updated_at",
                params![
                    snapshot.run_id,
                    snapshot.status.to_string(),
                    payload,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(db_error)?;
            Ok(())
        })
    }

    pub fn load_run(&self, run_id: &str) -> Result<Option<RunSnapshot>> {
        let connection = self.connection()?;
        let payload: Option<String> = connection
            .query_row(
                "SELECT payload FROM harvest_runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        payload.map(|json| decode(&json)).transpose()
    }

    /// Ids of every stored run, most recently updated first.
    pub fn list_runs(&self) -> Result<Vec<String>> {
        let connection = self.connection()?;
        let mut statement = connection
            .prepare("SELECT run_id FROM harvest_runs ORDER BY updated_at DESC")
            .map_err(db_error)?;
        let rows = statement
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_error)
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    fn connection(&self) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let connection = Connection::open_with_flags(&self.path, flags).map_err(db_error)?;
        connection
            .busy_timeout(self.busy_timeout)
            .map_err(db_error)?;
        connection
            .execute_batch("PRAGMA journal_mode = wal; PRAGMA synchronous = normal;")
            .map_err(db_error)?;
        Ok(connection)
    }

    /// Run `f` in a transaction: commit on success, roll back and propagate
    /// on failure.
    fn in_transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut connection = self.connection()?;
        let tx = connection.transaction().map_err(db_error)?;
        match f(&tx) {
            Ok(value) => {
                tx.commit().map_err(db_error)?;
                Ok(value)
            }
            Err(err) => {
                warn!(error = %err, "rolling back transaction");
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

fn initialize_schema(connection: &mut Connection) -> Result<()> {
    let tx = connection.transaction().map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(db_error)?;

    match version {
        None => {
            tx.execute(
                "INSERT INTO store_meta (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )
            .map_err(db_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS datasets (
                    instance_id TEXT PRIMARY KEY NOT NULL,
                    payload TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS harvest_runs (
                    run_id TEXT PRIMARY KEY NOT NULL,
                    status TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );",
            )
            .map_err(db_error)?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(StorageError::Database {
                message: format!("unsupported schema version {}", other),
            }
            .into());
        }
    }

    tx.commit().map_err(db_error)?;
    Ok(())
}

fn encode<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| {
        StorageError::Serialization {
            message: e.to_string(),
        }
        .into()
    })
}

fn decode<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| {
        StorageError::Serialization {
            message: e.to_string(),
        }
        .into()
    })
}

/// Map a rusqlite failure into the engine's storage taxonomy.
pub(crate) fn db_error(err: rusqlite::Error) -> esgf_core::Error {
    StorageError::Database {
        message: err.to_string(),
    }
    .into()
}
