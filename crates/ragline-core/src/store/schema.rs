//! Vector store schema and lifecycle

use crate::error::{RaglineError, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Persisted chunk + embedding store
///
/// The connection sits behind a mutex so the store can be shared between
/// request handlers; it is only held for synchronous SQLite work.
pub struct VectorStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

const SCHEMA_VERSION: i32 = 2;

const CREATE_TABLES: &str = r#"
-- Document windows
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    page INTEGER,
    start_index INTEGER NOT NULL,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- One embedding per chunk
CREATE TABLE IF NOT EXISTS embeddings (
    chunk_id TEXT PRIMARY KEY REFERENCES chunks(id) ON DELETE CASCADE,
    model TEXT NOT NULL,
    embedding BLOB NOT NULL
);

-- Model metadata for dimension validation
CREATE TABLE IF NOT EXISTS model_metadata (
    model TEXT PRIMARY KEY,
    dimensions INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    last_used_at TEXT NOT NULL
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source);
"#;

impl VectorStore {
    /// Open store database at path, creating if necessary
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Open the store file inside a data directory
    pub fn open_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open(dir.as_ref().join(crate::STORE_FILE_NAME))
    }

    /// Open in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RaglineError::Index("vector store lock poisoned".to_string()))
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        let existing: Option<i32> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .ok()
            .flatten();
        conn.execute_batch(CREATE_TABLES)?;
        if let Some(version) = existing.filter(|v| *v < 2) {
            tracing::info!("Migrating vector store schema from version {}", version);
            migrate_to_v2(&conn)?;
        }
        conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> Result<Option<i32>> {
        let conn = self.conn()?;
        let version = conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .ok();
        Ok(version)
    }
}

/// Version 2 records the page a chunk came from
fn migrate_to_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch("ALTER TABLE chunks ADD COLUMN page INTEGER;")?;
    Ok(())
}

/// Remove a persisted store directory
///
/// Returns `Ok(true)` when something was removed. A directory held open by
/// another process is reported and left in place so ingestion can continue.
pub fn clear_store_dir(dir: &Path) -> Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }

    match std::fs::remove_dir_all(dir) {
        Ok(()) => {
            tracing::info!("Existing vector store at {:?} has been cleared", dir);
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::warn!(
                "Could not delete the vector store at {:?} because it is in use by another process; proceeding with the existing directory",
                dir
            );
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
