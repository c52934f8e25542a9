//! Durable whole-collection snapshot store.
//!
//! Every mutation persists the full collection for its kind as one JSON
//! document replaced atomically, so a crash mid-write can never leave a
//! partially updated record. SQLite gives the atomic replace via a
//! transactional UPSERT on a single-row-per-kind table.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::warn;

use super::data_dir;
use crate::error::StoreError;

/// Which collection a snapshot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    Alarms,
    Records,
    Stats,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Alarms => "alarms",
            SnapshotKind::Records => "records",
            SnapshotKind::Stats => "stats",
        }
    }
}

/// Key-value snapshot storage. One value per kind, replaced wholesale.
pub trait SnapshotStore: Send + Sync {
    fn load(&self, kind: SnapshotKind) -> Result<Option<Vec<u8>>, StoreError>;
    fn save(&self, kind: SnapshotKind, bytes: &[u8]) -> Result<(), StoreError>;
}

/// Serialize and save, retrying once on failure.
///
/// A write that fails twice is logged and dropped; the in-memory state
/// remains authoritative and the next successful mutation rewrites the
/// whole snapshot anyway.
pub(crate) fn save_with_retry<T: Serialize>(
    store: &dyn SnapshotStore,
    kind: SnapshotKind,
    value: &T,
) {
    let bytes = match serde_json::to_vec(value) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(kind = kind.as_str(), %err, "snapshot serialization failed");
            return;
        }
    };
    if let Err(err) = store.save(kind, &bytes) {
        warn!(kind = kind.as_str(), %err, "snapshot write failed, retrying");
        if let Err(err) = store.save(kind, &bytes) {
            warn!(
                kind = kind.as_str(),
                %err,
                "snapshot write failed again; memory state stays authoritative"
            );
        }
    }
}

/// SQLite-backed snapshot store at `~/.config/wakefund/wakefund.db`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the store, creating the file and schema if needed.
    pub fn open() -> Result<Self, StoreError> {
        let path = data_dir()
            .map_err(|e| StoreError::ReadFailed(e.to_string()))?
            .join("wakefund.db");
        Self::open_at(&path)
    }

    /// Open at an explicit path (tests, alternative data dirs).
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (for tests).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS snapshots (
                kind     TEXT PRIMARY KEY,
                data     BLOB NOT NULL,
                saved_at TEXT NOT NULL
            );",
        )
        .map_err(StoreError::from)
    }
}

impl SnapshotStore for SqliteStore {
    fn load(&self, kind: SnapshotKind) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT data FROM snapshots WHERE kind = ?1")
            .map_err(StoreError::from)?;
        let mut rows = stmt
            .query(params![kind.as_str()])
            .map_err(StoreError::from)?;
        match rows.next().map_err(StoreError::from)? {
            Some(row) => Ok(Some(row.get(0).map_err(StoreError::from)?)),
            None => Ok(None),
        }
    }

    fn save(&self, kind: SnapshotKind, bytes: &[u8]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction().map_err(StoreError::from)?;
        tx.execute(
            "INSERT INTO snapshots (kind, data, saved_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(kind) DO UPDATE SET data = excluded.data, saved_at = excluded.saved_at",
            params![kind.as_str(), bytes, Utc::now().to_rfc3339()],
        )
        .map_err(StoreError::from)?;
        tx.commit().map_err(StoreError::from)
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<&'static str, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self, kind: SnapshotKind) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .map
            .lock()
            .expect("store mutex poisoned")
            .get(kind.as_str())
            .cloned())
    }

    fn save(&self, kind: SnapshotKind, bytes: &[u8]) -> Result<(), StoreError> {
        self.map
            .lock()
            .expect("store mutex poisoned")
            .insert(kind.as_str(), bytes.to_vec());
        Ok(())
    }
}
