/// Key-value persistence for one-time-derived data (identity tables and the
/// like), so a restarted process does not redo the extraction pass.
///
/// `SqliteStore` uses `rusqlite` with the `bundled` feature so SQLite is
/// compiled in. The connection sits behind a mutex; writes are rare and small.
/// A missing or undecodable entry is treated exactly like a cold cache.
use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-memory store (tests, one-shot runs)
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_owned(), value.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SQLite store
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and apply the schema.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        apply_schema(&conn)?;
        tracing::info!("Cache store opened at {:?}", db_path);
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous  = NORMAL;

        CREATE TABLE IF NOT EXISTS cache_entries (
            key        TEXT    PRIMARY KEY,
            value      BLOB    NOT NULL,
            written_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );
    ")?;
    Ok(())
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let value = conn
            .query_row(
                "SELECT value FROM cache_entries WHERE key = ?1",
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO cache_entries (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            written_at = strftime('%s', 'now')",
            params![key, value],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Read-through / write-through
// ---------------------------------------------------------------------------

/// Return the JSON value stored under `key`, or build it, store it and return
/// it. A store that fails to read or write only costs a rebuild.
pub fn read_through<T, F>(store: &dyn KvStore, key: &str, build: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T>,
{
    match store.get(key) {
        Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
            Ok(value) => {
                tracing::debug!("Store hit: {}", key);
                return Ok(value);
            }
            Err(e) => tracing::warn!("Discarding undecodable store entry {}: {}", key, e),
        },
        Ok(None) => tracing::debug!("Store miss: {}", key),
        Err(e) => tracing::warn!("Store read failed for {}: {}", key, e),
    }

    let value = build()?;
    let bytes = serde_json::to_vec(&value)?;
    if let Err(e) = store.put(key, &bytes) {
        tracing::warn!("Store write failed for {}: {}", key, e);
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::tempdir;

    #[test]
    fn sqlite_round_trips_and_overwrites() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("cache").join("ledger.sqlite")).unwrap();
        assert!(store.get("a").unwrap().is_none());

        store.put("a", b"one").unwrap();
        store.put("a", b"two").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some(&b"two"[..]));
    }

    #[test]
    fn sqlite_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.sqlite");
        SqliteStore::open(&path).unwrap().put("units", b"{}").unwrap();
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get("units").unwrap().as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn read_through_builds_once() {
        let store = MemoryStore::new();
        let builds = Cell::new(0);
        let build = || {
            builds.set(builds.get() + 1);
            Ok(vec![1u32, 2, 3])
        };

        let first: Vec<u32> = read_through(&store, "log/units", build).unwrap();
        let second: Vec<u32> = read_through(&store, "log/units", build).unwrap();
        assert_eq!(first, second);
        assert_eq!(builds.get(), 1);
    }

    #[test]
    fn undecodable_entry_counts_as_miss() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("log/units", b"not json").unwrap();
        let value: Vec<u32> = read_through(&store, "log/units", || Ok(vec![9])).unwrap();
        assert_eq!(value, vec![9]);
        assert_eq!(store.get("log/units").unwrap().as_deref(), Some(&b"[9]"[..]));
    }
}
