//! Durable key-value stores backing the translation cache.
//! A namespace is loaded whole at startup and saved whole after writes.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Namespaced string map persisted across process restarts.
pub trait KeyValueStore: Send + Sync {
    fn load(&self, namespace: &str) -> Result<HashMap<String, String>, StoreError>;
    fn save(&self, namespace: &str, entries: &HashMap<String, String>) -> Result<(), StoreError>;
}

/// SQLite-backed store. One row per key; saving a namespace replaces its rows.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        // WAL keeps readers off the writer's back.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init(&conn)?;
        info!(path = %db_path.display(), "sqlite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv_store (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            );",
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn load(&self, namespace: &str) -> Result<HashMap<String, String>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key, value FROM kv_store WHERE namespace = ?1")?;
        let rows = stmt.query_map(params![namespace], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let entries = rows.collect::<Result<HashMap<_, _>, _>>()?;
        debug!(namespace, count = entries.len(), "namespace loaded");
        Ok(entries)
    }

    fn save(&self, namespace: &str, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        let start = std::time::Instant::now();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM kv_store WHERE namespace = ?1", params![namespace])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO kv_store (namespace, key, value) VALUES (?1, ?2, ?3)",
            )?;
            for (key, value) in entries {
                stmt.execute(params![namespace, key, value])?;
            }
        }
        tx.commit()?;
        debug!(
            namespace,
            count = entries.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "namespace saved"
        );
        Ok(())
    }
}

/// Process-local store for hosts without disk access, and for tests.
#[derive(Default)]
pub struct MemoryStore {
    namespaces: Mutex<HashMap<String, HashMap<String, String>>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, namespace: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.namespaces.lock().get(namespace).cloned().unwrap_or_default())
    }

    fn save(&self, namespace: &str, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        self.namespaces
            .lock()
            .insert(namespace.to_string(), entries.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HashMap<String, String> {
        HashMap::from([
            ("k1".to_string(), "v1".to_string()),
            ("k2".to_string(), "多行\n文本".to_string()),
        ])
    }

    #[test]
    fn sqlite_save_replaces_namespace() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save("ns", &sample()).unwrap();
        store.save("other", &sample()).unwrap();
        assert_eq!(store.load("ns").unwrap(), sample());

        let smaller = HashMap::from([("k1".to_string(), "v9".to_string())]);
        store.save("ns", &smaller).unwrap();
        assert_eq!(store.load("ns").unwrap(), smaller);
        assert_eq!(store.load("other").unwrap().len(), 2);
    }

    #[test]
    fn sqlite_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        SqliteStore::open(&path).unwrap().save("ns", &sample()).unwrap();
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.load("ns").unwrap(), sample());
    }

    #[test]
    fn memory_store_missing_namespace_is_empty() {
        let store = MemoryStore::new();
        assert!(store.load("nothing").unwrap().is_empty());
        store.save("ns", &sample()).unwrap();
        assert_eq!(store.save_count(), 1);
    }
}
