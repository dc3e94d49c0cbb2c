//! Persistent tier backends
//!
//! Capacity-bounded, FIFO by first insertion. Replacing an existing key keeps
//! its original position in the eviction order.
//!
//! - `InMemoryStore` - default, process-lifetime durability
//! - `SqliteStore` - rusqlite-backed, survives restarts

use crate::errors::StorageError;
use rusqlite::{Connection, OptionalExtension};
use std::collections::{HashMap, VecDeque};
use std::path::Path;

/// One persisted payload encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEntry {
    pub key: String,
    pub bytes: Vec<u8>,
    pub compressed: bool,
    /// BLAKE3 hex digest of `bytes`
    pub checksum: String,
    pub importance: f64,
    pub original_size: usize,
    pub stored_at: i64,
}

/// Durable, capacity-bounded key/value tier.
pub trait StorageBackend: Send {
    /// Insert or replace. Returns keys evicted by capacity pressure.
    fn put(&mut self, entry: StorageEntry) -> Result<Vec<String>, StorageError>;

    fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError>;

    fn contains(&self, key: &str) -> Result<bool, StorageError>;

    fn remove(&mut self, key: &str) -> Result<bool, StorageError>;

    fn len(&self) -> Result<usize, StorageError>;

    fn max_size(&self) -> usize;
}

#[derive(Debug)]
pub struct InMemoryStore {
    entries: HashMap<String, StorageEntry>,
    insertion_order: VecDeque<String>,
    max_size: usize,
}

impl InMemoryStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }
}

impl StorageBackend for InMemoryStore {
    fn put(&mut self, entry: StorageEntry) -> Result<Vec<String>, StorageError> {
        if let Some(existing) = self.entries.get_mut(&entry.key) {
            *existing = entry;
            return Ok(Vec::new());
        }

        let mut evicted = Vec::new();
        while self.entries.len() >= self.max_size {
            match self.insertion_order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                    evicted.push(oldest);
                }
                None => break,
            }
        }

        self.insertion_order.push_back(entry.key.clone());
        self.entries.insert(entry.key.clone(), entry);
        Ok(evicted)
    }

    fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.contains_key(key))
    }

    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        if self.entries.remove(key).is_none() {
            return Ok(false);
        }
        if let Some(pos) = self.insertion_order.iter().position(|k| k == key) {
            self.insertion_order.remove(pos);
        }
        Ok(true)
    }

    fn len(&self) -> Result<usize, StorageError> {
        Ok(self.entries.len())
    }

    fn max_size(&self) -> usize {
        self.max_size
    }
}

/// SQLite-backed store. `seq` records first insertion for FIFO eviction.
pub struct SqliteStore {
    conn: Connection,
    max_size: usize,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, max_size: usize) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, max_size)
    }

    pub fn open_in_memory(max_size: usize) -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?, max_size)
    }

    fn with_connection(conn: Connection, max_size: usize) -> Result<Self, StorageError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS memory_entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL UNIQUE,
                payload BLOB NOT NULL,
                compressed INTEGER NOT NULL,
                checksum TEXT NOT NULL,
                importance REAL NOT NULL,
                original_size INTEGER NOT NULL,
                stored_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn,
            max_size: max_size.max(1),
        })
    }

    fn count(&self) -> Result<usize, StorageError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM memory_entries", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl StorageBackend for SqliteStore {
    fn put(&mut self, entry: StorageEntry) -> Result<Vec<String>, StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO memory_entries
                (key, payload, compressed, checksum, importance, original_size, stored_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                compressed = excluded.compressed,
                checksum = excluded.checksum,
                importance = excluded.importance,
                original_size = excluded.original_size,
                stored_at = excluded.stored_at
            "#,
            rusqlite::params![
                entry.key,
                entry.bytes,
                entry.compressed,
                entry.checksum,
                entry.importance,
                entry.original_size as i64,
                entry.stored_at,
            ],
        )?;

        let count: i64 = tx.query_row("SELECT COUNT(*) FROM memory_entries", [], |row| row.get(0))?;
        let overflow = count - self.max_size as i64;

        let mut evicted = Vec::new();
        if overflow > 0 {
            {
                let mut stmt =
                    tx.prepare("SELECT key FROM memory_entries ORDER BY seq ASC LIMIT ?1")?;
                let rows = stmt.query_map([overflow], |row| row.get::<_, String>(0))?;
                for key in rows {
                    evicted.push(key?);
                }
            }
            for key in &evicted {
                tx.execute("DELETE FROM memory_entries WHERE key = ?1", [key])?;
            }
        }

        tx.commit()?;
        Ok(evicted)
    }

    fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        let entry = self
            .conn
            .query_row(
                r#"
                SELECT key, payload, compressed, checksum, importance, original_size, stored_at
                FROM memory_entries WHERE key = ?1
                "#,
                [key],
                |row| {
                    Ok(StorageEntry {
                        key: row.get(0)?,
                        bytes: row.get(1)?,
                        compressed: row.get(2)?,
                        checksum: row.get(3)?,
                        importance: row.get(4)?,
                        original_size: row.get::<_, i64>(5)? as usize,
                        stored_at: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    fn contains(&self, key: &str) -> Result<bool, StorageError> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM memory_entries WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        let n = self
            .conn
            .execute("DELETE FROM memory_entries WHERE key = ?1", [key])?;
        Ok(n > 0)
    }

    fn len(&self) -> Result<usize, StorageError> {
        self.count()
    }

    fn max_size(&self) -> usize {
        self.max_size
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.conn.path())
            .field("max_size", &self.max_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn make_test_entry(key: &str, stored_at: i64) -> StorageEntry {
        StorageEntry {
            key: key.to_string(),
            bytes: format!("{{\"k\":\"{}\"}}", key).into_bytes(),
            compressed: false,
            checksum: crate::memory::payload::checksum(key.as_bytes()),
            importance: 0.7,
            original_size: 10,
            stored_at,
        }
    }

    fn exercise_fifo(store: &mut dyn StorageBackend) {
        assert!(store.put(make_test_entry("a", 1)).unwrap().is_empty());
        assert!(store.put(make_test_entry("b", 2)).unwrap().is_empty());
        assert!(store.put(make_test_entry("c", 3)).unwrap().is_empty());

        // Replacing "a" keeps it the oldest
        assert!(store.put(make_test_entry("a", 4)).unwrap().is_empty());
        assert_eq!(store.get("a").unwrap().unwrap().stored_at, 4);

        let evicted = store.put(make_test_entry("d", 5)).unwrap();
        assert_eq!(evicted, vec!["a".to_string()]);
        assert!(!store.contains("a").unwrap());
        assert!(store.contains("b").unwrap());
        assert_eq!(store.len().unwrap(), 3);

        assert!(store.remove("b").unwrap());
        assert!(!store.remove("b").unwrap());
        assert_eq!(store.len().unwrap(), 2);
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_in_memory_store_is_fifo() {
        let mut store = InMemoryStore::new(3);
        exercise_fifo(&mut store);
    }

    #[test]
    fn test_sqlite_store_is_fifo() {
        let mut store = SqliteStore::open_in_memory(3).unwrap();
        exercise_fifo(&mut store);
    }

    #[test]
    fn test_sqlite_store_survives_reopen() {
        let file = NamedTempFile::new().unwrap();
        {
            let mut store = SqliteStore::open(file.path(), 10).unwrap();
            let mut entry = make_test_entry("s1/risk", 42);
            entry.compressed = true;
            store.put(entry).unwrap();
        }

        let store = SqliteStore::open(file.path(), 10).unwrap();
        let entry = store.get("s1/risk").unwrap().unwrap();
        assert!(entry.compressed);
        assert_eq!(entry.stored_at, 42);
        assert_eq!(entry.importance, 0.7);
    }
}
