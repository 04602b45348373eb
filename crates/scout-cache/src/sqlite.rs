//! SQLite-backed durable tier.
//!
//! Wraps a single rusqlite Connection in a Mutex. Configures WAL mode on
//! file databases and runs the cache migrations on open.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::durable::{DurableEntry, DurableStore};
use crate::error::CacheError;
use crate::migrations;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| CacheError::Storage(format!("Failed to open cache database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| CacheError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Cache database opened at {}", path.display());

        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.with_conn(migrations::run_migrations)?;
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            CacheError::Storage(format!("Failed to open in-memory cache db: {}", e))
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.with_conn(migrations::run_migrations)?;
        Ok(store)
    }

    /// Execute a closure with the connection held under the mutex.
    fn with_conn<F, T>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(&Connection) -> Result<T, CacheError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CacheError::LockPoisoned(format!("cache database: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish()
    }
}

impl DurableStore for SqliteStore {
    fn load(&self, key: &str) -> Result<Option<DurableEntry>, CacheError> {
        self.with_conn(|conn| {
            let entry = conn
                .query_row(
                    "SELECT key, value, expire_at FROM cache_entries WHERE key = ?1",
                    params![key],
                    |row| {
                        Ok(DurableEntry {
                            key: row.get(0)?,
                            value: row.get(1)?,
                            expire_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(entry)
        })
    }

    fn store(&self, entry: &DurableEntry) -> Result<(), CacheError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO cache_entries (key, value, expire_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                expire_at = excluded.expire_at",
                params![entry.key, entry.value, entry.expire_at],
            )?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
            Ok(())
        })
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM cache_entries", [])?;
            Ok(())
        })
    }

    fn keys_with_prefix(&self, prefix: &str, now_millis: i64) -> Result<Vec<String>, CacheError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key FROM cache_entries
                 WHERE substr(key, 1, length(?1)) = ?1
                   AND (expire_at IS NULL OR expire_at > ?2)
                 ORDER BY key",
            )?;
            let keys = stmt
                .query_map(params![prefix, now_millis], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys)
        })
    }

    fn purge_expired(&self, now_millis: i64) -> Result<usize, CacheError> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM cache_entries WHERE expire_at IS NOT NULL AND expire_at <= ?1",
                params![now_millis],
            )?;
            Ok(removed)
        })
    }

    fn count(&self) -> Result<usize, CacheError> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    fn location(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => ":memory:".to_string(),
        }
    }
}
