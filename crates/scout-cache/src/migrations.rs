//! Durable cache schema migrations.

use rusqlite::Connection;
use tracing::info;

use crate::error::CacheError;

/// Run all pending migrations against the cache database.
pub fn run_migrations(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| CacheError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| CacheError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied cache migration v1: cache_entries");
    }

    if current_version < 2 {
        apply_v2(conn)?;
        info!("Applied cache migration v2: expire_at_millis");
    }

    Ok(())
}

fn apply_v1(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS cache_entries (
            key         TEXT PRIMARY KEY NOT NULL,
            value       TEXT NOT NULL,
            expire_at   INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_cache_entries_expire_at
            ON cache_entries (expire_at);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'cache_entries');
        ",
    )
    .map_err(|e| CacheError::Storage(format!("Failed to apply migration v1: {}", e)))?;
    Ok(())
}

/// `expire_at` moves from epoch seconds to epoch milliseconds.
fn apply_v2(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        "
        UPDATE cache_entries SET expire_at = expire_at * 1000 WHERE expire_at IS NOT NULL;

        INSERT INTO schema_migrations (version, name) VALUES (2, 'expire_at_millis');
        ",
    )
    .map_err(|e| CacheError::Storage(format!("Failed to apply migration v2: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 2);

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_v2_converts_second_expiries() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_migrations (
                version     INTEGER PRIMARY KEY NOT NULL,
                name        TEXT NOT NULL,
                applied_at  INTEGER NOT NULL DEFAULT 0
            );",
        )
        .unwrap();
        apply_v1(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO cache_entries (key, value, expire_at) VALUES ('a', '1', 1700000000);
             INSERT INTO cache_entries (key, value, expire_at) VALUES ('b', '1', NULL);",
        )
        .unwrap();

        run_migrations(&conn).unwrap();

        let a: Option<i64> = conn
            .query_row("SELECT expire_at FROM cache_entries WHERE key = 'a'", [], |row| row.get(0))
            .unwrap();
        let b: Option<i64> = conn
            .query_row("SELECT expire_at FROM cache_entries WHERE key = 'b'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(a, Some(1_700_000_000_000));
        assert_eq!(b, None);
    }
}
