//! SQLite storage layer -- pool, schema, event and incident tables.

pub mod incidents;
pub mod logs;
pub mod schema;

use std::time::{Duration, Instant};

use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, ErrorCode};
use thiserror::Error;

use crate::config::DatabaseConfig;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No connection could be checked out of the pool.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] r2d2::Error),

    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("query exceeded {0:?} and was interrupted")]
    TimedOut(Duration),
}

impl StoreError {
    /// Classify a rusqlite error, recognising progress-handler interrupts.
    fn from_query(err: rusqlite::Error, timeout: Duration) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::OperationInterrupted) => StoreError::TimedOut(timeout),
            _ => StoreError::Query(err),
        }
    }
}

const PRAGMAS: &str = "PRAGMA journal_mode = WAL;
     PRAGMA synchronous = NORMAL;
     PRAGMA temp_store = MEMORY;
     PRAGMA foreign_keys = ON;";

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(config: &DatabaseConfig) -> Result<Pool, StoreError> {
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "could not create database directory");
            }
        }
    }

    let busy_timeout = config.query_timeout();
    let manager = SqliteConnectionManager::file(&config.path).with_init(move |c| {
        c.execute_batch(PRAGMAS)?;
        c.busy_timeout(busy_timeout)
    });

    let pool = R2D2Pool::builder()
        .max_size(config.pool_size.max(1))
        .connection_timeout(config.connection_timeout())
        .build(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Single-connection in-memory pool. Every checkout sees the same database.
pub fn open_memory_pool() -> Result<Pool, StoreError> {
    let manager = SqliteConnectionManager::memory();
    let pool = R2D2Pool::builder()
        .max_size(1)
        .connection_timeout(Duration::from_secs(5))
        .build(manager)?;

    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Interrupts any statement on `conn` that runs past the deadline. The
/// handler is removed when the guard drops, so pooled connections go back
/// clean.
struct QueryDeadline<'c> {
    conn: &'c Connection,
}

impl<'c> QueryDeadline<'c> {
    fn arm(conn: &'c Connection, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        conn.progress_handler(1_000, Some(move || Instant::now() >= deadline));
        Self { conn }
    }
}

impl Drop for QueryDeadline<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}

/// Pool-backed handle for both the event and incident tables.
///
/// Each operation checks a connection out at entry and hands it back on every
/// exit path; nothing is held between calls.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool,
    query_timeout: Duration,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            query_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
        Ok(Self::new(open_pool(config)?).with_query_timeout(config.query_timeout()))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(open_memory_pool()?))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Run `f` on a pooled connection under the query deadline.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let conn = self.pool.get()?;
        let _deadline = QueryDeadline::arm(&conn, self.query_timeout);
        f(&conn).map_err(|e| StoreError::from_query(e, self.query_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_pool_shares_one_database() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .with_conn(|c| c.execute("INSERT INTO logs (event_time, source_address, kind, severity) VALUES ('2026-01-01T00:00:00.000000Z', '10.0.0.1', 'login_failed', 'medium')", []))
            .unwrap();
        let count: i64 = store
            .with_conn(|c| c.query_row("SELECT COUNT(*) FROM logs", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_runaway_query_is_interrupted() {
        let store = SqliteStore::in_memory()
            .unwrap()
            .with_query_timeout(Duration::from_millis(20));
        let err = store
            .with_conn(|c| {
                c.query_row(
                    "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) SELECT COUNT(*) FROM n",
                    [],
                    |r| r.get::<_, i64>(0),
                )
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::TimedOut(_)), "got {err:?}");

        // The handler is gone once the guard drops.
        let one: i64 = store
            .with_conn(|c| c.query_row("SELECT 1", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(one, 1);
    }

    #[test]
    fn test_open_pool_creates_file_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("sentry.db"),
            ..DatabaseConfig::default()
        };
        let store = SqliteStore::open(&config).unwrap();
        assert!(config.path.exists());
        let count: i64 = store
            .with_conn(|c| c.query_row("SELECT COUNT(*) FROM incidents", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(count, 0);
    }
}
