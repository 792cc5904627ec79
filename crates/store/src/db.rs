//! Database connection and pool management.

use exn::ResultExt;
use sqlx::pool::{PoolConnection, PoolConnectionMetadata};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqliteConnection};
use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Embedded migrations that are run automatically on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// Every store operation is serialized through one connection. Exclusive
// multi-statement work (checkpoint, attach, detach) relies on this.
const MAX_CONNECTIONS: u32 = 1;

/// The live relational store.
///
/// A pool capped at a single connection: short repository writes queue behind
/// each other, and [`acquire`](Self::acquire) holds the store exclusively until
/// the returned connection is dropped.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl Database {
    async fn new(options: SqliteConnectOptions, path: Option<PathBuf>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Apply the query-based PRAGMAs to every connection the pool ever
            // opens, not only the first one.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(MAX_CONNECTIONS)
            // Reaping the only connection would wipe an in-memory store.
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool, path };
        db.migrate().await?;
        Ok(db)
    }

    /// Connect to the store at the given path.
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let options = Self::base_options().filename(path).create_if_missing(true);
        Self::new(options, Some(path.to_path_buf())).await
    }

    /// Connect to an in-memory database (useful for testing).
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        Self::new(options, None).await
    }

    /// Base connection options shared between file and in-memory databases.
    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            // Only one connection exists, but an external process (a file
            // manager, a second CLI invocation) may still hold the file.
            .busy_timeout(std::time::Duration::from_millis(1500))
            .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::None)
    }

    /// Apply additional PRAGMA settings that aren't exposed via SqliteConnectOptions.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA locking_mode = NORMAL;
                PRAGMA wal_autocheckpoint = 800;
                PRAGMA cache_size = -2048;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    #[instrument("performing database migrations", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    /// Path of the backing file, or `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Take the store's only connection for exclusive use.
    ///
    /// Every other store operation waits until the returned connection is
    /// dropped (or, for a connection poisoned by an open attachment, closed).
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool.acquire().await.or_raise(|| {
            if self.pool.is_closed() { ErrorKind::Closed } else { ErrorKind::Database }
        })
    }

    /// Fold the write-ahead log back into the main database file and truncate it.
    ///
    /// After this returns, the main file alone holds every committed write, so
    /// it can be copied byte-for-byte.
    #[instrument(level = "debug", skip(conn))]
    pub async fn checkpoint(conn: &mut SqliteConnection) -> Result<()> {
        let (busy, log, moved): (i64, i64, i64) = sqlx::query_as("PRAGMA wal_checkpoint(TRUNCATE)")
            .fetch_one(conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if busy != 0 {
            exn::bail!(ErrorKind::CheckpointBlocked);
        }
        tracing::debug!(log_frames = log, checkpointed = moved, "Checkpointed write-ahead log");
        Ok(())
    }

    /// Close the database connection pool.
    ///
    /// Closing the last connection checkpoints the write-ahead log, so once
    /// this returns the store file can be moved or replaced.
    pub async fn close(&self) {
        // Let SQLite update query planner statistics
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrated_tables() {
        let db = Database::connect_in_memory().await.unwrap();
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_schema WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        assert_eq!(tables, vec!["app_meta", "entries", "entry_genres", "profile"]);
    }

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.is_closed());
        assert!(db.path().is_none());
        db.close().await;
        assert!(db.is_closed());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_pragmas_are_applied() {
        let db = Database::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA foreign_keys").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 1, "foreign_keys should be ON");
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 800, "WAL checkpoint should be 800");
        db.close().await;
    }

    #[tokio::test]
    async fn test_acquire_after_close() {
        let db = Database::connect_in_memory().await.unwrap();
        db.close().await;
        let err = db.acquire().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Closed));
    }

    #[tokio::test]
    async fn test_checkpoint_truncates_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        let db = Database::connect(&path).await.unwrap();
        assert_eq!(db.path(), Some(path.as_path()));
        sqlx::query("UPDATE profile SET username = 'reader'").execute(db.pool()).await.unwrap();

        let mut conn = db.acquire().await.unwrap();
        Database::checkpoint(&mut conn).await.unwrap();
        drop(conn);

        let wal = std::fs::metadata(dir.path().join("library.db-wal")).map(|m| m.len()).unwrap_or(0);
        assert_eq!(wal, 0);
        db.close().await;
    }
}
