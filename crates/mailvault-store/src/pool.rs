//! Database connection pool management
//!
//! Provides a wrapper around SQLx's `SqlitePool` with:
//! - Automatic directory creation for database files
//! - WAL journal mode for concurrent reads
//! - Automatic schema migration on first connection
//! - In-memory mode for testing

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::PoolError;

/// A pool of SQLite connections backing a [`crate::SqliteStore`].
///
/// Configured with WAL journal mode for concurrent read access, 5 max
/// connections for file-based databases, 1 connection for in-memory
/// databases (required for data to persist across queries), and a
/// 5-second busy timeout to ride out write contention.
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens a database pool at `db_path`, creating the file and parent
    /// directories if they don't exist, and running pending migrations.
    pub async fn new(db_path: &Path) -> Result<Self, PoolError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PoolError::Connect(format!("failed to create database directory {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| PoolError::Connect(format!("failed to connect to database at {}: {e}", db_path.display())))?;

        Self::run_migrations(&pool).await?;

        tracing::info!(path = %db_path.display(), "database pool initialized");

        Ok(Self { pool })
    }

    /// Opens an in-memory database pool, for tests.
    pub async fn in_memory() -> Result<Self, PoolError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| PoolError::Connect(format!("failed to create in-memory database: {e}")))?;

        sqlx::raw_sql("PRAGMA foreign_keys = ON;")
            .execute(&pool)
            .await
            .map_err(|e| PoolError::Migration(format!("failed to enable foreign keys: {e}")))?;

        Self::run_migrations(&pool).await?;

        tracing::debug!("in-memory database pool initialized");

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), PoolError> {
        let migration_sql = include_str!("migrations/20260203_initial.sql");
        sqlx::raw_sql(migration_sql)
            .execute(pool)
            .await
            .map_err(|e| PoolError::Migration(format!("failed to run initial migration: {e}")))?;

        tracing::debug!("database migrations completed");
        Ok(())
    }
}
