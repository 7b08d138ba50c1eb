//! SQLite connection pool for the analytics database
//!
//! Every pool applies the `analytics_events` schema before it is handed
//! out, so callers never see a database without the table.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::StoreError;

const SCHEMA: &str = include_str!("migrations/20240101_analytics_events.sql");

/// Connections for a file database; ingest and reports may overlap.
const FILE_CONNECTIONS: u32 = 5;

/// Pool of connections to the analytics database
///
/// File databases run in WAL mode with `synchronous = NORMAL` and wait up
/// to five seconds on a locked database. An in-memory database is private
/// to its connection, so in-memory pools hold exactly one.
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Open the database at `db_path`, creating it and its directory if
    /// needed.
    pub async fn new(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                StoreError::ConnectionFailed(format!("Cannot create {}: {e}", dir.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = Self::connect(options, FILE_CONNECTIONS).await?;
        tracing::info!(path = %db_path.display(), "Analytics database opened");
        Ok(pool)
    }

    /// A throwaway database that disappears with the pool.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new().filename(":memory:");
        let pool = Self::connect(options, 1).await?;
        tracing::debug!("In-memory analytics database opened");
        Ok(pool)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for in-use connections to return, then close them all.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn connect(options: SqliteConnectOptions, connections: u32) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(connections)
            // An in-memory database dies with its last connection
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        // Every statement is IF NOT EXISTS, so reapplying is harmless.
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

        Ok(Self { pool })
    }
}
