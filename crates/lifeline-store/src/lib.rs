//! Lifeline Store - Analytics event persistence
//!
//! SQLite storage for the analytics batches posted by the telemetry
//! client:
//! - [`DatabasePool`] - Connection pool that applies the schema on connect
//! - [`AnalyticsEventRepository`] - Batch ingest and the queries reports need
//! - [`StoreError`] - What went wrong talking to the database
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use lifeline_store::{AnalyticsEventRepository, DatabasePool};
//!
//! # async fn example() -> Result<(), lifeline_store::StoreError> {
//! let pool = DatabasePool::new(Path::new("/var/lib/lifeline/analytics.db")).await?;
//! let repo = AnalyticsEventRepository::new(pool.pool().clone());
//! let counts = repo.count_by_type().await?;
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::{AnalyticsEventRepository, ClientInfo, StoredEvent};

/// Failure while opening, migrating or querying the analytics database
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database file or its directory could not be opened
    #[error("Cannot open analytics database: {0}")]
    ConnectionFailed(String),

    #[error("Analytics query failed: {0}")]
    QueryFailed(String),

    /// The `analytics_events` schema could not be applied
    #[error("Cannot apply analytics schema: {0}")]
    MigrationFailed(String),

    /// An event could not be encoded or a stored row could not be decoded
    #[error("Bad analytics payload: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::SerializationError(e.to_string())
    }
}
