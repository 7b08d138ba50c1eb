//! Analytics event repository
//!
//! Stores [`EventRecord`]s as rows of `analytics_events` and answers the
//! queries reports need.
//!
//! ## Column mapping
//!
//! | Column        | Source                                              |
//! |---------------|-----------------------------------------------------|
//! | event_id      | `EventRecord::id`, UUID string                      |
//! | event_type    | `EventMetadata::event_type`                         |
//! | page_url      | page-view path, else the context page path          |
//! | event_data    | the whole record as JSON                            |
//! | ip_address    | [`ClientInfo`] of the posting request               |
//! | user_agent    | [`ClientInfo`], else the record's context           |
//! | device_type   | derived from the context viewport                   |
//! | browser       | parsed from the context user agent                  |
//! | created_at    | record timestamp, RFC 3339 UTC with microseconds    |
//!
//! The client may send a batch twice after a lost response. `event_id` is
//! unique and inserts ignore duplicates, so a resent batch stores nothing
//! new.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use lifeline_core::domain::{EventRecord, SessionId};

use crate::StoreError;

/// Request-level details of the POST that carried a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// A row of `analytics_events`
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub id: i64,
    pub event_id: String,
    pub event_type: String,
    pub event_name: String,
    pub user_id: Option<String>,
    pub session_id: String,
    pub page_url: Option<String>,
    pub referrer_url: Option<String>,
    pub event_data: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// SQLite repository for analytics events
pub struct AnalyticsEventRepository {
    pool: SqlitePool,
}

impl AnalyticsEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a posted batch in one transaction.
    ///
    /// Returns the number of rows actually inserted; events already stored
    /// are skipped.
    pub async fn insert_batch(
        &self,
        events: &[EventRecord],
        client: &ClientInfo,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for event in events {
            let context = event.context();
            let event_data = serde_json::to_string(event)?;
            let user_agent = client
                .user_agent
                .as_deref()
                .or(context.user_agent.as_deref());

            let result = sqlx::query(
                "INSERT OR IGNORE INTO analytics_events (
                    event_id, event_type, event_name, user_id, session_id,
                    page_url, referrer_url, event_data, ip_address, user_agent,
                    device_type, browser, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(event.id().to_string())
            .bind(event.event_type())
            .bind(event.name())
            .bind(event.user_id().map(|u| u.as_str().to_string()))
            .bind(event.session_id().to_string())
            .bind(event.page_url())
            .bind(event.referrer_url())
            .bind(event_data.as_str())
            .bind(client.ip_address.as_deref())
            .bind(user_agent)
            .bind(context.device_type())
            .bind(context.browser.as_str())
            .bind(format_timestamp(event.timestamp()))
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;

        let duplicates = events.len() as u64 - inserted;
        if duplicates > 0 {
            tracing::debug!(duplicates, "Skipped analytics events already stored");
        }
        tracing::debug!(inserted, "Stored analytics batch");
        Ok(inserted)
    }

    /// Number of stored events per `event_type`, ordered by type.
    pub async fn count_by_type(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT event_type, COUNT(*) FROM analytics_events
             GROUP BY event_type ORDER BY event_type",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Every event of one session, oldest first.
    pub async fn list_by_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM analytics_events WHERE session_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(stored_event_from_row).collect()
    }

    /// The `limit` most recent events, newest first.
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM analytics_events ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(stored_event_from_row).collect()
    }

    /// Delete events created before `cutoff`. Returns the number removed.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM analytics_events WHERE created_at < ?")
            .bind(format_timestamp(cutoff))
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        tracing::info!(removed, cutoff = %cutoff, "Pruned analytics events");
        Ok(removed)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

/// Fixed-width UTC form, so text order is time order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::SerializationError(format!("Invalid timestamp '{s}': {e}")))
}

fn stored_event_from_row(row: &SqliteRow) -> Result<StoredEvent, StoreError> {
    let event_data: String = row.try_get("event_data")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(StoredEvent {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        event_type: row.try_get("event_type")?,
        event_name: row.try_get("event_name")?,
        user_id: row.try_get("user_id")?,
        session_id: row.try_get("session_id")?,
        page_url: row.try_get("page_url")?,
        referrer_url: row.try_get("referrer_url")?,
        event_data: serde_json::from_str(&event_data)?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        device_type: row.try_get("device_type")?,
        browser: row.try_get("browser")?,
        created_at: parse_timestamp(&created_at)?,
    })
}
