//! Leveled client logging
//!
//! Every accepted entry is echoed through `tracing`, optionally persisted
//! to the [`LocalLogStore`], and optionally buffered for the logs endpoint.
//! Entries below the minimum level are dropped before any of that.

use std::sync::Arc;

use lifeline_core::config::LoggerConfig;
use lifeline_core::domain::{BreadcrumbKind, LogEntry, LogLevel};
use serde_json::Value;
use tracing::warn;

use crate::buffer::EventBuffer;
use crate::context::ContextEnricher;
use crate::error::StorageError;
use crate::error_tracker::ErrorTracker;
use crate::local_log::LocalLogStore;
use crate::metrics::{DropReason, TelemetryMetrics};
use crate::session::SessionManager;

const CHANNEL: &str = "logs";

/// Client-side logger
pub struct Logger {
    min_level: LogLevel,
    remote: bool,
    local: Option<LocalLogStore>,
    session: Arc<SessionManager>,
    enricher: Arc<ContextEnricher>,
    buffer: Arc<EventBuffer<LogEntry>>,
    errors: Option<Arc<ErrorTracker>>,
    metrics: Option<Arc<TelemetryMetrics>>,
}

impl Logger {
    /// Creates a logger from the `logger` configuration section.
    ///
    /// An unparseable `min_level` falls back to `info`. Local persistence
    /// is active only when `local` is given.
    pub fn new(
        config: &LoggerConfig,
        session: Arc<SessionManager>,
        enricher: Arc<ContextEnricher>,
        buffer: Arc<EventBuffer<LogEntry>>,
        local: Option<LocalLogStore>,
    ) -> Self {
        let min_level = config.min_level.parse().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid logger min_level, using info");
            LogLevel::Info
        });
        Self {
            min_level,
            remote: config.remote,
            local,
            session,
            enricher,
            buffer,
            errors: None,
            metrics: None,
        }
    }

    /// Leave a console breadcrumb on `errors` for every error entry.
    pub fn with_error_tracker(mut self, errors: Arc<ErrorTracker>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<TelemetryMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    pub fn local_store(&self) -> Option<&LocalLogStore> {
        self.local.as_ref()
    }

    pub async fn debug(&self, message: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Debug, message, data).await;
    }

    pub async fn info(&self, message: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Info, message, data).await;
    }

    pub async fn warn(&self, message: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Warn, message, data).await;
    }

    pub async fn error(&self, message: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Error, message, data).await;
    }

    /// Log at `level`. Returns `false` if the entry was below the minimum.
    pub async fn log(&self, level: LogLevel, message: impl Into<String>, data: Option<Value>) -> bool {
        if level < self.min_level {
            if let Some(metrics) = &self.metrics {
                metrics.record_dropped(CHANNEL, DropReason::Filtered, 1);
            }
            return false;
        }

        let entry = LogEntry::new(level, message, self.session.current())
            .with_data(data)
            .with_context(self.enricher.snapshot())
            .with_user_id(self.session.user_id());

        echo(&entry);

        if let Some(local) = &self.local {
            persist(local, &entry);
        }

        if level == LogLevel::Error {
            if let Some(errors) = &self.errors {
                errors.add_breadcrumb(BreadcrumbKind::Console, entry.message.clone(), None);
            }
        }

        if self.remote {
            self.buffer.record(entry).await;
        }
        true
    }
}

fn echo(entry: &LogEntry) {
    let session = entry.session_id.to_string();
    let data = entry.data.as_ref().map(Value::to_string).unwrap_or_default();
    match entry.level {
        LogLevel::Debug => tracing::debug!(target: "lifeline::client", session = %session, data = %data, "{}", entry.message),
        LogLevel::Info => tracing::info!(target: "lifeline::client", session = %session, data = %data, "{}", entry.message),
        LogLevel::Warn => tracing::warn!(target: "lifeline::client", session = %session, data = %data, "{}", entry.message),
        LogLevel::Error => tracing::error!(target: "lifeline::client", session = %session, data = %data, "{}", entry.message),
    }
}

/// A corrupt history is discarded and the entry written to a fresh one.
fn persist(local: &LocalLogStore, entry: &LogEntry) {
    let result = match local.append(entry) {
        Err(StorageError::Corrupt(e)) => {
            warn!(error = %e, "Local log history corrupt, starting over");
            local.clear().and_then(|()| local.append(entry))
        }
        other => other,
    };
    if let Err(e) = result {
        warn!(error = %e, "Failed to persist log entry locally");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lifeline_core::config::ErrorsConfig;
    use serde_json::json;

    use super::*;
    use crate::buffer::BufferLimits;
    use crate::local_log::LOGS_KEY;
    use crate::storage::{FileStorage, MemoryStorage, Storage};
    use crate::transport::MemoryTransport;

    struct Fixture {
        logger: Logger,
        transport: Arc<MemoryTransport>,
        buffer: Arc<EventBuffer<LogEntry>>,
        local_storage: Arc<MemoryStorage>,
        errors: Arc<ErrorTracker>,
    }

    fn fixture(config: LoggerConfig) -> Fixture {
        let transport = Arc::new(MemoryTransport::new());
        let session = Arc::new(SessionManager::new(Duration::from_secs(1800)));
        let enricher = Arc::new(ContextEnricher::new(
            "test",
            "0.0.0",
            Arc::new(MemoryStorage::new()),
        ));
        let limits = BufferLimits {
            batch_size: 10,
            max_queue_size: 100,
        };
        let buffer = Arc::new(EventBuffer::new("logs", "/api/logs", limits, transport.clone()));
        let error_buffer = Arc::new(EventBuffer::new("errors", "/api/errors", limits, transport.clone()));
        let errors = Arc::new(ErrorTracker::new(
            &ErrorsConfig::default(),
            session.clone(),
            enricher.clone(),
            error_buffer,
        ));

        let local_storage = Arc::new(MemoryStorage::new());
        let local = config
            .local
            .then(|| LocalLogStore::new(local_storage.clone(), config.local_max_entries));

        let logger = Logger::new(&config, session, enricher, buffer.clone(), local)
            .with_error_tracker(errors.clone());
        Fixture {
            logger,
            transport,
            buffer,
            local_storage,
            errors,
        }
    }

    #[tokio::test]
    async fn test_min_level_filters() {
        let f = fixture(LoggerConfig {
            min_level: "warn".to_string(),
            ..LoggerConfig::default()
        });
        assert!(!f.logger.log(LogLevel::Info, "quiet", None).await);
        assert!(f.logger.log(LogLevel::Warn, "loud", None).await);
        assert_eq!(f.buffer.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_entries_reach_logs_endpoint() {
        let f = fixture(LoggerConfig::default());
        f.logger
            .info("course page opened", Some(json!({ "courseId": "efaw-1" })))
            .await;
        f.buffer.flush().await;

        let records = f.transport.records("/api/logs");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["level"], "info");
        assert_eq!(records[0]["message"], "course page opened");
        assert_eq!(records[0]["data"]["courseId"], "efaw-1");
    }

    #[tokio::test]
    async fn test_remote_disabled_keeps_nothing_pending() {
        let f = fixture(LoggerConfig {
            remote: false,
            ..LoggerConfig::default()
        });
        f.logger.info("local only", None).await;
        assert!(f.buffer.is_empty());
    }

    #[tokio::test]
    async fn test_local_persistence_is_bounded() {
        let f = fixture(LoggerConfig {
            local: true,
            local_max_entries: 3,
            ..LoggerConfig::default()
        });
        for i in 0..5 {
            f.logger.info(format!("entry {i}"), None).await;
        }
        let stored = f.logger.local_store().unwrap().entries().unwrap();
        let messages: Vec<&str> = stored.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[tokio::test]
    async fn test_corrupt_local_history_is_replaced() {
        let f = fixture(LoggerConfig {
            local: true,
            ..LoggerConfig::default()
        });
        f.local_storage.set(LOGS_KEY, "garbage").unwrap();
        f.logger.warn("after corruption", None).await;

        let stored = f.logger.local_store().unwrap().entries().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].message, "after corruption");
    }

    #[tokio::test]
    async fn test_truncated_log_file_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.json");
        std::fs::write(&path, r#"{"lifeline.logs": "["#).unwrap();

        let transport = Arc::new(MemoryTransport::new());
        let session = Arc::new(SessionManager::new(Duration::from_secs(1800)));
        let enricher = Arc::new(ContextEnricher::new(
            "test",
            "0.0.0",
            Arc::new(MemoryStorage::new()),
        ));
        let limits = BufferLimits {
            batch_size: 10,
            max_queue_size: 100,
        };
        let buffer = Arc::new(EventBuffer::new("logs", "/api/logs", limits, transport));
        let local = LocalLogStore::new(Arc::new(FileStorage::new(path.clone())), 10);
        let config = LoggerConfig {
            local: true,
            ..LoggerConfig::default()
        };
        let logger = Logger::new(&config, session, enricher, buffer, Some(local));

        for i in 0..3 {
            logger.warn(format!("cert upload retry {i}"), None).await;
        }

        let stored = logger.local_store().unwrap().entries().unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].message, "cert upload retry 0");

        let reopened = LocalLogStore::new(Arc::new(FileStorage::new(path)), 10);
        assert_eq!(reopened.entries().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_error_entries_leave_breadcrumb() {
        let f = fixture(LoggerConfig::default());
        f.logger.info("not a crumb", None).await;
        f.logger.error("checkout failed", None).await;

        let crumbs = f.errors.breadcrumbs();
        assert_eq!(crumbs.len(), 1);
        assert_eq!(crumbs[0].kind, BreadcrumbKind::Console);
        assert_eq!(crumbs[0].message, "checkout failed");
    }

    #[test]
    fn test_invalid_min_level_falls_back() {
        let f = fixture(LoggerConfig {
            min_level: "chatty".to_string(),
            ..LoggerConfig::default()
        });
        assert_eq!(f.logger.min_level(), LogLevel::Info);
    }
}
