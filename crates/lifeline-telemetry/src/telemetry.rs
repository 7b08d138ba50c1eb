//! Telemetry service facade
//!
//! [`Telemetry`] wires the four producers to one session, one context
//! enricher, one metrics registry, and four channel buffers, and owns the
//! flush scheduler. Each instance is independent; nothing is global except
//! the optional panic hook.
//!
//! ## Lifecycle
//!
//! 1. [`Telemetry::new`] builds everything; nothing runs yet.
//! 2. [`Telemetry::start`] spawns the flush scheduler.
//! 3. [`Telemetry::shutdown`] stops it and makes one bounded final flush.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use lifeline_core::config::Config;
use lifeline_core::domain::{ErrorReport, EventRecord, LogEntry, PerformanceMetric};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::analytics::Analytics;
use crate::buffer::{BufferLimits, EventBuffer, FlushOutcome, Flushable};
use crate::context::ContextEnricher;
use crate::error_tracker::ErrorTracker;
use crate::local_log::LocalLogStore;
use crate::logger::Logger;
use crate::metrics::TelemetryMetrics;
use crate::performance::PerformanceMonitor;
use crate::scheduler::{final_flush, flush_channels, FlushScheduler};
use crate::session::SessionManager;
use crate::storage::{FileStorage, MemoryStorage, Storage};
use crate::transport::{HttpTransport, Transport};

/// One telemetry client
pub struct Telemetry {
    config: Config,
    session: Arc<SessionManager>,
    enricher: Arc<ContextEnricher>,
    metrics: Arc<TelemetryMetrics>,
    logger: Logger,
    analytics: Analytics,
    errors: Arc<ErrorTracker>,
    performance: PerformanceMonitor,
    channels: Vec<Arc<dyn Flushable>>,
    cancel: CancellationToken,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl Telemetry {
    /// Creates a client posting to `config.endpoint` over HTTP.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let transport = HttpTransport::from_config(&config.endpoint)
            .context("Failed to build HTTP transport")?;
        Self::new(config, Arc::new(transport))
    }

    /// Creates a client delivering through `transport`.
    ///
    /// Custom context lives in memory for the life of the client. When
    /// `logger.local` is set, the log history goes to `logger.local_path`.
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> anyhow::Result<Self> {
        let local_storage: Arc<dyn Storage> = if config.logger.local {
            Arc::new(FileStorage::new(config.logger.local_path.clone()))
        } else {
            Arc::new(MemoryStorage::new())
        };
        Self::with_storage(config, transport, Arc::new(MemoryStorage::new()), local_storage)
    }

    /// Creates a client with explicit storage backends for the custom
    /// context (`session_storage`) and the local log history
    /// (`local_storage`).
    pub fn with_storage(
        config: Config,
        transport: Arc<dyn Transport>,
        session_storage: Arc<dyn Storage>,
        local_storage: Arc<dyn Storage>,
    ) -> anyhow::Result<Self> {
        let problems = config.validate();
        if !problems.is_empty() {
            let joined = problems
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            anyhow::bail!("Invalid telemetry configuration: {joined}");
        }

        let metrics = Arc::new(TelemetryMetrics::new()?);
        let session = Arc::new(SessionManager::new(Duration::from_secs(
            config.session.idle_timeout_mins.saturating_mul(60),
        )));
        let enricher = Arc::new(ContextEnricher::from_config(&config.session, session_storage));

        let limits = BufferLimits {
            batch_size: config.buffer.batch_size,
            max_queue_size: config.buffer.max_queue_size,
        };
        let error_limits = BufferLimits {
            batch_size: config.errors.batch_size,
            ..limits
        };
        let endpoint = &config.endpoint;

        let logs_buffer = Arc::new(
            EventBuffer::<LogEntry>::new("logs", &endpoint.logs_path, limits, transport.clone())
                .with_metrics(metrics.clone()),
        );
        let analytics_buffer = Arc::new(
            EventBuffer::<EventRecord>::new(
                "analytics",
                &endpoint.analytics_path,
                limits,
                transport.clone(),
            )
            .with_metrics(metrics.clone()),
        );
        let errors_buffer = Arc::new(
            EventBuffer::<ErrorReport>::new(
                "errors",
                &endpoint.errors_path,
                error_limits,
                transport.clone(),
            )
            .with_metrics(metrics.clone()),
        );
        let performance_buffer = Arc::new(
            EventBuffer::<PerformanceMetric>::new(
                "performance",
                &endpoint.performance_path,
                limits,
                transport,
            )
            .with_metrics(metrics.clone()),
        );

        let errors = Arc::new(
            ErrorTracker::new(
                &config.errors,
                session.clone(),
                enricher.clone(),
                errors_buffer.clone(),
            )
            .with_metrics(metrics.clone()),
        );

        let local = config
            .logger
            .local
            .then(|| LocalLogStore::new(local_storage, config.logger.local_max_entries));
        let logger = Logger::new(
            &config.logger,
            session.clone(),
            enricher.clone(),
            logs_buffer.clone(),
            local,
        )
        .with_error_tracker(errors.clone())
        .with_metrics(metrics.clone());

        let analytics = Analytics::new(
            &config.analytics,
            session.clone(),
            enricher.clone(),
            analytics_buffer.clone(),
        )
        .with_error_tracker(errors.clone())
        .with_metrics(metrics.clone());

        let performance = PerformanceMonitor::new(
            &config.performance,
            session.clone(),
            enricher.clone(),
            performance_buffer.clone(),
        )
        .with_metrics(metrics.clone());

        let channels: Vec<Arc<dyn Flushable>> =
            vec![logs_buffer, analytics_buffer, errors_buffer, performance_buffer];

        info!(
            environment = %config.session.environment,
            version = %config.session.app_version,
            session = %session.peek(),
            "Telemetry client created"
        );

        Ok(Self {
            config,
            session,
            enricher,
            metrics,
            logger,
            analytics,
            errors,
            performance,
            channels,
            cancel: CancellationToken::new(),
            scheduler: Mutex::new(None),
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Spawn the periodic flush task. Calling it again is a no-op, as is
    /// calling it after shutdown.
    pub fn start(&self) {
        let mut scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if scheduler.is_some() || self.cancel.is_cancelled() {
            return;
        }
        let buffer = &self.config.buffer;
        let handle = FlushScheduler::new(
            self.channels.clone(),
            Duration::from_secs(buffer.flush_interval_secs),
        )
        .with_max_backoff_ticks(buffer.max_backoff_ticks)
        .with_shutdown_timeout(self.shutdown_timeout())
        .spawn(self.cancel.clone());
        *scheduler = Some(handle);
    }

    /// Flush every channel now, ignoring any backoff.
    pub async fn flush_all(&self) -> Vec<(String, FlushOutcome)> {
        flush_channels(&self.channels).await
    }

    /// Stop the scheduler and make one final flush bounded by
    /// `buffer.shutdown_timeout_ms`.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Flush scheduler ended abnormally");
                }
            }
            None => final_flush(&self.channels, self.shutdown_timeout()).await,
        }
        info!("Telemetry client shut down");
    }

    /// Report panics through this client's error tracker.
    pub fn install_panic_hook(&self) {
        self.errors.install_panic_hook();
    }

    fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.config.buffer.shutdown_timeout_ms)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn analytics(&self) -> &Analytics {
        &self.analytics
    }

    pub fn errors(&self) -> &Arc<ErrorTracker> {
        &self.errors
    }

    pub fn performance(&self) -> &PerformanceMonitor {
        &self.performance
    }

    pub fn context(&self) -> &ContextEnricher {
        &self.enricher
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn metrics(&self) -> &TelemetryMetrics {
        &self.metrics
    }

    /// Records waiting in each channel.
    pub fn pending(&self) -> Vec<(String, usize)> {
        self.channels
            .iter()
            .map(|c| (c.channel().to_string(), c.pending()))
            .collect()
    }
}
