//! Error capture
//!
//! The [`ErrorTracker`] turns failures into [`ErrorReport`]s and buffers
//! them for the errors endpoint. Each captured error passes, in order:
//!
//! 1. the enabled switch
//! 2. the ignore list (regexes matched against `"{type}: {message}"` and
//!    the bare message)
//! 3. the sliding-window rate limiter
//! 4. the sampler
//!
//! Survivors get a heuristic severity, a copy of the breadcrumb trail,
//! and a context snapshot.
//!
//! [`ErrorTracker::install_panic_hook`] captures Rust panics the way global
//! `error` listeners capture uncaught exceptions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lifeline_core::config::ErrorsConfig;
use lifeline_core::domain::{
    Breadcrumb, BreadcrumbKind, CaptureSource, ErrorReport, EventId, Severity,
};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::buffer::EventBuffer;
use crate::context::ContextEnricher;
use crate::metrics::{DropReason, TelemetryMetrics};
use crate::rate_limit::SlidingWindowLimiter;
use crate::sampler::Sampler;
use crate::session::SessionManager;

const CHANNEL: &str = "errors";

/// An error as handed to the tracker, before enrichment
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedError {
    pub error_type: String,
    pub message: String,
    pub source: CaptureSource,
    pub stack: Option<String>,
    pub component: Option<String>,
}

impl CapturedError {
    pub fn new(
        error_type: impl Into<String>,
        message: impl Into<String>,
        source: CaptureSource,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            source,
            stack: None,
            component: None,
        }
    }

    /// Build from a Rust error; the `source()` chain becomes the stack.
    pub fn from_error<E>(err: &E, source: CaptureSource) -> Self
    where
        E: std::error::Error,
    {
        let type_name = std::any::type_name::<E>();
        let short_name = type_name.rsplit("::").next().unwrap_or(type_name);

        let mut chain = Vec::new();
        let mut cause = err.source();
        while let Some(c) = cause {
            chain.push(format!("caused by: {c}"));
            cause = c.source();
        }

        let mut captured = Self::new(short_name, err.to_string(), source);
        if !chain.is_empty() {
            captured.stack = Some(chain.join("\n"));
        }
        captured
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Name the component whose boundary caught the error.
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }
}

/// What happened to a captured error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Buffered for delivery as the report with this id
    Captured(EventId),
    /// Error tracking is disabled
    Disabled,
    /// Matched the ignore list
    Ignored,
    /// Over the per-window cap
    RateLimited,
    /// Lost the sampling draw
    Sampled,
}

/// Heuristic severity for a captured error.
///
/// Checks run from most to least severe and the first match wins, so an
/// uncaught out-of-memory error is critical rather than high.
pub fn classify_severity(err: &CapturedError) -> Severity {
    let message = err.message.to_lowercase();
    let error_type = err.error_type.to_lowercase();
    let mentions = |needle: &str| message.contains(needle) || error_type.contains(needle);

    if err.source == CaptureSource::Panic
        || mentions("chunkloaderror")
        || mentions("loading chunk")
        || mentions("out of memory")
        || mentions("payment")
        || mentions("security")
    {
        return Severity::Critical;
    }

    if matches!(
        err.source,
        CaptureSource::Uncaught | CaptureSource::UnhandledRejection
    ) || mentions("network")
        || mentions("failed to fetch")
        || error_type == "typeerror"
        || error_type == "referenceerror"
    {
        return Severity::High;
    }

    if err.source == CaptureSource::ComponentBoundary || mentions("validation") {
        return Severity::Medium;
    }

    Severity::Low
}

/// Captures, filters, and buffers error reports
pub struct ErrorTracker {
    enabled: AtomicBool,
    ignore: Vec<Regex>,
    limiter: SlidingWindowLimiter,
    sampler: Sampler,
    max_breadcrumbs: usize,
    breadcrumbs: Mutex<VecDeque<Breadcrumb>>,
    session: Arc<SessionManager>,
    enricher: Arc<ContextEnricher>,
    buffer: Arc<EventBuffer<ErrorReport>>,
    metrics: Option<Arc<TelemetryMetrics>>,
}

impl ErrorTracker {
    /// Creates a tracker from the `errors` configuration section.
    ///
    /// Ignore patterns that fail to compile are skipped with a warning.
    pub fn new(
        config: &ErrorsConfig,
        session: Arc<SessionManager>,
        enricher: Arc<ContextEnricher>,
        buffer: Arc<EventBuffer<ErrorReport>>,
    ) -> Self {
        let ignore = config
            .ignore_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "Skipping invalid ignore pattern");
                    None
                }
            })
            .collect();

        Self {
            enabled: AtomicBool::new(config.enabled),
            ignore,
            limiter: SlidingWindowLimiter::per_minute(config.max_per_minute),
            sampler: Sampler::new(config.sampling_rate),
            max_breadcrumbs: config.max_breadcrumbs,
            breadcrumbs: Mutex::new(VecDeque::with_capacity(config.max_breadcrumbs)),
            session,
            enricher,
            buffer,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<TelemetryMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the sampler, e.g. with a seeded one.
    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    // ========================================================================
    // Breadcrumbs
    // ========================================================================

    /// Append to the trail, evicting the oldest entry when full.
    pub fn add_breadcrumb(
        &self,
        kind: BreadcrumbKind,
        message: impl Into<String>,
        data: Option<Map<String, Value>>,
    ) {
        if self.max_breadcrumbs == 0 {
            return;
        }
        let mut crumb = Breadcrumb::new(kind, message);
        if let Some(data) = data {
            crumb = crumb.with_data(data);
        }

        let mut trail = self.lock_breadcrumbs();
        while trail.len() >= self.max_breadcrumbs {
            trail.pop_front();
        }
        trail.push_back(crumb);
    }

    /// The current trail, oldest first.
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.lock_breadcrumbs().iter().cloned().collect()
    }

    pub fn clear_breadcrumbs(&self) {
        self.lock_breadcrumbs().clear();
    }

    fn lock_breadcrumbs(&self) -> MutexGuard<'_, VecDeque<Breadcrumb>> {
        self.breadcrumbs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Capture
    // ========================================================================

    /// Capture an error and buffer its report, delivering immediately when
    /// the batch threshold is reached.
    pub async fn capture(&self, err: CapturedError) -> CaptureOutcome {
        match self.prepare(err) {
            Ok(report) => {
                let id = report.id;
                self.buffer.record(report).await;
                CaptureOutcome::Captured(id)
            }
            Err(outcome) => outcome,
        }
    }

    /// Capture from synchronous code. The report waits for the next flush.
    pub fn capture_sync(&self, err: CapturedError) -> CaptureOutcome {
        match self.prepare(err) {
            Ok(report) => {
                let id = report.id;
                self.buffer.push(report);
                CaptureOutcome::Captured(id)
            }
            Err(outcome) => outcome,
        }
    }

    /// Shorthand for a manually reported message.
    pub async fn capture_message(&self, message: impl Into<String>) -> CaptureOutcome {
        self.capture(CapturedError::new("Error", message, CaptureSource::Manual))
            .await
    }

    fn is_ignored(&self, err: &CapturedError) -> bool {
        let qualified = format!("{}: {}", err.error_type, err.message);
        self.ignore
            .iter()
            .any(|re| re.is_match(&err.message) || re.is_match(&qualified))
    }

    fn prepare(&self, err: CapturedError) -> Result<ErrorReport, CaptureOutcome> {
        if !self.is_enabled() {
            self.record_dropped(DropReason::Filtered);
            return Err(CaptureOutcome::Disabled);
        }
        if self.is_ignored(&err) {
            debug!(error_type = %err.error_type, "Ignoring benign error");
            self.record_dropped(DropReason::Ignored);
            return Err(CaptureOutcome::Ignored);
        }
        if !self.limiter.try_acquire() {
            warn!(
                error_type = %err.error_type,
                max_per_window = self.limiter.max_per_window(),
                "Error rate limit reached, dropping report"
            );
            self.record_dropped(DropReason::RateLimited);
            return Err(CaptureOutcome::RateLimited);
        }
        if !self.sampler.should_sample() {
            self.record_dropped(DropReason::Sampled);
            return Err(CaptureOutcome::Sampled);
        }

        let severity = classify_severity(&err);
        error!(
            error_type = %err.error_type,
            source = ?err.source,
            severity = %severity,
            "{}",
            err.message
        );

        Ok(ErrorReport::new(
            &err.error_type,
            &err.message,
            err.source,
            severity,
            self.session.current(),
        )
        .with_stack(err.stack)
        .with_component(err.component)
        .with_breadcrumbs(self.breadcrumbs())
        .with_context(self.enricher.snapshot())
        .with_user_id(self.session.user_id()))
    }

    fn record_dropped(&self, reason: DropReason) {
        if let Some(metrics) = &self.metrics {
            metrics.record_dropped(CHANNEL, reason, 1);
        }
    }

    // ========================================================================
    // Panic hook
    // ========================================================================

    /// Install a panic hook that reports panics through this tracker.
    ///
    /// Chains with the existing hook so default behavior (stderr output) is
    /// preserved. The hook only appends to the buffer; the report goes out
    /// with the next flush. It holds a weak reference, so dropping the
    /// tracker turns it into a pass-through.
    pub fn install_panic_hook(self: &Arc<Self>) {
        let tracker = Arc::downgrade(self);
        let previous_hook = std::panic::take_hook();

        std::panic::set_hook(Box::new(move |panic_info| {
            if let Some(tracker) = tracker.upgrade() {
                let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };

                let location = panic_info
                    .location()
                    .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                    .unwrap_or_default();

                let backtrace = std::backtrace::Backtrace::capture();
                let stack = format!("at {location}\n{backtrace}");

                tracker.capture_sync(
                    CapturedError::new("panic", message, CaptureSource::Panic).with_stack(stack),
                );
            }

            previous_hook(panic_info);
        }));
    }
}
