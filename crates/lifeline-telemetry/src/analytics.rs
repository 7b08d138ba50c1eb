//! Product analytics
//!
//! [`Analytics`] records user interactions as [`EventRecord`]s for the
//! analytics endpoint. Convenience methods cover the booking site's common
//! interactions; [`Analytics::track`] takes anything else.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lifeline_core::config::AnalyticsConfig;
use lifeline_core::domain::{BreadcrumbKind, EventId, EventMetadata, EventRecord, UserId};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::buffer::EventBuffer;
use crate::context::ContextEnricher;
use crate::error_tracker::ErrorTracker;
use crate::metrics::{DropReason, TelemetryMetrics};
use crate::sampler::Sampler;
use crate::session::SessionManager;

const CHANNEL: &str = "analytics";

/// An interaction to track, before session and context are attached
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackEvent {
    pub name: String,
    pub category: String,
    pub action: String,
    pub label: Option<String>,
    pub value: Option<f64>,
    pub metadata: EventMetadata,
}

impl TrackEvent {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            action: action.into(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// What happened to a tracked event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// Buffered for delivery
    Tracked(EventId),
    /// Analytics is switched off
    Disabled,
    /// Lost the sampling draw
    Sampled,
    /// The event was malformed (blank name)
    Invalid,
}

/// Interaction tracking for one client
pub struct Analytics {
    enabled: AtomicBool,
    sampler: Sampler,
    session: Arc<SessionManager>,
    enricher: Arc<ContextEnricher>,
    buffer: Arc<EventBuffer<EventRecord>>,
    errors: Option<Arc<ErrorTracker>>,
    metrics: Option<Arc<TelemetryMetrics>>,
}

impl Analytics {
    pub fn new(
        config: &AnalyticsConfig,
        session: Arc<SessionManager>,
        enricher: Arc<ContextEnricher>,
        buffer: Arc<EventBuffer<EventRecord>>,
    ) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            sampler: Sampler::new(config.sampling_rate),
            session,
            enricher,
            buffer,
            errors: None,
            metrics: None,
        }
    }

    /// Leave navigation and click breadcrumbs on `errors`.
    pub fn with_error_tracker(mut self, errors: Arc<ErrorTracker>) -> Self {
        self.errors = Some(errors);
        self
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
        debug!(enabled, "Analytics switched");
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Attribute subsequent events to `user_id`.
    pub fn identify(&self, user_id: UserId) {
        self.session.identify(user_id);
    }

    /// Forget the user and start a new session, e.g. on sign-out.
    pub fn reset(&self) {
        self.session.reset();
    }

    // ========================================================================
    // Tracking
    // ========================================================================

    /// Track an arbitrary interaction.
    pub async fn track(&self, event: TrackEvent) -> TrackOutcome {
        if !self.is_enabled() {
            self.record_dropped(DropReason::Filtered);
            return TrackOutcome::Disabled;
        }
        if !self.sampler.should_sample() {
            self.record_dropped(DropReason::Sampled);
            return TrackOutcome::Sampled;
        }

        let record = match EventRecord::new(
            event.name,
            event.category,
            event.action,
            self.session.current(),
        ) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Dropping malformed analytics event");
                self.record_dropped(DropReason::Filtered);
                return TrackOutcome::Invalid;
            }
        };

        let mut record = record
            .with_metadata(event.metadata)
            .with_context(self.enricher.snapshot())
            .with_user_id(self.session.user_id());
        if let Some(label) = event.label {
            record = record.with_label(label);
        }
        if let Some(value) = event.value {
            record = record.with_value(value);
        }

        let id = record.id();
        debug!(event = %record.name(), event_type = record.event_type(), "Tracked");
        self.buffer.record(record).await;
        TrackOutcome::Tracked(id)
    }

    /// Track a page view. The enricher's current page is updated even when
    /// the event itself is disabled or sampled out.
    pub async fn page_view(
        &self,
        path: impl Into<String>,
        title: Option<String>,
        referrer: Option<String>,
    ) -> TrackOutcome {
        let path = path.into();
        let previous = self.enricher.page_path();
        self.enricher.set_page(path.clone(), referrer.clone());
        self.breadcrumb(
            BreadcrumbKind::Navigation,
            format!("{} -> {}", previous.as_deref().unwrap_or("(entry)"), path),
        );

        self.track(
            TrackEvent::new("page_view", "navigation", "view")
                .with_label(path.clone())
                .with_metadata(EventMetadata::PageView {
                    path,
                    title,
                    referrer,
                }),
        )
        .await
    }

    pub async fn click(&self, element: impl Into<String>, text: Option<String>) -> TrackOutcome {
        let element = element.into();
        self.breadcrumb(BreadcrumbKind::Click, element.clone());
        self.track(
            TrackEvent::new("click", "interaction", "click")
                .with_label(element.clone())
                .with_metadata(EventMetadata::Click { element, text }),
        )
        .await
    }

    pub async fn form_submit(&self, form: impl Into<String>, success: bool) -> TrackOutcome {
        let form = form.into();
        let action = if success { "submit" } else { "submit_failed" };
        self.track(
            TrackEvent::new("form_submit", "form", action)
                .with_label(form.clone())
                .with_metadata(EventMetadata::FormSubmit { form, success }),
        )
        .await
    }

    /// Track progress through the course booking funnel.
    pub async fn booking_step(
        &self,
        course_id: impl Into<String>,
        step: impl Into<String>,
    ) -> TrackOutcome {
        let course_id = course_id.into();
        let step = step.into();
        self.track(
            TrackEvent::new("booking_step", "booking", step.clone())
                .with_label(course_id.clone())
                .with_metadata(EventMetadata::Booking { course_id, step }),
        )
        .await
    }

    pub async fn search(&self, query: impl Into<String>, results: u32) -> TrackOutcome {
        let query = query.into();
        self.track(
            TrackEvent::new("search", "search", "query")
                .with_label(query.clone())
                .with_value(f64::from(results))
                .with_metadata(EventMetadata::Search { query, results }),
        )
        .await
    }

    /// Track an event with free-form properties.
    pub async fn custom(
        &self,
        name: impl Into<String>,
        properties: Map<String, Value>,
    ) -> TrackOutcome {
        self.track(
            TrackEvent::new(name, "custom", "custom")
                .with_metadata(EventMetadata::Custom(properties)),
        )
        .await
    }

    fn breadcrumb(&self, kind: BreadcrumbKind, message: String) {
        if let Some(errors) = &self.errors {
            errors.add_breadcrumb(kind, message, None);
        }
    }

    fn record_dropped(&self, reason: DropReason) {
        if let Some(metrics) = &self.metrics {
            metrics.record_dropped(CHANNEL, reason, 1);
        }
    }
}
