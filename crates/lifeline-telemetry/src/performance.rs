//! Performance measurement
//!
//! [`PerformanceMonitor`] records web vitals and custom timings as
//! [`PerformanceMetric`]s for the performance endpoint. Metrics with a
//! known threshold carry a `passed` flag; exceeding one is logged at warn.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use lifeline_core::config::PerformanceConfig;
use lifeline_core::domain::{MetricUnit, PerformanceMetric};
use tracing::{debug, warn};

use crate::buffer::EventBuffer;
use crate::context::ContextEnricher;
use crate::metrics::{DropReason, TelemetryMetrics};
use crate::sampler::Sampler;
use crate::session::SessionManager;

const CHANNEL: &str = "performance";

/// Collects and buffers performance metrics
pub struct PerformanceMonitor {
    enabled: AtomicBool,
    sampler: Sampler,
    thresholds: BTreeMap<String, f64>,
    session: Arc<SessionManager>,
    enricher: Arc<ContextEnricher>,
    buffer: Arc<EventBuffer<PerformanceMetric>>,
    metrics: Option<Arc<TelemetryMetrics>>,
}

impl PerformanceMonitor {
    pub fn new(
        config: &PerformanceConfig,
        session: Arc<SessionManager>,
        enricher: Arc<ContextEnricher>,
        buffer: Arc<EventBuffer<PerformanceMetric>>,
    ) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            sampler: Sampler::new(config.sampling_rate),
            thresholds: config.thresholds.clone(),
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

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Threshold configured for `name`, if any.
    pub fn threshold(&self, name: &str) -> Option<f64> {
        self.thresholds.get(name).copied()
    }

    /// Record a measurement. Returns the metric if it was buffered.
    pub async fn record(
        &self,
        name: impl Into<String>,
        value: f64,
        unit: MetricUnit,
    ) -> Option<PerformanceMetric> {
        let name = name.into();
        if !self.is_enabled() {
            self.record_dropped(DropReason::Filtered);
            return None;
        }
        if !self.sampler.should_sample() {
            self.record_dropped(DropReason::Sampled);
            return None;
        }

        let threshold = self.threshold(&name);
        let metric = PerformanceMetric::new(name, value, unit, self.session.current())
            .with_threshold(threshold)
            .with_page_path(self.enricher.page_path());
        Some(self.finish(metric).await)
    }

    /// Record a core web vital. CLS is a unitless score; the others are
    /// milliseconds.
    pub async fn record_web_vital(&self, name: &str, value: f64) -> Option<PerformanceMetric> {
        let unit = if name.eq_ignore_ascii_case("CLS") {
            MetricUnit::Score
        } else {
            MetricUnit::Milliseconds
        };
        self.record(name.to_ascii_uppercase(), value, unit).await
    }

    /// Start timing `name`; [`Timer::stop`] records the elapsed time.
    pub fn start_timer(&self, name: impl Into<String>) -> Timer<'_> {
        Timer {
            monitor: self,
            name: name.into(),
            started: Instant::now(),
        }
    }

    /// Time `operation` and record how long it took, returning its output.
    pub async fn measure<F, T>(&self, name: impl Into<String>, operation: F) -> T
    where
        F: Future<Output = T>,
    {
        let timer = self.start_timer(name);
        let output = operation.await;
        timer.stop().await;
        output
    }

    async fn finish(&self, metric: PerformanceMetric) -> PerformanceMetric {
        if metric.exceeded() {
            warn!(
                metric = %metric.name,
                value = metric.value,
                threshold = metric.threshold.unwrap_or_default(),
                "Performance threshold exceeded"
            );
        } else {
            debug!(metric = %metric.name, value = metric.value, "Performance metric recorded");
        }
        self.buffer.record(metric.clone()).await;
        metric
    }

    fn record_dropped(&self, reason: DropReason) {
        if let Some(metrics) = &self.metrics {
            metrics.record_dropped(CHANNEL, reason, 1);
        }
    }
}

/// A running measurement started by [`PerformanceMonitor::start_timer`]
#[must_use = "a timer records nothing unless stopped"]
pub struct Timer<'a> {
    monitor: &'a PerformanceMonitor,
    name: String,
    started: Instant,
}

impl Timer<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    /// Stop the timer and record the elapsed milliseconds.
    pub async fn stop(self) -> Option<PerformanceMetric> {
        let elapsed = self.elapsed_ms();
        self.monitor
            .record(self.name, elapsed, MetricUnit::Milliseconds)
            .await
    }
}
