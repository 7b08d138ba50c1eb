//! Prometheus self-metrics for the telemetry pipeline
//!
//! Counts what each channel buffered, dropped, and flushed so the
//! pipeline's own health can be inspected without shipping it anywhere.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Why a record never reached a buffer, or left one unsent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Lost the sampling draw
    Sampled,
    /// Rejected by the sliding-window rate limiter
    RateLimited,
    /// Matched the ignore list
    Ignored,
    /// Evicted because the channel was at capacity
    Overflow,
    /// Channel disabled or below the minimum level
    Filtered,
    /// Batch could not be serialized
    Unserializable,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Sampled => "sampled",
            DropReason::RateLimited => "rate_limited",
            DropReason::Ignored => "ignored",
            DropReason::Overflow => "overflow",
            DropReason::Filtered => "filtered",
            DropReason::Unserializable => "unserializable",
        }
    }
}

/// Registry holding the pipeline's counters, gauges, and histograms.
pub struct TelemetryMetrics {
    registry: Registry,
    /// Counter: records appended to a buffer, by channel
    pub records_buffered_total: IntCounterVec,
    /// Counter: records discarded, by (channel, reason)
    pub records_dropped_total: IntCounterVec,
    /// Counter: flush attempts, by (channel, status)
    pub flushes_total: IntCounterVec,
    /// Gauge: records waiting in each channel
    pub pending_records: IntGaugeVec,
    /// Histogram: records per delivered batch
    pub flush_batch_size: HistogramVec,
}

impl TelemetryMetrics {
    /// Creates a new `TelemetryMetrics` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("lifeline".to_string()), None)?;

        let records_buffered_total = IntCounterVec::new(
            Opts::new("records_buffered_total", "Records appended to a buffer"),
            &["channel"],
        )?;
        registry.register(Box::new(records_buffered_total.clone()))?;

        let records_dropped_total = IntCounterVec::new(
            Opts::new("records_dropped_total", "Records discarded before delivery"),
            &["channel", "reason"],
        )?;
        registry.register(Box::new(records_dropped_total.clone()))?;

        let flushes_total = IntCounterVec::new(
            Opts::new("flushes_total", "Flush attempts by outcome"),
            &["channel", "status"],
        )?;
        registry.register(Box::new(flushes_total.clone()))?;

        let pending_records = IntGaugeVec::new(
            Opts::new("pending_records", "Records waiting to be flushed"),
            &["channel"],
        )?;
        registry.register(Box::new(pending_records.clone()))?;

        let flush_batch_size = HistogramVec::new(
            HistogramOpts::new("flush_batch_size", "Records per delivered batch")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]),
            &["channel"],
        )?;
        registry.register(Box::new(flush_batch_size.clone()))?;

        Ok(Self {
            registry,
            records_buffered_total,
            records_dropped_total,
            flushes_total,
            pending_records,
            flush_batch_size,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    /// Record a record appended to `channel`.
    pub fn record_buffered(&self, channel: &str) {
        self.records_buffered_total
            .with_label_values(&[channel])
            .inc();
    }

    /// Record `count` records dropped from `channel`.
    pub fn record_dropped(&self, channel: &str, reason: DropReason, count: u64) {
        self.records_dropped_total
            .with_label_values(&[channel, reason.as_str()])
            .inc_by(count);
    }

    /// Record the outcome of a flush attempt carrying `batch_size` records.
    pub fn record_flush(&self, channel: &str, success: bool, batch_size: usize) {
        let status = if success { "success" } else { "failure" };
        self.flushes_total
            .with_label_values(&[channel, status])
            .inc();
        if success {
            self.flush_batch_size
                .with_label_values(&[channel])
                .observe(batch_size as f64);
        }
    }

    /// Set the number of pending records for `channel`.
    pub fn set_pending(&self, channel: &str, count: usize) {
        self.pending_records
            .with_label_values(&[channel])
            .set(count as i64);
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
