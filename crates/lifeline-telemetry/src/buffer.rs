//! Batched event buffer
//!
//! An [`EventBuffer`] collects records for one channel (logs, analytics,
//! errors, performance) and delivers them to that channel's endpoint as a
//! single JSON array.
//!
//! ## Delivery rules
//!
//! - Appending the `batch_size`-th record takes the whole pending list in
//!   the same critical section as the append, then sends it. Records
//!   appended while that send is in flight land in the fresh list.
//! - A failed send puts the batch back at the head of the pending list in
//!   its original order, ahead of anything recorded since.
//! - Only one send per buffer is in flight at a time, so a retried batch
//!   can never be overtaken by a later one.
//! - The pending list never holds more than `max_queue_size` records; the
//!   oldest are evicted first.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::metrics::{DropReason, TelemetryMetrics};
use crate::transport::Transport;

/// Result of a flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending
    Empty,
    /// Another flush of the same buffer was already in flight
    Busy,
    /// The batch was delivered
    Sent(usize),
    /// Delivery failed and the batch was put back for the next attempt
    Requeued(usize),
    /// The batch could not be serialized and was dropped
    Discarded(usize),
}

impl FlushOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, FlushOutcome::Requeued(_) | FlushOutcome::Discarded(_))
    }
}

/// Sizing of an [`EventBuffer`]
#[derive(Debug, Clone, Copy)]
pub struct BufferLimits {
    /// Pending count that triggers an immediate flush
    pub batch_size: usize,
    /// Hard cap on pending records
    pub max_queue_size: usize,
}

/// Clears the in-flight flag when the send finishes or is cancelled.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Pending records for one channel plus the means to deliver them
pub struct EventBuffer<T> {
    channel: String,
    path: String,
    limits: BufferLimits,
    pending: Mutex<VecDeque<T>>,
    in_flight: AtomicBool,
    transport: Arc<dyn Transport>,
    metrics: Option<Arc<TelemetryMetrics>>,
}

impl<T> std::fmt::Debug for EventBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBuffer")
            .field("channel", &self.channel)
            .field("path", &self.path)
            .field("limits", &self.limits)
            .finish()
    }
}

impl<T> EventBuffer<T>
where
    T: Serialize + Send + 'static,
{
    /// Creates a buffer for `channel` that posts to `path`.
    ///
    /// A zero `batch_size` is treated as 1, and `max_queue_size` is raised
    /// to at least `batch_size`.
    pub fn new(
        channel: impl Into<String>,
        path: impl Into<String>,
        limits: BufferLimits,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let batch_size = limits.batch_size.max(1);
        let limits = BufferLimits {
            batch_size,
            max_queue_size: limits.max_queue_size.max(batch_size),
        };
        Self {
            channel: channel.into(),
            path: path.into(),
            limits,
            pending: Mutex::new(VecDeque::new()),
            in_flight: AtomicBool::new(false),
            transport,
            metrics: None,
        }
    }

    /// Attach the shared self-metrics registry.
    pub fn with_metrics(mut self, metrics: Arc<TelemetryMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn limits(&self) -> BufferLimits {
        self.limits
    }

    /// Number of records waiting to be sent.
    pub fn len(&self) -> usize {
        self.lock_pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append without sending. Returns `true` once `batch_size` is reached.
    ///
    /// Safe to call from synchronous code such as a panic hook; the next
    /// flush delivers the record.
    pub fn push(&self, item: T) -> bool {
        let mut pending = self.lock_pending();
        self.append_locked(&mut pending, item);
        pending.len() >= self.limits.batch_size
    }

    /// Append and, when the batch threshold is reached, deliver immediately.
    pub async fn record(&self, item: T) -> Option<FlushOutcome> {
        let batch = {
            let mut pending = self.lock_pending();
            self.append_locked(&mut pending, item);
            if pending.len() >= self.limits.batch_size && !self.in_flight.swap(true, Ordering::AcqRel)
            {
                Some(pending.drain(..).collect::<Vec<_>>())
            } else {
                None
            }
        };

        match batch {
            Some(batch) => {
                let _in_flight = InFlight(&self.in_flight);
                Some(self.send(batch).await)
            }
            None => None,
        }
    }

    /// Deliver everything pending as one batch.
    pub async fn flush(&self) -> FlushOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return FlushOutcome::Busy;
        }
        let _in_flight = InFlight(&self.in_flight);

        let batch: Vec<T> = self.lock_pending().drain(..).collect();
        self.update_pending_gauge();
        self.send(batch).await
    }

    /// A panic while holding the lock cannot leave the list half-updated,
    /// so a poisoned lock is still usable. The panic hook relies on this.
    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append_locked(&self, pending: &mut VecDeque<T>, item: T) {
        pending.push_back(item);
        let overflow = pending.len().saturating_sub(self.limits.max_queue_size);
        if overflow > 0 {
            pending.drain(..overflow);
            warn!(
                channel = %self.channel,
                dropped = overflow,
                "Buffer at capacity, dropped oldest records"
            );
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_buffered(&self.channel);
            if overflow > 0 {
                metrics.record_dropped(&self.channel, DropReason::Overflow, overflow as u64);
            }
            metrics.set_pending(&self.channel, pending.len());
        }
    }

    async fn send(&self, batch: Vec<T>) -> FlushOutcome {
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }
        let count = batch.len();

        let payload = match serde_json::to_value(&batch) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(channel = %self.channel, count, error = %e, "Dropping unserializable batch");
                if let Some(metrics) = &self.metrics {
                    metrics.record_flush(&self.channel, false, count);
                    metrics.record_dropped(&self.channel, DropReason::Unserializable, count as u64);
                }
                return FlushOutcome::Discarded(count);
            }
        };

        match self.transport.send_batch(&self.path, &payload).await {
            Ok(()) => {
                debug!(channel = %self.channel, count, "Flushed batch");
                if let Some(metrics) = &self.metrics {
                    metrics.record_flush(&self.channel, true, count);
                }
                self.update_pending_gauge();
                FlushOutcome::Sent(count)
            }
            Err(e) => {
                warn!(
                    channel = %self.channel,
                    count,
                    error = %e,
                    "Flush failed, batch requeued for next attempt"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_flush(&self.channel, false, count);
                }
                self.requeue(batch);
                FlushOutcome::Requeued(count)
            }
        }
    }

    /// Put a failed batch back at the head, then re-apply the capacity cap.
    fn requeue(&self, batch: Vec<T>) {
        let mut pending = self.lock_pending();
        for item in batch.into_iter().rev() {
            pending.push_front(item);
        }
        let overflow = pending.len().saturating_sub(self.limits.max_queue_size);
        if overflow > 0 {
            pending.drain(..overflow);
            warn!(
                channel = %self.channel,
                dropped = overflow,
                "Requeued batch exceeds capacity, dropped oldest records"
            );
        }
        if let Some(metrics) = &self.metrics {
            if overflow > 0 {
                metrics.record_dropped(&self.channel, DropReason::Overflow, overflow as u64);
            }
            metrics.set_pending(&self.channel, pending.len());
        }
    }

    fn update_pending_gauge(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_pending(&self.channel, self.len());
        }
    }
}

/// A channel the flush scheduler can drive
#[async_trait]
pub trait Flushable: Send + Sync {
    /// Channel name, for logging
    fn channel(&self) -> &str;

    /// Records waiting to be sent
    fn pending(&self) -> usize;

    /// Deliver everything pending
    async fn flush(&self) -> FlushOutcome;
}

#[async_trait]
impl<T> Flushable for EventBuffer<T>
where
    T: Serialize + Send + 'static,
{
    fn channel(&self) -> &str {
        EventBuffer::channel(self)
    }

    fn pending(&self) -> usize {
        self.len()
    }

    async fn flush(&self) -> FlushOutcome {
        EventBuffer::flush(self).await
    }
}
