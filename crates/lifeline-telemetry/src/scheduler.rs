//! Periodic flushing
//!
//! The [`FlushScheduler`] flushes every registered channel on a fixed
//! interval until cancelled, then makes one last bounded attempt to
//! deliver whatever is still pending.
//!
//! ## Backoff
//!
//! A channel whose flush fails sits out the following timer ticks: 1 after
//! the first consecutive failure, then 2, 4, and so on, capped at
//! `max_backoff_ticks`. A successful or empty flush clears the backoff.
//! Explicit [`FlushScheduler::flush_all`] calls ignore the backoff.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::buffer::{Flushable, FlushOutcome};

/// Tick-skipping state for one channel
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Backoff {
    consecutive_failures: u32,
    skip_remaining: u32,
}

impl Backoff {
    /// Whether this tick should be skipped. Consumes one skip if so.
    pub(crate) fn should_skip(&mut self) -> bool {
        if self.skip_remaining > 0 {
            self.skip_remaining -= 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn observe(&mut self, outcome: FlushOutcome, max_ticks: u32) {
        match outcome {
            FlushOutcome::Sent(_) | FlushOutcome::Empty => *self = Backoff::default(),
            FlushOutcome::Requeued(_) | FlushOutcome::Discarded(_) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                let exponent = (self.consecutive_failures - 1).min(31);
                self.skip_remaining = (1u32 << exponent).min(max_ticks);
            }
            FlushOutcome::Busy => {}
        }
    }
}

/// Bounds applied to the tick interval; the timer needs a non-zero
/// period and a first deadline that fits in an `Instant`.
const MIN_INTERVAL: Duration = Duration::from_millis(1);
const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Drives periodic flushing of a set of channels
pub struct FlushScheduler {
    channels: Vec<Arc<dyn Flushable>>,
    interval: Duration,
    max_backoff_ticks: u32,
    shutdown_timeout: Duration,
}

impl FlushScheduler {
    /// Creates a scheduler ticking every `interval`, clamped to between
    /// one millisecond and one day.
    pub fn new(channels: Vec<Arc<dyn Flushable>>, interval: Duration) -> Self {
        Self {
            channels,
            interval: interval.clamp(MIN_INTERVAL, MAX_INTERVAL),
            max_backoff_ticks: 8,
            shutdown_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_max_backoff_ticks(mut self, ticks: u32) -> Self {
        self.max_backoff_ticks = ticks;
        self
    }

    /// Upper bound on the final flush after cancellation.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn channels(&self) -> &[Arc<dyn Flushable>] {
        &self.channels
    }

    /// Flush every channel concurrently and report each outcome.
    pub async fn flush_all(&self) -> Vec<(String, FlushOutcome)> {
        flush_channels(&self.channels).await
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Tick until `cancel` fires, then perform the final flush.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            channels = self.channels.len(),
            "Flush scheduler starting"
        );

        let mut backoff = vec![Backoff::default(); self.channels.len()];
        let mut timer = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval,
        );
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => self.tick(&mut backoff).await,
            }
        }

        final_flush(&self.channels, self.shutdown_timeout).await;
        info!("Flush scheduler stopped");
    }

    async fn tick(&self, backoff: &mut [Backoff]) {
        for (channel, state) in self.channels.iter().zip(backoff.iter_mut()) {
            if state.should_skip() {
                debug!(channel = channel.channel(), "Skipping flush during backoff");
                continue;
            }
            let outcome = channel.flush().await;
            state.observe(outcome, self.max_backoff_ticks);
            if outcome.is_failure() {
                debug!(
                    channel = channel.channel(),
                    skip_ticks = state.skip_remaining,
                    "Backing off after failed flush"
                );
            }
        }
    }
}

/// Best-effort flush bounded by `timeout`. A batch still in flight when
/// the timeout expires is lost.
pub(crate) async fn final_flush(channels: &[Arc<dyn Flushable>], timeout: Duration) {
    let pending: usize = channels.iter().map(|c| c.pending()).sum();
    if pending == 0 {
        return;
    }
    match tokio::time::timeout(timeout, flush_channels(channels)).await {
        Ok(outcomes) => {
            for (channel, outcome) in outcomes {
                if outcome.is_failure() {
                    warn!(channel = %channel, ?outcome, "Final flush failed, records lost");
                }
            }
        }
        Err(_) => warn!(
            pending,
            timeout_ms = timeout.as_millis() as u64,
            "Final flush timed out, pending records lost"
        ),
    }
}

pub(crate) async fn flush_channels(channels: &[Arc<dyn Flushable>]) -> Vec<(String, FlushOutcome)> {
    join_all(channels.iter().map(|channel| async move {
        (channel.channel().to_string(), channel.flush().await)
    }))
    .await
}
