//! Sliding-window rate limiting
//!
//! [`SlidingWindowLimiter`] keeps the timestamps of accepted items inside
//! the current window and admits a new one only while fewer than
//! `max_per_window` remain. Unlike a token bucket there is no burst
//! refill: exactly `max_per_window` items pass in any rolling window.
//!
//! Limits are per instance; separate clients do not share them.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default window for error reporting
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Rolling-window admission control
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_per_window: u32,
    window: Duration,
    accepted: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    /// Creates a limiter admitting `max_per_window` items per `window`.
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            accepted: Mutex::new(VecDeque::with_capacity(max_per_window as usize)),
        }
    }

    /// Creates a limiter admitting `max` items per rolling minute.
    pub fn per_minute(max: u32) -> Self {
        Self::new(max, DEFAULT_WINDOW)
    }

    /// Try to admit one item now.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Try to admit one item at `now`.
    ///
    /// Timestamps at or before `now - window` have left the window.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut accepted = self.lock_accepted();
        Self::evict(&mut accepted, now, self.window);

        if accepted.len() < self.max_per_window as usize {
            accepted.push_back(now);
            true
        } else {
            false
        }
    }

    /// Items admitted within the window ending at `now`.
    pub fn in_window_at(&self, now: Instant) -> usize {
        let mut accepted = self.lock_accepted();
        Self::evict(&mut accepted, now, self.window);
        accepted.len()
    }

    /// Forget all admitted items.
    pub fn reset(&self) {
        self.lock_accepted().clear();
    }

    pub fn max_per_window(&self) -> u32 {
        self.max_per_window
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock_accepted(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.accepted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evict(accepted: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(&oldest) = accepted.front() {
            if now.saturating_duration_since(oldest) >= window {
                accepted.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poisoned_window_keeps_counting() {
        let limiter = std::sync::Arc::new(SlidingWindowLimiter::per_minute(2));
        let start = Instant::now();
        assert!(limiter.try_acquire_at(start));

        let holder = limiter.clone();
        let _ = std::thread::spawn(move || {
            let _held = holder.accepted.lock();
            panic!("admission thread died");
        })
        .join();
        assert!(limiter.accepted.is_poisoned());

        assert!(limiter.try_acquire_at(start));
        assert!(!limiter.try_acquire_at(start));
        assert_eq!(limiter.in_window_at(start), 2);
    }

    #[test]
    fn test_admits_exactly_cap_then_rejects() {
        let limiter = SlidingWindowLimiter::per_minute(10);
        let start = Instant::now();

        for i in 0..10 {
            assert!(
                limiter.try_acquire_at(start + Duration::from_secs(i)),
                "item {i} should be admitted"
            );
        }
        assert!(!limiter.try_acquire_at(start + Duration::from_secs(10)));
        assert_eq!(limiter.in_window_at(start + Duration::from_secs(10)), 10);
    }

    #[test]
    fn test_window_rolls_forward() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.try_acquire_at(start));
        assert!(limiter.try_acquire_at(start + Duration::from_secs(30)));
        assert!(!limiter.try_acquire_at(start + Duration::from_secs(59)));

        // The first admission leaves the window at exactly +60s
        assert!(limiter.try_acquire_at(start + Duration::from_secs(60)));
        assert!(!limiter.try_acquire_at(start + Duration::from_secs(61)));

        // The second leaves at +90s
        assert!(limiter.try_acquire_at(start + Duration::from_secs(90)));
    }

    #[test]
    fn test_rejections_do_not_consume_capacity() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.try_acquire_at(start));
        for s in 1..50 {
            assert!(!limiter.try_acquire_at(start + Duration::from_secs(s)));
        }
        assert!(limiter.try_acquire_at(start + Duration::from_secs(60)));
    }

    #[test]
    fn test_any_rolling_window_holds_at_most_cap() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(10));
        let start = Instant::now();
        let mut admitted = Vec::new();

        for ms in (0..40_000).step_by(700) {
            let at = start + Duration::from_millis(ms);
            if limiter.try_acquire_at(at) {
                admitted.push(ms);
            }
        }

        for (i, &t) in admitted.iter().enumerate() {
            let in_window = admitted[i..].iter().filter(|&&u| u < t + 10_000).count();
            assert!(in_window <= 3, "window starting at {t}ms held {in_window}");
        }
    }

    #[test]
    fn test_reset_clears_history() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        limiter.reset();
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_zero_cap_rejects_everything() {
        let limiter = SlidingWindowLimiter::per_minute(0);
        assert!(!limiter.try_acquire());
    }
}
