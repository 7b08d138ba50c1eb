//! Session tracking
//!
//! A session id is random, lives only in memory, and rotates after a
//! period of inactivity or an explicit [`SessionManager::reset`]. The
//! identified user, if any, is held alongside it.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lifeline_core::domain::{SessionId, UserId};
use tracing::{debug, info};

#[derive(Debug)]
struct SessionState {
    id: SessionId,
    last_activity: Instant,
    user_id: Option<UserId>,
}

/// Shared session state for all producers of one client
#[derive(Debug)]
pub struct SessionManager {
    idle_timeout: Duration,
    state: Mutex<SessionState>,
}

impl SessionManager {
    /// Creates a manager with a fresh session.
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            state: Mutex::new(SessionState {
                id: SessionId::new(),
                last_activity: Instant::now(),
                user_id: None,
            }),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Current session id, recording activity.
    pub fn current(&self) -> SessionId {
        self.current_at(Instant::now())
    }

    /// Current session id as of `now`, rotating it if the previous
    /// activity is older than the idle timeout.
    pub fn current_at(&self, now: Instant) -> SessionId {
        let mut state = self.lock_state();
        if now.saturating_duration_since(state.last_activity) >= self.idle_timeout {
            let previous = state.id;
            state.id = SessionId::new();
            debug!(previous = %previous, current = %state.id, "Session expired after inactivity");
        }
        state.last_activity = now;
        state.id
    }

    /// Session id without recording activity or rotating.
    pub fn peek(&self) -> SessionId {
        self.lock_state().id
    }

    /// Start a new session and forget the identified user.
    pub fn reset(&self) -> SessionId {
        let mut state = self.lock_state();
        state.id = SessionId::new();
        state.last_activity = Instant::now();
        state.user_id = None;
        info!(session = %state.id, "Session reset");
        state.id
    }

    /// Associate subsequent records with `user_id`.
    pub fn identify(&self, user_id: UserId) {
        self.lock_state().user_id = Some(user_id);
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.lock_state().user_id.clone()
    }

    /// Every field is written in one assignment, so a poisoned lock still
    /// holds a consistent session.
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Panic on another thread while holding the state lock.
    #[cfg(test)]
    pub(crate) fn poison(self: &std::sync::Arc<Self>) {
        let session = self.clone();
        let _ = std::thread::spawn(move || {
            let _held = session.state.lock();
            panic!("session holder died");
        })
        .join();
        assert!(self.state.is_poisoned());
    }
}
