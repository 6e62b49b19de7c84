//! Session and identity state
//!
//! Three process-wide identifiers ride on every envelope:
//! - the anonymous identifier, created once on first launch and kept for the
//!   install's lifetime
//! - the session identifier, created at process start and rotated when the
//!   app resumes after a background gap longer than the inactivity threshold
//! - the user identifier, set on sign-in and cleared on sign-out
//!
//! Timestamps are passed in by the caller so rotation stays testable without
//! wall-clock waits.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::state::{keys, StateStore};

/// Identity snapshot attached to envelopes at build time
#[derive(Debug, Clone)]
pub struct Identity {
    pub anonymous_id: String,
    pub user_id: Option<String>,
    pub session_id: String,
}

/// Process-wide session/identity state
pub struct SessionState {
    store: Arc<dyn StateStore>,
    anonymous_id: String,
    user_id: Option<String>,
    session_id: String,
    /// When the app last entered the background
    background_at: Option<DateTime<Utc>>,
    timeout: Duration,
}

impl SessionState {
    /// Load-or-create identity state from durable storage.
    ///
    /// The anonymous identifier is reused if present; a fresh session
    /// identifier is always minted at process start.
    pub fn init(store: Arc<dyn StateStore>, timeout: Duration) -> Self {
        let anonymous_id = match store.load(keys::ANONYMOUS_ID) {
            Ok(Some(id)) => id,
            Ok(None) => {
                let id = Uuid::new_v4().to_string();
                persist(&store, keys::ANONYMOUS_ID, &id);
                id
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load anonymous id, minting ephemeral one");
                Uuid::new_v4().to_string()
            }
        };

        let user_id = store.load(keys::USER_ID).ok().flatten();

        let session_id = Uuid::new_v4().to_string();
        persist(&store, keys::SESSION_ID, &session_id);

        tracing::debug!(%anonymous_id, %session_id, "Session state initialized");

        Self {
            store,
            anonymous_id,
            user_id,
            session_id,
            background_at: None,
            timeout,
        }
    }

    /// Current identity snapshot
    pub fn identity(&self) -> Identity {
        Identity {
            anonymous_id: self.anonymous_id.clone(),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
        }
    }

    /// Record a sign-in
    pub fn identify(&mut self, user_id: &str) {
        self.user_id = Some(user_id.to_string());
        persist(&self.store, keys::USER_ID, user_id);
    }

    /// Record a sign-out; only the user identifier is cleared
    pub fn reset(&mut self) {
        self.user_id = None;
        if let Err(e) = self.store.remove(keys::USER_ID) {
            tracing::warn!(error = %e, "Failed to clear user id");
        }
    }

    /// Note that the app entered the background at `at`
    pub fn note_background(&mut self, at: DateTime<Utc>) {
        self.background_at = Some(at);
    }

    /// Note that the app returned to the foreground at `at`.
    ///
    /// Rotates the session identifier if the background gap exceeded the
    /// inactivity threshold. Returns true if a rotation happened.
    pub fn note_foreground(&mut self, at: DateTime<Utc>) -> bool {
        let Some(background_at) = self.background_at.take() else {
            return false;
        };

        let gap = (at - background_at).to_std().unwrap_or(Duration::ZERO);
        if gap < self.timeout {
            return false;
        }

        self.session_id = Uuid::new_v4().to_string();
        persist(&self.store, keys::SESSION_ID, &self.session_id);
        tracing::debug!(session_id = %self.session_id, gap_secs = gap.as_secs(), "Session rotated");
        true
    }
}

/// Best-effort durable write; failure degrades to in-memory state
fn persist(store: &Arc<dyn StateStore>, key: &str, value: &str) {
    if let Err(e) = store.store(key, value) {
        tracing::warn!(key, error = %e, "Failed to persist state entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;
    use chrono::TimeDelta;

    fn make_state(store: Arc<dyn StateStore>) -> SessionState {
        SessionState::init(store, Duration::from_secs(30 * 60))
    }

    #[test]
    fn test_anonymous_id_survives_restart() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());

        let first = make_state(store.clone()).identity();
        let second = make_state(store.clone()).identity();

        assert_eq!(first.anonymous_id, second.anonymous_id);
        // Sessions are per process start
        assert_ne!(first.session_id, second.session_id);
    }

    #[test]
    fn test_identify_and_reset() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let mut state = make_state(store.clone());

        state.identify("user-42");
        assert_eq!(state.identity().user_id.as_deref(), Some("user-42"));

        // Survives restart
        let restarted = make_state(store.clone());
        assert_eq!(restarted.identity().user_id.as_deref(), Some("user-42"));

        state.reset();
        assert!(state.identity().user_id.is_none());
        let anon = state.identity().anonymous_id;
        // Reset clears only the user identifier
        assert_eq!(anon, make_state(store).identity().anonymous_id);
    }

    #[test]
    fn test_session_rotates_after_long_background_gap() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let mut state = make_state(store);
        let original = state.identity().session_id;

        let t0 = Utc::now();
        state.note_background(t0);
        assert!(state.note_foreground(t0 + TimeDelta::minutes(31)));
        assert_ne!(state.identity().session_id, original);
    }

    #[test]
    fn test_short_gap_keeps_session() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let mut state = make_state(store);
        let original = state.identity().session_id;

        let t0 = Utc::now();
        state.note_background(t0);
        assert!(!state.note_foreground(t0 + TimeDelta::minutes(5)));
        assert_eq!(state.identity().session_id, original);
    }

    #[test]
    fn test_foreground_without_background_is_noop() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let mut state = make_state(store);
        assert!(!state.note_foreground(Utc::now()));
    }
}
