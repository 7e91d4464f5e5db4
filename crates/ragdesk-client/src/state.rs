//! Shared session state.
//!
//! [`SessionState`] is a cloneable handle over a `watch` channel holding the
//! current [`Session`]. Readers take cheap snapshots or subscribe to changes;
//! writes go through the crate-private setters used by the session store, the
//! lifecycle controller and the HTTP wrapper's 401 handling.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;

use crate::identity::{AuthState, Identity, Session};

/// Handle to the single session record.
#[derive(Clone)]
pub struct SessionState {
    tx: Arc<watch::Sender<Session>>,
    // Code exchanges talking to the backend; `loading` stays up while non-zero.
    exchanges: Arc<AtomicUsize>,
}

impl SessionState {
    /// A fresh state, loading with no identity.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Session::initializing());
        Self {
            tx: Arc::new(tx),
            exchanges: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Current session value.
    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn state(&self) -> AuthState {
        self.tx.borrow().state()
    }

    /// Receive every subsequent change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    pub(crate) fn set_identity(&self, identity: Identity) {
        self.tx.send_modify(|session| session.identity = Some(identity));
    }

    /// Returns whether an identity was actually removed.
    pub(crate) fn clear_identity(&self) -> bool {
        self.tx.send_if_modified(|session| session.identity.take().is_some())
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        self.tx.send_if_modified(|session| {
            let changed = session.loading != loading;
            session.loading = loading;
            changed
        });
    }

    /// Mark a code exchange as running and raise `loading`.
    pub(crate) fn begin_exchange(&self) {
        self.exchanges.fetch_add(1, Ordering::AcqRel);
        self.set_loading(true);
    }

    pub(crate) fn end_exchange(&self) {
        self.exchanges.fetch_sub(1, Ordering::AcqRel);
    }

    /// Clear `loading` unless an exchange is still running.
    pub(crate) fn settle(&self) {
        if self.exchanges.load(Ordering::Acquire) == 0 {
            self.set_loading(false);
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;

    fn identity() -> Identity {
        Identity {
            id: 1,
            external_id: None,
            email: Some("a@b.com".to_string()),
            role: Role::Admin,
        }
    }

    #[test]
    fn starts_initializing() {
        let state = SessionState::new();
        assert_eq!(state.snapshot(), Session::initializing());
        assert_eq!(state.state(), AuthState::Initializing);
    }

    #[test]
    fn clones_share_the_record() {
        let state = SessionState::new();
        let other = state.clone();
        state.set_identity(identity());
        state.set_loading(false);
        assert_eq!(other.state(), AuthState::Authenticated);

        assert!(other.clear_identity());
        assert!(!other.clear_identity());
        assert_eq!(state.state(), AuthState::Anonymous);
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let state = SessionState::new();
        let mut rx = state.subscribe();

        state.set_loading(false);
        rx.changed().await.unwrap();
        assert!(!rx.borrow_and_update().loading);

        // Unchanged values do not wake subscribers.
        state.set_loading(false);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn settle_waits_for_running_exchange() {
        let state = SessionState::new();
        state.begin_exchange();
        state.settle();
        assert!(state.snapshot().loading);

        state.end_exchange();
        state.settle();
        assert!(!state.snapshot().loading);
    }
}
