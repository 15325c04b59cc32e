use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// In-memory authentication status with observable streams for UI binding.
#[derive(Debug)]
pub struct AuthState {
    authenticated: watch::Sender<bool>,
    loading: watch::Sender<bool>,
    offline_session: AtomicBool,
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            authenticated: watch::Sender::new(false),
            loading: watch::Sender::new(false),
            offline_session: AtomicBool::new(false),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        *self.authenticated.borrow()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    /// Session established from cached credentials without a server round trip.
    pub fn is_offline_session(&self) -> bool {
        self.offline_session.load(Ordering::SeqCst)
    }

    pub fn set_authenticated(&self, value: bool) {
        self.authenticated.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
        if !value {
            self.offline_session.store(false, Ordering::SeqCst);
        }
    }

    pub fn set_offline_session(&self, value: bool) {
        self.offline_session.store(value, Ordering::SeqCst);
    }

    pub fn set_loading(&self, value: bool) {
        self.loading.send_replace(value);
    }

    pub fn authenticated_stream(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    pub fn loading_stream(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the loading flag when dropped, whatever path the operation took.
pub(crate) struct LoadingGuard<'a> {
    state: &'a AuthState,
}

impl<'a> LoadingGuard<'a> {
    pub(crate) fn start(state: &'a AuthState) -> Self {
        state.set_loading(true);
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state.set_loading(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_observes_transitions() {
        let state = AuthState::new();
        let mut stream = state.authenticated_stream();
        assert!(!*stream.borrow_and_update());

        state.set_authenticated(true);
        stream.changed().await.unwrap();
        assert!(*stream.borrow_and_update());
    }

    #[test]
    fn test_deauthentication_clears_offline_flag() {
        let state = AuthState::new();
        state.set_authenticated(true);
        state.set_offline_session(true);

        state.set_authenticated(false);
        assert!(!state.is_offline_session());
    }

    #[test]
    fn test_loading_guard_resets_on_drop() {
        let state = AuthState::new();
        {
            let _guard = LoadingGuard::start(&state);
            assert!(state.is_loading());
        }
        assert!(!state.is_loading());
    }
}
