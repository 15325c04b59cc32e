//! Session events.
//!
//! # Delivery
//!
//! - Observers registered with [`SessionBus::observe`] are called
//!   synchronously, in registration order, before `emit` returns.
//! - Broadcast subscribers receive the same events afterwards. Slow
//!   subscribers may lag and miss events, like any `broadcast` receiver.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::debug;

use super::CurrentUser;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn(Arc<CurrentUser>),
    /// A fresh profile replaced the known user record.
    UserUpdated(Arc<CurrentUser>),
    LoggedOut,
    /// Refresh failed and the session was torn down.
    SessionExpired,
    TokensRefreshed,
}

pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: &AuthEvent);
}

#[derive(Clone)]
pub struct SessionBus {
    observers: Arc<RwLock<Vec<Arc<dyn SessionObserver>>>>,
    sender: broadcast::Sender<AuthEvent>,
}

impl SessionBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self {
            observers: Arc::new(RwLock::new(Vec::new())),
            sender,
        }
    }

    pub fn observe(&self, observer: Arc<dyn SessionObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: AuthEvent) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for observer in &observers {
            observer.on_event(&event);
        }

        let receivers = self.sender.send(event.clone()).unwrap_or(0);
        debug!(?event, observers = observers.len(), receivers, "Session event emitted");
    }
}

impl Default for SessionBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}
