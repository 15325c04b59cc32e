//! Connectivity signal.
//!
//! The client never probes the network itself; the host tells it whether it
//! is online. The auth provider and the refresh coordinator pick their
//! execution path from that.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;

    fn is_offline(&self) -> bool {
        !self.is_online()
    }
}

impl<C: Connectivity + ?Sized> Connectivity for Arc<C> {
    fn is_online(&self) -> bool {
        (**self).is_online()
    }
}

/// Host-controlled online/offline flag.
#[derive(Debug, Clone)]
pub struct ConnectivityFlag {
    online: Arc<watch::Sender<bool>>,
}

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(watch::Sender::new(online)),
        }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn set_online(&self, online: bool) {
        let changed = self.online.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if changed {
            info!(online, "Connectivity changed");
        }
    }

    pub fn watch(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_online(&self) -> bool {
        *self.online.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flag_transitions_are_observable() {
        let flag = ConnectivityFlag::online();
        let mut rx = flag.watch();
        assert!(flag.is_online());

        flag.set_online(false);
        rx.changed().await.unwrap();

        assert!(!*rx.borrow());
        assert!(flag.is_offline());
    }

    #[test]
    fn test_clones_share_state() {
        let flag = ConnectivityFlag::online();
        let other = flag.clone();
        other.set_online(false);
        assert!(flag.is_offline());
    }
}
