//! User projection.
//!
//! The single read-only view of the signed-in user. It is updated only by
//! session events, so screens never hold a second copy that could drift.

use std::sync::Arc;

use tokio::sync::watch;

use crate::auth::{AuthEvent, CurrentUser, Role, SessionObserver};

#[derive(Debug)]
pub struct UserProjection {
    current: watch::Sender<Option<Arc<CurrentUser>>>,
}

impl UserProjection {
    pub fn new() -> Self {
        Self {
            current: watch::Sender::new(None),
        }
    }

    pub fn current(&self) -> Option<Arc<CurrentUser>> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<CurrentUser>>> {
        self.current.subscribe()
    }

    pub fn display_name(&self) -> Option<String> {
        self.current.borrow().as_ref().map(|user| user.display_name())
    }

    pub fn is_admin(&self) -> bool {
        self.current
            .borrow()
            .as_ref()
            .is_some_and(|user| user.role == Role::Admin)
    }
}

impl Default for UserProjection {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionObserver for UserProjection {
    fn on_event(&self, event: &AuthEvent) {
        match event {
            AuthEvent::LoggedIn(user) | AuthEvent::UserUpdated(user) => {
                self.current.send_replace(Some(user.clone()));
            }
            AuthEvent::LoggedOut | AuthEvent::SessionExpired => {
                self.current.send_replace(None);
            }
            AuthEvent::TokensRefreshed => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionBus;
    use crate::testing::sample_user;

    #[test]
    fn test_follows_session_events() {
        let bus = SessionBus::new();
        let projection = Arc::new(UserProjection::new());
        bus.observe(projection.clone());

        bus.emit(AuthEvent::LoggedIn(Arc::new(sample_user("u1", "ada@example.com"))));
        assert_eq!(projection.current().unwrap().id, "u1");
        assert_eq!(projection.display_name().as_deref(), Some("Ada Obi"));
        assert!(!projection.is_admin());

        bus.emit(AuthEvent::TokensRefreshed);
        assert!(projection.current().is_some());

        bus.emit(AuthEvent::SessionExpired);
        assert!(projection.current().is_none());
    }

    #[test]
    fn test_updated_user_replaces_record() {
        let projection = UserProjection::new();
        let mut admin = sample_user("u1", "ada@example.com");
        admin.role = Role::Admin;

        projection.on_event(&AuthEvent::LoggedIn(Arc::new(sample_user("u1", "ada@example.com"))));
        projection.on_event(&AuthEvent::UserUpdated(Arc::new(admin)));

        assert!(projection.is_admin());
    }

    #[tokio::test]
    async fn test_subscribers_see_logout() {
        let projection = UserProjection::new();
        projection.on_event(&AuthEvent::LoggedIn(Arc::new(sample_user("u1", "ada@example.com"))));
        let mut rx = projection.subscribe();

        projection.on_event(&AuthEvent::LoggedOut);
        rx.changed().await.unwrap();

        assert!(rx.borrow().is_none());
    }
}
