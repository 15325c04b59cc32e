//! Auth domain - session lifecycle for the OurAfrica client
//!
//! Responsibilities:
//! - Login/logout/profile through an online or offline provider
//! - Startup session restoration from cached credentials
//! - Single-flight access token renewal
//! - Session events for the user projection and other observers

pub mod events;
pub mod provider;
pub mod refresh;
pub mod service;
pub mod state;
pub mod types;

pub use events::{AuthEvent, SessionBus, SessionObserver};
pub use provider::{AuthProvider, ConnectivityAwareProvider, OfflineAuthProvider, OnlineAuthProvider};
pub use refresh::{RefreshCoordinator, RefreshEndpoint, TokenRefresher};
pub use service::{AuthService, Restored, Session};
pub use state::AuthState;
pub use types::*;
