//! Session coordinator.
//!
//! Owns the in-memory authentication status and funnels every session
//! mutation (login, registration, logout, refresh, profile updates) through
//! one place so the token store and local database are never written from
//! two independent flows.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::state::LoadingGuard;
use super::{
    AuthEvent, AuthPayload, AuthProvider, AuthState, Credentials, CurrentUser, RefreshCoordinator,
    RegistrationDetails, Role, SessionBus, TokenPair,
};
use crate::connectivity::Connectivity;
use crate::error::{ApiError, ClientError, Result};
use crate::storage::LocalDatabase;
use crate::token::{self, TokenStore};

/// Snapshot of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub is_authenticated: bool,
    pub is_refreshing: bool,
}

/// Where startup restoration found a usable session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restored {
    /// Offline: cached access token trusted without an expiry check
    OfflineCache,
    /// Online: unexpired access token in the local database
    LocalDatabase,
    /// Online: unexpired access token in the token store
    TokenStore,
    Unauthenticated,
}

pub struct AuthService {
    provider: Arc<dyn AuthProvider>,
    tokens: TokenStore,
    local_db: Arc<dyn LocalDatabase>,
    connectivity: Arc<dyn Connectivity>,
    state: Arc<AuthState>,
    events: SessionBus,
    refresh: Arc<RefreshCoordinator>,
    user_sync: Mutex<Option<JoinHandle<()>>>,
}

impl AuthService {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        tokens: TokenStore,
        local_db: Arc<dyn LocalDatabase>,
        connectivity: Arc<dyn Connectivity>,
        state: Arc<AuthState>,
        events: SessionBus,
        refresh: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            provider,
            tokens,
            local_db,
            connectivity,
            state,
            events,
            refresh,
            user_sync: Mutex::new(None),
        }
    }

    /// Build the service and restore any cached session.
    pub async fn start(
        provider: Arc<dyn AuthProvider>,
        tokens: TokenStore,
        local_db: Arc<dyn LocalDatabase>,
        connectivity: Arc<dyn Connectivity>,
        state: Arc<AuthState>,
        events: SessionBus,
        refresh: Arc<RefreshCoordinator>,
    ) -> Result<Self> {
        let service = Self::new(provider, tokens, local_db, connectivity, state, events, refresh);
        service.initialize_auth_state().await?;
        Ok(service)
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Synchronous check against the token store. Offline sessions count on
    /// cached credentials alone.
    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
            && (self.state.is_offline_session() || self.tokens.has_valid_session())
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    /// Signed in from the local cache, without the server.
    pub fn is_offline_session(&self) -> bool {
        self.state.is_offline_session()
    }

    pub fn is_authenticated_stream(&self) -> watch::Receiver<bool> {
        self.state.authenticated_stream()
    }

    pub fn is_loading_stream(&self) -> watch::Receiver<bool> {
        self.state.loading_stream()
    }

    pub fn session(&self) -> Session {
        Session {
            access_token: self.tokens.access_token(),
            refresh_token: self.tokens.refresh_token(),
            is_authenticated: self.is_authenticated(),
            is_refreshing: self.refresh.is_refreshing(),
        }
    }

    pub fn events(&self) -> &SessionBus {
        &self.events
    }

    /// Role check for role-gated views. Never touches the session.
    pub fn require_role(&self, role: Role) -> Result<()> {
        if !self.is_authenticated() {
            return Err(ClientError::Api(ApiError::from_status(401)));
        }

        let actual = self
            .tokens
            .access_token()
            .and_then(|t| token::decode_claims(&t).ok())
            .and_then(|claims| claims.role)
            .or_else(|| self.tokens.cached_user().map(|u| u.role));

        match actual {
            Some(actual) if actual == role => Ok(()),
            Some(actual) => Err(ClientError::Forbidden(format!(
                "{} access required, signed in as {}",
                role, actual
            ))),
            None => Err(ClientError::Forbidden(format!("{} access required", role))),
        }
    }

    // =========================================================================
    // Login / logout
    // =========================================================================

    pub async fn login(&self, credentials: Credentials) -> Result<Arc<CurrentUser>> {
        credentials.validate()?;
        let _loading = LoadingGuard::start(&self.state);

        match self.provider.login(&credentials).await {
            Ok(payload) => self.establish_session(payload).await,
            Err(err) => {
                warn!(email = %credentials.email, error = %err, "Login failed");
                self.state.set_authenticated(false);
                Err(err)
            }
        }
    }

    /// Best-effort remote invalidation, then unconditional local cleanup.
    ///
    /// User records stay cached so the account can still sign in offline.
    pub async fn logout(&self) {
        let _loading = LoadingGuard::start(&self.state);
        let refresh_token = self.tokens.refresh_token();

        match self.provider.logout(refresh_token.as_deref()).await {
            Ok(()) => debug!("Remote session invalidated"),
            Err(err) if err.is_unauthorized() => debug!("Remote session already invalid"),
            Err(err) => warn!(error = %err, "Remote logout failed, clearing local session anyway"),
        }

        self.end_session(AuthEvent::LoggedOut).await;
        info!("Logged out");
    }

    // =========================================================================
    // Profile and tokens
    // =========================================================================

    /// A 401 ends the session; any other failure is returned untouched.
    pub async fn fetch_current_user(&self) -> Result<Arc<CurrentUser>> {
        match self.provider.fetch_profile().await {
            Ok(user) => {
                let user = Arc::new(user);
                persist_user(&self.tokens, self.local_db.as_ref(), &user).await;
                self.events.emit(AuthEvent::UserUpdated(user.clone()));
                Ok(user)
            }
            Err(err) if err.is_unauthorized() => {
                // A failed renewal behind the 401 has already torn the session down.
                if self.state.is_authenticated() || self.tokens.access_token().is_some() {
                    info!("Profile fetch unauthorized, ending session");
                    self.end_session(AuthEvent::SessionExpired).await;
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Renew the token pair. Failure ends the session.
    pub async fn refresh_tokens(&self) -> Result<()> {
        if self.tokens.refresh_token().is_none() {
            return Err(ClientError::NoRefreshToken);
        }
        self.refresh.refresh().await.map(|_| ())
    }

    // =========================================================================
    // Registration
    // =========================================================================

    pub async fn initiate_email_verification(&self, email: &str) -> Result<()> {
        require_email(email)?;
        self.provider.initiate_email_verification(email).await
    }

    /// Confirms the emailed code and keeps the temporary registration token.
    pub async fn confirm_email_verification(&self, email: &str, code: &str) -> Result<()> {
        require_email(email)?;
        if code.trim().is_empty() {
            return Err(ClientError::Validation("Verification code is required".into()));
        }

        let verification = self.provider.confirm_email_verification(email, code).await?;
        self.tokens
            .set_registration_token(&verification.registration_token)
            .await?;
        debug!(email, "Email verified, registration token stored");
        Ok(())
    }

    pub async fn resend_email_verification(&self, email: &str) -> Result<()> {
        require_email(email)?;
        self.provider.resend_email_verification(email).await
    }

    /// Consumes the registration token and signs the new account in.
    pub async fn complete_registration(&self, details: RegistrationDetails) -> Result<Arc<CurrentUser>> {
        details.validate()?;
        let registration_token = self
            .tokens
            .registration_token()
            .ok_or(ClientError::NoRegistrationToken)?;

        let _loading = LoadingGuard::start(&self.state);
        let payload = self
            .provider
            .complete_registration(&registration_token, &details)
            .await?;

        let user = self.establish_session(payload).await?;
        if let Err(e) = self.tokens.clear_registration_token().await {
            warn!(error = %e, "Failed to clear registration token");
        }
        Ok(user)
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Restore a session without waiting on the network.
    ///
    /// Tiers: local database, then token store, then unauthenticated. No
    /// refresh is attempted here, even when a live refresh token exists.
    pub async fn initialize_auth_state(&self) -> Result<Restored> {
        let stored = match self.local_db.get_auth_tokens().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Local database unreadable, skipping cached tokens");
                Default::default()
            }
        };

        let cached_pair = match (&stored.access, &stored.refresh) {
            (Some(access), Some(refresh)) => Some((
                access.is_expired(),
                TokenPair {
                    access_token: access.token.clone(),
                    refresh_token: refresh.token.clone(),
                },
            )),
            _ => None,
        };

        let restored = if self.connectivity.is_offline() {
            // No way to check freshness offline; trust whatever is cached.
            if let Some((_, pair)) = &cached_pair {
                self.tokens.set_tokens(pair).await?;
                Restored::OfflineCache
            } else if self.tokens.access_token().is_some() {
                Restored::OfflineCache
            } else {
                Restored::Unauthenticated
            }
        } else if let Some((false, pair)) = &cached_pair {
            self.tokens.set_tokens(pair).await?;
            Restored::LocalDatabase
        } else if !self.tokens.is_access_token_expired() {
            Restored::TokenStore
        } else {
            Restored::Unauthenticated
        };

        match restored {
            Restored::Unauthenticated => {
                self.state.set_authenticated(false);
                debug!("No usable cached session");
            }
            Restored::OfflineCache => {
                self.state.set_authenticated(true);
                self.state.set_offline_session(true);
                self.emit_cached_user().await;
            }
            Restored::LocalDatabase | Restored::TokenStore => {
                self.state.set_authenticated(true);
                self.emit_cached_user().await;
                self.spawn_user_sync();
            }
        }

        info!(?restored, "Auth state initialized");
        Ok(restored)
    }

    /// Wait for the background profile sync started by startup restoration.
    pub async fn wait_for_user_sync(&self) {
        let handle = self
            .user_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn establish_session(&self, payload: AuthPayload) -> Result<Arc<CurrentUser>> {
        if let Some(pair) = payload.tokens() {
            self.tokens.set_tokens(&pair).await?;
            if !payload.offline {
                if let Err(e) = self.local_db.save_auth_tokens(&pair).await {
                    warn!(error = %e, "Failed to cache tokens locally");
                }
            }
        }

        let user = Arc::new(payload.user);
        persist_user(&self.tokens, self.local_db.as_ref(), &user).await;

        self.state.set_authenticated(true);
        self.state.set_offline_session(payload.offline);
        self.events.emit(AuthEvent::LoggedIn(user.clone()));

        info!(user_id = %user.id, offline = payload.offline, "Session established");
        Ok(user)
    }

    async fn end_session(&self, event: AuthEvent) {
        if let Err(e) = self.tokens.clear_tokens().await {
            warn!(error = %e, "Failed to clear tokens");
        }
        if let Err(e) = self.local_db.clear_auth_tokens().await {
            warn!(error = %e, "Failed to clear locally cached tokens");
        }
        self.state.set_authenticated(false);
        self.events.emit(event);
    }

    async fn emit_cached_user(&self) {
        let cached = match self.local_db.get_current_user().await {
            Ok(Some(user)) => Some(user),
            _ => self.tokens.cached_user(),
        };
        if let Some(user) = cached {
            self.events.emit(AuthEvent::UserUpdated(Arc::new(user)));
        }
    }

    /// Refresh user data in the background. Failure is logged and never
    /// revokes the restored session.
    fn spawn_user_sync(&self) {
        let provider = self.provider.clone();
        let tokens = self.tokens.clone();
        let local_db = self.local_db.clone();
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            match provider.fetch_profile().await {
                Ok(user) => {
                    let user = Arc::new(user);
                    persist_user(&tokens, local_db.as_ref(), &user).await;
                    events.emit(AuthEvent::UserUpdated(user));
                    debug!("Background profile sync complete");
                }
                Err(err) => warn!(error = %err, "Background profile sync failed"),
            }
        });

        *self.user_sync.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }
}

async fn persist_user(tokens: &TokenStore, local_db: &dyn LocalDatabase, user: &CurrentUser) {
    if let Err(e) = tokens.set_user(user).await {
        warn!(error = %e, "Failed to store user record");
    }
    if let Err(e) = local_db.save_user(user).await {
        warn!(error = %e, "Failed to cache user locally");
    }
}

fn require_email(email: &str) -> Result<()> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(ClientError::Validation("A valid email is required".into()));
    }
    Ok(())
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("session", &self.session())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectivityFlag;
    use crate::storage::{KvDatabase, MemoryStore};
    use crate::testing::{MockAuthProvider, MockRefresher};

    async fn service(provider: MockAuthProvider) -> (AuthService, Arc<MockAuthProvider>) {
        let provider = Arc::new(provider);
        let tokens = TokenStore::load(Arc::new(MemoryStore::new())).await.unwrap();
        let local_db: Arc<dyn LocalDatabase> = Arc::new(KvDatabase::new(MemoryStore::new()));
        let state = Arc::new(AuthState::new());
        let events = SessionBus::new();
        let refresh = Arc::new(RefreshCoordinator::new(
            tokens.clone(),
            local_db.clone(),
            state.clone(),
            events.clone(),
            Arc::new(ConnectivityFlag::online()),
            Arc::new(MockRefresher::succeeding()),
        ));

        let service = AuthService::new(
            provider.clone(),
            tokens,
            local_db,
            Arc::new(ConnectivityFlag::online()),
            state,
            events,
            refresh,
        );
        (service, provider)
    }

    #[tokio::test]
    async fn test_login_failure_surfaces_error() {
        let (service, provider) =
            service(MockAuthProvider::new().with_login_error(ClientError::Api(ApiError::from_status(401)))).await;

        let err = service
            .login(Credentials::new("ada@example.com", "pw"))
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert!(!service.is_authenticated());
        assert!(!service.is_loading());
        assert_eq!(provider.calls("login"), 1);
    }

    #[tokio::test]
    async fn test_profile_error_other_than_unauthorized_keeps_session() {
        let (service, _) = service(
            MockAuthProvider::new().with_profile_error(ClientError::Api(ApiError::from_status(500))),
        )
        .await;
        service.login(Credentials::new("ada@example.com", "pw")).await.unwrap();

        let err = service.fetch_current_user().await.unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert!(service.is_authenticated());
    }

    #[tokio::test]
    async fn test_require_role_when_signed_out() {
        let (service, _) = service(MockAuthProvider::new()).await;

        let err = service.require_role(Role::Student).unwrap_err();

        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_logout_with_failing_remote_still_ends_session() {
        let (service, provider) = service(
            MockAuthProvider::new().with_logout_error(ClientError::Network("reset".into())),
        )
        .await;
        service.login(Credentials::new("ada@example.com", "pw")).await.unwrap();
        let mut events = service.events().subscribe();

        service.logout().await;

        assert!(!service.is_authenticated());
        assert!(service.session().access_token.is_none());
        assert_eq!(events.recv().await.unwrap(), AuthEvent::LoggedOut);
        assert_eq!(provider.calls("logout"), 1);
    }

    #[tokio::test]
    async fn test_refresh_without_token() {
        let (service, _) = service(MockAuthProvider::new()).await;

        assert!(matches!(
            service.refresh_tokens().await,
            Err(ClientError::NoRefreshToken)
        ));
    }
}
