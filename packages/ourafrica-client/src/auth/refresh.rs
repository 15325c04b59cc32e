//! Single-flight access token renewal.
//!
//! At most one refresh call is in flight at a time. The first caller becomes
//! the leader and performs it; everyone arriving while it runs waits on a
//! `watch` channel for the leader's outcome instead of issuing their own.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{AuthEvent, AuthState, SessionBus, TokenPair};
use crate::connectivity::Connectivity;
use crate::error::{ApiError, ClientError, Result};
use crate::http::{ApiGateway, ApiRequest};
use crate::storage::LocalDatabase;
use crate::token::TokenStore;

pub const REFRESH_PATH: &str = "/api/auth/refresh-token";

/// The call that exchanges a refresh token for a new pair.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair>;
}

/// `POST /api/auth/refresh-token`, sent without a bearer header.
#[derive(Debug, Clone)]
pub struct RefreshEndpoint {
    gateway: ApiGateway,
}

impl RefreshEndpoint {
    pub fn new(gateway: ApiGateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl TokenRefresher for RefreshEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let request = ApiRequest::post(self.gateway.url(REFRESH_PATH))
            .json(&serde_json::json!({ "refresh_token": refresh_token }))?;

        self.gateway.send_json::<TokenPair>(request).await?.into_value()
    }
}

#[derive(Debug, Clone)]
enum RefreshOutcome {
    Renewed(String),
    Failed(ClientError),
}

enum RefreshState {
    Idle,
    Refreshing(watch::Receiver<Option<RefreshOutcome>>),
}

enum Turn {
    Reuse(String),
    Leader(watch::Sender<Option<RefreshOutcome>>),
    Follower(watch::Receiver<Option<RefreshOutcome>>),
}

/// Puts the state machine back to `Idle` even if the leader's future is
/// dropped mid-refresh. Followers then see the channel close and fail.
struct IdleOnDrop<'a>(&'a Mutex<RefreshState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = RefreshState::Idle;
    }
}

pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    tokens: TokenStore,
    local_db: Arc<dyn LocalDatabase>,
    auth_state: Arc<AuthState>,
    events: SessionBus,
    connectivity: Arc<dyn Connectivity>,
    refresher: Arc<dyn TokenRefresher>,
}

impl RefreshCoordinator {
    pub fn new(
        tokens: TokenStore,
        local_db: Arc<dyn LocalDatabase>,
        auth_state: Arc<AuthState>,
        events: SessionBus,
        connectivity: Arc<dyn Connectivity>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            state: Mutex::new(RefreshState::Idle),
            tokens,
            local_db,
            auth_state,
            events,
            connectivity,
            refresher,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            RefreshState::Refreshing(_)
        )
    }

    /// Renew after a 401 on a request that carried `rejected`.
    ///
    /// If the store already holds a different access token, someone renewed
    /// it since the request went out and that token is reused as is.
    pub async fn renew_after_unauthorized(&self, rejected: Option<&str>) -> Result<String> {
        self.coordinate(Some(rejected)).await
    }

    /// Renew the access token, joining an in-flight refresh if there is one.
    ///
    /// On failure the session is torn down: tokens cleared, unauthenticated,
    /// `SessionExpired` emitted. While offline nothing is attempted and the
    /// session is left as it is.
    pub async fn refresh(&self) -> Result<String> {
        self.coordinate(None).await
    }

    async fn coordinate(&self, rejected: Option<Option<&str>>) -> Result<String> {
        if self.connectivity.is_offline() {
            debug!("Offline, not renewing access token");
            return Err(ClientError::RequiresInternet("Token refresh"));
        }

        let turn = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match &*state {
                RefreshState::Refreshing(rx) => Turn::Follower(rx.clone()),
                RefreshState::Idle => match (rejected, self.tokens.access_token()) {
                    (Some(rejected), Some(current)) if rejected != Some(current.as_str()) => {
                        Turn::Reuse(current)
                    }
                    _ => {
                        let (tx, rx) = watch::channel(None);
                        *state = RefreshState::Refreshing(rx);
                        Turn::Leader(tx)
                    }
                },
            }
        };

        match turn {
            Turn::Reuse(token) => {
                debug!("Access token already renewed, reusing it");
                Ok(token)
            }
            Turn::Follower(mut rx) => {
                debug!("Refresh in flight, waiting for its result");
                let outcome = match rx.wait_for(Option::is_some).await {
                    Ok(value) => value.clone(),
                    Err(_) => None,
                };
                match outcome {
                    Some(RefreshOutcome::Renewed(token)) => Ok(token),
                    Some(RefreshOutcome::Failed(err)) => Err(err),
                    None => Err(ClientError::Api(ApiError::from_status(401))),
                }
            }
            Turn::Leader(tx) => {
                let idle = IdleOnDrop(&self.state);
                let outcome = self.perform_refresh().await;
                drop(idle);

                tx.send_replace(Some(outcome.clone()));
                match outcome {
                    RefreshOutcome::Renewed(token) => Ok(token),
                    RefreshOutcome::Failed(err) => Err(err),
                }
            }
        }
    }

    async fn perform_refresh(&self) -> RefreshOutcome {
        let Some(refresh_token) = self.tokens.refresh_token() else {
            return RefreshOutcome::Failed(ClientError::NoRefreshToken);
        };

        debug!("Refreshing access token");
        match self.refresher.refresh(&refresh_token).await {
            Ok(pair) => {
                if let Err(e) = self.tokens.set_tokens(&pair).await {
                    warn!(error = %e, "Failed to persist refreshed tokens");
                }
                if let Err(e) = self.local_db.save_auth_tokens(&pair).await {
                    warn!(error = %e, "Failed to cache refreshed tokens locally");
                }
                self.auth_state.set_authenticated(true);
                self.events.emit(AuthEvent::TokensRefreshed);
                info!("Access token refreshed");
                RefreshOutcome::Renewed(pair.access_token)
            }
            Err(err) => {
                warn!(error = %err, "Token refresh failed, ending session");
                self.teardown().await;
                RefreshOutcome::Failed(err)
            }
        }
    }

    async fn teardown(&self) {
        if let Err(e) = self.tokens.clear_tokens().await {
            warn!(error = %e, "Failed to clear tokens");
        }
        if let Err(e) = self.local_db.clear_auth_tokens().await {
            warn!(error = %e, "Failed to clear locally cached tokens");
        }
        self.auth_state.set_authenticated(false);
        self.events.emit(AuthEvent::SessionExpired);
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &self.is_refreshing())
            .finish()
    }
}
