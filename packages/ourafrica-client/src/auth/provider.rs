//! Auth providers: where login, logout and profile fetches execute.
//!
//! `OnlineAuthProvider` talks to the backend, `OfflineAuthProvider` answers
//! from the local database, and `ConnectivityAwareProvider` picks between
//! them per call.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{AuthPayload, CurrentUser, Credentials, EmailVerification, RegistrationDetails};
use crate::connectivity::Connectivity;
use crate::error::{ClientError, Result};
use crate::http::ApiClient;
use crate::storage::LocalDatabase;

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const LOGOUT_PATH: &str = "/api/auth/logout";
pub const PROFILE_PATH: &str = "/api/auth/profile";
pub const VERIFY_INITIATE_PATH: &str = "/api/auth/email/verify/initiate";
pub const VERIFY_CONFIRM_PATH: &str = "/api/auth/email/verify/confirm";
pub const VERIFY_RESEND_PATH: &str = "/api/auth/email/verify/resend";
pub const REGISTER_COMPLETE_PATH: &str = "/api/auth/register/complete";

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<AuthPayload>;

    /// Invalidate the session server-side. `refresh_token` is whatever the
    /// client still holds.
    async fn logout(&self, refresh_token: Option<&str>) -> Result<()>;

    async fn fetch_profile(&self) -> Result<CurrentUser>;

    async fn initiate_email_verification(&self, email: &str) -> Result<()>;

    async fn confirm_email_verification(&self, email: &str, code: &str) -> Result<EmailVerification>;

    async fn resend_email_verification(&self, email: &str) -> Result<()>;

    async fn complete_registration(
        &self,
        registration_token: &str,
        details: &RegistrationDetails,
    ) -> Result<AuthPayload>;
}

// =============================================================================
// Online
// =============================================================================

#[derive(Debug, Clone)]
pub struct OnlineAuthProvider {
    api: ApiClient,
}

impl OnlineAuthProvider {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl AuthProvider for OnlineAuthProvider {
    async fn login(&self, credentials: &Credentials) -> Result<AuthPayload> {
        debug!(email = %credentials.email, "Logging in");
        self.api.post(LOGIN_PATH, credentials).await
    }

    async fn logout(&self, refresh_token: Option<&str>) -> Result<()> {
        self.api
            .post_for_message(LOGOUT_PATH, &json!({ "refresh_token": refresh_token }))
            .await?;
        Ok(())
    }

    async fn fetch_profile(&self) -> Result<CurrentUser> {
        self.api.get(PROFILE_PATH).await
    }

    async fn initiate_email_verification(&self, email: &str) -> Result<()> {
        self.api
            .post_for_message(VERIFY_INITIATE_PATH, &json!({ "email": email }))
            .await?;
        Ok(())
    }

    async fn confirm_email_verification(&self, email: &str, code: &str) -> Result<EmailVerification> {
        self.api
            .post(VERIFY_CONFIRM_PATH, &json!({ "email": email, "code": code }))
            .await
    }

    async fn resend_email_verification(&self, email: &str) -> Result<()> {
        self.api
            .post_for_message(VERIFY_RESEND_PATH, &json!({ "email": email }))
            .await?;
        Ok(())
    }

    async fn complete_registration(
        &self,
        registration_token: &str,
        details: &RegistrationDetails,
    ) -> Result<AuthPayload> {
        let mut body = serde_json::to_value(details)?;
        body["registration_token"] = json!(registration_token);
        self.api.post(REGISTER_COMPLETE_PATH, &body).await
    }
}

// =============================================================================
// Offline
// =============================================================================

/// Answers from the local database. Anything that needs the server fails
/// with `RequiresInternet`.
#[derive(Clone)]
pub struct OfflineAuthProvider {
    local_db: Arc<dyn LocalDatabase>,
}

impl OfflineAuthProvider {
    pub fn new(local_db: Arc<dyn LocalDatabase>) -> Self {
        Self { local_db }
    }
}

#[async_trait]
impl AuthProvider for OfflineAuthProvider {
    /// Password is not checked: the local cache only holds accounts that
    /// already signed in on this device.
    async fn login(&self, credentials: &Credentials) -> Result<AuthPayload> {
        let user = self
            .local_db
            .get_user_by_email(&credentials.email)
            .await?
            .ok_or_else(|| ClientError::OfflineAccountNotFound(credentials.email.clone()))?;

        let stored = self.local_db.get_auth_tokens().await?;
        info!(user_id = %user.id, has_tokens = !stored.is_empty(), "Offline login from local cache");

        Ok(AuthPayload {
            access_token: stored.access.map(|t| t.token),
            refresh_token: stored.refresh.map(|t| t.token),
            user,
            offline: true,
        })
    }

    async fn logout(&self, _refresh_token: Option<&str>) -> Result<()> {
        Ok(())
    }

    async fn fetch_profile(&self) -> Result<CurrentUser> {
        self.local_db
            .get_current_user()
            .await?
            .ok_or_else(|| ClientError::RequiresInternet("Loading your profile for the first time"))
    }

    async fn initiate_email_verification(&self, _email: &str) -> Result<()> {
        Err(ClientError::RequiresInternet("Email verification"))
    }

    async fn confirm_email_verification(&self, _email: &str, _code: &str) -> Result<EmailVerification> {
        Err(ClientError::RequiresInternet("Email verification"))
    }

    async fn resend_email_verification(&self, _email: &str) -> Result<()> {
        Err(ClientError::RequiresInternet("Email verification"))
    }

    async fn complete_registration(
        &self,
        _registration_token: &str,
        _details: &RegistrationDetails,
    ) -> Result<AuthPayload> {
        Err(ClientError::RequiresInternet("Registration"))
    }
}

impl std::fmt::Debug for OfflineAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineAuthProvider").finish_non_exhaustive()
    }
}

// =============================================================================
// Strategy selection
// =============================================================================

/// Routes each call to the online or offline provider.
///
/// While online, a network failure on login or profile fetch is answered
/// from the offline provider instead.
pub struct ConnectivityAwareProvider {
    online: Arc<dyn AuthProvider>,
    offline: Arc<dyn AuthProvider>,
    connectivity: Arc<dyn Connectivity>,
}

impl ConnectivityAwareProvider {
    pub fn new(
        online: Arc<dyn AuthProvider>,
        offline: Arc<dyn AuthProvider>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            online,
            offline,
            connectivity,
        }
    }

    fn current(&self) -> &Arc<dyn AuthProvider> {
        if self.connectivity.is_online() {
            &self.online
        } else {
            &self.offline
        }
    }
}

#[async_trait]
impl AuthProvider for ConnectivityAwareProvider {
    async fn login(&self, credentials: &Credentials) -> Result<AuthPayload> {
        if self.connectivity.is_offline() {
            return self.offline.login(credentials).await;
        }
        match self.online.login(credentials).await {
            Err(err) if err.is_network() => {
                warn!(error = %err, "Login failed on network, trying local cache");
                self.offline.login(credentials).await
            }
            other => other,
        }
    }

    async fn logout(&self, refresh_token: Option<&str>) -> Result<()> {
        self.current().logout(refresh_token).await
    }

    async fn fetch_profile(&self) -> Result<CurrentUser> {
        if self.connectivity.is_offline() {
            return self.offline.fetch_profile().await;
        }
        match self.online.fetch_profile().await {
            Err(err) if err.is_network() => {
                warn!(error = %err, "Profile fetch failed on network, using cached profile");
                self.offline.fetch_profile().await
            }
            other => other,
        }
    }

    async fn initiate_email_verification(&self, email: &str) -> Result<()> {
        self.current().initiate_email_verification(email).await
    }

    async fn confirm_email_verification(&self, email: &str, code: &str) -> Result<EmailVerification> {
        self.current().confirm_email_verification(email, code).await
    }

    async fn resend_email_verification(&self, email: &str) -> Result<()> {
        self.current().resend_email_verification(email).await
    }

    async fn complete_registration(
        &self,
        registration_token: &str,
        details: &RegistrationDetails,
    ) -> Result<AuthPayload> {
        self.current()
            .complete_registration(registration_token, details)
            .await
    }
}
