// Test doubles - mock implementations of the client's ports
//
// Always compiled so integration tests and downstream crates can wire a
// client without a backend.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use serde_json::{json, Value};

use crate::auth::{
    AuthPayload, AuthProvider, Credentials, CurrentUser, EmailVerification, RegistrationDetails,
    Role, TokenPair, TokenRefresher,
};
use crate::error::{ApiError, ClientError, Result};
use crate::http::{ApiRequest, HttpTransport, RawResponse};

// =============================================================================
// Tokens and fixtures
// =============================================================================

static TOKEN_SEQ: AtomicU64 = AtomicU64::new(0);

/// Unsigned JWT carrying `claims` as its payload.
pub fn encode_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

/// A distinct access token whose `exp` is `secs` from now (negative for the past).
pub fn token_expiring_in(secs: i64) -> String {
    let now = Utc::now().timestamp();
    encode_token(&json!({
        "sub": "u1",
        "email": "ada@example.com",
        "role": "student",
        "exp": now + secs,
        "iat": now,
        "type": "access",
        "jti": TOKEN_SEQ.fetch_add(1, Ordering::Relaxed),
    }))
}

pub fn sample_user(id: &str, email: &str) -> CurrentUser {
    CurrentUser {
        id: id.to_string(),
        email: email.to_string(),
        first_name: "Ada".to_string(),
        middle_name: None,
        last_name: "Obi".to_string(),
        full_name: None,
        role: Role::Student,
        bio: None,
        phone_number: None,
        email_verified: true,
        is_active: true,
        profile_image_url: None,
        created_at: None,
        updated_at: None,
    }
}

pub fn fresh_token_pair() -> TokenPair {
    TokenPair {
        access_token: token_expiring_in(900),
        refresh_token: token_expiring_in(7 * 24 * 3600),
    }
}

pub fn json_response(status: u16, body: &Value) -> RawResponse {
    RawResponse {
        status,
        content_type: Some("application/json".to_string()),
        body: Bytes::from(body.to_string()),
    }
}

// =============================================================================
// Mock HTTP transport
// =============================================================================

type Handler = Arc<dyn Fn(&ApiRequest) -> Result<RawResponse> + Send + Sync>;

/// Answers requests by URL path.
///
/// Queued replies are used in order; the last one repeats. Unrouted paths
/// answer 404.
pub struct MockTransport {
    routes: Arc<Mutex<HashMap<String, VecDeque<Handler>>>>,
    requests: Arc<Mutex<Vec<ApiRequest>>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            routes: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn respond_with<F>(&self, path: &str, handler: F)
    where
        F: Fn(&ApiRequest) -> Result<RawResponse> + Send + Sync + 'static,
    {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(Arc::new(handler));
    }

    pub fn respond_json(&self, path: &str, status: u16, body: Value) {
        self.respond_with(path, move |_| Ok(json_response(status, &body)));
    }

    pub fn respond_raw(&self, path: &str, status: u16, content_type: &str, body: &[u8]) {
        let response = RawResponse {
            status,
            content_type: Some(content_type.to_string()),
            body: Bytes::copy_from_slice(body),
        };
        self.respond_with(path, move |_| Ok(response.clone()));
    }

    pub fn fail_network(&self, path: &str) {
        self.respond_with(path, |_| Err(ClientError::Network("connection refused".into())));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests sent to `path`.
    pub fn calls(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| path_of(&r.url) == path)
            .count()
    }

    fn handler_for(&self, path: &str) -> Option<Handler> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.handler_for(path_of(&request.url)) {
            Some(handler) => handler(&request),
            None => Ok(json_response(404, &json!({ "message": "Not Found" }))),
        }
    }
}

fn path_of(url: &str) -> &str {
    let without_query = url.split('?').next().unwrap_or(url);
    match without_query.find("://") {
        Some(scheme_end) => {
            let rest = &without_query[scheme_end + 3..];
            rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
        }
        None => without_query,
    }
}

// =============================================================================
// Mock token refresher
// =============================================================================

pub struct MockRefresher {
    failure: Option<u16>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockRefresher {
    pub fn succeeding() -> Self {
        Self {
            failure: None,
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            failure: Some(status),
            ..Self::succeeding()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TokenRefresher for MockRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        self.calls.lock().unwrap().push(refresh_token.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.failure {
            Some(status) => Err(ClientError::Api(ApiError::from_status(status))),
            None => Ok(fresh_token_pair()),
        }
    }
}

// =============================================================================
// Mock auth provider
// =============================================================================

pub struct MockAuthProvider {
    user: CurrentUser,
    login_error: Option<ClientError>,
    logout_error: Option<ClientError>,
    profile_error: Option<ClientError>,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl MockAuthProvider {
    pub fn new() -> Self {
        Self {
            user: sample_user("u1", "ada@example.com"),
            login_error: None,
            logout_error: None,
            profile_error: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_user(mut self, user: CurrentUser) -> Self {
        self.user = user;
        self
    }

    pub fn with_login_error(mut self, error: ClientError) -> Self {
        self.login_error = Some(error);
        self
    }

    pub fn with_logout_error(mut self, error: ClientError) -> Self {
        self.logout_error = Some(error);
        self
    }

    pub fn with_profile_error(mut self, error: ClientError) -> Self {
        self.profile_error = Some(error);
        self
    }

    /// Number of calls to the named trait method.
    pub fn calls(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|m| **m == method)
            .count()
    }

    fn record(&self, method: &'static str) {
        self.calls.lock().unwrap().push(method);
    }

    fn payload(&self) -> AuthPayload {
        let pair = fresh_token_pair();
        AuthPayload {
            access_token: Some(pair.access_token),
            refresh_token: Some(pair.refresh_token),
            user: self.user.clone(),
            offline: false,
        }
    }
}

impl Default for MockAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn login(&self, _credentials: &Credentials) -> Result<AuthPayload> {
        self.record("login");
        match &self.login_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.payload()),
        }
    }

    async fn logout(&self, _refresh_token: Option<&str>) -> Result<()> {
        self.record("logout");
        match &self.logout_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn fetch_profile(&self) -> Result<CurrentUser> {
        self.record("fetch_profile");
        match &self.profile_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.user.clone()),
        }
    }

    async fn initiate_email_verification(&self, _email: &str) -> Result<()> {
        self.record("initiate_email_verification");
        Ok(())
    }

    async fn confirm_email_verification(&self, _email: &str, _code: &str) -> Result<EmailVerification> {
        self.record("confirm_email_verification");
        Ok(EmailVerification {
            registration_token: "registration-token".to_string(),
        })
    }

    async fn resend_email_verification(&self, _email: &str) -> Result<()> {
        self.record("resend_email_verification");
        Ok(())
    }

    async fn complete_registration(
        &self,
        _registration_token: &str,
        _details: &RegistrationDetails,
    ) -> Result<AuthPayload> {
        self.record("complete_registration");
        Ok(self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_of_strips_origin_and_query() {
        assert_eq!(path_of("http://api.test/api/x?page=2"), "/api/x");
        assert_eq!(path_of("http://api.test"), "/");
        assert_eq!(path_of("/api/y"), "/api/y");
    }

    #[tokio::test]
    async fn test_queued_replies_then_repeat_last() {
        let transport = MockTransport::new();
        transport.respond_json("/api/x", 401, json!({}));
        transport.respond_json("/api/x", 200, json!({"ok": true}));

        let statuses: Vec<u16> = futures::future::join_all(
            (0..3).map(|_| transport.send(ApiRequest::get("http://api.test/api/x"))),
        )
        .await
        .into_iter()
        .map(|r| r.unwrap().status)
        .collect();

        assert_eq!(statuses, vec![401, 200, 200]);
        assert_eq!(transport.calls("/api/x"), 3);
    }
}
