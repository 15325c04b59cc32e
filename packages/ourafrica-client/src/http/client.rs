//! Authenticated API access.
//!
//! Attaches the bearer token to backend requests and, on a 401, renews the
//! access token through the single-flight coordinator and retries once.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::{ApiGateway, ApiRequest, Envelope, RawResponse, normalize_envelope};
use crate::auth::RefreshCoordinator;
use crate::error::Result;
use crate::token::TokenStore;

/// Endpoints that never carry a bearer token and never trigger a refresh.
/// They either answer 401 by design or must not see a stale token.
const REFRESH_EXEMPT: [&str; 5] = [
    "/api/auth/login",
    "/api/auth/logout",
    "/api/auth/refresh-token",
    "/api/auth/register",
    "/api/auth/email/verify",
];

/// Matches on whole path segments: `/api/auth/register/complete` is exempt,
/// `/api/auth/registered` or an exempt path inside a query string is not.
pub fn is_refresh_exempt(url: &str) -> bool {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
    };

    REFRESH_EXEMPT.iter().any(|exempt| match path.strip_prefix(exempt) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    })
}

#[derive(Clone)]
pub struct ApiClient {
    gateway: ApiGateway,
    tokens: TokenStore,
    refresh: Arc<RefreshCoordinator>,
}

impl ApiClient {
    pub fn new(gateway: ApiGateway, tokens: TokenStore, refresh: Arc<RefreshCoordinator>) -> Self {
        Self {
            gateway,
            tokens,
            refresh,
        }
    }

    pub fn gateway(&self) -> &ApiGateway {
        &self.gateway
    }

    pub fn url(&self, path: &str) -> String {
        self.gateway.url(path)
    }

    pub async fn send(&self, request: ApiRequest) -> Result<RawResponse> {
        if is_refresh_exempt(&request.url) || !self.gateway.targets_backend(&request.url) {
            return self.gateway.execute(request).await;
        }

        let sent_token = self.tokens.access_token();
        let first = match &sent_token {
            Some(token) => request.clone().bearer(token),
            None => request.clone(),
        };

        match self.gateway.execute(first).await {
            Err(err) if err.is_unauthorized() && self.tokens.refresh_token().is_some() => {
                debug!(url = %request.url, "Unauthorized, renewing access token");
                match self.refresh.renew_after_unauthorized(sent_token.as_deref()).await {
                    Ok(token) => self.gateway.execute(request.bearer(&token)).await,
                    Err(refresh_err) => {
                        warn!(url = %request.url, error = %refresh_err, "Token renewal failed");
                        Err(err)
                    }
                }
            }
            other => other,
        }
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<Envelope<T>> {
        let response = self.send(request).await?;
        normalize_envelope(&response.body)?.decode()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(ApiRequest::get(self.url(path)))
            .await?
            .into_value()
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send_json(ApiRequest::post(self.url(path)).json(body)?)
            .await?
            .into_value()
    }

    /// POST whose reply value is irrelevant; returns the envelope message.
    pub async fn post_for_message<B: Serialize>(&self, path: &str, body: &B) -> Result<Option<String>> {
        let envelope: Envelope<serde_json::Value> = self
            .send_json(ApiRequest::post(self.url(path)).json(body)?)
            .await?;
        let message = envelope.message.clone();
        envelope.into_result()?;
        Ok(message)
    }

    pub async fn download(&self, path: &str) -> Result<Bytes> {
        Ok(self.send(ApiRequest::get(self.url(path)).binary()).await?.body)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("gateway", &self.gateway)
            .field("tokens", &self.tokens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exempt_endpoints() {
        assert!(is_refresh_exempt("http://api.test/api/auth/login"));
        assert!(is_refresh_exempt("http://api.test/api/auth/refresh-token"));
        assert!(is_refresh_exempt("http://api.test/api/auth/register/complete"));
        assert!(is_refresh_exempt("http://api.test/api/auth/email/verify/resend"));
        assert!(!is_refresh_exempt("http://api.test/api/auth/profile"));
        assert!(!is_refresh_exempt("http://api.test/api/student/certificates?next=/api/auth/login"));
    }

    #[test]
    fn test_exempt_match_is_anchored_to_path() {
        assert!(is_refresh_exempt("/api/auth/logout"));
        assert!(!is_refresh_exempt("http://api.test/proxy/api/auth/login"));
        assert!(!is_refresh_exempt("http://api.test/api/auth/registered-courses"));
        assert!(!is_refresh_exempt("http://api.test/api/auth/login-history"));
    }
}
