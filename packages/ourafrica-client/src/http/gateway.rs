use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{normalize_envelope, normalize_error, ApiRequest, Envelope, HttpTransport, RawResponse};
use crate::error::{ClientError, Result};

/// Unauthenticated access to the backend: URL building, transport, envelope
/// and error normalization. Bearer handling lives in `ApiClient`.
#[derive(Clone)]
pub struct ApiGateway {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl ApiGateway {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path such as `/api/auth/login`.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Same scheme, host and port as the base URL, and under its path.
    pub fn targets_backend(&self, url: &str) -> bool {
        let (Ok(base), Ok(target)) = (Url::parse(&self.base_url), Url::parse(url)) else {
            return false;
        };
        let base_path = base.path().trim_end_matches('/');
        let under_base = match target.path().strip_prefix(base_path) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        };

        base.scheme() == target.scheme()
            && base.host_str() == target.host_str()
            && base.port_or_known_default() == target.port_or_known_default()
            && under_base
    }

    /// Send and return the raw response on 2xx, a normalized error otherwise.
    pub async fn execute(&self, request: ApiRequest) -> Result<RawResponse> {
        let start = Instant::now();
        let method = request.method.clone();
        let url = request.url.clone();
        let kind = request.expect;

        let response = self.transport.send(request).await?;

        debug!(
            method = %method,
            url = %url,
            status = response.status,
            duration_ms = start.elapsed().as_millis(),
            "API request"
        );

        if response.is_success() {
            return Ok(response);
        }

        let error = normalize_error(&response, kind);
        if error.status >= 500 {
            warn!(url = %url, status = error.status, title = %error.title, "Server error");
        }
        Err(ClientError::Api(error))
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<Envelope<T>> {
        let response = self.execute(request).await?;
        normalize_envelope(&response.body)?.decode()
    }

    pub async fn send_binary(&self, request: ApiRequest) -> Result<Bytes> {
        Ok(self.execute(request.binary()).await?.body)
    }
}

impl std::fmt::Debug for ApiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiGateway")
            .field("base_url", &self.base_url)
            .finish()
    }
}
