//! HTTP plumbing: transport port, gateway, envelope and error normalization,
//! and the bearer-token interceptor.

pub mod client;
pub mod envelope;
pub mod errors;
pub mod gateway;
pub mod transport;

pub use client::{is_refresh_exempt, ApiClient};
pub use envelope::{normalize_envelope, Envelope};
pub use errors::{normalize_error, status_title};
pub use gateway::ApiGateway;
pub use transport::ReqwestTransport;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;

use crate::error::Result;

/// How the caller wants the response body treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Json,
    /// Opaque bytes (document downloads). Error bodies are not parsed by the
    /// transport in this mode.
    Binary,
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub expect: ResponseKind,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            expect: ResponseKind::Json,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn binary(mut self) -> Self {
        self.expect = ResponseKind::Binary;
        self
    }

    /// Set a header, replacing any existing value with the same name.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Access token carried in the `Authorization` header, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header_value("Authorization")?.strip_prefix("Bearer ")
    }
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false)
    }
}

/// Outbound HTTP. Implementations report only transport failures as errors;
/// every HTTP status, including 4xx/5xx, is a successful `RawResponse`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_replaces_case_insensitively() {
        let request = ApiRequest::get("http://x/api")
            .header("authorization", "Bearer old")
            .bearer("new");

        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.bearer_token(), Some("new"));
    }

    #[test]
    fn test_json_content_type_detection() {
        let response = RawResponse {
            status: 404,
            content_type: Some("application/problem+JSON; charset=utf-8".into()),
            body: Bytes::new(),
        };
        assert!(response.is_json());
        assert!(!response.is_success());
    }
}
