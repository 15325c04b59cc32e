//! Error types for the OurAfrica client.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::status_title;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Normalized API error, the `error` member of the response envelope.
///
/// `status` is the HTTP status code, or `0` when the request never reached
/// the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<BTreeMap<String, Vec<String>>>,
    pub status: u16,
}

impl ApiError {
    /// Error carrying only the human-readable title for `status`.
    pub fn from_status(status: u16) -> Self {
        Self {
            title: status_title(status).to_string(),
            details: None,
            field_errors: None,
            status,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        if !details.is_empty() {
            self.details = Some(details);
        }
        self
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.title, self.status)?;
        if let Some(details) = &self.details {
            write!(f, ": {}", details.join("; "))?;
        }
        Ok(())
    }
}

/// OurAfrica client errors.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Missing or malformed input, rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Non-2xx response, normalized
    #[error("API error: {0}")]
    Api(ApiError),

    /// Request never completed (connection refused, DNS, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Operation has no offline path
    #[error("{0} requires an internet connection")]
    RequiresInternet(&'static str),

    /// Offline login for an email that was never cached
    #[error("No offline account found for {0}. Please connect to the internet to sign in")]
    OfflineAccountNotFound(String),

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("No registration in progress. Verify your email first")]
    NoRegistrationToken,

    /// Role mismatch; the session stays intact
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Invalid JSON or unexpected response shape
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Token error: {0}")]
    Token(#[from] crate::token::TokenError),
}

impl ClientError {
    /// HTTP status behind this error, `0` for network failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api(err) => Some(err.status),
            ClientError::Network(_) | ClientError::RequiresInternet(_) => Some(0),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }

    /// Normalized view of any error, suitable for display.
    pub fn to_api_error(&self) -> ApiError {
        match self {
            ClientError::Api(err) => err.clone(),
            ClientError::Network(msg) => ApiError::from_status(0).with_details(vec![msg.clone()]),
            ClientError::RequiresInternet(_) | ClientError::OfflineAccountNotFound(_) => {
                ApiError::from_status(0).with_details(vec![self.to_string()])
            }
            ClientError::Validation(msg) => ApiError {
                title: "Validation Error".to_string(),
                details: Some(vec![msg.clone()]),
                field_errors: None,
                status: 400,
            },
            ClientError::Forbidden(msg) => ApiError::from_status(403).with_details(vec![msg.clone()]),
            ClientError::NoRefreshToken | ClientError::NoRegistrationToken => {
                ApiError::from_status(401).with_details(vec![self.to_string()])
            }
            ClientError::Parse(_) | ClientError::Storage(_) | ClientError::Token(_) => ApiError {
                title: "An error occurred".to_string(),
                details: Some(vec![self.to_string()]),
                field_errors: None,
                status: 500,
            },
        }
    }
}

impl From<ApiError> for ClientError {
    fn from(err: ApiError) -> Self {
        ClientError::Api(err)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Parse(err.to_string())
    }
}

impl From<crate::storage::StorageError> for ClientError {
    fn from(err: crate::storage::StorageError) -> Self {
        ClientError::Storage(err.to_string())
    }
}
