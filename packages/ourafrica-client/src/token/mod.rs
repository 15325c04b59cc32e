//! JWT helpers.
//!
//! Tokens are decoded, never verified: the backend signs them and the
//! transport is trusted. Only the payload segment is read.

pub mod store;

pub use store::TokenStore;

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::Role;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid JWT format")]
    Malformed,

    #[error("Failed to decode JWT: {0}")]
    Base64(String),

    #[error("Failed to parse JWT claims: {0}")]
    Claims(String),

    #[error("Invalid datetime format: {0}")]
    InvalidExpiry(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by an OurAfrica access or refresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(alias = "user_id")]
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default, rename = "type", alias = "token_type")]
    pub kind: Option<TokenKind>,
}

impl TokenClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|exp| exp <= now).unwrap_or(true)
    }

    pub fn display_name(&self) -> Option<String> {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        (!name.is_empty()).then_some(name)
    }
}

/// Decode the payload segment of `token`.
pub fn decode_claims(token: &str) -> Result<TokenClaims, TokenError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts[1].is_empty() {
        return Err(TokenError::Malformed);
    }

    // Some issuers keep base64 padding on the payload.
    let payload = URL_SAFE_NO_PAD
        .decode(parts[1])
        .or_else(|_| URL_SAFE.decode(parts[1]))
        .map_err(|e| TokenError::Base64(e.to_string()))?;

    serde_json::from_slice(&payload).map_err(|e| TokenError::Claims(e.to_string()))
}

pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    decode_claims(token).ok()?.expires_at()
}

/// Undecodable tokens count as expired.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    decode_claims(token)
        .map(|claims| claims.is_expired_at(now))
        .unwrap_or(true)
}

/// Seconds until expiry, negative once expired.
pub fn seconds_until_expiry(token: &str) -> Option<i64> {
    let exp = expires_at(token)?;
    Some((exp - Utc::now()).num_seconds())
}

/// Compare a stored RFC 3339 expiry string against the current time.
pub fn is_expiry_passed(expires_at: &str) -> Result<bool, TokenError> {
    let expiry = DateTime::parse_from_rfc3339(expires_at)
        .map_err(|e| TokenError::InvalidExpiry(e.to_string()))?;

    Ok(Utc::now() > expiry)
}
