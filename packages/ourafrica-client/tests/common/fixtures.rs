//! Canned backend payloads.

use ourafrica_client::auth::TokenPair;
use ourafrica_client::CurrentUser;
use serde_json::{json, Value};

pub use ourafrica_client::testing::{fresh_token_pair, sample_user, token_expiring_in};

pub const LOGIN: &str = "/api/auth/login";
pub const LOGOUT: &str = "/api/auth/logout";
pub const PROFILE: &str = "/api/auth/profile";
pub const REFRESH: &str = "/api/auth/refresh-token";
pub const CERTIFICATES: &str = "/api/student/certificates";

pub fn login_body(user: &CurrentUser, tokens: &TokenPair) -> Value {
    json!({
        "access_token": tokens.access_token,
        "refresh_token": tokens.refresh_token,
        "user": user,
    })
}

pub fn certificate_json(id: &str, course_id: &str) -> Value {
    json!({
        "id": id,
        "course_id": course_id,
        "course_title": "Introduction to Soil Science",
        "certificate_number": format!("OA-{}", id.to_uppercase()),
        "issued_at": "2025-06-01T09:30:00Z",
    })
}
