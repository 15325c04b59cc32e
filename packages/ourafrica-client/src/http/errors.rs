//! Error body normalization.
//!
//! Backends and proxies answer failures in several shapes. All of them are
//! folded into one `ApiError`, checked in this order:
//!
//! 1. an embedded structured error (`{"error": {"title": ..}}`)
//! 2. a flat error-shaped object (`{"title": .., "status": ..}`)
//! 3. a generic object (`details` / `message` / `errors` / `error` fields)
//! 4. the status-code title table

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use super::{RawResponse, ResponseKind};
use crate::error::ApiError;

pub fn status_title(status: u16) -> &'static str {
    match status {
        0 => "Network Error",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        408 => "Request Timeout",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "An error occurred",
    }
}

/// Normalize a non-2xx response.
///
/// In binary mode the body arrives undecoded; it is only parsed when the
/// content type says JSON.
pub fn normalize_error(response: &RawResponse, kind: ResponseKind) -> ApiError {
    let status = response.status;

    if kind == ResponseKind::Binary && !response.is_json() {
        return ApiError::from_status(status);
    }

    let text = String::from_utf8_lossy(&response.body);
    match serde_json::from_str::<Value>(&text) {
        Ok(body) => normalize_error_body(status, &body),
        Err(_) => {
            if kind == ResponseKind::Binary {
                debug!(status, "Binary error body was not valid JSON");
            }
            let text = text.trim();
            let details = if text.is_empty() || text.starts_with('<') {
                Vec::new()
            } else {
                vec![text.to_string()]
            };
            ApiError::from_status(status).with_details(details)
        }
    }
}

pub fn normalize_error_body(status: u16, body: &Value) -> ApiError {
    let Some(object) = body.as_object() else {
        return match body.as_str() {
            Some(text) if !text.trim().is_empty() => {
                ApiError::from_status(status).with_details(vec![text.to_string()])
            }
            _ => ApiError::from_status(status),
        };
    };

    if let Some(embedded) = object.get("error").and_then(Value::as_object) {
        if embedded.contains_key("title") {
            return structured(status, embedded);
        }
    }

    if object.contains_key("title") {
        return structured(status, object);
    }

    generic(status, object)
}

fn structured(status: u16, object: &Map<String, Value>) -> ApiError {
    let title = object
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| status_title(status))
        .to_string();

    let status = object
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok())
        .unwrap_or(status);

    ApiError {
        title,
        details: object.get("details").and_then(string_list),
        field_errors: object.get("field_errors").and_then(field_map),
        status,
    }
}

fn generic(status: u16, object: &Map<String, Value>) -> ApiError {
    let message = object.get("message").and_then(Value::as_str);
    let error_text = object.get("error").and_then(Value::as_str);

    let mut details = object
        .get("details")
        .or_else(|| object.get("detail"))
        .and_then(string_list)
        .unwrap_or_default();

    let mut field_errors = object.get("field_errors").and_then(field_map);

    match object.get("errors") {
        Some(Value::Object(_)) if field_errors.is_none() => {
            field_errors = object.get("errors").and_then(field_map);
        }
        Some(errors) => {
            if let Some(list) = string_list(errors) {
                details.extend(list);
            }
        }
        None => {}
    }

    let title = match (message, error_text) {
        (Some(m), _) if !m.is_empty() => m.to_string(),
        (_, Some(e)) if !e.is_empty() => e.to_string(),
        _ => status_title(status).to_string(),
    };

    // The title already says it; keep `error` only as extra detail.
    if let (Some(m), Some(e)) = (message, error_text) {
        if !m.is_empty() && !e.is_empty() && m != e {
            details.push(e.to_string());
        }
    }

    ApiError {
        title,
        details: (!details.is_empty()).then_some(details),
        field_errors,
        status,
    }
}

/// Accepts a string or an array of strings/objects-with-`msg`.
fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) if !s.is_empty() => Some(vec![s.clone()]),
        Value::Array(items) => {
            let list: Vec<String> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o
                        .get("msg")
                        .or_else(|| o.get("message"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .collect();
            (!list.is_empty()).then_some(list)
        }
        _ => None,
    }
}

fn field_map(value: &Value) -> Option<BTreeMap<String, Vec<String>>> {
    let object = value.as_object()?;
    let map: BTreeMap<String, Vec<String>> = object
        .iter()
        .filter_map(|(field, messages)| Some((field.clone(), string_list(messages)?)))
        .collect();
    (!map.is_empty()).then_some(map)
}
