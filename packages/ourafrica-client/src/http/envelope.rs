//! The `{message, value, error}` response envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ApiError, ClientError, Result};

const ENVELOPE_KEYS: [&str; 3] = ["message", "value", "error"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T> Envelope<T> {
    pub fn success(value: T) -> Self {
        Self {
            message: Some("Success".to_string()),
            value: Some(value),
            error: None,
        }
    }

    /// The carried value, or the carried error.
    pub fn into_result(self) -> Result<Option<T>> {
        match self.error {
            Some(error) => Err(ClientError::Api(error)),
            None => Ok(self.value),
        }
    }

    /// Like `into_result`, but a missing value is a parse error.
    pub fn into_value(self) -> Result<T> {
        self.into_result()?
            .ok_or_else(|| ClientError::Parse("Response envelope carried no value".into()))
    }
}

impl Envelope<Value> {
    pub fn decode<T: DeserializeOwned>(self) -> Result<Envelope<T>> {
        let value = match self.value {
            Some(Value::Null) | None => None,
            Some(raw) => Some(serde_json::from_value(raw)?),
        };
        Ok(Envelope {
            message: self.message,
            value,
            error: self.error,
        })
    }
}

/// True when `body` is already an envelope: an object whose keys are a
/// non-empty subset of `message`, `value` and `error`.
pub fn is_envelope(body: &Value) -> bool {
    match body.as_object() {
        Some(map) if !map.is_empty() => {
            map.keys().all(|k| ENVELOPE_KEYS.contains(&k.as_str()))
                && map
                    .get("message")
                    .map(|m| m.is_string() || m.is_null())
                    .unwrap_or(true)
                && map
                    .get("error")
                    .map(|e| e.is_object() || e.is_null())
                    .unwrap_or(true)
        }
        _ => false,
    }
}

/// Coerce a success body into the envelope shape.
pub fn normalize_envelope(body: &[u8]) -> Result<Envelope<Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Envelope {
            message: Some("Success".to_string()),
            value: None,
            error: None,
        });
    }

    let parsed: Value = serde_json::from_slice(body)?;
    if is_envelope(&parsed) {
        return Ok(serde_json::from_value(parsed)?);
    }

    Ok(serde_json::from_value(json!({
        "message": "Success",
        "value": parsed,
    }))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_passes_through() {
        let body = br#"{"message":"Fetched","value":{"id":"c1"}}"#;
        let envelope = normalize_envelope(body).unwrap();

        assert_eq!(envelope.message.as_deref(), Some("Fetched"));
        assert_eq!(envelope.value, Some(json!({"id": "c1"})));
    }

    #[test]
    fn test_raw_body_is_wrapped() {
        let envelope = normalize_envelope(br#"[{"id":"c1"},{"id":"c2"}]"#).unwrap();

        assert_eq!(envelope.message.as_deref(), Some("Success"));
        assert_eq!(envelope.value.unwrap().as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_object_with_foreign_keys_is_wrapped() {
        let envelope = normalize_envelope(br#"{"message":"hi","id":"c1"}"#).unwrap();
        assert_eq!(envelope.message.as_deref(), Some("Success"));
        assert_eq!(envelope.value, Some(json!({"message": "hi", "id": "c1"})));
    }

    #[test]
    fn test_empty_body() {
        let envelope = normalize_envelope(b"").unwrap();
        assert_eq!(envelope.message.as_deref(), Some("Success"));
        assert!(envelope.value.is_none());
    }

    #[test]
    fn test_embedded_error_surfaces_from_into_result() {
        let body = br#"{"error":{"title":"Conflict","status":409}}"#;
        let envelope = normalize_envelope(body).unwrap();

        let err = envelope.into_result().unwrap_err();
        assert_eq!(err.status(), Some(409));
    }

    #[test]
    fn test_decode_typed_value() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Course {
            id: String,
        }

        let envelope = normalize_envelope(br#"{"value":{"id":"c1"}}"#).unwrap();
        let typed: Envelope<Course> = envelope.decode().unwrap();
        assert_eq!(typed.into_value().unwrap(), Course { id: "c1".into() });
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        assert!(matches!(
            normalize_envelope(b"<html>"),
            Err(ClientError::Parse(_))
        ));
    }
}
