//! Uniform response envelope for the HTTP collaborator layer.
//!
//! `{error, message, statusCode, data | raw}`; single-element result arrays
//! are unwrapped to a bare object unless the caller opts out.

use crate::domain::error::BridgeError;
use serde::Serialize;
use serde_json::{Map, Value};

const OK_STATUS: u16 = 200;

/// Keys owned by the envelope itself; a response cannot override them
const RESERVED: [&str; 3] = ["error", "message", "statusCode"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope {
    pub error: bool,
    pub message: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    /// Sibling keys of a `data`-carrying response, e.g. paging totals
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiEnvelope {
    /// Success envelope.
    ///
    /// A response object that already has a `data` key is merged into the
    /// envelope; anything else becomes `data` as is.
    pub fn ok(message: impl Into<String>, response: Value, unwrap_single: bool) -> Self {
        let mut envelope = Self::bare(false, message.into(), OK_STATUS);
        match response {
            Value::Object(mut map) if map.contains_key("data") => {
                envelope.data = map.remove("data");
                envelope.raw = map.remove("raw");
                for key in RESERVED {
                    map.remove(key);
                }
                envelope.extra = map;
            }
            other => envelope.data = Some(other),
        }
        if unwrap_single {
            envelope.data = envelope.data.take().map(unwrap_single_item);
        }
        envelope
    }

    pub fn fail(message: impl Into<String>, status_code: u16, raw: Option<Value>) -> Self {
        Self {
            raw,
            ..Self::bare(true, message.into(), status_code)
        }
    }

    pub fn from_error(error: &BridgeError) -> Self {
        Self::fail(error.to_string(), error.status_code(), None)
    }

    /// Envelope for a bridge call result
    pub fn from_result<T: Serialize>(
        message: impl Into<String>,
        result: Result<T, BridgeError>,
    ) -> Self {
        let value = result.and_then(|value| {
            serde_json::to_value(value).map_err(|e| BridgeError::Malformed(e.to_string()))
        });
        match value {
            Ok(value) => Self::ok(message, value, true),
            Err(e) => Self::from_error(&e),
        }
    }

    fn bare(error: bool, message: String, status_code: u16) -> Self {
        Self {
            error,
            message,
            status_code,
            data: None,
            raw: None,
            extra: Map::new(),
        }
    }
}

fn unwrap_single_item(value: Value) -> Value {
    match value {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_single_element_is_unwrapped() {
        let envelope = ApiEnvelope::ok("Success", json!([{"id": "M1"}]), true);
        assert_eq!(envelope.data, Some(json!({"id": "M1"})));

        let kept = ApiEnvelope::ok("Success", json!([{"id": "M1"}]), false);
        assert_eq!(kept.data, Some(json!([{"id": "M1"}])));
    }

    #[test]
    fn test_data_response_is_merged() {
        let envelope = ApiEnvelope::ok(
            "Success",
            json!({"data": [{"id": "P1"}], "totalCount": 1, "statusCode": 999}),
            true,
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            json!({
                "error": false,
                "message": "Success",
                "statusCode": 200,
                "data": {"id": "P1"},
                "totalCount": 1
            })
        );
    }

    #[test]
    fn test_error_mapping() {
        let envelope = ApiEnvelope::from_error(&BridgeError::timeout(
            "query identification-media",
            Duration::from_millis(5000),
        ));
        assert!(envelope.error);
        assert_eq!(envelope.status_code, 504);

        let envelope = ApiEnvelope::from_error(&BridgeError::NoEntitySelected);
        assert_eq!(envelope.status_code, 400);
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_from_result() {
        let ok: Result<Value, BridgeError> = Ok(json!({"mediumId": "M1"}));
        assert_eq!(
            ApiEnvelope::from_result("Success", ok).data,
            Some(json!({"mediumId": "M1"}))
        );

        let err: Result<Value, BridgeError> = Err(BridgeError::NotAuthenticated);
        assert_eq!(ApiEnvelope::from_result("Success", err).status_code, 503);
    }
}
