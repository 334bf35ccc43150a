//! JSON response envelope.
//!
//! Success bodies carry `data` (and occasionally `message`); error bodies
//! carry `message` plus either a short `error` detail or a per-field
//! `errors` map.

use serde::Serialize;
use std::collections::BTreeMap;

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct DataBody<T: Serialize> {
    /// Response payload.
    pub data: T,
    /// Optional human-readable note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> DataBody<T> {
    /// Wrap a payload without a message.
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self {
            data,
            message: None,
        }
    }

    /// Wrap a payload with a message.
    #[must_use]
    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: Some(message.into()),
        }
    }
}

/// Error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// User-facing message.
    pub message: String,
    /// Short error detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-field validation messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_omits_absent_message() {
        let json = serde_json::to_value(DataBody::new(7)).unwrap();
        assert_eq!(json, serde_json::json!({ "data": 7 }));
    }

    #[test]
    fn error_envelope_omits_absent_fields() {
        let body = ErrorBody {
            message: "Validation failed".into(),
            error: None,
            errors: Some(BTreeMap::from([(
                "user_id".to_string(),
                "user_id is required".to_string(),
            )])),
        };
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "message": "Validation failed",
                "errors": { "user_id": "user_id is required" }
            })
        );
    }
}
