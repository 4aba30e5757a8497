//! RPC response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorPayload, RpcError};
use crate::PROTOCOL_VERSION;

/// Response to a single envelope.
///
/// Exactly one of `result` / `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// Echoed envelope id.
    pub id: String,
    /// Always [`PROTOCOL_VERSION`].
    pub protocol_version: String,
    /// Runner result (present on success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Normalized failure (present on error).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl ResponseEnvelope {
    /// Create a success response.
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn failure(id: impl Into<String>, error: &RpcError) -> Self {
        Self {
            id: id.into(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            result: None,
            error: Some(error.to_payload()),
        }
    }

    /// Whether the call succeeded.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated answer to a request, mirroring its cardinality.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Single(ResponseEnvelope),
    Batch(Vec<ResponseEnvelope>),
}

impl Outcome {
    /// Aggregate per-envelope responses, kept in input order.
    ///
    /// Exactly one response unwraps to a single object.
    pub fn from_responses(mut responses: Vec<ResponseEnvelope>) -> Self {
        if responses.len() == 1 {
            if let Some(response) = responses.pop() {
                return Self::Single(response);
            }
        }
        Self::Batch(responses)
    }

    /// All responses in input order.
    pub fn responses(&self) -> &[ResponseEnvelope] {
        match self {
            Self::Single(response) => std::slice::from_ref(response),
            Self::Batch(responses) => responses,
        }
    }

    /// Serialize to a JSON value.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let resp = ResponseEnvelope::success("abc", json!({"ok": true}));
        let value = serde_json::to_value(&resp).unwrap();

        assert_eq!(
            value,
            json!({"id": "abc", "protocolVersion": "2.0", "result": {"ok": true}})
        );
        assert!(resp.is_ok());
    }

    #[test]
    fn test_null_result_is_still_serialized() {
        let resp = ResponseEnvelope::success("abc", Value::Null);
        let value = serde_json::to_value(&resp).unwrap();

        assert!(value.as_object().unwrap().contains_key("result"));
        assert!(!value.as_object().unwrap().contains_key("error"));
    }

    #[test]
    fn test_failure_shape() {
        let err = RpcError::MethodNotFound("missing".into());
        let resp = ResponseEnvelope::failure("abc", &err);
        let value = serde_json::to_value(&resp).unwrap();

        assert_eq!(
            value,
            json!({
                "id": "abc",
                "protocolVersion": "2.0",
                "error": {"code": 404, "message": "Method missing does not exist"}
            })
        );
        assert!(!resp.is_ok());
    }

    #[test]
    fn test_single_response_unwraps() {
        let outcome = Outcome::from_responses(vec![ResponseEnvelope::success("a", json!(1))]);
        assert!(matches!(outcome, Outcome::Single(_)));
        assert!(outcome.to_value().unwrap().is_object());
    }

    #[test]
    fn test_multiple_responses_stay_array() {
        let outcome = Outcome::from_responses(vec![
            ResponseEnvelope::success("a", json!(1)),
            ResponseEnvelope::success("b", json!(2)),
        ]);

        let value = outcome.to_value().unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[1]["id"], "b");
        assert_eq!(outcome.responses().len(), 2);
    }
}
