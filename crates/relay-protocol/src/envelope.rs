//! RPC request envelopes.
//!
//! A request body is either one envelope object or a non-empty array of
//! them. Shape validation happens up front: any violation rejects the
//! whole request before a single method is resolved.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RpcError;
use crate::PROTOCOL_VERSION;

/// Method parameters: named (object) or positional (array).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    Object(Map<String, Value>),
    Array(Vec<Value>),
}

impl Params {
    /// Convert back into a plain JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Params::Object(map) => Value::Object(map.clone()),
            Params::Array(items) => Value::Array(items.clone()),
        }
    }
}

/// One RPC call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Caller-chosen identifier, echoed back. Must be a GUID.
    /// Uniqueness within a batch is the caller's responsibility.
    pub id: String,

    /// Must equal [`PROTOCOL_VERSION`].
    pub protocol_version: String,

    /// Name of the method to run.
    pub method: String,

    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
}

impl Envelope {
    /// Build an envelope for the supported protocol version.
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Option<Params>) -> Self {
        Self {
            id: id.into(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }

    /// Params as a plain JSON value, if present.
    pub fn params_value(&self) -> Option<Value> {
        self.params.as_ref().map(Params::to_value)
    }
}

/// A parsed request: one envelope or a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeBatch {
    Single(Envelope),
    Batch(Vec<Envelope>),
}

impl EnvelopeBatch {
    /// Parse and shape-validate a raw request body.
    pub fn parse(body: &str) -> Result<Self, RpcError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| RpcError::request_shape(vec![format!("invalid JSON: {}", e)]))?;

        Self::from_value(value)
    }

    /// Shape-validate an already-parsed request body.
    pub fn from_value(value: Value) -> Result<Self, RpcError> {
        match value {
            Value::Object(map) => {
                let mut messages = Vec::new();
                let envelope = check_envelope(&map, "", &mut messages);
                match envelope {
                    Some(envelope) if messages.is_empty() => Ok(Self::Single(envelope)),
                    _ => Err(RpcError::request_shape(messages)),
                }
            }
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(RpcError::request_shape(vec![
                        "\"value\" must contain at least 1 items".to_string(),
                    ]));
                }

                let mut messages = Vec::new();
                let mut envelopes = Vec::with_capacity(items.len());

                for (index, item) in items.iter().enumerate() {
                    let path = format!("[{}]", index);
                    match item {
                        Value::Object(map) => {
                            if let Some(envelope) = check_envelope(map, &path, &mut messages) {
                                envelopes.push(envelope);
                            }
                        }
                        _ => messages.push(format!("\"{}\" must be of type object", path)),
                    }
                }

                if messages.is_empty() {
                    Ok(Self::Batch(envelopes))
                } else {
                    Err(RpcError::request_shape(messages))
                }
            }
            _ => Err(RpcError::request_shape(vec![
                "\"value\" must be one of [object, array]".to_string(),
            ])),
        }
    }

    /// Number of envelopes in the request.
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Batch(envelopes) => envelopes.len(),
        }
    }

    /// Whether the request holds no envelopes. Never true once validated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalize to a list; a single envelope becomes a batch of one.
    pub fn into_envelopes(self) -> Vec<Envelope> {
        match self {
            Self::Single(envelope) => vec![envelope],
            Self::Batch(envelopes) => envelopes,
        }
    }
}

fn field_label(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}

fn required_string<'a>(
    map: &'a Map<String, Value>,
    path: &str,
    field: &str,
    messages: &mut Vec<String>,
) -> Option<&'a str> {
    let label = field_label(path, field);
    match map.get(field) {
        None => {
            messages.push(format!("\"{}\" is required", label));
            None
        }
        Some(Value::String(s)) if s.is_empty() => {
            messages.push(format!("\"{}\" is not allowed to be empty", label));
            None
        }
        Some(Value::String(s)) => Some(s),
        Some(_) => {
            messages.push(format!("\"{}\" must be a string", label));
            None
        }
    }
}

/// Hyphenated 8-4-4-4-12 hex only; braced, urn and simple forms are rejected.
fn is_guid(id: &str) -> bool {
    id.len() == 36 && uuid::Uuid::parse_str(id).is_ok()
}

/// Check one envelope object, pushing one message per violated rule.
fn check_envelope(
    map: &Map<String, Value>,
    path: &str,
    messages: &mut Vec<String>,
) -> Option<Envelope> {
    let before = messages.len();

    let id = required_string(map, path, "id", messages);
    if let Some(id) = id {
        if !is_guid(id) {
            messages.push(format!("\"{}\" must be a valid GUID", field_label(path, "id")));
        }
    }

    let version = required_string(map, path, "protocolVersion", messages);
    if let Some(version) = version {
        if version != PROTOCOL_VERSION {
            messages.push(format!(
                "\"{}\" must be [{}]",
                field_label(path, "protocolVersion"),
                PROTOCOL_VERSION
            ));
        }
    }

    let method = required_string(map, path, "method", messages);

    let params = match map.get("params") {
        None => None,
        Some(Value::Object(params)) => Some(Params::Object(params.clone())),
        Some(Value::Array(params)) => Some(Params::Array(params.clone())),
        Some(_) => {
            messages.push(format!(
                "\"{}\" must be one of [array, object]",
                field_label(path, "params")
            ));
            None
        }
    };

    if messages.len() != before {
        return None;
    }

    Some(Envelope {
        id: id?.to_string(),
        protocol_version: version?.to_string(),
        method: method?.to_string(),
        params,
    })
}
