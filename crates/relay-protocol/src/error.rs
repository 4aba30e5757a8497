//! Error taxonomy for the RPC protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Generic message returned for server-class failures.
///
/// Internal detail is logged, never sent to the caller.
pub const INTERNAL_MESSAGE: &str = "An internal server error occurred";

/// Message returned for parameter validation failures.
pub const INVALID_PARAMS_MESSAGE: &str = "One or more parameters are invalid";

/// Message returned for malformed top-level requests.
pub const INVALID_REQUEST_MESSAGE: &str = "Invalid request payload input";

/// Kind of failure, independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed or invalid top-level request; fatal to the whole request.
    RequestShape,
    /// The envelope names a method nobody registered.
    MethodNotFound,
    /// Params failed the method's validation schema.
    ParamValidation,
    /// A runner failed with its own code and message.
    Domain,
    /// Anything unrecognized; the detail never leaves the process.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestShape => write!(f, "REQUEST_SHAPE"),
            Self::MethodNotFound => write!(f, "METHOD_NOT_FOUND"),
            Self::ParamValidation => write!(f, "PARAM_VALIDATION"),
            Self::Domain => write!(f, "DOMAIN"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// RPC error carried through dispatch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    #[error("invalid request: {}", .messages.join("; "))]
    RequestShape { messages: Vec<String> },

    #[error("Method {0} does not exist")]
    MethodNotFound(String),

    #[error("invalid params: {}", .messages.join("; "))]
    ParamValidation { messages: Vec<String> },

    #[error("{message}")]
    Domain { code: u16, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl RpcError {
    /// Create a runner error with an explicit status code.
    pub fn domain(code: u16, message: impl Into<String>) -> Self {
        Self::Domain {
            code,
            message: message.into(),
        }
    }

    /// 400-class runner error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::domain(400, message)
    }

    /// 401-class runner error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::domain(401, message)
    }

    /// 403-class runner error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::domain(403, message)
    }

    /// 404-class runner error (a missing resource, not a missing method).
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::domain(404, message)
    }

    /// 409-class runner error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::domain(409, message)
    }

    /// Wrap an arbitrary failure. The detail is kept for logs only.
    pub fn internal(detail: impl fmt::Display) -> Self {
        Self::Internal(detail.to_string())
    }

    /// Top-level shape failure with one message per violated rule.
    pub fn request_shape(messages: Vec<String>) -> Self {
        Self::RequestShape { messages }
    }

    /// Parameter validation failure with one message per failing rule.
    pub fn param_validation(messages: Vec<String>) -> Self {
        Self::ParamValidation { messages }
    }

    /// Returns the kind tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::RequestShape { .. } => ErrorKind::RequestShape,
            RpcError::MethodNotFound(_) => ErrorKind::MethodNotFound,
            RpcError::ParamValidation { .. } => ErrorKind::ParamValidation,
            RpcError::Domain { .. } => ErrorKind::Domain,
            RpcError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP-style status code carried in the error payload.
    ///
    /// Domain codes outside the 4xx/5xx range are treated as 500.
    pub fn status_code(&self) -> u16 {
        match self {
            RpcError::RequestShape { .. } => 400,
            RpcError::MethodNotFound(_) => 404,
            RpcError::ParamValidation { .. } => 400,
            RpcError::Domain { code, .. } if (400..=599).contains(code) => *code,
            RpcError::Domain { .. } => 500,
            RpcError::Internal(_) => 500,
        }
    }

    /// Whether this is a server-class failure (status >= 500).
    pub fn is_server(&self) -> bool {
        self.status_code() >= 500
    }

    /// Message safe to send to the caller.
    pub fn public_message(&self) -> String {
        match self {
            RpcError::RequestShape { .. } => INVALID_REQUEST_MESSAGE.to_string(),
            RpcError::MethodNotFound(_) => self.to_string(),
            RpcError::ParamValidation { .. } => INVALID_PARAMS_MESSAGE.to_string(),
            RpcError::Domain { message, .. } if self.status_code() != 500 => message.clone(),
            RpcError::Domain { .. } | RpcError::Internal(_) => INTERNAL_MESSAGE.to_string(),
        }
    }

    /// Per-rule messages for validation-style errors.
    pub fn details(&self) -> Option<&[String]> {
        match self {
            RpcError::RequestShape { messages } | RpcError::ParamValidation { messages } => {
                Some(messages)
            }
            _ => None,
        }
    }

    /// Convert to the wire error payload.
    pub fn to_payload(&self) -> ErrorPayload {
        let payload = ErrorPayload::new(self.status_code(), self.public_message());

        match self.details() {
            Some(details) => payload.with_data(serde_json::json!({ "details": details })),
            None => payload,
        }
    }
}

impl From<std::io::Error> for RpcError {
    fn from(e: std::io::Error) -> Self {
        Self::internal(e)
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::internal(e)
    }
}

/// Error object embedded in a failed response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// HTTP-style status code.
    pub code: u16,
    /// Human-readable, single-line message. Never carries internal detail.
    pub message: String,
    /// Optional machine-readable details (failing rules).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorPayload {
    /// Create a new error payload.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach machine-readable data.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
