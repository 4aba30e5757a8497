//! HTTP gateway framing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Response body: JSON to serialize, or text passed through verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Text(String),
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

/// The transport-ready response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub status_code: u16,
    pub headers: Map<String, Value>,
    pub body: String,
}

/// Wraps a payload for the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct Responder {
    body: Body,
}

impl Responder {
    pub fn new(body: impl Into<Body>) -> Self {
        Self { body: body.into() }
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Frame with CORS headers, overridden by `headers`, and `status_code`.
    pub fn to_gateway<I, K>(&self, headers: I, status_code: u16) -> GatewayResponse
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut merged = Map::new();
        merged.insert("Access-Control-Allow-Origin".to_string(), Value::from("*"));
        merged.insert("Access-Control-Allow-Credentials".to_string(), Value::Bool(true));
        for (name, value) in headers {
            merged.insert(name.into(), value);
        }

        let body = match &self.body {
            Body::Text(text) => text.clone(),
            Body::Json(value) => value.to_string(),
        };

        GatewayResponse {
            status_code,
            headers: merged,
            body,
        }
    }

    /// 200 with the default headers.
    pub fn gateway(&self) -> GatewayResponse {
        self.to_gateway(Vec::<(String, Value)>::new(), 200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_framing() {
        let response = Responder::new(json!({"ok": true})).gateway();

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, r#"{"ok":true}"#);
        assert_eq!(response.headers["Access-Control-Allow-Origin"], "*");
        assert_eq!(response.headers["Access-Control-Allow-Credentials"], true);
    }

    #[test]
    fn test_text_body_verbatim() {
        let response = Responder::new("already serialized").gateway();
        assert_eq!(response.body, "already serialized");
    }

    #[test]
    fn test_caller_headers_win() {
        let response = Responder::new(json!(null)).to_gateway(
            [
                ("Access-Control-Allow-Origin", json!("https://example.com")),
                ("Content-Type", json!("application/json")),
            ],
            201,
        );

        assert_eq!(response.status_code, 201);
        assert_eq!(response.headers["Access-Control-Allow-Origin"], "https://example.com");
        assert_eq!(response.headers["Content-Type"], "application/json");
        assert_eq!(response.headers.len(), 3);
    }

    #[test]
    fn test_gateway_wire_shape() {
        let value = serde_json::to_value(Responder::new(json!(1)).gateway()).unwrap();
        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["body"], "1");
    }
}
