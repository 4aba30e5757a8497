//! Methods linked into the `relay` binary.

use std::sync::Arc;

use relay_protocol::RpcError;
use serde_json::{json, Value};

use crate::context::Resolved;
use crate::registry::{CallContext, MethodOptions, MethodTable, RegistryError};

/// The built-in method table: `hello` and `echo`.
pub fn methods() -> Result<MethodTable, RegistryError> {
    MethodTable::new()
        .method(
            "hello",
            hello,
            MethodOptions::new()
                .description("Greet the caller by email address")
                .param("email", "string.email.required"),
        )?
        .method(
            "echo",
            echo,
            MethodOptions::new().description("Return params exactly as sent"),
        )
}

async fn hello(
    params: Value,
    _call: CallContext,
    context: Resolved,
    _event: Arc<Value>,
) -> Result<Value, RpcError> {
    let email = params["email"].as_str().unwrap_or_default();
    let service = context
        .logger()
        .map(|logger| logger.service().to_string())
        .unwrap_or_default();

    Ok(json!({
        "message": format!("Hello {}!", email),
        "service": service,
    }))
}

async fn echo(
    _params: Value,
    call: CallContext,
    _context: Resolved,
    _event: Arc<Value>,
) -> Result<Value, RpcError> {
    Ok(call.params.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    fn call(params: Option<Value>) -> CallContext {
        CallContext {
            id: "1".to_string(),
            method: "echo".to_string(),
            params,
            caller: None,
        }
    }

    #[tokio::test]
    async fn test_hello_requires_email() {
        let table = methods().unwrap();
        let hello = table.get("hello").unwrap();

        assert!(hello.validate(Some(&json!({"email": "not-an-email"}))).is_err());

        let params = hello.validate(Some(&json!({"email": "a@b.com"}))).unwrap();
        let context = Context::new("relay").resolve().await.unwrap();
        let result = hello
            .invoke(params, call(None), context, Arc::new(Value::Null))
            .await
            .unwrap();

        assert_eq!(result, json!({"message": "Hello a@b.com!", "service": "relay"}));
    }

    #[tokio::test]
    async fn test_echo_returns_raw_params() {
        let table = methods().unwrap();
        let echo = table.get("echo").unwrap();

        let result = echo
            .invoke(
                json!({}),
                call(Some(json!([1, 2, 3]))),
                Resolved::default(),
                Arc::new(Value::Null),
            )
            .await
            .unwrap();
        assert_eq!(result, json!([1, 2, 3]));
    }
}
