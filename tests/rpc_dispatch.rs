//! End-to-end dispatch through `RpcHandler`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_runtime::context::{BoxError, Context, Resolved};
use relay_runtime::handler::{Handler, RpcHandler};
use relay_runtime::protocol::RpcError;
use relay_runtime::registry::{
    CallContext, MethodCache, MethodOptions, MethodSource, MethodTable, RegistryError,
};
use serde_json::{json, Value};

const ID_A: &str = "0b7c2f7e-4b8e-4f5a-9d3c-1a2b3c4d5e6f";
const ID_B: &str = "1c8d3a8f-5c9f-4a6b-8e4d-2b3c4d5e6f70";
const ID_C: &str = "2d9e4b90-6da0-4b7c-9f5e-3c4d5e6f7081";

async fn echo(
    params: Value,
    _call: CallContext,
    _context: Resolved,
    _event: Arc<Value>,
) -> Result<Value, RpcError> {
    Ok(params)
}

async fn slow(
    _params: Value,
    _call: CallContext,
    _context: Resolved,
    _event: Arc<Value>,
) -> Result<Value, RpcError> {
    tokio::time::sleep(Duration::from_millis(30)).await;
    Ok(json!("slow"))
}

async fn conflict(
    _params: Value,
    _call: CallContext,
    _context: Resolved,
    _event: Arc<Value>,
) -> Result<Value, RpcError> {
    Err(RpcError::conflict("Order already shipped"))
}

async fn leaky(
    _params: Value,
    _call: CallContext,
    _context: Resolved,
    _event: Arc<Value>,
) -> Result<Value, RpcError> {
    Err(RpcError::internal("db password rejected for user admin"))
}

async fn boom(
    _params: Value,
    _call: CallContext,
    _context: Resolved,
    _event: Arc<Value>,
) -> Result<Value, RpcError> {
    panic!("runner exploded")
}

async fn whoami(
    _params: Value,
    call: CallContext,
    _context: Resolved,
    _event: Arc<Value>,
) -> Result<Value, RpcError> {
    Ok(json!({
        "id": call.id,
        "method": call.method,
        "raw": call.params,
        "caller": call.caller,
    }))
}

fn table() -> MethodTable {
    MethodTable::new()
        .method("echo", echo, MethodOptions::new())
        .unwrap()
        .method("slow", slow, MethodOptions::new())
        .unwrap()
        .method("conflict", conflict, MethodOptions::new())
        .unwrap()
        .method("leaky", leaky, MethodOptions::new())
        .unwrap()
        .method("boom", boom, MethodOptions::new())
        .unwrap()
        .method("whoami", whoami, MethodOptions::new())
        .unwrap()
        .method(
            "hello",
            echo,
            MethodOptions::new().param("email", "string.email.required"),
        )
        .unwrap()
}

fn handler() -> RpcHandler {
    RpcHandler::new(
        Arc::new(Context::new("test")),
        Arc::new(MethodCache::from_table(table())),
    )
}

fn envelope(id: &str, method: &str, params: Value) -> Value {
    json!({"id": id, "protocolVersion": "2.0", "method": method, "params": params})
}

async fn exec(handler: &RpcHandler, body: Value) -> Value {
    let responder = handler.exec(json!({ "body": body.to_string() })).await.unwrap();
    let response = responder.gateway();
    assert_eq!(response.status_code, 200);
    serde_json::from_str(&response.body).unwrap()
}

#[tokio::test]
async fn test_batch_isolation_and_order() {
    let handler = handler();
    let body = json!([
        envelope(ID_A, "slow", json!({})),
        envelope(ID_B, "missing", json!({})),
        envelope(ID_C, "echo", json!({"x": 1})),
    ]);

    let response = exec(&handler, body).await;
    let items = response.as_array().unwrap();

    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["id"], ID_A);
    assert_eq!(items[0]["result"], "slow");
    assert_eq!(items[1]["id"], ID_B);
    assert_eq!(items[1]["error"]["code"], 404);
    assert_eq!(items[1]["error"]["message"], "Method missing does not exist");
    assert!(items[1].get("result").is_none());
    assert_eq!(items[2]["id"], ID_C);
    assert_eq!(items[2]["result"], json!({}));
}

#[tokio::test]
async fn test_cardinality_mirrors_request() {
    let handler = handler();

    let single = exec(&handler, envelope(ID_A, "echo", json!({}))).await;
    assert!(single.is_object());
    assert_eq!(single["protocolVersion"], "2.0");

    let pair = exec(
        &handler,
        json!([envelope(ID_A, "echo", json!({})), envelope(ID_B, "echo", json!({}))]),
    )
    .await;
    assert_eq!(pair.as_array().unwrap().len(), 2);

    // a one-element batch still unwraps
    let one = exec(&handler, json!([envelope(ID_A, "echo", json!({}))])).await;
    assert!(one.is_object());
}

#[tokio::test]
async fn test_wrong_version_rejected_before_resolution() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let enumerator = move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, RegistryError>(MethodSource::Locations(vec!["echo".into()]))
        }
    };

    let handler = RpcHandler::new(
        Arc::new(Context::new("test")),
        Arc::new(MethodCache::new(table(), enumerator).with_prefix("")),
    );

    let body = json!([
        envelope(ID_A, "echo", json!({})),
        {"id": ID_B, "protocolVersion": "1.0", "method": "echo"},
    ]);
    let err = handler
        .exec(json!({ "body": body.to_string() }))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!handler.methods().is_populated());

    // a valid request populates the cache exactly once
    exec(&handler, envelope(ID_A, "echo", json!({}))).await;
    exec(&handler, envelope(ID_A, "echo", json!({}))).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_request_shape_failures() {
    let handler = handler();

    let cases = [
        json!({"body": "{not json"}),
        json!({"body": "[]"}),
        json!({"body": json!({"id": "req-1", "protocolVersion": "2.0", "method": "echo"}).to_string()}),
        json!({"body": json!({"id": ID_A, "protocolVersion": "2.0"}).to_string()}),
        json!({}),
    ];

    for event in cases {
        let response = handler.handle(event).await;
        assert_eq!(response.status_code, 400);
        assert_eq!(response.headers["Access-Control-Allow-Origin"], "*");

        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["error"]["code"], 400);
        assert_eq!(body["error"]["message"], "Invalid request payload input");
        assert!(!body["error"]["data"]["details"].as_array().unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_param_validation_is_per_envelope() {
    let handler = handler();
    let body = json!([
        envelope(ID_A, "hello", json!({"email": "not-an-email"})),
        envelope(ID_B, "hello", json!({"email": "a@b.com", "extra": true})),
    ]);

    let response = exec(&handler, body).await;

    assert_eq!(response[0]["error"]["code"], 400);
    assert_eq!(response[0]["error"]["message"], "One or more parameters are invalid");
    assert_eq!(
        response[0]["error"]["data"]["details"],
        json!(["\"email\" must be a valid email"])
    );
    assert_eq!(response[1]["result"], json!({"email": "a@b.com"}));
}

#[tokio::test]
async fn test_panic_is_isolated() {
    let handler = handler();
    let body = json!([
        envelope(ID_A, "boom", json!({})),
        envelope(ID_B, "echo", json!({"ok": true})),
    ]);

    let response = exec(&handler, body).await;

    assert_eq!(response[0]["error"]["code"], 500);
    assert_eq!(response[0]["error"]["message"], "An internal server error occurred");
    assert_eq!(response[1]["result"], json!({}));
}

#[tokio::test]
async fn test_domain_errors_pass_through_internal_redacted() {
    let handler = handler();
    let body = json!([
        envelope(ID_A, "conflict", json!({})),
        envelope(ID_B, "leaky", json!({})),
    ]);

    let response = exec(&handler, body).await;

    assert_eq!(response[0]["error"], json!({"code": 409, "message": "Order already shipped"}));
    assert_eq!(response[1]["error"]["code"], 500);
    let message = response[1]["error"]["message"].as_str().unwrap();
    assert!(!message.contains("password"));
}

#[tokio::test]
async fn test_runner_sees_envelope_and_caller() {
    let handler = handler();
    let event = json!({
        "body": envelope(ID_A, "whoami", json!({"a": 1})).to_string(),
        "requestContext": {"authorizer": {"principalId": "user-7"}},
    });

    let response = handler.handle(event).await;
    let body: Value = serde_json::from_str(&response.body).unwrap();

    assert_eq!(
        body["result"],
        json!({
            "id": ID_A,
            "method": "whoami",
            "raw": {"a": 1},
            "caller": {"authorizer": {"principalId": "user-7"}},
        })
    );
}

#[tokio::test]
async fn test_positional_params_need_object_schema() {
    let handler = handler();
    let response = exec(&handler, envelope(ID_A, "echo", json!([1, 2]))).await;

    assert_eq!(response["error"]["code"], 400);
    assert_eq!(
        response["error"]["data"]["details"],
        json!(["\"value\" must be of type object"])
    );
}

#[tokio::test]
async fn test_duplicate_ids_answered_independently() {
    let handler = handler();
    let body = json!([
        envelope(ID_A, "echo", json!({})),
        envelope(ID_A, "missing", json!({})),
    ]);

    let response = exec(&handler, body).await;
    assert_eq!(response[0]["id"], ID_A);
    assert_eq!(response[1]["id"], ID_A);
    assert!(response[0].get("result").is_some());
    assert!(response[1].get("error").is_some());
}

#[tokio::test]
async fn test_context_failure_is_request_level() {
    let context = Context::new("test");
    context.register("Db", |_resolved: Resolved| async move {
        Err::<relay_runtime::context::Dependency, BoxError>("connection refused".into())
    });

    let handler = RpcHandler::new(Arc::new(context), Arc::new(MethodCache::from_table(table())));
    let response = handler
        .handle(json!({ "body": envelope(ID_A, "echo", json!({})).to_string() }))
        .await;

    assert_eq!(response.status_code, 500);
    let body: Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(body["error"]["message"], "An internal server error occurred");
}

#[tokio::test]
async fn test_pre_parsed_body() {
    let handler = handler();
    let response = handler
        .handle(json!({ "body": envelope(ID_A, "echo", json!({})) }))
        .await;

    assert_eq!(response.status_code, 200);
    let body: Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(body["id"], ID_A);
}
