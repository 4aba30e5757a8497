//! Queue trigger adapter.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use relay_protocol::RpcError;
use relay_schema::{ObjectSchema, SchemaError};
use serde_json::Value;

use super::base::{self, FieldMap, Handler};
use crate::context::{Context, Resolved};

/// Processes one queue record.
#[async_trait]
pub trait QueueRunner: Send + Sync {
    async fn run(
        &self,
        params: Value,
        record: Value,
        context: Resolved,
        event: Arc<Value>,
    ) -> Result<Value, RpcError>;
}

#[async_trait]
impl<F, Fut> QueueRunner for F
where
    F: Fn(Value, Value, Resolved, Arc<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, RpcError>> + Send,
{
    async fn run(
        &self,
        params: Value,
        record: Value,
        context: Resolved,
        event: Arc<Value>,
    ) -> Result<Value, RpcError> {
        (self)(params, record, context, event).await
    }
}

/// Runs every record of a queue event through one runner.
///
/// Records run concurrently; the first failure fails the whole batch so
/// the queue can redeliver it.
pub struct QueueHandler {
    context: Arc<Context>,
    runner: Arc<dyn QueueRunner>,
    schema: ObjectSchema,
}

impl QueueHandler {
    pub fn new(
        context: Arc<Context>,
        runner: impl QueueRunner + 'static,
        validation: Option<&FieldMap>,
    ) -> Result<Self, SchemaError> {
        Ok(Self {
            context,
            runner: Arc::new(runner),
            schema: base::build_schema(validation)?,
        })
    }

    async fn process(&self, record: Value, context: Resolved, event: Arc<Value>) -> Result<Value, RpcError> {
        let body = record_body(&record)?;
        let params = base::validate(&self.schema, body.as_ref())?;
        self.runner.run(params, record, context, event).await
    }
}

#[async_trait]
impl Handler for QueueHandler {
    type Output = Vec<Value>;

    async fn exec(&self, event: Value) -> Result<Vec<Value>, RpcError> {
        let records = match event.get("Records") {
            Some(Value::Array(records)) => records.clone(),
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                return Err(RpcError::request_shape(vec![
                    "\"Records\" must be an array".to_string(),
                ]))
            }
        };

        let context = self.context.resolve().await?;
        let event = Arc::new(event);
        tracing::debug!(records = records.len(), "processing queue records");

        try_join_all(
            records
                .into_iter()
                .map(|record| self.process(record, context.clone(), event.clone())),
        )
        .await
    }
}

/// A record's body: JSON text is parsed, structured bodies pass through.
fn record_body(record: &Value) -> Result<Option<Value>, RpcError> {
    match record.get("body") {
        Some(Value::String(text)) => serde_json::from_str(text)
            .map(Some)
            .map_err(|e| RpcError::request_shape(vec![format!("invalid record body: {}", e)])),
        Some(Value::Null) | None => Ok(None),
        Some(other) => Ok(Some(other.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn fields() -> FieldMap {
        [("orderId", "number.integer.required")].into_iter().collect()
    }

    #[tokio::test]
    async fn test_records_validated_and_run_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let handler = QueueHandler::new(
            Arc::new(Context::new("queue")),
            move |params: Value, record: Value, _context: Resolved, _event: Arc<Value>| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(record["messageId"].clone());
                    Ok::<_, RpcError>(params)
                }
            },
            Some(&fields()),
        )
        .unwrap();

        let event = json!({
            "Records": [
                {"messageId": "m1", "body": "{\"orderId\": \"7\", \"note\": \"x\"}"},
                {"messageId": "m2", "body": {"orderId": 8}}
            ]
        });

        let results = handler.exec(event).await.unwrap();
        assert_eq!(results, vec![json!({"orderId": 7}), json!({"orderId": 8})]);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_record_fails_batch() {
        let handler = QueueHandler::new(
            Arc::new(Context::new("queue")),
            |params: Value, _record: Value, _context: Resolved, _event: Arc<Value>| async move {
                Ok::<_, RpcError>(params)
            },
            Some(&fields()),
        )
        .unwrap();

        let event = json!({"Records": [{"body": "{}"}, {"body": "{\"orderId\": 1}"}]});
        let err = handler.exec(event).await.unwrap_err();

        assert_eq!(err.status_code(), 400);
        assert_eq!(err.details().unwrap(), &["\"orderId\" is required".to_string()]);
    }

    #[tokio::test]
    async fn test_unparseable_body() {
        let handler = QueueHandler::new(
            Arc::new(Context::new("queue")),
            |params: Value, _record: Value, _context: Resolved, _event: Arc<Value>| async move {
                Ok::<_, RpcError>(params)
            },
            None,
        )
        .unwrap();

        let err = handler.exec(json!({"Records": [{"body": "{nope"}]})).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(handler.exec(json!({})).await.unwrap().is_empty());
    }
}
