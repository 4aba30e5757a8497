//! Scheduled trigger adapter.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use relay_protocol::RpcError;
use serde_json::Value;

use super::base::Handler;
use crate::context::{Context, Resolved};

/// Handles one scheduled tick.
#[async_trait]
pub trait ScheduleRunner: Send + Sync {
    async fn run(&self, event: Value, context: Resolved) -> Result<Value, RpcError>;
}

#[async_trait]
impl<F, Fut> ScheduleRunner for F
where
    F: Fn(Value, Resolved) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, RpcError>> + Send,
{
    async fn run(&self, event: Value, context: Resolved) -> Result<Value, RpcError> {
        (self)(event, context).await
    }
}

/// Passes the raw event and resolved context straight to its runner.
pub struct ScheduleHandler {
    context: Arc<Context>,
    runner: Box<dyn ScheduleRunner>,
}

impl ScheduleHandler {
    pub fn new(context: Arc<Context>, runner: impl ScheduleRunner + 'static) -> Self {
        Self {
            context,
            runner: Box::new(runner),
        }
    }
}

#[async_trait]
impl Handler for ScheduleHandler {
    type Output = Value;

    async fn exec(&self, event: Value) -> Result<Value, RpcError> {
        let context = self.context.resolve().await?;
        tracing::debug!(service = %self.context.name(), "running scheduled task");
        self.runner.run(event, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{dependency, BoxError};
    use serde_json::json;

    #[tokio::test]
    async fn test_runner_sees_event_and_context() {
        let context = Arc::new(Context::new("cron"));
        context.register("Region", |_resolved: Resolved| async move {
            Ok::<_, BoxError>(dependency("eu-west-1".to_string()))
        });

        let handler = ScheduleHandler::new(context, |event: Value, context: Resolved| async move {
            let region = context.get::<String>("Region").map(|r| r.to_string());
            Ok::<_, RpcError>(json!({"source": event["source"], "region": region}))
        });

        let result = handler
            .exec(json!({"source": "aws.events", "detail": {}}))
            .await
            .unwrap();

        assert_eq!(result, json!({"source": "aws.events", "region": "eu-west-1"}));
    }

    #[tokio::test]
    async fn test_context_failure_is_internal() {
        let context = Arc::new(Context::new("cron"));
        context.register("Broken", |_resolved: Resolved| async move {
            Err::<crate::context::Dependency, BoxError>("no credentials".into())
        });

        let handler = ScheduleHandler::new(context, |_event: Value, _context: Resolved| async move {
            Ok::<_, RpcError>(Value::Null)
        });

        let err = handler.exec(json!({})).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.public_message(), "An internal server error occurred");
    }
}
