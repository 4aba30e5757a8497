//! RPC dispatcher
//!
//! Validates the request shape up front, then runs every envelope of the
//! batch concurrently. Each envelope resolves its method, validates its
//! params and invokes the runner inside its own logging span; whatever
//! happens (a domain error, a missing method, a panic) is folded into that
//! envelope's response and never reaches its siblings.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, FutureExt};
use relay_protocol::{Envelope, EnvelopeBatch, Outcome, ResponseEnvelope, RpcError};
use serde_json::{json, Value};
use tracing::Instrument;

use super::base::Handler;
use super::http::{GatewayResponse, Responder};
use crate::context::{Context, Logger, Resolved};
use crate::registry::{CallContext, MethodCache};

/// Event field carrying the request body.
const BODY: &str = "body";

/// Event field handed to runners as the caller slice.
const REQUEST_CONTEXT: &str = "requestContext";

/// The RPC entry point.
#[derive(Debug, Clone)]
pub struct RpcHandler {
    context: Arc<Context>,
    methods: Arc<MethodCache>,
}

impl RpcHandler {
    pub fn new(context: Arc<Context>, methods: Arc<MethodCache>) -> Self {
        Self { context, methods }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn methods(&self) -> &MethodCache {
        &self.methods
    }

    /// Run a shape-validated batch against the raw event.
    ///
    /// Only a failed context resolution fails the whole call; per-envelope
    /// failures come back as error envelopes in input order.
    pub async fn dispatch(&self, batch: EnvelopeBatch, event: Arc<Value>) -> Result<Outcome, RpcError> {
        let resolved = self.context.resolve().await?;
        let logger = resolved
            .logger()
            .unwrap_or_else(|| Arc::new(Logger::new(self.context.name())));

        let calls = batch
            .into_envelopes()
            .into_iter()
            .map(|envelope| self.call(envelope, &resolved, &logger, &event));

        Ok(Outcome::from_responses(join_all(calls).await))
    }

    /// Run the event and frame the result, including request-level errors.
    pub async fn handle(&self, event: Value) -> GatewayResponse {
        match self.exec(event).await {
            Ok(responder) => responder.gateway(),
            Err(err) => {
                if err.is_server() {
                    tracing::error!(error = %err, "rpc request rejected");
                } else {
                    tracing::debug!(error = %err, "rpc request rejected");
                }

                Responder::new(json!({ "error": err.to_payload() }))
                    .to_gateway(Vec::<(String, Value)>::new(), err.status_code())
            }
        }
    }

    async fn call(
        &self,
        envelope: Envelope,
        context: &Resolved,
        logger: &Logger,
        event: &Arc<Value>,
    ) -> ResponseEnvelope {
        let span = logger.child(&envelope.id);
        let id = envelope.id.clone();
        let method = envelope.method.clone();

        let run = AssertUnwindSafe(self.run_envelope(envelope, context.clone(), event.clone()))
            .catch_unwind()
            .instrument(span.clone());

        let result = match run.await {
            Ok(result) => result,
            Err(payload) => Err(RpcError::internal(format!(
                "runner panicked: {}",
                panic_message(payload.as_ref())
            ))),
        };

        match result {
            Ok(value) => {
                tracing::debug!(parent: &span, request_id = %id, method = %method, "rpc request finished");
                ResponseEnvelope::success(id, value)
            }
            Err(err) => {
                if err.is_server() {
                    tracing::error!(parent: &span, request_id = %id, method = %method, code = err.status_code(), error = %err, "rpc request failed");
                } else {
                    tracing::debug!(parent: &span, request_id = %id, method = %method, code = err.status_code(), error = %err, "rpc request failed");
                }
                ResponseEnvelope::failure(id, &err)
            }
        }
    }

    async fn run_envelope(
        &self,
        envelope: Envelope,
        context: Resolved,
        event: Arc<Value>,
    ) -> Result<Value, RpcError> {
        tracing::debug!(method = %envelope.method, "starting rpc request");

        let descriptor = self.methods.resolve(&envelope.method).await?;
        let raw = envelope.params_value();
        let params = descriptor.validate(raw.as_ref())?;

        let call = CallContext {
            id: envelope.id,
            method: envelope.method,
            params: raw,
            caller: caller_slice(&event),
        };

        descriptor.invoke(params, call, context, event).await
    }
}

#[async_trait]
impl Handler for RpcHandler {
    type Output = Responder;

    async fn exec(&self, event: Value) -> Result<Responder, RpcError> {
        let batch = parse_body(&event)?;
        let outcome = self.dispatch(batch, Arc::new(event)).await?;
        Ok(Responder::new(outcome.to_value()?))
    }
}

/// Extract and shape-validate the envelope body of a gateway event.
///
/// A string body is parsed as JSON; anything else is taken as already
/// parsed.
pub fn parse_body(event: &Value) -> Result<EnvelopeBatch, RpcError> {
    match event.get(BODY) {
        None | Some(Value::Null) => Err(RpcError::request_shape(vec![
            "\"body\" is required".to_string(),
        ])),
        Some(Value::String(body)) => EnvelopeBatch::parse(body),
        Some(body) => EnvelopeBatch::from_value(body.clone()),
    }
}

fn caller_slice(event: &Value) -> Option<Value> {
    event
        .get(REQUEST_CONTEXT)
        .filter(|value| !value.is_null())
        .cloned()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
