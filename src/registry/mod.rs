//! Method registry
//!
//! Runners are linked into a [`MethodTable`] at startup. A [`MethodCache`]
//! asks its [`MethodEnumerator`] once for the method sources, keeps the
//! table entries those sources name, and serves every later lookup from
//! memory. Names the sources do not mention resolve to a synthetic
//! not-found descriptor.

mod cache;
mod manifest;
mod source;

pub use cache::MethodCache;
pub use manifest::load_manifest;
pub use source::{locations, method_key, scan_directory, MethodEnumerator, MethodSource};

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use relay_protocol::RpcError;
use relay_schema::{ObjectSchema, SchemaError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Resolved;
use crate::handler::base::{self, FieldMap};

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("method enumeration failed: {0}")]
    Enumerate(String),

    #[error("cannot read method directory {path}: {message}")]
    Scan { path: String, message: String },

    #[error("invalid method manifest {path}: {message}")]
    Manifest { path: String, message: String },

    #[error("invalid validation for method '{method}': {source}")]
    Schema {
        method: String,
        #[source]
        source: SchemaError,
    },
}

impl From<RegistryError> for RpcError {
    fn from(e: RegistryError) -> Self {
        RpcError::internal(e)
    }
}

/// Envelope data handed to a runner alongside its params.
#[derive(Debug, Clone, PartialEq)]
pub struct CallContext {
    /// Envelope id.
    pub id: String,
    /// Method name as sent.
    pub method: String,
    /// Params as sent, before validation.
    pub params: Option<Value>,
    /// Caller slice of the raw event (authorizer principal and such).
    pub caller: Option<Value>,
}

/// A method implementation.
///
/// Receives validated params, the envelope's call context, the resolved
/// dependency context and the raw event.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(
        &self,
        params: Value,
        call: CallContext,
        context: Resolved,
        event: Arc<Value>,
    ) -> Result<Value, RpcError>;
}

#[async_trait]
impl<F, Fut> Runner for F
where
    F: Fn(Value, CallContext, Resolved, Arc<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, RpcError>> + Send,
{
    async fn run(
        &self,
        params: Value,
        call: CallContext,
        context: Resolved,
        event: Arc<Value>,
    ) -> Result<Value, RpcError> {
        (self)(params, call, context, event).await
    }
}

struct NotFound;

#[async_trait]
impl Runner for NotFound {
    async fn run(
        &self,
        _params: Value,
        call: CallContext,
        _context: Resolved,
        _event: Arc<Value>,
    ) -> Result<Value, RpcError> {
        Err(RpcError::MethodNotFound(call.method))
    }
}

/// Per-method metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether the method expects an authenticated caller.
    #[serde(default)]
    pub auth: bool,

    /// Field name to validation DSL.
    #[serde(default)]
    pub validation: FieldMap,
}

impl MethodOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn auth(mut self, auth: bool) -> Self {
        self.auth = auth;
        self
    }

    /// Add one validated field.
    pub fn param(mut self, field: impl Into<String>, dsl: impl Into<String>) -> Self {
        self.validation.insert(field.into(), dsl.into());
        self
    }
}

/// A method's runner, options and compiled parameter schema.
#[derive(Clone)]
pub struct MethodDescriptor {
    name: String,
    runner: Arc<dyn Runner>,
    options: MethodOptions,
    schema: Option<Arc<ObjectSchema>>,
}

impl MethodDescriptor {
    /// Compile the options' validation map; malformed DSL fails here.
    pub fn new(
        name: impl Into<String>,
        runner: impl Runner + 'static,
        options: MethodOptions,
    ) -> Result<Self, RegistryError> {
        let name = name.into();
        let schema = compile(&name, &options)?;

        Ok(Self {
            name,
            runner: Arc::new(runner),
            options,
            schema: Some(Arc::new(schema)),
        })
    }

    /// Stand-in for an unknown method. It skips validation and its runner
    /// fails with `MethodNotFound`.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runner: Arc::new(NotFound),
            options: MethodOptions::default(),
            schema: None,
        }
    }

    /// Same runner, new options.
    pub fn with_options(&self, options: MethodOptions) -> Result<Self, RegistryError> {
        let schema = compile(&self.name, &options)?;

        Ok(Self {
            name: self.name.clone(),
            runner: self.runner.clone(),
            options,
            schema: Some(Arc::new(schema)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &MethodOptions {
        &self.options
    }

    pub fn schema(&self) -> Option<&ObjectSchema> {
        self.schema.as_deref()
    }

    pub fn is_not_found(&self) -> bool {
        self.schema.is_none()
    }

    /// Validate params against this method's schema.
    pub fn validate(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        match &self.schema {
            Some(schema) => base::validate(schema, params),
            None => Ok(params.cloned().unwrap_or(Value::Null)),
        }
    }

    pub async fn invoke(
        &self,
        params: Value,
        call: CallContext,
        context: Resolved,
        event: Arc<Value>,
    ) -> Result<Value, RpcError> {
        self.runner.run(params, call, context, event).await
    }
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("not_found", &self.is_not_found())
            .finish()
    }
}

fn compile(method: &str, options: &MethodOptions) -> Result<ObjectSchema, RegistryError> {
    base::build_schema(Some(&options.validation)).map_err(|source| RegistryError::Schema {
        method: method.to_string(),
        source,
    })
}

/// Immutable name to descriptor table built at startup.
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    methods: BTreeMap<String, MethodDescriptor>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a runner under `name`.
    pub fn method(
        mut self,
        name: impl Into<String>,
        runner: impl Runner + 'static,
        options: MethodOptions,
    ) -> Result<Self, RegistryError> {
        let descriptor = MethodDescriptor::new(name, runner, options)?;
        self.methods.insert(descriptor.name.clone(), descriptor);
        Ok(self)
    }

    pub fn insert(&mut self, descriptor: MethodDescriptor) {
        self.methods.insert(descriptor.name.clone(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
