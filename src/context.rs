//! Dependency context
//!
//! A named bag of shared values (logger, config, clients) built from an
//! ordered list of async providers. Providers run strictly in registration
//! order and each one sees everything resolved before it, so later providers
//! may depend on earlier ones.
//!
//! The first caller of [`Context::resolve`] starts the provider chain; every
//! concurrent and later caller awaits the same shared future. Registering a
//! provider discards the memoized chain so the next resolve starts over,
//! while contexts already handed out are left untouched.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};

/// Name under which every context binds its [`Logger`].
pub const LOGGER: &str = "Logger";

/// Name under which the effective configuration is conventionally bound.
pub const CONFIG: &str = "Config";

/// A type-erased context value.
pub type Dependency = Arc<dyn Any + Send + Sync>;

/// Error type providers may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Wrap a value for binding in a context.
pub fn dependency<T: Any + Send + Sync>(value: T) -> Dependency {
    Arc::new(value)
}

/// Context resolution errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContextError {
    #[error("provider '{name}' failed: {message}")]
    Provider { name: String, message: String },
}

impl From<ContextError> for relay_protocol::RpcError {
    fn from(e: ContextError) -> Self {
        relay_protocol::RpcError::internal(e)
    }
}

/// An immutable snapshot of resolved values.
#[derive(Clone, Default)]
pub struct Resolved {
    values: Arc<HashMap<String, Dependency>>,
}

impl Resolved {
    pub fn new(values: HashMap<String, Dependency>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    /// Typed lookup. `None` if the name is unbound or holds another type.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.values
            .get(name)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn get_raw(&self, name: &str) -> Option<&Dependency> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The bound [`Logger`], if any.
    pub fn logger(&self) -> Option<Arc<Logger>> {
        self.get::<Logger>(LOGGER)
    }

    fn with(mut self, name: String, value: Dependency) -> Self {
        Arc::make_mut(&mut self.values).insert(name, value);
        self
    }
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Resolved").field("names", &names).finish()
    }
}

/// Produces one named context value from the values resolved so far.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn provide(&self, resolved: Resolved) -> Result<Dependency, BoxError>;
}

#[async_trait]
impl<F, Fut> Provider for F
where
    F: Fn(Resolved) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Dependency, BoxError>> + Send,
{
    async fn provide(&self, resolved: Resolved) -> Result<Dependency, BoxError> {
        (self)(resolved).await
    }
}

/// Service-scoped logging handle bound as [`LOGGER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logger {
    service: String,
}

impl Logger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// A span tagged with this service and the given correlation id.
    pub fn child(&self, request_id: &str) -> tracing::Span {
        tracing::info_span!("request", service = %self.service, request_id = %request_id)
    }
}

struct LoggerProvider {
    logger: Logger,
}

#[async_trait]
impl Provider for LoggerProvider {
    async fn provide(&self, _resolved: Resolved) -> Result<Dependency, BoxError> {
        Ok(dependency(self.logger.clone()))
    }
}

type Chain = Shared<BoxFuture<'static, Result<Resolved, ContextError>>>;

struct State {
    providers: Vec<(String, Arc<dyn Provider>)>,
    chain: Option<Chain>,
}

/// Process-scoped, lazily resolved dependency context.
pub struct Context {
    name: String,
    defaults: Resolved,
    state: Mutex<State>,
}

impl Context {
    /// A context whose only provider is its [`Logger`].
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_defaults(name, HashMap::new())
    }

    /// Like [`Context::new`], seeded with default values every provider sees.
    pub fn with_defaults(name: impl Into<String>, defaults: HashMap<String, Dependency>) -> Self {
        let name = name.into();
        let logger = LoggerProvider {
            logger: Logger::new(name.clone()),
        };

        Self {
            name,
            defaults: Resolved::new(defaults),
            state: Mutex::new(State {
                providers: vec![(LOGGER.to_string(), Arc::new(logger) as Arc<dyn Provider>)],
                chain: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a provider and discard any memoized resolution.
    pub fn register(&self, name: impl Into<String>, provider: impl Provider + 'static) -> &Self {
        let mut state = self.lock();
        state.providers.push((name.into(), Arc::new(provider)));
        state.chain = None;
        self
    }

    /// Names of registered providers, in resolution order.
    pub fn provider_names(&self) -> Vec<String> {
        self.lock()
            .providers
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Resolve every provider, once.
    ///
    /// A failed chain is not memoized; the next call starts a fresh one.
    pub async fn resolve(&self) -> Result<Resolved, ContextError> {
        let chain = {
            let mut state = self.lock();
            match state.chain.clone() {
                Some(chain) => chain,
                None => {
                    let chain = run_chain(self.defaults.clone(), state.providers.clone())
                        .boxed()
                        .shared();
                    state.chain = Some(chain.clone());
                    chain
                }
            }
        };

        let result = chain.clone().await;

        if result.is_err() {
            let mut state = self.lock();
            if state.chain.as_ref().is_some_and(|c| c.ptr_eq(&chain)) {
                state.chain = None;
            }
        }

        result
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("providers", &self.provider_names())
            .finish()
    }
}

async fn run_chain(
    defaults: Resolved,
    providers: Vec<(String, Arc<dyn Provider>)>,
) -> Result<Resolved, ContextError> {
    let mut resolved = defaults;

    for (name, provider) in providers {
        tracing::trace!(provider = %name, "resolving context value");
        let value = provider
            .provide(resolved.clone())
            .await
            .map_err(|e| ContextError::Provider {
                name: name.clone(),
                message: e.to_string(),
            })?;
        resolved = resolved.with(name, value);
    }

    Ok(resolved)
}
