//! Layered configuration
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. TOML file (`relay.toml`)
//! 3. Parameter store, when `parameters.prefix` is set
//! 4. Environment (`RELAY_*`, `LOG_LEVEL`)
//! 5. CLI flags

mod defaults;
mod effective;
mod merge;
mod parameters;

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigError, ConfigLoader, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, expand_dotted, merge_layers};
pub use parameters::{fetch_parameters, MemoryParameterStore, Parameter, ParameterPage, ParameterStore};

use async_trait::async_trait;

use crate::context::{dependency, BoxError, Dependency, Provider, Resolved};

/// A context provider that loads the effective configuration.
///
/// Register it under [`crate::context::CONFIG`].
pub fn provider(loader: ConfigLoader) -> impl Provider {
    ConfigProvider { loader }
}

struct ConfigProvider {
    loader: ConfigLoader,
}

#[async_trait]
impl Provider for ConfigProvider {
    async fn provide(&self, _resolved: Resolved) -> Result<Dependency, BoxError> {
        let config = self.loader.load().await?;
        Ok(dependency(config))
    }
}
