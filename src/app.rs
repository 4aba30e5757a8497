//! Process wiring: one context and one method cache per process.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::EffectiveConfig;
use crate::context::{dependency, Context, CONFIG};
use crate::handler::RpcHandler;
use crate::registry::{MethodCache, MethodSource, MethodTable};

/// Context named after the service, with the configuration pre-bound.
pub fn context(config: &EffectiveConfig) -> Context {
    let mut defaults = HashMap::new();
    defaults.insert(CONFIG.to_string(), dependency(config.clone()));
    Context::with_defaults(config.service_name(), defaults)
}

/// Method cache over `table`.
///
/// With `methods.dir` configured only the methods found there are exposed;
/// otherwise the whole table is.
pub fn method_cache(config: &EffectiveConfig, table: MethodTable) -> MethodCache {
    match config.methods_dir() {
        Some(dir) => MethodCache::new(table, MethodSource::Directory(dir))
            .with_prefix(config.methods_prefix()),
        None => MethodCache::from_table(table),
    }
}

/// A ready dispatcher for `config`.
pub fn rpc_handler(config: &EffectiveConfig, table: MethodTable) -> RpcHandler {
    RpcHandler::new(
        Arc::new(context(config)),
        Arc::new(method_cache(config, table)),
    )
}
