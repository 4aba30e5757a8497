//! Lazily populated method cache.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;

use super::manifest::{is_manifest, load_manifest};
use super::source::{locations, method_key, MethodEnumerator, MethodSource};
use super::{MethodDescriptor, MethodTable, RegistryError};

/// Name to descriptor lookups, populated on first use.
///
/// Population runs the enumerator once, behind a one-time-init guard, so
/// concurrent first lookups share a single enumeration. A failed
/// population is not cached and the next lookup tries again.
pub struct MethodCache {
    table: MethodTable,
    enumerator: Arc<dyn MethodEnumerator>,
    prefix: String,
    methods: OnceCell<HashMap<String, MethodDescriptor>>,
}

impl MethodCache {
    pub fn new(table: MethodTable, enumerator: impl MethodEnumerator + 'static) -> Self {
        Self {
            table,
            enumerator: Arc::new(enumerator),
            prefix: "_".to_string(),
            methods: OnceCell::new(),
        }
    }

    /// Expose every method in the table under its own name.
    pub fn from_table(table: MethodTable) -> Self {
        let names = table.names().map(str::to_string).collect();
        Self::new(table, MethodSource::Names(names)).with_prefix("")
    }

    /// Prefix marking method files and stripped from their keys.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn is_populated(&self) -> bool {
        self.methods.initialized()
    }

    /// Every resolvable method, populating on first call.
    pub async fn methods(&self) -> Result<&HashMap<String, MethodDescriptor>, RegistryError> {
        self.methods.get_or_try_init(|| self.populate()).await
    }

    /// Look up a method. Unknown names get [`MethodDescriptor::not_found`].
    pub async fn resolve(&self, name: &str) -> Result<MethodDescriptor, RegistryError> {
        let methods = self.methods().await?;

        Ok(methods
            .get(name)
            .cloned()
            .unwrap_or_else(|| MethodDescriptor::not_found(name)))
    }

    async fn populate(&self) -> Result<HashMap<String, MethodDescriptor>, RegistryError> {
        let source = self.enumerator.enumerate().await?;
        let entries: Vec<(Option<String>, Option<PathBuf>)> = match &source {
            MethodSource::Names(names) => names.iter().map(|name| (Some(name.clone()), None)).collect(),
            other => locations(other, &self.prefix)?
                .into_iter()
                .map(|path| (method_key(&path, &self.prefix), Some(path)))
                .collect(),
        };
        let mut methods = HashMap::new();

        for (key, path) in entries {
            let location = path.as_deref().map(|p| p.display().to_string()).unwrap_or_default();

            let Some(key) = key else {
                tracing::warn!(location = %location, "skipping location without a method name");
                continue;
            };

            if methods.contains_key(&key) {
                tracing::warn!(method = %key, location = %location, "duplicate method location ignored");
                continue;
            }

            let Some(linked) = self.table.get(&key) else {
                tracing::warn!(method = %key, location = %location, "no runner linked for method");
                continue;
            };

            let descriptor = match path {
                Some(ref path) if is_manifest(path) => linked.with_options(load_manifest(path)?)?,
                _ => linked.clone(),
            };
            methods.insert(key, descriptor);
        }

        tracing::debug!(count = methods.len(), "method cache populated");
        Ok(methods)
    }
}

impl std::fmt::Debug for MethodCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodCache")
            .field("table", &self.table)
            .field("prefix", &self.prefix)
            .field("populated", &self.is_populated())
            .finish()
    }
}
