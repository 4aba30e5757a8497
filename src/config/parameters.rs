//! Parameter-store layer
//!
//! Pages every parameter under a path prefix out of a hierarchical
//! key/value store and folds them into one nested configuration object:
//! `/svc/prod/db/host` under prefix `/svc/prod` becomes `{"db": {"host": ..}}`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::effective::ConfigError;
use super::merge::expand_dotted;

/// One stored parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

/// One page of a by-path listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterPage {
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// A paged, recursive parameter store.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// List parameters whose names start with `path`, continuing from
    /// `next_token` when given.
    async fn get_parameters_by_path(
        &self,
        path: &str,
        next_token: Option<&str>,
    ) -> Result<ParameterPage, ConfigError>;
}

/// Fetch every parameter under `prefix` as a nested object.
///
/// The first value seen for a key wins over later pages.
pub async fn fetch_parameters(
    store: &dyn ParameterStore,
    prefix: &str,
) -> Result<Value, ConfigError> {
    let path = format!("{}/", prefix.trim_end_matches('/'));
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = store.get_parameters_by_path(&path, token.as_deref()).await?;
        pages += 1;

        for parameter in page.parameters {
            let key = parameter
                .name
                .strip_prefix(&path)
                .unwrap_or(parameter.name.as_str())
                .replace('/', ".");
            flat.entry(key).or_insert(parameter.value);
        }

        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    tracing::debug!(prefix = %path, pages, keys = flat.len(), "fetched parameters");

    Ok(expand_dotted(
        flat.into_iter().map(|(k, v)| (k, Value::String(v))),
    ))
}

/// In-memory store serving fixed-size pages.
#[derive(Debug)]
pub struct MemoryParameterStore {
    parameters: Vec<Parameter>,
    page_size: usize,
    requests: AtomicUsize,
}

impl MemoryParameterStore {
    pub fn new<I, K, V>(parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            parameters: parameters
                .into_iter()
                .map(|(name, value)| Parameter {
                    name: name.into(),
                    value: value.into(),
                })
                .collect(),
            page_size: 10,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Number of pages served so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParameterStore for MemoryParameterStore {
    async fn get_parameters_by_path(
        &self,
        path: &str,
        next_token: Option<&str>,
    ) -> Result<ParameterPage, ConfigError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let start = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ConfigError::Parameters(format!("invalid page token '{}'", token)))?,
            None => 0,
        };

        let matching: Vec<&Parameter> = self
            .parameters
            .iter()
            .filter(|p| p.name.starts_with(path))
            .collect();

        let end = (start + self.page_size).min(matching.len());
        let parameters = matching
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|p| (*p).clone())
            .collect();

        Ok(ParameterPage {
            parameters,
            next_token: (end < matching.len()).then(|| end.to_string()),
        })
    }
}
