//! Effective configuration with provenance
//!
//! The merged configuration plus a record of every layer that contributed
//! to it, in precedence order.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::defaults::BuiltinDefaults;
use super::merge::{deep_merge, merge_layers};
use super::parameters::{fetch_parameters, ParameterStore};
use crate::logging::{self, LogFormat};

/// Schema identifier
pub const SCHEMA_ID: &str = "relay/effective_config@1";

/// Environment variables read as overrides, with their dotted config path.
/// Earlier entries win when two map to the same path.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("RELAY_SERVICE_NAME", "service_name"),
    ("RELAY_LOG_LEVEL", "log.level"),
    ("LOG_LEVEL", "log.level"),
    ("RELAY_LOG_FORMAT", "log.format"),
    ("RELAY_METHODS_DIR", "methods.dir"),
    ("RELAY_PARAMETERS_PREFIX", "parameters.prefix"),
];

/// Keys that contain secrets and should be redacted
const SECRET_KEYS: &[&str] = &[
    "password",
    "token",
    "secret",
    "private_key",
    "api_key",
    "credential",
];

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Parameters,
    Env,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path, or parameter prefix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ConfigSource {
    fn new(origin: ConfigOrigin) -> Self {
        Self {
            origin,
            path: None,
            digest: None,
        }
    }
}

/// Effective configuration with full provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_id: String,

    /// When this config was computed
    pub created_at: DateTime<Utc>,

    /// The merged configuration object
    pub config: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,

    /// Key paths replaced by [`EffectiveConfig::redacted`]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redactions: Vec<String>,
}

impl EffectiveConfig {
    /// Built-in defaults only.
    pub fn defaults() -> Self {
        Self {
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config: BuiltinDefaults::default().to_value(),
            sources: vec![ConfigSource::new(ConfigOrigin::Builtin)],
            redactions: Vec::new(),
        }
    }

    /// A copy with secret-looking values replaced, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.redactions = redact_secrets(&mut copy.config);
        copy
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get a config value by path (dot-separated)
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.config;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    pub fn service_name(&self) -> &str {
        self.get_str("service_name").unwrap_or("relay")
    }

    /// Level name or numeric level, as configured.
    pub fn log_level(&self) -> String {
        match self.get("log.level") {
            Some(Value::String(level)) => level.clone(),
            Some(Value::Number(level)) => level.to_string(),
            _ => "info".to_string(),
        }
    }

    pub fn log_format(&self) -> LogFormat {
        self.get_str("log.format")
            .and_then(|f| f.parse().ok())
            .unwrap_or_default()
    }

    pub fn methods_dir(&self) -> Option<PathBuf> {
        self.get_str("methods.dir").map(PathBuf::from)
    }

    pub fn methods_prefix(&self) -> &str {
        self.get_str("methods.prefix").unwrap_or("_")
    }

    pub fn parameters_prefix(&self) -> Option<&str> {
        self.get_str("parameters.prefix")
    }
}

/// Builds an [`EffectiveConfig`] from its layers:
/// defaults, TOML file, parameter store, environment, CLI.
#[derive(Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    require_file: bool,
    store: Option<Arc<dyn ParameterStore>>,
    env: Option<Vec<(String, String)>>,
    cli: Option<Value>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a TOML file if it exists.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self.require_file = false;
        self
    }

    /// Read a TOML file that must exist.
    pub fn required_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self.require_file = true;
        self
    }

    /// Fetch a parameter layer when `parameters.prefix` is configured.
    pub fn parameter_store(mut self, store: Arc<dyn ParameterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use these variables instead of the process environment.
    pub fn env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Highest-precedence overrides.
    pub fn cli(mut self, overrides: Value) -> Self {
        self.cli = Some(match self.cli.take() {
            Some(existing) => deep_merge(existing, overrides),
            None => overrides,
        });
        self
    }

    pub async fn load(&self) -> Result<EffectiveConfig, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource::new(ConfigOrigin::Builtin)];

        if let Some(path) = &self.file {
            if path.exists() {
                let (value, digest) = load_toml_file(path)?;
                layers.push(value);
                sources.push(ConfigSource {
                    origin: ConfigOrigin::File,
                    path: Some(path.to_string_lossy().to_string()),
                    digest: Some(digest),
                });
            } else if self.require_file {
                return Err(ConfigError::IoError(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }

        let env = self.env_layer();
        let cli = self.cli.clone();

        if let Some(store) = &self.store {
            let preview = merge_layers(
                layers
                    .iter()
                    .cloned()
                    .chain(env.clone())
                    .chain(cli.clone())
                    .collect(),
            );
            if let Some(prefix) = preview
                .pointer("/parameters/prefix")
                .and_then(Value::as_str)
            {
                let value = fetch_parameters(store.as_ref(), prefix).await?;
                layers.push(value);
                sources.push(ConfigSource {
                    origin: ConfigOrigin::Parameters,
                    path: Some(prefix.to_string()),
                    digest: None,
                });
            }
        }

        if let Some(env) = env {
            layers.push(env);
            sources.push(ConfigSource::new(ConfigOrigin::Env));
        }

        if let Some(cli) = cli {
            layers.push(cli);
            sources.push(ConfigSource::new(ConfigOrigin::Cli));
        }

        let merged = merge_layers(layers);
        validate_config(&merged)?;

        tracing::debug!(sources = sources.len(), "configuration loaded");

        Ok(EffectiveConfig {
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config: merged,
            sources,
            redactions: Vec::new(),
        })
    }

    fn env_layer(&self) -> Option<Value> {
        let vars: Vec<(String, String)> = match &self.env {
            Some(vars) => vars.clone(),
            None => ENV_OVERRIDES
                .iter()
                .filter_map(|(name, _)| std::env::var(name).ok().map(|v| (name.to_string(), v)))
                .collect(),
        };

        let mut layer = Value::Object(Map::new());
        let mut seen = Vec::new();

        for (name, path) in ENV_OVERRIDES {
            if seen.contains(path) {
                continue;
            }
            let Some((_, value)) = vars.iter().find(|(k, _)| k == name) else {
                continue;
            };
            seen.push(*path);
            layer = deep_merge(layer, nest(path, Value::String(value.clone())));
        }

        (!seen.is_empty()).then_some(layer)
    }
}

impl std::fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("file", &self.file)
            .field("parameter_store", &self.store.is_some())
            .field("cli", &self.cli)
            .finish()
    }
}

fn nest(path: &str, value: Value) -> Value {
    path.rsplit('.').fold(value, |inner, key| {
        let mut map = Map::new();
        map.insert(key.to_string(), inner);
        Value::Object(map)
    })
}

/// Load and parse a TOML file, returning the value and digest
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;

    let toml_value: toml::Value = toml::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

    Ok((toml_to_json(toml_value), digest))
}

/// Convert TOML Value to JSON Value
fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Redact secrets in place, returning the redacted paths
fn redact_secrets(value: &mut Value) -> Vec<String> {
    let mut redactions = Vec::new();
    redact_recursive(value, String::new(), &mut redactions);
    redactions
}

fn redact_recursive(value: &mut Value, path: String, redactions: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                let current_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };

                let is_secret = SECRET_KEYS.iter().any(|s| key_lower.contains(s));

                if is_secret && !val.is_object() && !val.is_array() {
                    *val = Value::String("[REDACTED]".to_string());
                    redactions.push(current_path);
                } else {
                    redact_recursive(val, current_path, redactions);
                }
            }
        }
        Value::Array(arr) => {
            for (i, val) in arr.iter_mut().enumerate() {
                redact_recursive(val, format!("{}[{}]", path, i), redactions);
            }
        }
        _ => {}
    }
}

fn validate_config(config: &Value) -> Result<(), ConfigError> {
    match config.get("service_name") {
        Some(Value::String(name)) if !name.trim().is_empty() => {}
        _ => {
            return Err(ConfigError::ValidationError(
                "service_name must be a non-empty string".to_string(),
            ))
        }
    }

    if let Some(level) = config.pointer("/log/level") {
        let text = match level {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        };
        logging::parse_level(&text)
            .map_err(|e| ConfigError::ValidationError(format!("log.level: {}", e)))?;
    }

    if let Some(format) = config.pointer("/log/format") {
        format
            .as_str()
            .unwrap_or_default()
            .parse::<LogFormat>()
            .map_err(|e| ConfigError::ValidationError(format!("log.format: {}", e)))?;
    }

    if let Some(prefix) = config.pointer("/methods/prefix") {
        if !prefix.is_string() {
            return Err(ConfigError::ValidationError(
                "methods.prefix must be a string".to_string(),
            ));
        }
    }

    Ok(())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Parameter store error: {0}")]
    Parameters(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryParameterStore;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env() -> ConfigLoader {
        ConfigLoader::new().env(Vec::<(String, String)>::new())
    }

    #[tokio::test]
    async fn test_defaults_only() {
        let config = no_env().load().await.unwrap();

        assert_eq!(config.service_name(), "relay");
        assert_eq!(config.log_level(), "info");
        assert_eq!(config.log_format(), LogFormat::Compact);
        assert_eq!(config.methods_prefix(), "_");
        assert!(config.methods_dir().is_none());
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].origin, ConfigOrigin::Builtin);
    }

    #[tokio::test]
    async fn test_file_layer_with_digest() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "service_name = \"billing\"").unwrap();
        writeln!(temp, "[methods]").unwrap();
        writeln!(temp, "dir = \"/srv/methods\"").unwrap();

        let config = no_env().file(temp.path()).load().await.unwrap();

        assert_eq!(config.service_name(), "billing");
        assert_eq!(config.methods_dir(), Some(PathBuf::from("/srv/methods")));
        assert_eq!(config.sources[1].origin, ConfigOrigin::File);
        assert_eq!(config.sources[1].digest.as_ref().map(String::len), Some(64));
    }

    #[tokio::test]
    async fn test_missing_optional_file_skipped() {
        let config = no_env().file("/definitely/not/here.toml").load().await.unwrap();
        assert_eq!(config.sources.len(), 1);

        let err = no_env()
            .required_file("/definitely/not/here.toml")
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[tokio::test]
    async fn test_env_and_cli_precedence() {
        let config = ConfigLoader::new()
            .env([("LOG_LEVEL", "20"), ("RELAY_LOG_LEVEL", "warn"), ("RELAY_SERVICE_NAME", "env-svc")])
            .cli(json!({"service_name": "cli-svc"}))
            .load()
            .await
            .unwrap();

        assert_eq!(config.log_level(), "warn");
        assert_eq!(config.service_name(), "cli-svc");
        let origins: Vec<_> = config.sources.iter().map(|s| s.origin.clone()).collect();
        assert_eq!(
            origins,
            vec![ConfigOrigin::Builtin, ConfigOrigin::Env, ConfigOrigin::Cli]
        );
    }

    #[tokio::test]
    async fn test_numeric_log_level_from_env() {
        let config = ConfigLoader::new().env([("LOG_LEVEL", "50")]).load().await.unwrap();
        assert_eq!(config.log_level(), "50");
    }

    #[tokio::test]
    async fn test_parameter_layer() {
        let store = Arc::new(MemoryParameterStore::new([
            ("/relay/prod/service_name", "from-store"),
            ("/relay/prod/db/password", "hunter2"),
        ]));

        let config = no_env()
            .parameter_store(store)
            .cli(json!({"parameters": {"prefix": "/relay/prod"}}))
            .load()
            .await
            .unwrap();

        // cli does not set service_name, so the store value survives
        assert_eq!(config.service_name(), "from-store");
        assert_eq!(config.get_str("db.password"), Some("hunter2"));
        assert!(config
            .sources
            .iter()
            .any(|s| s.origin == ConfigOrigin::Parameters));
    }

    #[tokio::test]
    async fn test_store_ignored_without_prefix() {
        let store = Arc::new(MemoryParameterStore::new([("/x/service_name", "nope")]));
        let config = no_env().parameter_store(store.clone()).load().await.unwrap();

        assert_eq!(config.service_name(), "relay");
        assert_eq!(store.requests(), 0);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let err = no_env()
            .cli(json!({"log": {"level": "loud"}}))
            .load()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("log.level"));

        let err = no_env()
            .cli(json!({"service_name": ""}))
            .load()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("service_name"));
    }

    #[tokio::test]
    async fn test_redacted_copy() {
        let config = no_env()
            .cli(json!({"db": {"password": "hunter2", "host": "db"}, "api_key": "k"}))
            .load()
            .await
            .unwrap();

        let shown = config.redacted();
        assert_eq!(shown.get_str("db.password"), Some("[REDACTED]"));
        assert_eq!(shown.get_str("api_key"), Some("[REDACTED]"));
        assert_eq!(shown.get_str("db.host"), Some("db"));
        assert!(shown.redactions.contains(&"db.password".to_string()));

        assert_eq!(config.get_str("db.password"), Some("hunter2"));
        assert!(config.redactions.is_empty());
    }
}
