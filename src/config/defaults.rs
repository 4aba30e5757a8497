//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Service name used for the context logger (default: "relay")
    pub service_name: String,

    /// Log level name or numeric level (default: "info")
    pub log_level: String,

    /// Log output format (default: "compact")
    pub log_format: String,

    /// Prefix marking method files in a scanned directory (default: "_")
    pub methods_prefix: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            service_name: "relay".to_string(),
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
            methods_prefix: "_".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "service_name": self.service_name,
            "log": {
                "level": self.log_level,
                "format": self.log_format
            },
            "methods": {
                "prefix": self.methods_prefix
            }
        })
    }
}
