//! Schema compile and validation errors.

/// A DSL string could not be compiled.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("cannot parse '{input}' at offset {position}: {message}")]
    Parse {
        input: String,
        position: usize,
        message: String,
    },

    #[error("unknown schema type '{kind}' in '{input}'")]
    UnknownKind { input: String, kind: String },

    #[error("'{method}' is not a {kind} rule (in '{input}')")]
    UnknownMethod {
        input: String,
        kind: String,
        method: String,
    },

    #[error("invalid arguments to '{method}' in '{input}': {message}")]
    InvalidArguments {
        input: String,
        method: String,
        message: String,
    },

    #[error("field '{field}': {source}")]
    Field {
        field: String,
        #[source]
        source: Box<SchemaError>,
    },
}

/// A candidate failed validation; one message per failing rule.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", .details.join("; "))]
pub struct ValidationError {
    pub details: Vec<String>,
}

impl ValidationError {
    pub fn new(details: Vec<String>) -> Self {
        Self { details }
    }
}
