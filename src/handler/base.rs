//! Shared dispatch contract
//!
//! Every trigger (RPC, queue, schedule) builds its parameter schema from a
//! field-to-DSL map, validates input against it, and hands the cleaned
//! value to a runner.

use std::fmt;

use async_trait::async_trait;
use relay_protocol::RpcError;
use relay_schema::{ObjectSchema, SchemaError};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Field name to validation DSL, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field, or replace its DSL in place.
    pub fn insert(&mut self, field: impl Into<String>, dsl: impl Into<String>) {
        let field = field.into();
        let dsl = dsl.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, existing)) => *existing = dsl,
            None => self.fields.push((field, dsl)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, dsl)| dsl.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, dsl)| (name.as_str(), dsl.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Self::new();
        for (field, dsl) in iter {
            fields.insert(field, dsl);
        }
        fields
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldMapVisitor;

        impl<'de> Visitor<'de> for FieldMapVisitor {
            type Value = FieldMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of field names to validation strings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMap, A::Error> {
                let mut fields = FieldMap::new();
                while let Some((field, dsl)) = access.next_entry::<String, String>()? {
                    fields.insert(field, dsl);
                }
                Ok(fields)
            }
        }

        deserializer.deserialize_map(FieldMapVisitor)
    }
}

/// Compile a field map. No map means an empty, key-stripping schema.
pub fn build_schema(fields: Option<&FieldMap>) -> Result<ObjectSchema, SchemaError> {
    match fields {
        Some(fields) => ObjectSchema::compile(fields.iter()),
        None => Ok(ObjectSchema::empty()),
    }
}

/// Validate a candidate, returning the stripped and coerced value.
///
/// Failures become a 400-class `ParamValidation` error with one message
/// per failing rule.
pub fn validate(schema: &ObjectSchema, candidate: Option<&Value>) -> Result<Value, RpcError> {
    schema
        .validate(candidate)
        .map_err(|e| RpcError::param_validation(e.details))
}

/// A trigger-specific entry point.
#[async_trait]
pub trait Handler: Send + Sync {
    type Output: Send;

    async fn exec(&self, event: Value) -> Result<Self::Output, RpcError>;
}
