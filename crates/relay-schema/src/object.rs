//! Object schemas built from a field-to-DSL map.

use serde_json::{Map, Value};

use crate::error::{SchemaError, ValidationError};
use crate::schema::Schema;

/// A set of named field schemas validated together against one object.
///
/// Fields keep their declaration order. Keys not named by a field are
/// stripped from the validated output.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: Vec<(String, Schema)>,
}

impl ObjectSchema {
    /// An object schema with no fields; every key is stripped.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile every `(field, dsl)` pair.
    pub fn compile<I, K, V>(fields: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut schema = Self::empty();
        for (field, dsl) in fields {
            let field = field.into();
            let compiled = Schema::compile(dsl.as_ref()).map_err(|e| SchemaError::Field {
                field: field.clone(),
                source: Box::new(e),
            })?;
            schema.insert(field, compiled);
        }
        Ok(schema)
    }

    /// Add a field, or replace it in place if already declared.
    pub fn insert(&mut self, field: impl Into<String>, schema: Schema) {
        let field = field.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, existing)) => *existing = schema,
            None => self.fields.push((field, schema)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Schema> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, schema)| schema)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate a candidate object and return the cleaned copy.
    ///
    /// An absent candidate is treated as `{}`. Messages from every failing
    /// field are collected, in declaration order.
    pub fn validate(&self, candidate: Option<&Value>) -> Result<Value, ValidationError> {
        let empty = Map::new();
        let input = match candidate {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(ValidationError::new(vec![
                    "\"value\" must be of type object".to_string(),
                ]))
            }
        };

        let mut output = Map::new();
        let mut details = Vec::new();

        for (field, schema) in &self.fields {
            match schema.validate(field, input.get(field)) {
                Ok(Some(value)) => {
                    output.insert(field.clone(), value);
                }
                Ok(None) => {}
                Err(messages) => details.extend(messages),
            }
        }

        if details.is_empty() {
            Ok(Value::Object(output))
        } else {
            Err(ValidationError::new(details))
        }
    }
}
