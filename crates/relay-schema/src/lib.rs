//! Validation DSL for method parameters.
//!
//! A field rule is written as a dotted call chain, `string.email.required`,
//! compiled once into a [`Schema`] and then applied to any number of
//! candidate values. An [`ObjectSchema`] groups field rules for a whole
//! parameter object.

mod date;
mod error;
mod object;
mod parser;
mod schema;

pub use date::{DateFormat, TimestampUnit};
pub use error::{SchemaError, ValidationError};
pub use object::ObjectSchema;
pub use parser::{parse, Literal, Segment};
pub use schema::{Kind, Presence, Schema};

/// Compile a single DSL expression.
pub fn compile(input: &str) -> Result<Schema, SchemaError> {
    Schema::compile(input)
}
