//! Relay Protocol Types
//!
//! Defines the JSON RPC envelope exchanged with the dispatcher: request
//! envelopes (single or batched), response envelopes, and the error
//! taxonomy every per-envelope failure is normalized into.

pub mod envelope;
pub mod error;
pub mod response;

pub use envelope::{Envelope, EnvelopeBatch, Params};
pub use error::{ErrorKind, ErrorPayload, RpcError};
pub use response::{Outcome, ResponseEnvelope};

/// The only protocol version this implementation accepts and emits.
pub const PROTOCOL_VERSION: &str = "2.0";
