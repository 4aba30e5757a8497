//! Relay - RPC envelope runtime
//!
//! Accepts JSON RPC envelopes (one or a batch) from a gateway event,
//! validates them, resolves each method from a lazily populated registry,
//! validates params against a compact schema DSL and runs the method with
//! a shared dependency context. Every envelope is answered independently.

pub mod app;
pub mod builtin;
pub mod config;
pub mod context;
pub mod handler;
pub mod logging;
pub mod registry;

pub use relay_protocol as protocol;
pub use relay_schema as schema;

pub use config::{ConfigLoader, EffectiveConfig};
pub use context::{Context, Logger, Provider, Resolved};
pub use handler::{GatewayResponse, Handler, QueueHandler, Responder, RpcHandler, ScheduleHandler};
pub use protocol::{Envelope, EnvelopeBatch, Outcome, ResponseEnvelope, RpcError};
pub use registry::{CallContext, MethodCache, MethodDescriptor, MethodOptions, MethodSource, MethodTable, Runner};
