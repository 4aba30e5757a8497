//! Trigger handlers
//!
//! One adapter per event source. All of them share the schema and
//! validation helpers in [`base`]; [`rpc`] is the envelope dispatcher.

pub mod base;
pub mod http;
pub mod queue;
pub mod rpc;
pub mod schedule;

pub use base::{build_schema, validate, FieldMap, Handler};
pub use http::{Body, GatewayResponse, Responder};
pub use queue::{QueueHandler, QueueRunner};
pub use rpc::{parse_body, RpcHandler};
pub use schedule::{ScheduleHandler, ScheduleRunner};
