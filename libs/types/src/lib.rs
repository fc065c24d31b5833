//! # procflow-types
//!
//! Data records shared by the procflow persistence layer and its callers.
//!
//! ## Design Principles
//!
//! - Records are plain data: no storage handles, no engine callbacks
//! - Opaque documents (`payload`, `owner_identity`) stay structured in
//!   memory; text encoding happens only at the storage boundary
//! - Token history is append-only; each lifecycle transition of an instance
//!   contributes exactly one token
//! - Failure information survives storage round trips without ever failing
//!   a read
//!
//! ## Records
//!
//! - [`FlowNodeInstance`] - one execution of an activity, event, or gateway
//!   within a running process instance, with its full token history
//! - [`ProcessToken`] - an immutable snapshot of the instance's data context
//!   captured at one lifecycle event
//! - [`InstanceFailure`] - structured or plain failure attached to an
//!   instance that ended in error

pub mod document;
mod failure;
mod instance;
mod token;

pub use failure::InstanceFailure;
pub use instance::{FlowNodeDefinition, FlowNodeInstance, FlowNodeInstanceState, ProcessContext};
pub use token::{ProcessToken, ProcessTokenType};
