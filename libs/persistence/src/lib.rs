//! # procflow-persistence
//!
//! State-machine-aware persistence for flow node instances and their
//! process token history.
//!
//! ## Design Principles
//!
//! - Every state transition writes the new state and appends exactly one
//!   token in the same transaction; a failure rolls both back
//! - Tokens are append-only; an instance's history is its tokens in
//!   ascending creation order
//! - `Finished`, `Error`, and `Terminated` are terminal states; transitions
//!   out of them are rejected
//! - Queries return plain data records hydrated with full token history,
//!   never raw rows
//! - Opaque documents and failure text are decoded at the storage boundary
//!   and never fail a read
//!
//! ## Usage
//!
//! ```no_run
//! use procflow_persistence::{FlowNodeInstanceStore, StoreConfig};
//! use procflow_types::{FlowNodeDefinition, ProcessContext};
//!
//! # async fn run() -> Result<(), procflow_persistence::StoreError> {
//! let store = FlowNodeInstanceStore::new(StoreConfig::from_env());
//! store.initialize().await?;
//!
//! let definition = FlowNodeDefinition::new("Task_1", "bpmn:UserTask");
//! let context = ProcessContext {
//!     correlation_id: "corr-1".into(),
//!     process_model_id: "model-1".into(),
//!     process_instance_id: "pi-1".into(),
//!     parent_process_instance_id: None,
//!     owner_identity: serde_json::json!({"user": "alice"}),
//! };
//! let instance = store
//!     .persist_on_enter(&definition, "fni-1", &context, &serde_json::json!({"x": 1}), None)
//!     .await?;
//! let finished = store
//!     .persist_on_exit("Task_1", &instance.instance_id, &serde_json::json!({"x": 2}))
//!     .await?;
//! assert_eq!(finished.tokens.len(), 2);
//! # Ok(())
//! # }
//! ```

mod config;
mod db;
mod error;
mod query;
mod rows;
mod store;
mod token_ledger;

pub use config::StoreConfig;
pub use db::ConnectionProvider;
pub use error::{StoreError, StoreResult};
pub use store::FlowNodeInstanceStore;
