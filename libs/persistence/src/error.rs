//! Error types for the persistence layer.

use procflow_types::FlowNodeInstanceState;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by the flow node instance store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open the database.
    #[error("database connection failed: {0}")]
    Connect(#[source] sqlx::Error),

    /// A query failed.
    #[error("database query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// Schema setup failed.
    #[error("schema setup failed: {0}")]
    Schema(#[source] sqlx::Error),

    /// The store was used before `initialize` or after `dispose`.
    #[error("store is not initialized")]
    NotInitialized,

    /// No row matched the given identifiers.
    #[error("{0} not found")]
    NotFound(String),

    /// An instance with this id already exists.
    #[error("flow node instance already exists: {instance_id}")]
    Conflict { instance_id: String },

    /// The instance is in a terminal state and accepts no further
    /// transitions.
    #[error("illegal transition for instance {instance_id}: {from} -> {to}")]
    IllegalTransition {
        instance_id: String,
        from: FlowNodeInstanceState,
        to: FlowNodeInstanceState,
    },

    /// A stored value could not be interpreted.
    #[error("invalid stored value: {0}")]
    Invalid(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
