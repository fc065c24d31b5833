//! Raw table rows and their conversion into domain records.
//!
//! Conversion is done by value through associated functions. Opaque
//! documents and failure text are decoded here, at the storage boundary,
//! and never fail a read.

use chrono::{DateTime, Utc};
use procflow_types::{
    document, FlowNodeInstance, FlowNodeInstanceState, InstanceFailure, ProcessToken,
    ProcessTokenType,
};
use sqlx::{sqlite::SqliteRow, Row};

use crate::error::StoreError;

/// A row from the flow_node_instances table.
#[derive(Debug, Clone)]
pub(crate) struct InstanceRow {
    pub instance_id: String,
    pub flow_node_id: String,
    pub flow_node_type: String,
    pub event_type: Option<String>,
    pub correlation_id: String,
    pub process_model_id: String,
    pub process_instance_id: String,
    pub parent_process_instance_id: Option<String>,
    pub owner_identity: String,
    pub state: String,
    pub error: Option<String>,
    pub previous_instance_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for InstanceRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            instance_id: row.try_get("instance_id")?,
            flow_node_id: row.try_get("flow_node_id")?,
            flow_node_type: row.try_get("flow_node_type")?,
            event_type: row.try_get("event_type")?,
            correlation_id: row.try_get("correlation_id")?,
            process_model_id: row.try_get("process_model_id")?,
            process_instance_id: row.try_get("process_instance_id")?,
            parent_process_instance_id: row.try_get("parent_process_instance_id")?,
            owner_identity: row.try_get("owner_identity")?,
            state: row.try_get("state")?,
            error: row.try_get("error")?,
            previous_instance_id: row.try_get("previous_instance_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl InstanceRow {
    /// Convert the row and its token history into a domain record.
    pub(crate) fn into_record(
        self,
        tokens: Vec<ProcessToken>,
    ) -> Result<FlowNodeInstance, StoreError> {
        let state = FlowNodeInstanceState::from_str(&self.state)
            .ok_or_else(|| StoreError::Invalid(format!("unknown instance state: {}", self.state)))?;

        Ok(FlowNodeInstance {
            instance_id: self.instance_id,
            flow_node_id: self.flow_node_id,
            flow_node_type: self.flow_node_type,
            event_type: self.event_type,
            correlation_id: self.correlation_id,
            process_model_id: self.process_model_id,
            process_instance_id: self.process_instance_id,
            parent_process_instance_id: self.parent_process_instance_id,
            owner_identity: document::decode(&self.owner_identity),
            state,
            error: self.error.as_deref().map(InstanceFailure::decode),
            previous_instance_id: self.previous_instance_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            tokens,
        })
    }
}

/// A row from the process_tokens table.
#[derive(Debug, Clone)]
pub(crate) struct TokenRow {
    pub instance_id: String,
    pub token_type: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for TokenRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            instance_id: row.try_get("instance_id")?,
            token_type: row.try_get("token_type")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TokenRow {
    /// Convert the row into a domain record.
    pub(crate) fn into_record(self) -> Result<ProcessToken, StoreError> {
        let token_type = ProcessTokenType::from_str(&self.token_type)
            .ok_or_else(|| StoreError::Invalid(format!("unknown token type: {}", self.token_type)))?;

        Ok(ProcessToken {
            instance_id: self.instance_id,
            token_type,
            payload: document::decode(&self.payload),
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn sample_row() -> InstanceRow {
        InstanceRow {
            instance_id: "fni-1".to_string(),
            flow_node_id: "Task_1".to_string(),
            flow_node_type: "bpmn:UserTask".to_string(),
            event_type: None,
            correlation_id: "corr-1".to_string(),
            process_model_id: "model-1".to_string(),
            process_instance_id: "pi-1".to_string(),
            parent_process_instance_id: None,
            owner_identity: r#"{"user":"alice"}"#.to_string(),
            state: "running".to_string(),
            error: None,
            previous_instance_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_into_record_decodes_identity() {
        let record = sample_row().into_record(Vec::new()).unwrap();
        assert_eq!(record.state, FlowNodeInstanceState::Running);
        assert_eq!(record.owner_identity["user"], "alice");
        assert!(record.error.is_none());
    }

    #[test]
    fn test_into_record_rejects_unknown_state() {
        let mut row = sample_row();
        row.state = "paused".to_string();
        let err = row.into_record(Vec::new()).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn test_into_record_decodes_error_text() {
        let mut row = sample_row();
        row.state = "error".to_string();
        row.error = Some("engine exploded".to_string());
        let record = row.into_record(Vec::new()).unwrap();
        assert_eq!(
            record.error,
            Some(InstanceFailure::plain("engine exploded"))
        );
    }

    #[test]
    fn test_token_row_degrades_unparseable_payload() {
        let row = TokenRow {
            instance_id: "fni-1".to_string(),
            token_type: "on_enter".to_string(),
            payload: "not json".to_string(),
            created_at: Utc::now(),
        };
        let token = row.into_record().unwrap();
        assert_eq!(token.token_type, ProcessTokenType::OnEnter);
        assert_eq!(token.payload, Value::String("not json".to_string()));
    }
}
