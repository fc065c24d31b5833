//! Flow node instance records and lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{InstanceFailure, ProcessToken};

/// Lifecycle state of a flow node instance.
///
/// `Running` is the initial state. `Finished`, `Error`, and `Terminated` are
/// terminal: once reached, no further transition is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowNodeInstanceState {
    Running,
    Suspended,
    Finished,
    Error,
    Terminated,
}

impl FlowNodeInstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowNodeInstanceState::Running => "running",
            FlowNodeInstanceState::Suspended => "suspended",
            FlowNodeInstanceState::Finished => "finished",
            FlowNodeInstanceState::Error => "error",
            FlowNodeInstanceState::Terminated => "terminated",
        }
    }

    pub fn from_str(s: &str) -> Option<FlowNodeInstanceState> {
        match s {
            "running" => Some(FlowNodeInstanceState::Running),
            "suspended" => Some(FlowNodeInstanceState::Suspended),
            "finished" => Some(FlowNodeInstanceState::Finished),
            "error" => Some(FlowNodeInstanceState::Error),
            "terminated" => Some(FlowNodeInstanceState::Terminated),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowNodeInstanceState::Finished
                | FlowNodeInstanceState::Error
                | FlowNodeInstanceState::Terminated
        )
    }

    /// Active states are those the engine may still move forward.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            FlowNodeInstanceState::Running | FlowNodeInstanceState::Suspended
        )
    }
}

impl std::fmt::Display for FlowNodeInstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reference to the flow node definition an instance executes.
///
/// `flow_node_type` and `event_type` carry the model layer's vocabulary
/// (e.g. BPMN element names) and are opaque here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowNodeDefinition {
    pub id: String,
    pub flow_node_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
}

impl FlowNodeDefinition {
    pub fn new(id: impl Into<String>, flow_node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            flow_node_type: flow_node_type.into(),
            event_type: None,
        }
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }
}

/// Process-level context captured when an instance is created.
///
/// `owner_identity` is an opaque structured document supplied by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessContext {
    pub correlation_id: String,
    pub process_model_id: String,
    pub process_instance_id: String,
    /// Process instance that called this one, if any ("caller").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_process_instance_id: Option<String>,
    pub owner_identity: Value,
}

/// One execution of a flow node definition within a running process
/// instance, together with its full ordered token history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNodeInstance {
    pub instance_id: String,
    pub flow_node_id: String,
    pub flow_node_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    pub correlation_id: String,
    pub process_model_id: String,
    pub process_instance_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_process_instance_id: Option<String>,
    pub owner_identity: Value,
    pub state: FlowNodeInstanceState,
    /// Present only when `state` is [`FlowNodeInstanceState::Error`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InstanceFailure>,
    /// Instance executed immediately before this one in the same process
    /// instance. Absent for process-start nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_instance_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Token history in ascending creation order.
    pub tokens: Vec<ProcessToken>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&FlowNodeInstanceState::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(
            serde_json::to_string(&FlowNodeInstanceState::Terminated).unwrap(),
            "\"terminated\""
        );
    }

    #[test]
    fn test_state_str_round_trip() {
        let states = vec![
            FlowNodeInstanceState::Running,
            FlowNodeInstanceState::Suspended,
            FlowNodeInstanceState::Finished,
            FlowNodeInstanceState::Error,
            FlowNodeInstanceState::Terminated,
        ];
        for state in states {
            assert_eq!(FlowNodeInstanceState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(FlowNodeInstanceState::from_str("paused"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!FlowNodeInstanceState::Running.is_terminal());
        assert!(!FlowNodeInstanceState::Suspended.is_terminal());
        assert!(FlowNodeInstanceState::Finished.is_terminal());
        assert!(FlowNodeInstanceState::Error.is_terminal());
        assert!(FlowNodeInstanceState::Terminated.is_terminal());

        assert!(FlowNodeInstanceState::Running.is_active());
        assert!(FlowNodeInstanceState::Suspended.is_active());
        assert!(!FlowNodeInstanceState::Finished.is_active());
    }

    #[test]
    fn test_definition_builder() {
        let definition = FlowNodeDefinition::new("Task_1", "bpmn:UserTask");
        assert_eq!(definition.id, "Task_1");
        assert!(definition.event_type.is_none());

        let definition = FlowNodeDefinition::new("Catch_1", "bpmn:IntermediateCatchEvent")
            .with_event_type("message");
        assert_eq!(definition.event_type.as_deref(), Some("message"));
    }
}
