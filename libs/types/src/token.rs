//! Process token records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle event a token was captured at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessTokenType {
    OnEnter,
    OnExit,
    OnSuspend,
    OnResume,
}

impl ProcessTokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessTokenType::OnEnter => "on_enter",
            ProcessTokenType::OnExit => "on_exit",
            ProcessTokenType::OnSuspend => "on_suspend",
            ProcessTokenType::OnResume => "on_resume",
        }
    }

    pub fn from_str(s: &str) -> Option<ProcessTokenType> {
        match s {
            "on_enter" => Some(ProcessTokenType::OnEnter),
            "on_exit" => Some(ProcessTokenType::OnExit),
            "on_suspend" => Some(ProcessTokenType::OnSuspend),
            "on_resume" => Some(ProcessTokenType::OnResume),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProcessTokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable snapshot of a flow node instance's data context, captured
/// at one lifecycle event.
///
/// Tokens are never edited or individually deleted; an instance's history
/// is the sequence of its tokens in ascending creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessToken {
    /// Owning flow node instance.
    pub instance_id: String,
    #[serde(rename = "type")]
    pub token_type: ProcessTokenType,
    /// Opaque structured document supplied by the engine.
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}
