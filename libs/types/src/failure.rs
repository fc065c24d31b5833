//! Failure information for instances that ended in error.
//!
//! The engine reports failures in two shapes: structured errors with a kind,
//! a message, and optional metadata, or plain text from foreign exceptions.
//! Both shapes survive a storage round trip; decoding degrades stage by
//! stage instead of failing a read.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Failure attached to a flow node instance in the error state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceFailure {
    /// One of the engine's own structured error kinds.
    Structured {
        kind: String,
        message: String,
        metadata: Value,
    },
    /// Plain failure text from a non-structured source.
    Plain { text: String },
}

/// Storage shape of a structured failure.
#[derive(Serialize, Deserialize)]
struct StructuredRepr {
    kind: String,
    message: String,
    #[serde(default)]
    metadata: Value,
}

impl InstanceFailure {
    pub fn structured(
        kind: impl Into<String>,
        message: impl Into<String>,
        metadata: Value,
    ) -> Self {
        InstanceFailure::Structured {
            kind: kind.into(),
            message: message.into(),
            metadata,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        InstanceFailure::Plain { text: text.into() }
    }

    /// Build a failure from any error value, capturing its display text and
    /// source chain.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(Value::String(cause.to_string()));
            source = cause.source();
        }
        let metadata = if chain.is_empty() {
            Value::Null
        } else {
            serde_json::json!({ "cause_chain": chain })
        };
        InstanceFailure::Structured {
            kind: "error".to_string(),
            message: err.to_string(),
            metadata,
        }
    }

    /// Serialize for storage: structured failures as one JSON document,
    /// plain failures verbatim.
    pub fn encode(&self) -> String {
        match self {
            InstanceFailure::Structured {
                kind,
                message,
                metadata,
            } => serde_json::json!({
                "kind": kind,
                "message": message,
                "metadata": metadata,
            })
            .to_string(),
            InstanceFailure::Plain { text } => text.clone(),
        }
    }

    /// Decode stored failure text. Never fails.
    ///
    /// Stages: the native structured shape first; then any JSON document a
    /// message can be extracted from; finally the raw text unchanged.
    pub fn decode(text: &str) -> Self {
        if let Ok(repr) = serde_json::from_str::<StructuredRepr>(text) {
            return InstanceFailure::Structured {
                kind: repr.kind,
                message: repr.message,
                metadata: repr.metadata,
            };
        }
        if let Ok(Value::Object(doc)) = serde_json::from_str::<Value>(text) {
            if let Some(message) = doc.get("message").and_then(Value::as_str) {
                let kind = doc
                    .get("kind")
                    .or_else(|| doc.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("error")
                    .to_string();
                return InstanceFailure::Structured {
                    kind,
                    message: message.to_string(),
                    metadata: Value::Object(doc),
                };
            }
        }
        InstanceFailure::Plain {
            text: text.to_string(),
        }
    }
}

impl From<String> for InstanceFailure {
    fn from(text: String) -> Self {
        InstanceFailure::Plain { text }
    }
}

impl From<&str> for InstanceFailure {
    fn from(text: &str) -> Self {
        InstanceFailure::Plain {
            text: text.to_string(),
        }
    }
}

impl std::fmt::Display for InstanceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceFailure::Structured { kind, message, .. } => {
                write!(f, "{kind}: {message}")
            }
            InstanceFailure::Plain { text } => write!(f, "{text}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_round_trip() {
        let failure = InstanceFailure::structured(
            "service_task_failed",
            "external call returned 502",
            serde_json::json!({"attempt": 3}),
        );
        let decoded = InstanceFailure::decode(&failure.encode());
        assert_eq!(decoded, failure);
    }

    #[test]
    fn test_plain_round_trip() {
        let failure = InstanceFailure::plain("something broke");
        assert_eq!(failure.encode(), "something broke");
        assert_eq!(InstanceFailure::decode("something broke"), failure);
    }

    #[test]
    fn test_decode_foreign_document_with_message() {
        let decoded = InstanceFailure::decode(r#"{"name":"TypeError","message":"boom"}"#);
        match decoded {
            InstanceFailure::Structured {
                kind,
                message,
                metadata,
            } => {
                assert_eq!(kind, "TypeError");
                assert_eq!(message, "boom");
                assert_eq!(metadata["name"], "TypeError");
            }
            other => panic!("expected structured failure, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_json_without_message_stays_plain() {
        let decoded = InstanceFailure::decode(r#"{"a":1}"#);
        assert_eq!(decoded, InstanceFailure::plain(r#"{"a":1}"#));
    }

    #[test]
    fn test_decode_missing_metadata_defaults_to_null() {
        let decoded = InstanceFailure::decode(r#"{"kind":"timeout","message":"gave up"}"#);
        assert_eq!(
            decoded,
            InstanceFailure::structured("timeout", "gave up", Value::Null)
        );
    }

    #[test]
    fn test_from_error_captures_chain() {
        let source = std::io::Error::other("disk gone");
        let failure = InstanceFailure::from_error(&source);
        match failure {
            InstanceFailure::Structured { kind, message, .. } => {
                assert_eq!(kind, "error");
                assert_eq!(message, "disk gone");
            }
            other => panic!("expected structured failure, got {other:?}"),
        }
    }

    #[test]
    fn test_display() {
        let failure = InstanceFailure::structured("timeout", "gave up", Value::Null);
        assert_eq!(failure.to_string(), "timeout: gave up");
        assert_eq!(InstanceFailure::plain("boom").to_string(), "boom");
    }
}
