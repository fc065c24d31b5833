//! Storage codec for opaque structured documents.
//!
//! Token payloads and owner identities are arbitrary JSON-shaped data. They
//! are encoded to text exactly once, at the storage boundary, and decoded
//! back on read. Decoding never fails: stored text that does not parse as a
//! document comes back as a raw string value.

use serde_json::Value;

/// Encode a document for storage.
pub fn encode(value: &Value) -> String {
    value.to_string()
}

/// Decode stored text into a document, degrading to a raw string value for
/// text that does not parse.
pub fn decode(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Decode an optional stored column; an absent column is the null document.
pub fn decode_or_null(text: Option<&str>) -> Value {
    match text {
        Some(text) => decode(text),
        None => Value::Null,
    }
}
