//! Error serialization for the envelope `e` field.
//!
//! Native error values cannot cross the wire, so they are flattened into a
//! plain mapping. The `source()` chain is folded into a single `stack` string
//! with one `Caused by:` section per level.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::JmsgError;

/// Name given to every serialized error.
pub const ERROR_NAME: &str = "Error";

/// Transmissible form of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedError {
    pub message: String,
    pub name: String,
    pub stack: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
}

impl SerializedError {
    /// Convert to a JSON value for the envelope.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::String(self.message.clone()))
    }
}

/// Serialize `err`, walking its cause chain.
pub fn serialize_error(err: &(dyn std::error::Error + 'static)) -> SerializedError {
    SerializedError {
        message: err.to_string(),
        name: ERROR_NAME.to_string(),
        stack: full_stack(err),
        code: error_code(err),
        signal: None,
    }
}

fn full_stack(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = format!("{ERROR_NAME}: {err}");
    let mut cause = err.source();
    while let Some(c) = cause {
        out.push_str("\nCaused by: ");
        out.push_str(&format!("{ERROR_NAME}: {c}"));
        cause = c.source();
    }
    out
}

fn error_code(err: &(dyn std::error::Error + 'static)) -> Option<String> {
    if let Some(e) = err.downcast_ref::<JmsgError>() {
        return Some(e.code().as_str().to_string());
    }
    if let Some(e) = err.downcast_ref::<std::io::Error>() {
        return Some(format!("{:?}", e.kind()));
    }
    None
}
