//! Wire-level result and error envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;

/// Optional meta block attached to a successful tool result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolMeta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Value>,
}

impl ToolMeta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty() && self.suggestions.is_empty() && self.diagnostics.is_none()
    }

    #[must_use]
    pub fn with_diagnostic(mut self, key: &str, value: Value) -> Self {
        match &mut self.diagnostics {
            Some(Value::Object(map)) => {
                map.insert(key.to_string(), value);
            }
            _ => {
                let mut map = serde_json::Map::new();
                map.insert(key.to_string(), value);
                self.diagnostics = Some(Value::Object(map));
            }
        }
        self
    }
}

/// Successful tool result: output data plus optional diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ToolMeta>,
}

impl ToolOutcome {
    #[must_use]
    pub fn new(data: Value) -> Self {
        Self { data, meta: None }
    }

    #[must_use]
    pub fn with_meta(data: Value, meta: ToolMeta) -> Self {
        let meta = if meta.is_empty() { None } else { Some(meta) };
        Self { data, meta }
    }
}

/// Error envelope surfaced to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: ErrorCode,
    pub message: String,
    pub retriable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ToolMeta, ToolOutcome};

    #[test]
    fn empty_meta_is_dropped_from_outcome() {
        let outcome = ToolOutcome::with_meta(json!({"ok": true}), ToolMeta::default());
        assert!(outcome.meta.is_none());
    }

    #[test]
    fn with_diagnostic_merges_into_existing_object() {
        let meta = ToolMeta::default()
            .with_diagnostic("window_selection", json!("default_window"))
            .with_diagnostic("epoch", json!(3));
        let diagnostics = meta.diagnostics.unwrap();
        assert_eq!(diagnostics["window_selection"], "default_window");
        assert_eq!(diagnostics["epoch"], 3);
    }
}
