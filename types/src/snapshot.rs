//! Snapshot nodes and selector descriptors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::RefId;

/// Hints the driver attaches to a snapshot node for locator derivation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocatorHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_and_name: Option<RoleAndName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
}

/// A `{role, name}` pair. Serialization order is fixed so the canonical
/// JSON form used as a role descriptor value is stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAndName {
    pub role: String,
    pub name: String,
}

impl RoleAndName {
    /// Canonical JSON form, e.g. `{"role":"button","name":"Save"}`.
    #[must_use]
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One element in an accessibility snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotNode {
    #[serde(rename = "ref")]
    pub ref_id: RefId,
    pub role: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator_hints: Option<LocatorHints>,
}

/// Kinds of resolved selector, ordered by trustworthiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    TestId,
    Role,
    Label,
    Text,
    Css,
}

impl SelectorKind {
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::TestId => 100,
            Self::Role => 90,
            Self::Label => 80,
            Self::Text => 70,
            Self::Css => 10,
        }
    }
}

/// Resolved locator used to drive the automation, chosen by priority from
/// snapshot hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorDescriptor {
    #[serde(rename = "type")]
    pub kind: SelectorKind,
    pub value: String,
    pub priority: u8,
}

impl SelectorDescriptor {
    #[must_use]
    pub fn new(kind: SelectorKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            priority: kind.priority(),
        }
    }

    /// Highest-priority descriptor derivable from a node's hints, or `None`
    /// when the node is unresolvable.
    #[must_use]
    pub fn from_hints(hints: &LocatorHints) -> Option<Self> {
        if let Some(test_id) = &hints.test_id {
            return Some(Self::new(SelectorKind::TestId, test_id.clone()));
        }
        if let Some(role_and_name) = &hints.role_and_name {
            return Some(Self::new(SelectorKind::Role, role_and_name.canonical_json()));
        }
        if let Some(label) = &hints.label {
            return Some(Self::new(SelectorKind::Label, label.clone()));
        }
        if let Some(text) = &hints.text_content {
            return Some(Self::new(SelectorKind::Text, text.clone()));
        }
        None
    }
}

/// Viewport rectangle of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Raw snapshot returned by the driver, before ref-map processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub version: i64,
    pub created_at_ms: i64,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<ViewportRect>,
    pub nodes: Vec<SnapshotNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::{LocatorHints, RoleAndName, SelectorDescriptor, SelectorKind};

    fn full_hints() -> LocatorHints {
        LocatorHints {
            test_id: Some("save-btn".into()),
            role_and_name: Some(RoleAndName {
                role: "button".into(),
                name: "Save".into(),
            }),
            label: Some("Save".into()),
            text_content: Some("Save".into()),
        }
    }

    #[test]
    fn test_id_wins_over_everything() {
        let d = SelectorDescriptor::from_hints(&full_hints()).unwrap();
        assert_eq!(d.kind, SelectorKind::TestId);
        assert_eq!(d.value, "save-btn");
        assert_eq!(d.priority, 100);
    }

    #[test]
    fn role_and_name_is_canonical_json() {
        let mut hints = full_hints();
        hints.test_id = None;
        let d = SelectorDescriptor::from_hints(&hints).unwrap();
        assert_eq!(d.kind, SelectorKind::Role);
        assert_eq!(d.value, r#"{"role":"button","name":"Save"}"#);
        assert_eq!(d.priority, 90);
    }

    #[test]
    fn label_then_text_then_unresolvable() {
        let mut hints = full_hints();
        hints.test_id = None;
        hints.role_and_name = None;
        assert_eq!(
            SelectorDescriptor::from_hints(&hints).unwrap().kind,
            SelectorKind::Label
        );
        hints.label = None;
        assert_eq!(
            SelectorDescriptor::from_hints(&hints).unwrap().kind,
            SelectorKind::Text
        );
        hints.text_content = None;
        assert!(SelectorDescriptor::from_hints(&hints).is_none());
    }
}
