//! Ref → selector-descriptor cache with epoch invalidation.
//!
//! Each (session, window) pair owns one map. Every snapshot rebuild bumps
//! the epoch; refs handed out under an older epoch are stale and must be
//! refreshed with a new snapshot before they can drive actions.

use std::collections::HashMap;

use gantry_types::{RefId, RoleAndName, SelectorDescriptor, SelectorKind, SnapshotNode};

#[derive(Debug, Clone, Default)]
pub struct RefMap {
    entries: HashMap<RefId, SelectorDescriptor>,
    current_epoch: i64,
}

impl RefMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached descriptors with those derivable from `nodes` and
    /// return the new epoch. Nodes without usable hints are unresolvable
    /// and get no entry.
    pub fn rebuild_from_snapshot(&mut self, nodes: &[SnapshotNode]) -> i64 {
        self.current_epoch += 1;
        self.entries.clear();
        for node in nodes {
            let Some(hints) = &node.locator_hints else {
                continue;
            };
            if let Some(descriptor) = SelectorDescriptor::from_hints(hints) {
                self.entries.insert(node.ref_id.clone(), descriptor);
            }
        }
        self.current_epoch
    }

    #[must_use]
    pub fn resolve(&self, ref_id: &RefId) -> Option<&SelectorDescriptor> {
        self.entries.get(ref_id)
    }

    #[must_use]
    pub const fn current_epoch(&self) -> i64 {
        self.current_epoch
    }

    /// A snapshot taken at `epoch` is stale iff a newer rebuild happened.
    #[must_use]
    pub const fn is_stale(&self, epoch: i64) -> bool {
        epoch < self.current_epoch
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Render a descriptor as the locator string the driver consumes.
#[must_use]
pub fn to_locator(descriptor: &SelectorDescriptor) -> String {
    match descriptor.kind {
        SelectorKind::TestId => format!("[data-testid=\"{}\"]", descriptor.value),
        SelectorKind::Role => {
            // The value is the canonical {role, name} JSON.
            match serde_json::from_str::<RoleAndName>(&descriptor.value) {
                Ok(pair) => format!("role={}[name=\"{}\"]", pair.role, pair.name),
                Err(_) => format!("role={}", descriptor.value),
            }
        }
        SelectorKind::Label | SelectorKind::Text => format!("text=\"{}\"", descriptor.value),
        SelectorKind::Css => descriptor.value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use gantry_types::{LocatorHints, RefId, RoleAndName, SelectorDescriptor, SelectorKind, SnapshotNode};

    use super::{RefMap, to_locator};

    fn node(ref_id: &str, hints: LocatorHints) -> SnapshotNode {
        SnapshotNode {
            ref_id: RefId::new(ref_id),
            role: "button".into(),
            name: "Save".into(),
            value: None,
            disabled: None,
            checked: None,
            locator_hints: Some(hints),
        }
    }

    fn role_hints() -> LocatorHints {
        LocatorHints {
            role_and_name: Some(RoleAndName {
                role: "button".into(),
                name: "Save".into(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn epoch_strictly_increases_and_governs_staleness() {
        let mut map = RefMap::new();
        let nodes = vec![node("e1", role_hints())];

        let first = map.rebuild_from_snapshot(&nodes);
        assert_eq!(first, 1);
        let second = map.rebuild_from_snapshot(&nodes);
        assert_eq!(second, 2);

        assert!(map.is_stale(1));
        assert!(!map.is_stale(2));
    }

    #[test]
    fn rebuild_replaces_entries() {
        let mut map = RefMap::new();
        map.rebuild_from_snapshot(&[node("e1", role_hints())]);
        assert!(map.resolve(&RefId::new("e1")).is_some());

        map.rebuild_from_snapshot(&[node("e2", role_hints())]);
        assert!(map.resolve(&RefId::new("e1")).is_none());
        assert!(map.resolve(&RefId::new("e2")).is_some());
    }

    #[test]
    fn hintless_nodes_are_unresolvable() {
        let mut map = RefMap::new();
        map.rebuild_from_snapshot(&[node("e1", LocatorHints::default())]);
        assert!(map.is_empty());
    }

    #[test]
    fn locator_rendering_per_kind() {
        let test_id = SelectorDescriptor::new(SelectorKind::TestId, "save-btn");
        assert_eq!(to_locator(&test_id), "[data-testid=\"save-btn\"]");

        let role = SelectorDescriptor::new(
            SelectorKind::Role,
            RoleAndName {
                role: "button".into(),
                name: "Save".into(),
            }
            .canonical_json(),
        );
        assert_eq!(to_locator(&role), "role=button[name=\"Save\"]");

        let text = SelectorDescriptor::new(SelectorKind::Text, "Save");
        assert_eq!(to_locator(&text), "text=\"Save\"");

        let css = SelectorDescriptor::new(SelectorKind::Css, "#save");
        assert_eq!(to_locator(&css), "#save");
    }
}
