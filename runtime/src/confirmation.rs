//! Two-phase approval tokens for dangerous tools.
//!
//! A guarded tool invoked without approval synthesizes a pending record and
//! rejects with `CONFIRMATION_REQUIRED`. The `confirm` tool stamps the
//! record; re-invoking the guarded tool with the confirmation id consumes
//! it. Tokens are single-use and expire after their TTL; expired entries
//! are indistinguishable from missing ones.

use std::collections::HashMap;
use std::sync::Mutex;

use gantry_types::{ConfirmationId, PendingConfirmation, ResolvedPolicy, ServerError, now_unix_ms};

#[derive(Debug, Default)]
pub struct ConfirmationStore {
    inner: Mutex<HashMap<ConfirmationId, PendingConfirmation>>,
}

impl ConfirmationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending confirmation, sweeping expired entries first.
    pub fn add(&self, confirmation: PendingConfirmation) {
        let mut inner = self.inner.lock().expect("confirmation store poisoned");
        sweep(&mut inner, now_unix_ms());
        inner.insert(confirmation.id.clone(), confirmation);
    }

    /// Look up a live entry.
    #[must_use]
    pub fn get(&self, id: &ConfirmationId) -> Option<PendingConfirmation> {
        let mut inner = self.inner.lock().expect("confirmation store poisoned");
        sweep(&mut inner, now_unix_ms());
        inner.get(id).cloned()
    }

    /// Stamp `confirmed_at` on a live entry and return it.
    pub fn confirm(&self, id: &ConfirmationId) -> Result<PendingConfirmation, ServerError> {
        let now = now_unix_ms();
        let mut inner = self.inner.lock().expect("confirmation store poisoned");
        sweep(&mut inner, now);
        let entry = inner
            .get_mut(id)
            .ok_or_else(|| not_found_or_expired(id))?;
        entry.confirmed_at_ms = Some(now);
        Ok(entry.clone())
    }

    /// Remove and return a live entry. A second consume of the same id
    /// fails the same way as a never-issued one.
    pub fn consume(&self, id: &ConfirmationId) -> Result<PendingConfirmation, ServerError> {
        let mut inner = self.inner.lock().expect("confirmation store poisoned");
        sweep(&mut inner, now_unix_ms());
        inner.remove(id).ok_or_else(|| not_found_or_expired(id))
    }

    /// Drop entries whose expiry has passed.
    pub fn cleanup(&self) {
        let mut inner = self.inner.lock().expect("confirmation store poisoned");
        sweep(&mut inner, now_unix_ms());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("confirmation store poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sweep(entries: &mut HashMap<ConfirmationId, PendingConfirmation>, now_ms: i64) {
    entries.retain(|_, entry| !entry.is_expired(now_ms));
}

fn not_found_or_expired(id: &ConfirmationId) -> ServerError {
    ServerError::invalid_input(format!("Confirmation '{id}' not found or has expired"))
}

/// Whether `tool_name` is confirmation-gated under `policy`. The `confirm`
/// tool itself never is.
#[must_use]
pub fn should_require_confirmation(tool_name: &str, policy: &ResolvedPolicy) -> bool {
    if tool_name == "confirm" {
        return false;
    }
    policy
        .tools
        .require_confirmation
        .iter()
        .any(|t| t == tool_name)
}

#[cfg(test)]
mod tests {
    use gantry_types::{
        ConfirmationId, ErrorCode, PendingConfirmation, ResolvedPolicy, SafetyMode, ToolPolicy,
        now_unix_ms,
    };
    use serde_json::json;

    use super::{ConfirmationStore, should_require_confirmation};

    fn pending(id: &str, ttl_ms: i64) -> PendingConfirmation {
        let now = now_unix_ms();
        PendingConfirmation {
            id: ConfirmationId::new(id),
            tool_name: "app_close".into(),
            description: "Close the session".into(),
            params: json!({"session_id": "s1"}),
            created_at_ms: now,
            expires_at_ms: now + ttl_ms,
            confirmed_at_ms: None,
        }
    }

    fn policy_requiring(tools: &[&str]) -> ResolvedPolicy {
        ResolvedPolicy {
            mode: SafetyMode::Standard,
            allowed_origins: vec![],
            artifact_root: "/tmp".into(),
            max_session_ttl_ms: 1000,
            tools: ToolPolicy {
                disabled: vec![],
                require_confirmation: tools.iter().map(ToString::to_string).collect(),
            },
            redaction_patterns: vec![],
            roots: None,
            allowed_env_vars: None,
            max_snapshot_nodes: None,
            source_path: None,
        }
    }

    #[test]
    fn consume_is_single_use() {
        let store = ConfirmationStore::new();
        store.add(pending("c1", 60_000));

        let first = store.consume(&ConfirmationId::new("c1")).unwrap();
        assert_eq!(first.tool_name, "app_close");

        let second = store.consume(&ConfirmationId::new("c1")).unwrap_err();
        assert_eq!(second.code(), ErrorCode::InvalidInput);
        assert!(second.to_string().contains("not found or has expired"));
    }

    #[test]
    fn expired_entries_look_missing() {
        let store = ConfirmationStore::new();
        store.add(pending("c1", -1));
        assert!(store.get(&ConfirmationId::new("c1")).is_none());
        assert!(store.consume(&ConfirmationId::new("c1")).is_err());
    }

    #[test]
    fn confirm_stamps_confirmed_at() {
        let store = ConfirmationStore::new();
        store.add(pending("c1", 60_000));
        let confirmed = store.confirm(&ConfirmationId::new("c1")).unwrap();
        assert!(confirmed.is_confirmed());
        // Still present until consumed.
        assert!(store.get(&ConfirmationId::new("c1")).unwrap().is_confirmed());
    }

    #[test]
    fn add_sweeps_expired_entries() {
        let store = ConfirmationStore::new();
        store.add(pending("old", -1));
        store.add(pending("new", 60_000));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn confirm_tool_is_never_gated() {
        let policy = policy_requiring(&["confirm", "app_close"]);
        assert!(!should_require_confirmation("confirm", &policy));
        assert!(should_require_confirmation("app_close", &policy));
        assert!(!should_require_confirmation("snapshot_capture", &policy));
    }
}
