//! Safety modes and policy shapes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Runtime privilege level, ordered by increasing privilege.
///
/// The ordering matters: policy resolution always takes the *stricter*
/// (lower) of two modes, so a policy file can narrow privileges but never
/// widen them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum SafetyMode {
    #[default]
    Safe,
    Standard,
    Trusted,
}

impl SafetyMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Standard => "standard",
            Self::Trusted => "trusted",
        }
    }

    /// The stricter of two modes.
    #[must_use]
    pub fn stricter(self, other: Self) -> Self {
        self.min(other)
    }
}

impl std::fmt::Display for SafetyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base safety policy: the mode plus the limits it implies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyPolicy {
    pub mode: SafetyMode,
    pub allowed_origins: Vec<String>,
    pub artifact_root: PathBuf,
    pub max_session_ttl_ms: u64,
}

/// Per-tool gating lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolPolicy {
    /// Tools that reject every invocation with a policy violation.
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Tools that require a confirmed two-phase approval before running.
    #[serde(default)]
    pub require_confirmation: Vec<String>,
}

/// Fully resolved policy: mode defaults merged with any file overrides.
///
/// Invariants (enforced by `gantry-policy::resolve_policy`):
/// - string lists are deduplicated, first-seen order preserved;
/// - every entry of `allowed_origins` is admissible under `mode`;
/// - `max_session_ttl_ms` never exceeds the mode default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedPolicy {
    pub mode: SafetyMode,
    pub allowed_origins: Vec<String>,
    pub artifact_root: PathBuf,
    pub max_session_ttl_ms: u64,
    #[serde(default)]
    pub tools: ToolPolicy,
    /// Extra redaction regexes applied to event-log params. Compile-checked
    /// at policy load, never at redaction time.
    #[serde(default)]
    pub redaction_patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<Vec<PathBuf>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_env_vars: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_snapshot_nodes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
}

impl ResolvedPolicy {
    #[must_use]
    pub fn is_tool_disabled(&self, tool: &str) -> bool {
        self.tools.disabled.iter().any(|t| t == tool)
    }
}

#[cfg(test)]
mod tests {
    use super::SafetyMode;

    #[test]
    fn mode_ordering_is_safe_standard_trusted() {
        assert!(SafetyMode::Safe < SafetyMode::Standard);
        assert!(SafetyMode::Standard < SafetyMode::Trusted);
    }

    #[test]
    fn stricter_takes_the_lower_mode() {
        assert_eq!(
            SafetyMode::Trusted.stricter(SafetyMode::Safe),
            SafetyMode::Safe
        );
        assert_eq!(
            SafetyMode::Standard.stricter(SafetyMode::Trusted),
            SafetyMode::Standard
        );
    }

    #[test]
    fn modes_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&SafetyMode::Trusted).unwrap(),
            "\"trusted\""
        );
    }
}
