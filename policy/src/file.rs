//! Policy-file parsing.
//!
//! The file schema is strict: `version` must be the literal 1, unknown
//! fields reject, and numeric limits must be positive and bounded. JSON is
//! always supported; YAML sits behind the `yaml` cargo feature so a build
//! without it degrades to a clear error instead of a crash.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use gantry_types::{SafetyMode, ServerError, ToolPolicy};

/// Upper bound on any TTL the file may request (24 h). Mode caps are
/// enforced later during resolution.
const MAX_FILE_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Upper bound on `max_snapshot_nodes`.
const MAX_SNAPSHOT_NODES_BOUND: usize = 100_000;

const SUPPORTED_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// Tool lists as they appear in the file. Strict mirror of
/// [`gantry_types::ToolPolicy`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyFileTools {
    #[serde(default)]
    pub disabled: Vec<String>,
    #[serde(default)]
    pub require_confirmation: Vec<String>,
}

impl PolicyFileTools {
    #[must_use]
    pub fn into_tool_policy(self) -> ToolPolicy {
        ToolPolicy {
            disabled: self.disabled,
            require_confirmation: self.require_confirmation,
        }
    }
}

/// The on-disk policy document, version 1.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyFile {
    pub version: u32,
    #[serde(default)]
    pub mode: Option<SafetyMode>,
    #[serde(default)]
    pub allowed_origins: Option<Vec<String>>,
    #[serde(default)]
    pub max_session_ttl_ms: Option<u64>,
    #[serde(default)]
    pub tools: PolicyFileTools,
    #[serde(default)]
    pub redaction_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub roots: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub allowed_env_vars: Option<Vec<String>>,
    #[serde(default)]
    pub max_snapshot_nodes: Option<usize>,
    /// Where the document came from. Not part of the schema; stamped by the
    /// loader.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for PolicyFile {
    fn default() -> Self {
        Self {
            version: 1,
            mode: None,
            allowed_origins: None,
            max_session_ttl_ms: None,
            tools: PolicyFileTools::default(),
            redaction_patterns: None,
            roots: None,
            allowed_env_vars: None,
            max_snapshot_nodes: None,
            source_path: None,
        }
    }
}

impl PolicyFile {
    fn validate(&self) -> Result<(), ServerError> {
        if self.version != 1 {
            return Err(ServerError::invalid_input(format!(
                "Unsupported policy file version {}; expected 1",
                self.version
            )));
        }
        if let Some(ttl) = self.max_session_ttl_ms {
            if ttl == 0 || ttl > MAX_FILE_TTL_MS {
                return Err(ServerError::invalid_input(format!(
                    "max_session_ttl_ms must be in 1..={MAX_FILE_TTL_MS}, got {ttl}"
                )));
            }
        }
        if let Some(nodes) = self.max_snapshot_nodes {
            if nodes == 0 || nodes > MAX_SNAPSHOT_NODES_BOUND {
                return Err(ServerError::invalid_input(format!(
                    "max_snapshot_nodes must be in 1..={MAX_SNAPSHOT_NODES_BOUND}, got {nodes}"
                )));
            }
        }
        Ok(())
    }
}

/// Parse a policy document from an in-memory JSON value.
pub fn policy_file_from_value(value: Value) -> Result<PolicyFile, ServerError> {
    let file: PolicyFile = serde_json::from_value(value)
        .map_err(|e| ServerError::invalid_input(format!("Invalid policy document: {e}")))?;
    file.validate()?;
    Ok(file)
}

/// Load and validate a policy file from disk, dispatching on extension.
pub fn load_policy_file(path: &Path) -> Result<PolicyFile, ServerError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ServerError::invalid_input(format!(
            "Unsupported policy file extension '{extension}' for {}; supported: {}",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }

    let raw = std::fs::read_to_string(path).map_err(|e| {
        ServerError::invalid_input(format!("Cannot read policy file {}: {e}", path.display()))
    })?;

    let mut file = match extension.as_str() {
        "json" => serde_json::from_str::<PolicyFile>(&raw).map_err(|e| {
            ServerError::invalid_input(format!("Invalid policy JSON in {}: {e}", path.display()))
        })?,
        "yaml" | "yml" => parse_yaml(&raw, path)?,
        _ => unreachable!("extension checked above"),
    };
    file.validate()?;
    file.source_path = Some(path.to_path_buf());
    tracing::info!(path = %path.display(), "loaded policy file");
    Ok(file)
}

#[cfg(feature = "yaml")]
fn parse_yaml(raw: &str, path: &Path) -> Result<PolicyFile, ServerError> {
    serde_yaml::from_str::<PolicyFile>(raw).map_err(|e| {
        ServerError::invalid_input(format!("Invalid policy YAML in {}: {e}", path.display()))
    })
}

#[cfg(not(feature = "yaml"))]
fn parse_yaml(_raw: &str, path: &Path) -> Result<PolicyFile, ServerError> {
    Err(ServerError::invalid_input(format!(
        "Cannot load YAML policy {}: this build lacks the 'yaml' feature of gantry-policy",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use gantry_types::{ErrorCode, SafetyMode};
    use serde_json::json;

    use super::{load_policy_file, policy_file_from_value};

    #[test]
    fn literal_document_parses_and_validates() {
        let file = policy_file_from_value(json!({
            "version": 1,
            "mode": "standard",
            "tools": { "disabled": ["trace_start"], "require_confirmation": ["app_close"] },
        }))
        .unwrap();
        assert_eq!(file.mode, Some(SafetyMode::Standard));
        assert_eq!(file.tools.disabled, vec!["trace_start"]);
    }

    #[test]
    fn unknown_fields_reject() {
        let err = policy_file_from_value(json!({ "version": 1, "surprise": true })).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
        assert!(err.to_string().contains("surprise"));
    }

    #[test]
    fn version_must_be_one() {
        let err = policy_file_from_value(json!({ "version": 2 })).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn zero_ttl_rejects() {
        let err =
            policy_file_from_value(json!({ "version": 1, "max_session_ttl_ms": 0 })).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn json_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, r#"{{ "version": 1, "mode": "safe" }}"#).unwrap();

        let file = load_policy_file(&path).unwrap();
        assert_eq!(file.mode, Some(SafetyMode::Safe));
        assert_eq!(file.source_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn unsupported_extension_lists_supported_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(&path, "version = 1").unwrap();

        let err = load_policy_file(&path).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
        assert!(err.to_string().contains("json, yaml, yml"));
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_file_parses_when_the_feature_is_on() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        std::fs::write(&path, "version: 1\nmode: trusted\n").unwrap();

        let file = load_policy_file(&path).unwrap();
        assert_eq!(file.mode, Some(SafetyMode::Trusted));
    }
}
