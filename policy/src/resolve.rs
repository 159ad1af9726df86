//! Merging mode defaults with file overrides.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use gantry_types::{ResolvedPolicy, SafetyMode, ServerError, ToolPolicy};

use crate::file::PolicyFile;

/// Origins a plain `safe`-mode server accepts.
const SAFE_DEFAULT_ORIGINS: &[&str] = &["http://localhost", "http://127.0.0.1"];

/// Matches loopback http(s) origins, with or without an explicit port.
static LOCAL_ORIGIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(localhost|127\.0\.0\.1)(:\d+)?$")
        .expect("local-origin pattern is a valid regex")
});

/// Default session TTL for a mode, in milliseconds.
#[must_use]
pub const fn default_session_ttl_ms(mode: SafetyMode) -> u64 {
    match mode {
        SafetyMode::Safe => 30 * 60 * 1000,
        SafetyMode::Standard => 2 * 60 * 60 * 1000,
        SafetyMode::Trusted => 8 * 60 * 60 * 1000,
    }
}

/// Default allowed origins for a mode.
#[must_use]
pub fn default_allowed_origins(mode: SafetyMode) -> Vec<String> {
    match mode {
        SafetyMode::Safe => SAFE_DEFAULT_ORIGINS
            .iter()
            .map(ToString::to_string)
            .collect(),
        SafetyMode::Standard => {
            let mut origins = default_allowed_origins(SafetyMode::Safe);
            origins.push("file://".to_string());
            origins
        }
        SafetyMode::Trusted => vec!["*".to_string()],
    }
}

/// Whether `origin` may appear in a policy resolved to `mode`.
#[must_use]
pub fn is_origin_admissible(mode: SafetyMode, origin: &str) -> bool {
    match mode {
        SafetyMode::Trusted => true,
        SafetyMode::Standard => origin.starts_with("file://") || LOCAL_ORIGIN_RE.is_match(origin),
        SafetyMode::Safe => LOCAL_ORIGIN_RE.is_match(origin),
    }
}

/// Deduplicate preserving first-seen order.
fn dedup_first_seen(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Resolve the effective policy from the runtime mode and an optional file.
///
/// The effective mode is the stricter of the two; the file can never
/// escalate TTLs or origins beyond the mode defaults.
pub fn resolve_policy(
    runtime_mode: SafetyMode,
    file: Option<&PolicyFile>,
    artifact_root: &Path,
) -> Result<ResolvedPolicy, ServerError> {
    let mode = file
        .and_then(|f| f.mode)
        .map_or(runtime_mode, |file_mode| runtime_mode.stricter(file_mode));

    let default_ttl = default_session_ttl_ms(mode);
    let max_session_ttl_ms = match file.and_then(|f| f.max_session_ttl_ms) {
        Some(requested) if requested > default_ttl => {
            return Err(ServerError::policy_violation(format!(
                "max_session_ttl_ms {requested} exceeds the {mode} mode limit of {default_ttl}"
            )));
        }
        Some(requested) => requested,
        None => default_ttl,
    };

    let allowed_origins = match file.and_then(|f| f.allowed_origins.clone()) {
        Some(origins) => {
            let rejected: Vec<&String> = origins
                .iter()
                .filter(|origin| !is_origin_admissible(mode, origin))
                .collect();
            if !rejected.is_empty() {
                let listed = rejected
                    .iter()
                    .map(|o| format!("'{o}'"))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ServerError::policy_violation(format!(
                    "Origins not admissible in {mode} mode: {listed}"
                )));
            }
            dedup_first_seen(origins)
        }
        None => default_allowed_origins(mode),
    };

    let redaction_patterns = file
        .and_then(|f| f.redaction_patterns.clone())
        .unwrap_or_default();
    for pattern in &redaction_patterns {
        if let Err(e) = Regex::new(pattern) {
            return Err(ServerError::invalid_input(format!(
                "Invalid redaction pattern '{pattern}': {e}"
            )));
        }
    }

    let mut tools: ToolPolicy = file
        .map(|f| f.tools.clone().into_tool_policy())
        .unwrap_or_default();
    tools.disabled = dedup_first_seen(tools.disabled);
    tools.require_confirmation = dedup_first_seen(tools.require_confirmation);

    let resolved = ResolvedPolicy {
        mode,
        allowed_origins,
        artifact_root: artifact_root.to_path_buf(),
        max_session_ttl_ms,
        tools,
        redaction_patterns: dedup_first_seen(redaction_patterns),
        roots: file.and_then(|f| f.roots.clone()),
        allowed_env_vars: file
            .and_then(|f| f.allowed_env_vars.clone())
            .map(dedup_first_seen),
        max_snapshot_nodes: file.and_then(|f| f.max_snapshot_nodes),
        source_path: file.and_then(|f| f.source_path.clone()),
    };
    tracing::debug!(
        mode = %resolved.mode,
        origins = resolved.allowed_origins.len(),
        ttl_ms = resolved.max_session_ttl_ms,
        "resolved safety policy"
    );
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use gantry_types::{ErrorCode, SafetyMode};

    use super::{
        default_session_ttl_ms, is_origin_admissible, resolve_policy,
    };
    use crate::file::PolicyFile;

    fn file_with(f: impl FnOnce(&mut PolicyFile)) -> PolicyFile {
        let mut file = PolicyFile::default();
        f(&mut file);
        file
    }

    #[test]
    fn no_file_yields_mode_defaults() {
        let p = resolve_policy(SafetyMode::Standard, None, Path::new("/tmp/a")).unwrap();
        assert_eq!(p.mode, SafetyMode::Standard);
        assert_eq!(p.max_session_ttl_ms, default_session_ttl_ms(SafetyMode::Standard));
        assert!(p.allowed_origins.contains(&"file://".to_string()));
    }

    #[test]
    fn file_mode_downgrades_but_never_escalates() {
        let file = file_with(|f| {
            f.mode = Some(SafetyMode::Safe);
            f.allowed_origins = Some(vec!["http://localhost:3000".into()]);
        });
        let p = resolve_policy(SafetyMode::Trusted, Some(&file), Path::new("/tmp/a")).unwrap();
        assert_eq!(p.mode, SafetyMode::Safe);
        assert_eq!(p.allowed_origins, vec!["http://localhost:3000"]);

        let escalating = file_with(|f| f.mode = Some(SafetyMode::Trusted));
        let p = resolve_policy(SafetyMode::Safe, Some(&escalating), Path::new("/tmp/a")).unwrap();
        assert_eq!(p.mode, SafetyMode::Safe);
    }

    #[test]
    fn inadmissible_origin_is_a_policy_violation() {
        let file = file_with(|f| {
            f.mode = Some(SafetyMode::Safe);
            f.allowed_origins = Some(vec!["https://example.com".into()]);
        });
        let err = resolve_policy(SafetyMode::Trusted, Some(&file), Path::new("/tmp/a")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PolicyViolation);
        assert!(err.to_string().contains("https://example.com"));
    }

    #[test]
    fn ttl_above_mode_default_is_a_policy_violation() {
        let file = file_with(|f| f.max_session_ttl_ms = Some(3_600_000));
        let err = resolve_policy(SafetyMode::Safe, Some(&file), Path::new("/tmp/a")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PolicyViolation);
    }

    #[test]
    fn ttl_at_or_below_default_is_kept() {
        let file = file_with(|f| f.max_session_ttl_ms = Some(60_000));
        let p = resolve_policy(SafetyMode::Safe, Some(&file), Path::new("/tmp/a")).unwrap();
        assert_eq!(p.max_session_ttl_ms, 60_000);
    }

    #[test]
    fn origins_and_tool_lists_are_deduped_first_seen() {
        let file = file_with(|f| {
            f.allowed_origins = Some(vec![
                "http://localhost:3000".into(),
                "http://localhost".into(),
                "http://localhost:3000".into(),
            ]);
        });
        let p = resolve_policy(SafetyMode::Safe, Some(&file), Path::new("/tmp/a")).unwrap();
        assert_eq!(p.allowed_origins, vec!["http://localhost:3000", "http://localhost"]);
    }

    #[test]
    fn invalid_redaction_pattern_fails_at_load() {
        let file = file_with(|f| f.redaction_patterns = Some(vec!["[unclosed".into()]));
        let err = resolve_policy(SafetyMode::Trusted, Some(&file), Path::new("/tmp/a")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn admissibility_follows_the_mode() {
        assert!(is_origin_admissible(SafetyMode::Safe, "http://localhost:5173"));
        assert!(!is_origin_admissible(SafetyMode::Safe, "file:///tmp/app"));
        assert!(is_origin_admissible(SafetyMode::Standard, "file:///tmp/app"));
        assert!(!is_origin_admissible(SafetyMode::Standard, "https://example.com"));
        assert!(is_origin_admissible(SafetyMode::Trusted, "https://example.com"));
    }

    #[test]
    fn every_resolved_origin_is_admissible_under_the_resolved_mode() {
        for mode in [SafetyMode::Safe, SafetyMode::Standard, SafetyMode::Trusted] {
            let p = resolve_policy(mode, None, Path::new("/tmp/a")).unwrap();
            for origin in &p.allowed_origins {
                assert!(
                    origin == "*" || is_origin_admissible(p.mode, origin),
                    "{origin} must be admissible under {mode}"
                );
            }
        }
    }
}
