//! Artifact directory layout.
//!
//! ```text
//! <artifact_root>/
//!   artifacts/<session_id>/screenshots/*
//!   logs/
//!   traces/<session_id>.zip
//! ```

use std::path::{Path, PathBuf};

use gantry_types::{ServerError, SessionId};

/// Create the fixed top-level layout under the artifact root.
pub fn ensure_layout(root: &Path) -> Result<(), ServerError> {
    for sub in ["artifacts", "logs", "traces"] {
        std::fs::create_dir_all(root.join(sub))
            .map_err(|e| ServerError::wrap_internal("artifact layout", e))?;
    }
    Ok(())
}

#[must_use]
pub fn session_artifact_dir(root: &Path, id: &SessionId) -> PathBuf {
    root.join("artifacts").join(id.as_str())
}

#[must_use]
pub fn screenshots_dir(root: &Path, id: &SessionId) -> PathBuf {
    session_artifact_dir(root, id).join("screenshots")
}

/// Create the per-session directories and return the session dir.
pub fn ensure_session_dirs(root: &Path, id: &SessionId) -> Result<PathBuf, ServerError> {
    let dir = session_artifact_dir(root, id);
    std::fs::create_dir_all(screenshots_dir(root, id))
        .map_err(|e| ServerError::wrap_internal("session artifact dir", e))?;
    Ok(dir)
}

/// Trace archives have a deterministic path per session id.
#[must_use]
pub fn trace_path(root: &Path, id: &SessionId) -> PathBuf {
    root.join("traces").join(format!("{id}.zip"))
}

/// List a directory, treating a missing one as empty rather than an error.
#[must_use]
pub fn list_dir_or_empty(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok().map(|e| e.path())).collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use gantry_types::SessionId;

    use super::{ensure_layout, ensure_session_dirs, list_dir_or_empty, trace_path};

    #[test]
    fn layout_and_session_dirs_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        ensure_layout(root).unwrap();
        assert!(root.join("logs").is_dir());
        assert!(root.join("traces").is_dir());

        let id = SessionId::new("s-1");
        let session_dir = ensure_session_dirs(root, &id).unwrap();
        assert!(session_dir.join("screenshots").is_dir());
        assert_eq!(trace_path(root, &id), root.join("traces/s-1.zip"));
    }

    #[test]
    fn missing_directories_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_dir_or_empty(&dir.path().join("does-not-exist")).is_empty());
    }
}
