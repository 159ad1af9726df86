//! Integration tests for launch orchestration against the scripted driver.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use gantry_launch::{
    AttachOptions, DevServerOptions, ElectronOptions, LaunchOptions, LaunchTimeouts,
    META_LAUNCH_FALLBACK_REASON, META_LAUNCH_PATH, attach_app, derive_cdp_url, find_ws_endpoint,
    launch_app, resolve_preset,
};
use gantry_runtime::SessionManager;
use gantry_runtime::testing::ScriptedDriver;
use gantry_types::{
    ErrorCode, LaunchMode, ResolvedPolicy, SafetyMode, SessionId, ToolPolicy, Window, WindowId,
    WindowKind, now_unix_ms,
};

fn policy(root: &Path, mode: SafetyMode) -> ResolvedPolicy {
    ResolvedPolicy {
        mode,
        allowed_origins: match mode {
            SafetyMode::Trusted => vec!["*".into()],
            _ => vec!["http://localhost".into(), "http://127.0.0.1".into()],
        },
        artifact_root: root.to_path_buf(),
        max_session_ttl_ms: 60_000,
        tools: ToolPolicy::default(),
        redaction_patterns: vec![],
        roots: None,
        allowed_env_vars: None,
        max_snapshot_nodes: None,
        source_path: None,
    }
}

fn window(id: &str, kind: WindowKind, focused: bool) -> Window {
    Window {
        id: WindowId::new(id),
        title: "Main".into(),
        url: "http://localhost:5173/".into(),
        kind,
        focused,
        visible: true,
        last_seen_at_ms: now_unix_ms(),
        bounds: None,
        kind_hint: None,
    }
}

fn custom_options(root: &Path) -> LaunchOptions {
    LaunchOptions {
        project_root: root.to_path_buf(),
        preset: Some("custom".into()),
        electron: Some(ElectronOptions {
            entry_path: Some(root.join("out/main.js")),
            ..Default::default()
        }),
        timeouts: Some(LaunchTimeouts {
            launch_ms: Some(2_000),
            first_window_ms: Some(0),
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn custom_launch_registers_a_running_session() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(ScriptedDriver::new());
    driver.set_windows(vec![
        window("dt", WindowKind::Devtools, false),
        window("w1", WindowKind::Primary, true),
    ]);
    let sessions = Arc::new(SessionManager::new(60_000));
    let policy = policy(dir.path(), SafetyMode::Standard);

    let outcome = launch_app(
        driver.clone(),
        sessions.clone(),
        &policy,
        custom_options(dir.path()),
    )
    .await
    .unwrap();

    assert_eq!(outcome.session.launch_mode, LaunchMode::Custom);
    assert_eq!(outcome.session.windows.len(), 2);
    // Primary preferred over the devtools window that sorts first.
    assert_eq!(
        outcome.session.selected_window_id,
        Some(WindowId::new("w1"))
    );
    assert_eq!(outcome.session.metadata[META_LAUNCH_PATH], "driver_launch");
    assert!(sessions.has(&outcome.session.id));
    // Artifact layout exists.
    assert!(dir.path().join("traces").is_dir());
    assert!(
        dir.path()
            .join("artifacts")
            .join(outcome.session.id.as_str())
            .join("screenshots")
            .is_dir()
    );
}

#[tokio::test]
async fn unknown_preset_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(ScriptedDriver::new());
    let sessions = Arc::new(SessionManager::new(60_000));
    let policy = policy(dir.path(), SafetyMode::Standard);

    let err = launch_app(
        driver,
        sessions,
        &policy,
        LaunchOptions {
            project_root: dir.path().to_path_buf(),
            preset: Some("mystery".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInput);
    assert!(err.to_string().contains("vite"));

    assert!(resolve_preset("vite").is_ok());
    assert!(resolve_preset("mystery").is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn dev_server_timeout_never_reaches_the_driver() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(ScriptedDriver::new());
    let sessions = Arc::new(SessionManager::new(60_000));
    let policy = policy(dir.path(), SafetyMode::Standard);

    let err = launch_app(
        driver.clone(),
        sessions,
        &policy,
        LaunchOptions {
            project_root: dir.path().to_path_buf(),
            preset: Some("vite".into()),
            dev_server: Some(DevServerOptions {
                command: Some("echo 'starting up'; sleep 30".into()),
                ready_pattern: Some("ready".into()),
                timeout_ms: Some(150),
                url: None,
            }),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), ErrorCode::LaunchFailed);
    assert!(
        err.to_string()
            .contains("Timed out waiting for dev server readiness signal")
    );
    let details = err.details().unwrap();
    assert!(details["readiness"][0]["timed_out"].as_bool().unwrap());
    // The driver was never asked to launch.
    assert!(!driver.recorded_calls().contains(&"launch".to_string()));
}

#[tokio::test]
async fn dev_server_origin_outside_policy_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(ScriptedDriver::new());
    let sessions = Arc::new(SessionManager::new(60_000));
    let policy = policy(dir.path(), SafetyMode::Safe);

    let err = launch_app(
        driver,
        sessions,
        &policy,
        LaunchOptions {
            project_root: dir.path().to_path_buf(),
            preset: Some("vite".into()),
            dev_server: Some(DevServerOptions {
                command: Some("true".into()),
                url: Some("https://example.com".into()),
                ready_pattern: None,
                timeout_ms: None,
            }),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PolicyViolation);
}

#[tokio::test]
async fn cdp_attach_fallback_annotates_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(ScriptedDriver::new());
    driver.fail_launch_with(
        "Electron exited early: DevTools listening on ws://127.0.0.1:9222/devtools/browser/abc",
    );
    driver.set_windows(vec![window("w1", WindowKind::Primary, true)]);
    let sessions = Arc::new(SessionManager::new(60_000));
    let policy = policy(dir.path(), SafetyMode::Standard);

    let mut options = custom_options(dir.path());
    options.electron.as_mut().unwrap().args = vec!["--remote-debugging-port=9222".into()];
    // attach_fallback left unset: auto-derived from the debugging-port arg.

    let outcome = launch_app(driver.clone(), sessions, &policy, options)
        .await
        .unwrap();

    let targets = driver.attach_targets.lock().unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(
        targets[0].ws_endpoint.as_deref(),
        Some("ws://127.0.0.1:9222/devtools/browser/abc")
    );
    assert_eq!(targets[0].cdp_url.as_deref(), Some("http://127.0.0.1:9222"));

    assert_eq!(
        outcome.session.metadata[META_LAUNCH_PATH],
        "cdp_attach_fallback"
    );
    assert!(
        outcome.session.metadata[META_LAUNCH_FALLBACK_REASON].contains("Electron exited early")
    );
}

#[tokio::test]
async fn launch_failure_without_fallback_carries_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(ScriptedDriver::new());
    driver.fail_launch_with("spawn ENOENT");
    let sessions = Arc::new(SessionManager::new(60_000));
    let policy = policy(dir.path(), SafetyMode::Standard);

    let err = launch_app(
        driver,
        sessions.clone(),
        &policy,
        custom_options(dir.path()),
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), ErrorCode::LaunchFailed);
    assert!(err.retriable());
    assert!(err.details().is_some());
    assert_eq!(sessions.count(), 0);
}

#[tokio::test]
async fn attach_app_requires_a_target_and_registers_attached_mode() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(ScriptedDriver::new());
    driver.set_windows(vec![window("w1", WindowKind::Primary, true)]);
    let sessions = Arc::new(SessionManager::new(60_000));
    let policy = policy(dir.path(), SafetyMode::Trusted);

    let err = attach_app(
        driver.clone(),
        sessions.clone(),
        &policy,
        AttachOptions::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInput);

    let outcome = attach_app(
        driver,
        sessions.clone(),
        &policy,
        AttachOptions {
            ws_endpoint: Some("ws://127.0.0.1:9222/devtools/browser/xyz".into()),
            cdp_url: None,
            session_id: Some("attached-1".into()),
        },
    )
    .await
    .unwrap();
    assert_eq!(outcome.session.launch_mode, LaunchMode::Attached);
    assert!(sessions.has(&SessionId::new("attached-1")));
}

#[test]
fn ws_endpoint_scan_and_cdp_derivation() {
    let text = "noise\nDevTools listening on ws://127.0.0.1:9222/devtools/browser/abc-123\nmore";
    let ws = find_ws_endpoint(text).unwrap();
    assert_eq!(ws, "ws://127.0.0.1:9222/devtools/browser/abc-123");
    assert_eq!(derive_cdp_url(&ws).unwrap(), "http://127.0.0.1:9222");
    assert!(find_ws_endpoint("nothing here").is_none());
    assert!(derive_cdp_url("not-a-ws-url").is_none());
}
