//! Launch orchestration.
//!
//! One entry point per launch path: `launch_app` (preset or custom launch,
//! with optional dev server and CDP attach fallback) and `attach_app`
//! (direct attach to an already-running instance). Both register the
//! resulting session, wired with the cleanup hooks teardown needs.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use gantry_runtime::{
    AttachTarget, AutomationDriver, DriverLaunchSpec, ManagedSession, SessionManager,
};
use gantry_types::{
    LaunchMode, ResolvedPolicy, ServerError, Session, SessionId, SessionState, Window, WindowKind,
    now_unix_ms,
};

use crate::artifacts::{ensure_layout, ensure_session_dirs};
use crate::diagnostics::{EnvReporter, LaunchDiagnostics, LaunchEventKind};
use crate::readiness::{DevServerConfig, DevServerHandle, start_dev_server};

pub const DEFAULT_LAUNCH_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_FIRST_WINDOW_TIMEOUT_MS: u64 = 5_000;
const FIRST_WINDOW_POLL: Duration = Duration::from_millis(250);

pub const CUSTOM_PRESET: &str = "custom";

/// Env-var prefixes worth surfacing in launch diagnostics.
const ENV_REPORT_PREFIXES: &[&str] = &["VITE_", "ELECTRON_", "NODE_"];

/// Session metadata keys stamped by the orchestrator.
pub const META_LAUNCH_PATH: &str = "launch_path";
pub const META_LAUNCH_FALLBACK_REASON: &str = "launch_fallback_reason";
pub const META_PRESET: &str = "preset";
pub const META_LAUNCHED_AT: &str = "launched_at";

static WS_ENDPOINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"wss?://[0-9A-Za-z_.\-:\[\]]+/devtools/browser/[0-9A-Za-z\-]+")
        .expect("ws-endpoint pattern is a valid regex")
});

/// A named launch recipe.
#[derive(Debug, Clone)]
pub struct Preset {
    pub name: &'static str,
    pub dev_server_command: Option<&'static str>,
    pub ready_pattern: Option<&'static str>,
    pub dev_server_url: Option<&'static str>,
}

const PRESETS: &[Preset] = &[
    Preset {
        name: "vite",
        dev_server_command: Some("npm run dev"),
        ready_pattern: Some(r"ready in|localhost:\d+"),
        dev_server_url: Some("http://localhost:5173"),
    },
    Preset {
        name: "forge",
        dev_server_command: Some("npm start"),
        ready_pattern: Some(r"launching|compiled successfully"),
        dev_server_url: None,
    },
    Preset {
        name: "webpack",
        dev_server_command: Some("npm run dev"),
        ready_pattern: Some("compiled successfully"),
        dev_server_url: Some("http://localhost:9000"),
    },
];

/// Look up a named preset; unknown names enumerate the known ones.
pub fn resolve_preset(name: &str) -> Result<&'static Preset, ServerError> {
    PRESETS.iter().find(|p| p.name == name).ok_or_else(|| {
        let known: Vec<&str> = PRESETS.iter().map(|p| p.name).collect();
        ServerError::invalid_input(format!(
            "Unknown preset '{name}'; known presets: {}, or '{CUSTOM_PRESET}'",
            known.join(", ")
        ))
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevServerOptions {
    pub command: Option<String>,
    pub url: Option<String>,
    pub ready_pattern: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElectronOptions {
    pub entry_path: Option<PathBuf>,
    pub executable_path: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LaunchTimeouts {
    pub launch_ms: Option<u64>,
    pub first_window_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LaunchOptions {
    pub project_root: PathBuf,
    /// Named preset, or "custom" to compose `[entry_path, ...args]`
    /// directly. Defaults to "custom" when an entry path is given, else to
    /// the first named preset.
    pub preset: Option<String>,
    pub session_id: Option<String>,
    pub dev_server: Option<DevServerOptions>,
    pub electron: Option<ElectronOptions>,
    pub timeouts: Option<LaunchTimeouts>,
    /// Auto-derives from `--remote-debugging-port=` in the electron args
    /// when unset.
    pub attach_fallback: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachOptions {
    pub ws_endpoint: Option<String>,
    pub cdp_url: Option<String>,
    pub session_id: Option<String>,
}

/// A registered session plus the diagnostics its launch accumulated.
#[derive(Debug)]
pub struct LaunchOutcome {
    pub session: Session,
    pub diagnostics: Arc<LaunchDiagnostics>,
}

/// First DevTools WebSocket endpoint found in `text`, if any.
#[must_use]
pub fn find_ws_endpoint(text: &str) -> Option<String> {
    WS_ENDPOINT_RE.find(text).map(|m| m.as_str().to_string())
}

/// Derive the HTTP base URL (`http://host:port`) from a DevTools WebSocket
/// endpoint.
#[must_use]
pub fn derive_cdp_url(ws_endpoint: &str) -> Option<String> {
    let rest = ws_endpoint
        .strip_prefix("ws://")
        .or_else(|| ws_endpoint.strip_prefix("wss://"))?;
    let host_port = rest.split('/').next()?;
    if host_port.is_empty() {
        return None;
    }
    Some(format!("http://{host_port}"))
}

/// Origin (`scheme://host[:port]`) of a URL, without a real URL parser.
fn url_origin(url: &str) -> Option<String> {
    let scheme_end = url.find("://")?;
    let rest = &url[scheme_end + 3..];
    let host_end = rest.find('/').unwrap_or(rest.len());
    if rest[..host_end].is_empty() {
        return None;
    }
    Some(format!("{}://{}", &url[..scheme_end], &rest[..host_end]))
}

/// Check a dev-server URL against the policy's allowed origins.
fn check_origin_allowed(policy: &ResolvedPolicy, url: &str) -> Result<(), ServerError> {
    if policy.allowed_origins.iter().any(|o| o == "*") {
        return Ok(());
    }
    let origin = url_origin(url)
        .ok_or_else(|| ServerError::invalid_input(format!("Malformed dev server URL '{url}'")))?;
    let allowed = policy.allowed_origins.iter().any(|allowed| {
        origin == *allowed
            || (origin.starts_with(allowed.as_str())
                && origin[allowed.len()..].starts_with(':'))
    });
    if allowed {
        return Ok(());
    }
    Err(ServerError::policy_violation(format!(
        "Dev server origin '{origin}' is not in the allowed origins for {} mode",
        policy.mode
    )))
}

fn filter_env(
    env: &BTreeMap<String, String>,
    allowed: Option<&[String]>,
) -> Vec<(String, String)> {
    env.iter()
        .filter(|(key, _)| allowed.is_none_or(|list| list.iter().any(|a| a == *key)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

async fn abort_launch(
    error: ServerError,
    dev_server: Option<DevServerHandle>,
    diagnostics: &LaunchDiagnostics,
) -> ServerError {
    if let Some(handle) = dev_server {
        diagnostics.record_event(LaunchEventKind::Signal, "shutting down dev server after launch failure");
        handle.shutdown().await;
    }
    match error {
        ServerError::LaunchFailed {
            message,
            diagnostics: inner,
        } => ServerError::LaunchFailed {
            message,
            diagnostics: inner.or_else(|| Some(diagnostics.snapshot())),
        },
        other => other,
    }
}

/// Launch the application and register the resulting session.
pub async fn launch_app(
    driver: Arc<dyn AutomationDriver>,
    sessions: Arc<SessionManager>,
    policy: &ResolvedPolicy,
    options: LaunchOptions,
) -> Result<LaunchOutcome, ServerError> {
    let root = policy.artifact_root.clone();
    ensure_layout(&root)?;
    let session_id = options
        .session_id
        .clone()
        .map_or_else(|| SessionId::new(Uuid::new_v4().to_string()), SessionId::new);
    let artifact_dir = ensure_session_dirs(&root, &session_id)?;

    let diagnostics = Arc::new(LaunchDiagnostics::new());
    let electron = options.electron.clone().unwrap_or_default();
    let timeouts = options.timeouts.unwrap_or_default();
    let launch_timeout_ms = timeouts.launch_ms.unwrap_or(DEFAULT_LAUNCH_TIMEOUT_MS);
    let env = filter_env(&electron.env, policy.allowed_env_vars.as_deref());
    if !env.is_empty() {
        let reporter = EnvReporter::new(
            ENV_REPORT_PREFIXES.iter().map(ToString::to_string).collect(),
            policy.allowed_env_vars.as_deref().unwrap_or_default(),
        )?;
        diagnostics.set_env_report(reporter.report(&env));
    }

    let preset_name = options.preset.clone().unwrap_or_else(|| {
        if electron.entry_path.is_some() {
            CUSTOM_PRESET.to_string()
        } else {
            PRESETS[0].name.to_string()
        }
    });
    diagnostics.record_event(
        LaunchEventKind::Launch,
        format!("launching session {session_id} with preset '{preset_name}'"),
    );

    // Dev server first: the renderer needs something to load.
    let mut dev_server = None;
    let launch_mode;
    let argv;
    if preset_name == CUSTOM_PRESET {
        launch_mode = LaunchMode::Custom;
        let entry = electron.entry_path.clone().ok_or_else(|| {
            ServerError::invalid_input("Custom launch requires electron.entry_path")
        })?;
        let mut composed = vec![entry.to_string_lossy().into_owned()];
        composed.extend(electron.args.iter().cloned());
        argv = composed;
    } else {
        launch_mode = LaunchMode::Preset;
        let preset = resolve_preset(&preset_name)?;
        argv = electron.args.clone();

        let dev_options = options.dev_server.clone().unwrap_or_default();
        if let Some(url) = dev_options
            .url
            .as_deref()
            .or(preset.dev_server_url)
            .filter(|_| dev_options.command.is_some())
        {
            check_origin_allowed(policy, url)?;
        }
        if preset.dev_server_command.is_some() {
            if let Some(command) = dev_options.command.clone() {
                let ready_pattern = dev_options
                    .ready_pattern
                    .clone()
                    .or_else(|| preset.ready_pattern.map(ToString::to_string));
                let handle = start_dev_server(
                    DevServerConfig {
                        command,
                        cwd: options.project_root.clone(),
                        ready_pattern,
                        timeout_ms: dev_options.timeout_ms.unwrap_or(launch_timeout_ms),
                        env: env.clone(),
                    },
                    diagnostics.clone(),
                )
                .await?;
                dev_server = Some(handle);
            }
        }
    }

    let attach_enabled = options.attach_fallback.unwrap_or_else(|| {
        electron
            .args
            .iter()
            .any(|a| a.starts_with("--remote-debugging-port="))
    });

    let spec = DriverLaunchSpec {
        executable: electron.executable_path.clone(),
        argv,
        env,
        cwd: Some(options.project_root.clone()),
        timeout_ms: Some(launch_timeout_ms),
    };

    let (driver_session, launch_path, fallback_reason) = match driver.launch(spec).await {
        Ok(session) => (session, "driver_launch", None),
        Err(original) => {
            if !attach_enabled {
                return Err(abort_launch(original, dev_server, &diagnostics).await);
            }
            let mut haystack = diagnostics.stderr_tail(usize::MAX);
            haystack.push(original.to_string());
            if let Some(cause) = original.details() {
                haystack.push(cause.to_string());
            }
            let Some(ws_endpoint) = haystack.iter().find_map(|line| find_ws_endpoint(line)) else {
                return Err(abort_launch(original, dev_server, &diagnostics).await);
            };
            let cdp_url = derive_cdp_url(&ws_endpoint);
            diagnostics.record_event(
                LaunchEventKind::Target,
                format!("DevTools endpoint found in captured output: {ws_endpoint}"),
            );
            diagnostics.record_event(
                LaunchEventKind::Attach,
                format!("launch failed; attempting CDP attach to {ws_endpoint}"),
            );
            match driver
                .attach(AttachTarget {
                    ws_endpoint: Some(ws_endpoint.clone()),
                    cdp_url,
                })
                .await
            {
                Ok(session) => {
                    diagnostics
                        .record_event(LaunchEventKind::Attach, "CDP attach fallback succeeded");
                    (session, "cdp_attach_fallback", Some(original.to_string()))
                }
                Err(attach_error) => {
                    diagnostics.record_event(
                        LaunchEventKind::Attach,
                        format!("CDP attach fallback failed: {attach_error}"),
                    );
                    return Err(abort_launch(original, dev_server, &diagnostics).await);
                }
            }
        }
    };

    // Give the first window a moment to appear; its absence is not fatal.
    let first_window_ms = timeouts
        .first_window_ms
        .unwrap_or(DEFAULT_FIRST_WINDOW_TIMEOUT_MS);
    let deadline = tokio::time::Instant::now() + Duration::from_millis(first_window_ms);
    let mut windows: Vec<Window> = driver.windows(&driver_session).await.unwrap_or_default();
    while windows.is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(FIRST_WINDOW_POLL).await;
        windows = driver.windows(&driver_session).await.unwrap_or_default();
    }
    diagnostics.record_event(
        LaunchEventKind::Window,
        format!("{} window(s) after launch", windows.len()),
    );

    let default_window_id = windows
        .iter()
        .find(|w| w.kind == WindowKind::Primary)
        .or_else(|| windows.first())
        .map(|w| w.id.clone());

    let now = now_unix_ms();
    let mut metadata = BTreeMap::new();
    metadata.insert(META_PRESET.to_string(), preset_name.clone());
    metadata.insert(META_LAUNCH_PATH.to_string(), launch_path.to_string());
    metadata.insert(META_LAUNCHED_AT.to_string(), chrono::Utc::now().to_rfc3339());
    if let Some(reason) = fallback_reason {
        metadata.insert(META_LAUNCH_FALLBACK_REASON.to_string(), reason);
    }

    let session = Session {
        id: session_id.clone(),
        state: SessionState::Running,
        mode: policy.mode,
        launch_mode,
        created_at_ms: now,
        updated_at_ms: now,
        last_activity_at_ms: now,
        artifact_dir,
        selected_window_id: default_window_id.clone(),
        trace: None,
        windows: windows.clone(),
        metadata,
    };

    let mut managed = ManagedSession::new(session.clone());
    managed.driver = Some(driver.clone());
    managed.driver_session = Some(driver_session);
    managed.default_window_id = default_window_id;
    if let Some(handle) = dev_server {
        managed.push_cleanup(Box::new(move || {
            Box::pin(async move {
                handle.shutdown().await;
                Ok(())
            })
        }));
    }
    sessions.add(managed);
    tracing::info!(session_id = %session_id, launch_path, "session launched");

    Ok(LaunchOutcome {
        session,
        diagnostics,
    })
}

/// Attach directly to a running instance and register the session.
pub async fn attach_app(
    driver: Arc<dyn AutomationDriver>,
    sessions: Arc<SessionManager>,
    policy: &ResolvedPolicy,
    options: AttachOptions,
) -> Result<LaunchOutcome, ServerError> {
    if options.ws_endpoint.is_none() && options.cdp_url.is_none() {
        return Err(ServerError::invalid_input(
            "Attach requires ws_endpoint or cdp_url",
        ));
    }

    let root = policy.artifact_root.clone();
    ensure_layout(&root)?;
    let session_id = options
        .session_id
        .clone()
        .map_or_else(|| SessionId::new(Uuid::new_v4().to_string()), SessionId::new);
    let artifact_dir = ensure_session_dirs(&root, &session_id)?;

    let diagnostics = Arc::new(LaunchDiagnostics::new());
    diagnostics.record_event(
        LaunchEventKind::Attach,
        format!(
            "attaching to {}",
            options
                .ws_endpoint
                .as_deref()
                .or(options.cdp_url.as_deref())
                .unwrap_or_default()
        ),
    );

    let driver_session = driver
        .attach(AttachTarget {
            ws_endpoint: options.ws_endpoint.clone(),
            cdp_url: options.cdp_url.clone(),
        })
        .await?;

    let windows = driver.windows(&driver_session).await.unwrap_or_default();
    let default_window_id = windows
        .iter()
        .find(|w| w.kind == WindowKind::Primary)
        .or_else(|| windows.first())
        .map(|w| w.id.clone());

    let now = now_unix_ms();
    let mut metadata = BTreeMap::new();
    metadata.insert(META_LAUNCH_PATH.to_string(), "cdp_attach".to_string());
    metadata.insert(META_LAUNCHED_AT.to_string(), chrono::Utc::now().to_rfc3339());

    let session = Session {
        id: session_id.clone(),
        state: SessionState::Running,
        mode: policy.mode,
        launch_mode: LaunchMode::Attached,
        created_at_ms: now,
        updated_at_ms: now,
        last_activity_at_ms: now,
        artifact_dir,
        selected_window_id: default_window_id.clone(),
        trace: None,
        windows: windows.clone(),
        metadata,
    };

    let mut managed = ManagedSession::new(session.clone());
    managed.driver = Some(driver.clone());
    managed.driver_session = Some(driver_session);
    managed.default_window_id = default_window_id;
    sessions.add(managed);
    tracing::info!(session_id = %session_id, "attached session registered");

    Ok(LaunchOutcome {
        session,
        diagnostics,
    })
}
