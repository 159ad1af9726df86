//! Launch orchestration for the Gantry automation server.
//!
//! Covers everything between "launch this app" and a registered session:
//! artifact directories, dev-server spawn and readiness, the driver launch
//! with its CDP attach fallback, and the diagnostics every step records.

pub mod artifacts;
pub mod diagnostics;
pub mod orchestrator;
pub mod process;
pub mod readiness;
pub mod shell;

pub use artifacts::{
    ensure_layout, ensure_session_dirs, list_dir_or_empty, screenshots_dir, session_artifact_dir,
    trace_path,
};
pub use diagnostics::{
    EnvReport, EnvReporter, LaunchDiagnostics, LaunchEvent, LaunchEventKind, LaunchEventLog,
    LineCollector, ReadinessRecord, ReadinessTimeline,
};
pub use orchestrator::{
    AttachOptions, CUSTOM_PRESET, DevServerOptions, ElectronOptions, LaunchOptions, LaunchOutcome,
    LaunchTimeouts, META_LAUNCH_FALLBACK_REASON, META_LAUNCH_PATH, META_PRESET, Preset, attach_app,
    derive_cdp_url, find_ws_endpoint, launch_app, resolve_preset,
};
pub use process::{ChildGuard, set_new_session, signal_group_graceful};
pub use readiness::{
    DEFAULT_READINESS_TIMEOUT_MS, DevServerConfig, DevServerHandle, compile_ready_pattern,
    start_dev_server,
};
pub use shell::CommandShell;
