//! The automation-driver capability.
//!
//! The driver is an opaque collaborator: it launches or attaches to the
//! application under automation and exposes windows, snapshots, actions,
//! and capture primitives. Every method may suspend. The runtime never
//! assumes anything about what sits behind the trait; tests substitute a
//! scripted mock.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use gantry_types::{RawSnapshot, ServerError, Window, WindowId};

/// Boxed future returned by driver methods.
pub type DriverFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, ServerError>> + Send + 'a>>;

/// Opaque handle to one driven application instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSession {
    handle: String,
}

impl DriverSession {
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
        }
    }

    #[must_use]
    pub fn handle(&self) -> &str {
        &self.handle
    }
}

/// Launch configuration handed to the driver.
///
/// For preset launches `executable` names the app binary; for custom
/// launches `argv` is the fully composed `[entry, ...args]` vector.
#[derive(Debug, Clone, Default)]
pub struct DriverLaunchSpec {
    pub executable: Option<PathBuf>,
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
}

/// Target for attaching to an already-running instance over the remote
/// debugging protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachTarget {
    pub ws_endpoint: Option<String>,
    pub cdp_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

const fn default_click_count() -> u32 {
    1
}

/// One UI action, expressed against a resolved locator string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionDescriptor {
    Click {
        locator: String,
        #[serde(default)]
        button: MouseButton,
        #[serde(default = "default_click_count")]
        click_count: u32,
    },
    TypeText {
        locator: String,
        text: String,
        #[serde(default)]
        clear_first: bool,
    },
    PressKeys {
        keys: Vec<String>,
    },
    Hover {
        locator: String,
    },
}

/// One renderer console message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: String,
    pub text: String,
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// One observed network exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// The consumed driver capability. Object-safe; all methods may suspend.
pub trait AutomationDriver: Send + Sync {
    fn launch(&self, spec: DriverLaunchSpec) -> DriverFut<'_, DriverSession>;

    fn attach(&self, target: AttachTarget) -> DriverFut<'_, DriverSession>;

    fn windows<'a>(&'a self, session: &'a DriverSession) -> DriverFut<'a, Vec<Window>>;

    fn snapshot<'a>(
        &'a self,
        session: &'a DriverSession,
        window: &'a WindowId,
    ) -> DriverFut<'a, RawSnapshot>;

    fn perform<'a>(
        &'a self,
        session: &'a DriverSession,
        window: &'a WindowId,
        action: ActionDescriptor,
    ) -> DriverFut<'a, ()>;

    fn screenshot<'a>(
        &'a self,
        session: &'a DriverSession,
        window: &'a WindowId,
        path: &'a Path,
    ) -> DriverFut<'a, ()>;

    fn console_logs<'a>(
        &'a self,
        session: &'a DriverSession,
        window: &'a WindowId,
    ) -> DriverFut<'a, Vec<ConsoleEntry>>;

    fn network_logs<'a>(
        &'a self,
        session: &'a DriverSession,
        window: &'a WindowId,
    ) -> DriverFut<'a, Vec<NetworkEntry>>;

    fn start_tracing<'a>(&'a self, session: &'a DriverSession) -> DriverFut<'a, ()>;

    fn stop_tracing<'a>(
        &'a self,
        session: &'a DriverSession,
        path: &'a Path,
    ) -> DriverFut<'a, ()>;

    /// Optional capability; drivers without native focus control keep the
    /// no-op default.
    fn focus_window<'a>(
        &'a self,
        _session: &'a DriverSession,
        _window: &'a WindowId,
    ) -> DriverFut<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn close<'a>(&'a self, session: &'a DriverSession) -> DriverFut<'a, ()>;
}
