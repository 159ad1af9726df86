//! Session and window models.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ids::{SessionId, WindowId};
use crate::policy::SafetyMode;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Launching,
    Running,
    Closed,
    Error,
}

/// How the session's application instance came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    Preset,
    Custom,
    Attached,
}

/// Classification of a window surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Primary,
    Modal,
    Devtools,
    Utility,
    #[default]
    Unknown,
}

/// Window geometry as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One window surface of the automated application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Window {
    #[serde(rename = "window_id")]
    pub id: WindowId,
    pub title: String,
    pub url: String,
    pub kind: WindowKind,
    pub focused: bool,
    pub visible: bool,
    pub last_seen_at_ms: i64,
    /// Geometry, when the driver reports it. Feeds modal detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<WindowBounds>,
    /// Raw driver-side window type hint (e.g. "dialog"), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind_hint: Option<String>,
}

/// Trace-recording state of a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceState {
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_path: Option<PathBuf>,
}

/// The externally visible session record.
///
/// Created by launch tools, mutated only through the session manager,
/// destroyed by TTL eviction or explicit removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "session_id")]
    pub id: SessionId,
    pub state: SessionState,
    pub mode: SafetyMode,
    pub launch_mode: LaunchMode,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub last_activity_at_ms: i64,
    pub artifact_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_window_id: Option<WindowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceState>,
    #[serde(default)]
    pub windows: Vec<Window>,
    /// Launch annotations: launch path, fallback reason, preset name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Compact session listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(rename = "session_id")]
    pub id: SessionId,
    pub state: SessionState,
    pub launch_mode: LaunchMode,
    pub window_count: usize,
    pub created_at_ms: i64,
    pub last_activity_at_ms: i64,
}

impl Session {
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            state: self.state,
            launch_mode: self.launch_mode,
            window_count: self.windows.len(),
            created_at_ms: self.created_at_ms,
            last_activity_at_ms: self.last_activity_at_ms,
        }
    }

    #[must_use]
    pub fn find_window(&self, id: &WindowId) -> Option<&Window> {
        self.windows.iter().find(|w| &w.id == id)
    }
}
