//! The Gantry tool vocabulary.
//!
//! Every tool is a unit struct implementing the dispatch contract. Shared
//! session/window plumbing lives here; the modules group tools by concern.

pub mod app;
pub mod capture;
pub mod confirm;
pub mod interact;
pub mod sessions;
pub mod snapshot;
pub mod trace;
pub mod windows;

use gantry_runtime::{
    DriverSession, ToolContext, ToolRegistry, apply_window_refresh, select_window,
};
use gantry_types::{ServerError, SessionId, Window, WindowId};

/// Register every built-in tool.
pub fn builtin_registry() -> Result<ToolRegistry, ServerError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(app::AppLaunchTool))?;
    registry.register(Box::new(app::AppAttachTool))?;
    registry.register(Box::new(app::AppCloseTool))?;
    registry.register(Box::new(sessions::SessionListTool))?;
    registry.register(Box::new(windows::WindowListTool))?;
    registry.register(Box::new(windows::WindowSelectTool))?;
    registry.register(Box::new(windows::WaitForWindowTool))?;
    registry.register(Box::new(snapshot::SnapshotCaptureTool))?;
    registry.register(Box::new(interact::ElementClickTool))?;
    registry.register(Box::new(interact::ElementTypeTool))?;
    registry.register(Box::new(interact::ElementPressKeysTool))?;
    registry.register(Box::new(capture::ScreenshotCaptureTool))?;
    registry.register(Box::new(capture::ConsoleReadTool))?;
    registry.register(Box::new(capture::NetworkReadTool))?;
    registry.register(Box::new(trace::TraceStartTool))?;
    registry.register(Box::new(trace::TraceStopTool))?;
    registry.register(Box::new(confirm::ConfirmTool))?;
    Ok(registry)
}

/// A resolved (session, window) target for an interactive tool.
pub(crate) struct ResolvedTarget {
    pub driver_session: DriverSession,
    pub window: Window,
    /// Which heuristic step picked the window; surfaced in diagnostics.
    pub strategy: &'static str,
}

/// Resolve the driver session and target window for a tool invocation.
///
/// Touches the session first so it stays alive across this handler's own
/// suspension points, refreshes the window list from the driver, then runs
/// the selection heuristic. With `track`, the chosen window becomes the
/// session's last-interacted one.
pub(crate) async fn resolve_target(
    ctx: &ToolContext,
    session_id: &SessionId,
    window_id: Option<&WindowId>,
    track: bool,
) -> Result<ResolvedTarget, ServerError> {
    ctx.sessions.touch(session_id);
    let driver_session = ctx
        .sessions
        .with_session(session_id, |m| m.driver_session.clone())?
        .ok_or_else(|| {
            ServerError::internal(format!("Session '{session_id}' has no driver session"))
        })?;

    let windows = ctx.driver.windows(&driver_session).await?;
    let selection = ctx.sessions.with_session(session_id, |m| {
        apply_window_refresh(m, windows);
        select_window(m, window_id, track)
    })??;

    Ok(ResolvedTarget {
        driver_session,
        window: selection.window,
        strategy: selection.strategy,
    })
}

/// Fetch the session's driver session without touching windows.
pub(crate) fn driver_session_of(
    ctx: &ToolContext,
    session_id: &SessionId,
) -> Result<DriverSession, ServerError> {
    ctx.sessions
        .with_session(session_id, |m| m.driver_session.clone())?
        .ok_or_else(|| {
            ServerError::internal(format!("Session '{session_id}' has no driver session"))
        })
}

/// Truncate to a character limit, marking the cut.
pub(crate) fn clamp_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clamped: String = text.chars().take(max_chars).collect();
    clamped.push('…');
    clamped
}

#[cfg(test)]
mod tests {
    use super::{builtin_registry, clamp_chars};

    #[test]
    fn registry_holds_the_full_vocabulary() {
        let registry = builtin_registry().unwrap();
        let names = registry.names();
        for expected in [
            "app_launch",
            "app_attach",
            "app_close",
            "session_list",
            "window_list",
            "window_select",
            "wait_for_window",
            "snapshot_capture",
            "element_click",
            "element_type",
            "element_press_keys",
            "screenshot_capture",
            "console_read",
            "network_read",
            "trace_start",
            "trace_stop",
            "confirm",
        ] {
            assert!(names.contains(&expected), "missing tool {expected}");
        }
        assert_eq!(names.len(), 17);
    }

    #[test]
    fn clamping_marks_the_cut() {
        assert_eq!(clamp_chars("short", 10), "short");
        assert_eq!(clamp_chars("abcdefgh", 3), "abc…");
    }
}
