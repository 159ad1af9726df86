//! Window resolution for interactive tools.
//!
//! When a tool names no window, selection walks a fixed heuristic over the
//! session's current windows; the chosen strategy is surfaced through
//! result diagnostics so callers can see why a window was picked.

use std::sync::LazyLock;

use regex::Regex;

use gantry_types::{ServerError, Window, WindowId, WindowKind};

use crate::session::ManagedSession;

static MODAL_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(dialog|alert|modal|popup|preferences|settings|confirm|about)\b")
        .expect("modal-title pattern is a valid regex")
});

static MODAL_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(dialog|alert|modal)$").expect("modal-hint pattern is a valid regex")
});

/// A resolved window plus the heuristic step that chose it.
#[derive(Debug, Clone)]
pub struct WindowSelection {
    pub window: Window,
    pub strategy: &'static str,
}

/// Whether `window` looks like a modal relative to its siblings.
#[must_use]
pub fn is_likely_modal(window: &Window, all_windows: &[Window]) -> bool {
    if window.kind == WindowKind::Modal {
        return true;
    }
    if MODAL_TITLE_RE.is_match(&window.title) {
        return true;
    }
    if window.url == "about:blank" {
        return true;
    }
    if let Some(hint) = &window.kind_hint {
        if MODAL_HINT_RE.is_match(hint) {
            return true;
        }
    }
    // Strictly smaller than the largest sibling in both dimensions.
    if let Some(bounds) = window.bounds {
        let largest = all_windows
            .iter()
            .filter_map(|w| w.bounds)
            .max_by(|a, b| {
                (a.width * a.height)
                    .partial_cmp(&(b.width * b.height))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        if let Some(largest) = largest {
            if bounds.width < largest.width && bounds.height < largest.height {
                return true;
            }
        }
    }
    false
}

/// Resolve the target window for a tool invocation.
///
/// With an explicit `requested` id, the window must exist. Otherwise the
/// heuristic runs in order: default window, likely modal, last interacted,
/// focused primary, selected window, first non-devtools, first window.
/// With `track_as_interacted`, the chosen id becomes the session's last
/// interacted (and selected) window.
pub fn select_window(
    managed: &mut ManagedSession,
    requested: Option<&WindowId>,
    track_as_interacted: bool,
) -> Result<WindowSelection, ServerError> {
    let windows = &managed.session.windows;

    let (window, strategy) = if let Some(id) = requested {
        let window = windows
            .iter()
            .find(|w| &w.id == id)
            .ok_or_else(|| ServerError::window_not_found(id))?;
        (window.clone(), "explicit")
    } else if windows.is_empty() {
        return Err(ServerError::WindowNotFound {
            message: format!("Session '{}' has no windows", managed.session.id),
        });
    } else if let Some(window) = managed
        .default_window_id
        .as_ref()
        .and_then(|id| windows.iter().find(|w| &w.id == id))
    {
        (window.clone(), "default_window")
    } else if let Some(window) = windows.iter().find(|w| is_likely_modal(w, windows)) {
        (window.clone(), "likely_modal")
    } else if let Some(window) = managed
        .last_interacted_window_id
        .as_ref()
        .and_then(|id| windows.iter().find(|w| &w.id == id))
    {
        (window.clone(), "last_interacted")
    } else if let Some(window) = windows
        .iter()
        .find(|w| w.kind == WindowKind::Primary && w.focused)
    {
        (window.clone(), "focused_primary")
    } else if let Some(window) = managed
        .session
        .selected_window_id
        .as_ref()
        .and_then(|id| windows.iter().find(|w| &w.id == id))
    {
        (window.clone(), "selected_window")
    } else if let Some(window) = windows.iter().find(|w| w.kind != WindowKind::Devtools) {
        (window.clone(), "first_non_devtools")
    } else {
        (windows[0].clone(), "first_window")
    };

    if track_as_interacted {
        managed.last_interacted_window_id = Some(window.id.clone());
        managed.session.selected_window_id = Some(window.id.clone());
    }

    Ok(WindowSelection { window, strategy })
}

/// Replace the session's window list with a fresh driver report, keeping
/// derived pointers consistent.
pub fn apply_window_refresh(managed: &mut ManagedSession, windows: Vec<Window>) {
    if let Some(focused_primary) = windows
        .iter()
        .find(|w| w.kind == WindowKind::Primary && w.focused)
    {
        managed.last_focused_primary_window_id = Some(focused_primary.id.clone());
    }

    let still_present = |id: &Option<WindowId>| {
        id.as_ref()
            .is_some_and(|id| windows.iter().any(|w| &w.id == id))
    };
    if !still_present(&managed.default_window_id) {
        managed.default_window_id = None;
    }
    if !still_present(&managed.last_interacted_window_id) {
        managed.last_interacted_window_id = None;
    }
    if !still_present(&managed.session.selected_window_id) {
        managed.session.selected_window_id = None;
    }

    managed.session.windows = windows;
}
