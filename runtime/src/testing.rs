//! Scripted driver for tests.
//!
//! Downstream crates exercise the runtime against this in-memory driver:
//! scripted window lists and snapshots, recorded calls and actions, and an
//! optional launch failure for fallback paths. Not for production use.

use std::path::Path;
use std::sync::Mutex;

use gantry_types::{RawSnapshot, ServerError, Window, WindowId};

use crate::driver::{
    ActionDescriptor, AttachTarget, AutomationDriver, ConsoleEntry, DriverFut, DriverLaunchSpec,
    DriverSession, NetworkEntry,
};

/// In-memory [`AutomationDriver`] with scripted responses.
#[derive(Default)]
pub struct ScriptedDriver {
    pub windows: Mutex<Vec<Window>>,
    pub snapshot: Mutex<Option<RawSnapshot>>,
    pub console: Mutex<Vec<ConsoleEntry>>,
    pub network: Mutex<Vec<NetworkEntry>>,
    /// When set, `launch` fails with `LAUNCH_FAILED` carrying this message.
    pub launch_error: Mutex<Option<String>>,
    /// Every driver call, in order, by name.
    pub calls: Mutex<Vec<String>>,
    /// Actions performed, with their target window.
    pub actions: Mutex<Vec<(WindowId, ActionDescriptor)>>,
    /// Attach targets received.
    pub attach_targets: Mutex<Vec<AttachTarget>>,
}

impl ScriptedDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_windows(&self, windows: Vec<Window>) {
        *self.windows.lock().unwrap() = windows;
    }

    pub fn set_snapshot(&self, snapshot: RawSnapshot) {
        *self.snapshot.lock().unwrap() = Some(snapshot);
    }

    pub fn fail_launch_with(&self, message: impl Into<String>) {
        *self.launch_error.lock().unwrap() = Some(message.into());
    }

    pub fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    #[must_use]
    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl AutomationDriver for ScriptedDriver {
    fn launch(&self, _spec: DriverLaunchSpec) -> DriverFut<'_, DriverSession> {
        Box::pin(async {
            self.record("launch");
            if let Some(message) = self.launch_error.lock().unwrap().clone() {
                return Err(ServerError::launch_failed(message));
            }
            Ok(DriverSession::new("drv-1"))
        })
    }

    fn attach(&self, target: AttachTarget) -> DriverFut<'_, DriverSession> {
        Box::pin(async move {
            self.record("attach");
            self.attach_targets.lock().unwrap().push(target);
            Ok(DriverSession::new("drv-attach"))
        })
    }

    fn windows<'a>(&'a self, _session: &'a DriverSession) -> DriverFut<'a, Vec<Window>> {
        Box::pin(async {
            self.record("windows");
            Ok(self.windows.lock().unwrap().clone())
        })
    }

    fn snapshot<'a>(
        &'a self,
        _session: &'a DriverSession,
        _window: &'a WindowId,
    ) -> DriverFut<'a, RawSnapshot> {
        Box::pin(async {
            self.record("snapshot");
            self.snapshot
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ServerError::internal("no snapshot scripted"))
        })
    }

    fn perform<'a>(
        &'a self,
        _session: &'a DriverSession,
        window: &'a WindowId,
        action: ActionDescriptor,
    ) -> DriverFut<'a, ()> {
        Box::pin(async move {
            self.record("perform");
            self.actions.lock().unwrap().push((window.clone(), action));
            Ok(())
        })
    }

    fn screenshot<'a>(
        &'a self,
        _session: &'a DriverSession,
        _window: &'a WindowId,
        path: &'a Path,
    ) -> DriverFut<'a, ()> {
        Box::pin(async move {
            self.record("screenshot");
            std::fs::write(path, b"png").map_err(|e| ServerError::wrap_internal("screenshot", e))
        })
    }

    fn console_logs<'a>(
        &'a self,
        _session: &'a DriverSession,
        _window: &'a WindowId,
    ) -> DriverFut<'a, Vec<ConsoleEntry>> {
        Box::pin(async {
            self.record("console_logs");
            Ok(self.console.lock().unwrap().clone())
        })
    }

    fn network_logs<'a>(
        &'a self,
        _session: &'a DriverSession,
        _window: &'a WindowId,
    ) -> DriverFut<'a, Vec<NetworkEntry>> {
        Box::pin(async {
            self.record("network_logs");
            Ok(self.network.lock().unwrap().clone())
        })
    }

    fn start_tracing<'a>(&'a self, _session: &'a DriverSession) -> DriverFut<'a, ()> {
        Box::pin(async {
            self.record("start_tracing");
            Ok(())
        })
    }

    fn stop_tracing<'a>(
        &'a self,
        _session: &'a DriverSession,
        path: &'a Path,
    ) -> DriverFut<'a, ()> {
        Box::pin(async move {
            self.record("stop_tracing");
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ServerError::wrap_internal("trace dir", e))?;
            }
            std::fs::write(path, b"zip").map_err(|e| ServerError::wrap_internal("trace", e))
        })
    }

    fn focus_window<'a>(
        &'a self,
        _session: &'a DriverSession,
        _window: &'a WindowId,
    ) -> DriverFut<'a, ()> {
        Box::pin(async {
            self.record("focus_window");
            Ok(())
        })
    }

    fn close<'a>(&'a self, _session: &'a DriverSession) -> DriverFut<'a, ()> {
        Box::pin(async {
            self.record("close");
            Ok(())
        })
    }
}
