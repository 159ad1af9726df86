//! Session ownership: lifecycle, TTL eviction, and cleanup composition.
//!
//! Cleanup is an explicit LIFO hook list per managed session. Subsystems
//! that need teardown (trace recording, dev-server children) push a hook;
//! hooks run newest-first, and closing the driver session is always the
//! sentinel tail. Eviction removes entries under the store lock, then runs
//! the async cleanup outside it.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use gantry_types::{
    Session, SessionId, SessionState, SessionSummary, ServerError, TraceState, WindowId,
    now_unix_ms,
};

use crate::driver::{AutomationDriver, DriverSession};
use crate::refmap::RefMap;

/// Future returned by one cleanup hook.
pub type CleanupFut = Pin<Box<dyn Future<Output = Result<(), ServerError>> + Send>>;

/// One registered cleanup step. Hooks capture what they need (paths,
/// process handles) and run exactly once.
pub type CleanupHook = Box<dyn FnOnce() -> CleanupFut + Send>;

/// A session plus the runtime-internal state the wire never sees.
pub struct ManagedSession {
    pub session: Session,
    pub driver: Option<Arc<dyn AutomationDriver>>,
    pub driver_session: Option<DriverSession>,
    pub default_window_id: Option<WindowId>,
    pub last_interacted_window_id: Option<WindowId>,
    pub last_focused_primary_window_id: Option<WindowId>,
    pub ref_maps: HashMap<WindowId, RefMap>,
    /// Guards against wrapping the trace teardown twice.
    pub trace_cleanup_registered: bool,
    cleanup_hooks: Vec<CleanupHook>,
}

impl fmt::Debug for ManagedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedSession")
            .field("session_id", &self.session.id)
            .field("state", &self.session.state)
            .field("windows", &self.session.windows.len())
            .field("cleanup_hooks", &self.cleanup_hooks.len())
            .finish_non_exhaustive()
    }
}

impl ManagedSession {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session,
            driver: None,
            driver_session: None,
            default_window_id: None,
            last_interacted_window_id: None,
            last_focused_primary_window_id: None,
            ref_maps: HashMap::new(),
            trace_cleanup_registered: false,
            cleanup_hooks: Vec::new(),
        }
    }

    /// Register a cleanup hook. Later registrations run earlier.
    pub fn push_cleanup(&mut self, hook: CleanupHook) {
        self.cleanup_hooks.push(hook);
    }

    #[must_use]
    pub fn cleanup_hook_count(&self) -> usize {
        self.cleanup_hooks.len()
    }
}

/// A cleanup failure, recorded rather than raised.
#[derive(Debug)]
pub struct CleanupFailure {
    pub session_id: SessionId,
    pub error: ServerError,
}

/// Owner of all active sessions.
#[derive(Debug)]
pub struct SessionManager {
    ttl_ms: u64,
    inner: Mutex<IndexMap<SessionId, ManagedSession>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl_ms,
            inner: Mutex::new(IndexMap::new()),
        }
    }

    #[must_use]
    pub const fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn add(&self, managed: ManagedSession) {
        let mut inner = self.inner.lock().expect("session store poisoned");
        inner.insert(managed.session.id.clone(), managed);
    }

    #[must_use]
    pub fn has(&self, id: &SessionId) -> bool {
        self.inner
            .lock()
            .expect("session store poisoned")
            .contains_key(id)
    }

    /// Clone of the public session record.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.inner
            .lock()
            .expect("session store poisoned")
            .get(id)
            .map(|m| m.session.clone())
    }

    pub fn get_or_err(&self, id: &SessionId) -> Result<Session, ServerError> {
        self.get(id)
            .ok_or_else(|| ServerError::SessionNotFound { id: id.clone() })
    }

    /// Remove and return the managed session without running its cleanup.
    #[must_use]
    pub fn remove(&self, id: &SessionId) -> Option<ManagedSession> {
        self.inner
            .lock()
            .expect("session store poisoned")
            .shift_remove(id)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.lock().expect("session store poisoned").len()
    }

    /// All sessions in insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<Session> {
        self.inner
            .lock()
            .expect("session store poisoned")
            .values()
            .map(|m| m.session.clone())
            .collect()
    }

    #[must_use]
    pub fn list_summaries(&self) -> Vec<SessionSummary> {
        self.inner
            .lock()
            .expect("session store poisoned")
            .values()
            .map(|m| m.session.summary())
            .collect()
    }

    /// Bump activity stamps; no-op when the session is unknown.
    pub fn touch(&self, id: &SessionId) {
        let now = now_unix_ms();
        let mut inner = self.inner.lock().expect("session store poisoned");
        if let Some(managed) = inner.get_mut(id) {
            managed.session.updated_at_ms = now;
            managed.session.last_activity_at_ms = now;
        }
    }

    pub fn set_trace_state(&self, id: &SessionId, trace: TraceState) -> Result<(), ServerError> {
        self.with_session(id, |m| m.session.trace = Some(trace))
    }

    pub fn set_ref_map(
        &self,
        id: &SessionId,
        window: WindowId,
        map: RefMap,
    ) -> Result<(), ServerError> {
        self.with_session(id, |m| {
            m.ref_maps.insert(window, map);
        })
    }

    #[must_use]
    pub fn get_ref_map(&self, id: &SessionId, window: &WindowId) -> Option<RefMap> {
        self.inner
            .lock()
            .expect("session store poisoned")
            .get(id)
            .and_then(|m| m.ref_maps.get(window).cloned())
    }

    pub fn clear_ref_maps(&self, id: &SessionId) -> Result<(), ServerError> {
        self.with_session(id, |m| m.ref_maps.clear())
    }

    /// Run a closure against the managed session under the store lock.
    ///
    /// The closure must not suspend; callers extract what they need and
    /// release the lock before awaiting anything.
    pub fn with_session<R>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut ManagedSession) -> R,
    ) -> Result<R, ServerError> {
        let mut inner = self.inner.lock().expect("session store poisoned");
        let managed = inner
            .get_mut(id)
            .ok_or_else(|| ServerError::SessionNotFound { id: id.clone() })?;
        Ok(f(managed))
    }

    /// Evict every session idle past the TTL, running each one's cleanup
    /// at most once. Failures are collected, never raised.
    pub async fn cleanup_stale(&self) -> Vec<CleanupFailure> {
        let now = now_unix_ms();
        let ttl = i64::try_from(self.ttl_ms).unwrap_or(i64::MAX);
        let expired: Vec<ManagedSession> = {
            let mut inner = self.inner.lock().expect("session store poisoned");
            let ids: Vec<SessionId> = inner
                .iter()
                .filter(|(_, m)| now - m.session.last_activity_at_ms > ttl)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| inner.shift_remove(id)).collect()
        };

        let mut failures = Vec::new();
        for managed in expired {
            let id = managed.session.id.clone();
            tracing::info!(session_id = %id, "evicting stale session");
            failures.extend(run_cleanup(managed).await);
        }
        failures
    }

    /// Tear down every session, regardless of age.
    pub async fn reset(&self, reason: &str) -> Vec<CleanupFailure> {
        let all: Vec<ManagedSession> = {
            let mut inner = self.inner.lock().expect("session store poisoned");
            inner.drain(..).map(|(_, m)| m).collect()
        };
        tracing::info!(reason, sessions = all.len(), "resetting session manager");

        let mut failures = Vec::new();
        for managed in all {
            failures.extend(run_cleanup(managed).await);
        }
        failures
    }

    /// Remove one session and run its composed cleanup.
    pub async fn close_session(&self, id: &SessionId) -> Result<Vec<CleanupFailure>, ServerError> {
        let managed = self
            .remove(id)
            .ok_or_else(|| ServerError::SessionNotFound { id: id.clone() })?;
        Ok(run_cleanup(managed).await)
    }
}

/// Run a removed session's cleanup: mark it closed, run hooks newest-first,
/// then close the driver session as the sentinel tail.
pub async fn run_cleanup(mut managed: ManagedSession) -> Vec<CleanupFailure> {
    let id = managed.session.id.clone();
    managed.session.state = SessionState::Closed;

    let mut failures = Vec::new();
    while let Some(hook) = managed.cleanup_hooks.pop() {
        if let Err(error) = hook().await {
            tracing::warn!(session_id = %id, %error, "session cleanup hook failed");
            failures.push(CleanupFailure {
                session_id: id.clone(),
                error: ServerError::wrap_internal("session cleanup", error),
            });
        }
    }

    if let (Some(driver), Some(driver_session)) = (&managed.driver, &managed.driver_session) {
        if let Err(error) = driver.close(driver_session).await {
            tracing::warn!(session_id = %id, %error, "driver close failed");
            failures.push(CleanupFailure {
                session_id: id.clone(),
                error: ServerError::wrap_internal("driver close", error),
            });
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gantry_types::{
        LaunchMode, SafetyMode, Session, SessionId, SessionState, WindowId, now_unix_ms,
    };

    use super::{ManagedSession, SessionManager, run_cleanup};
    use crate::driver::DriverSession;
    use crate::refmap::RefMap;
    use crate::testing::ScriptedDriver;

    fn session(id: &str) -> Session {
        let now = now_unix_ms();
        Session {
            id: SessionId::new(id),
            state: SessionState::Running,
            mode: SafetyMode::Standard,
            launch_mode: LaunchMode::Preset,
            created_at_ms: now,
            updated_at_ms: now,
            last_activity_at_ms: now,
            artifact_dir: "/tmp/gantry".into(),
            selected_window_id: None,
            trace: None,
            windows: Vec::new(),
            metadata: Default::default(),
        }
    }

    fn managed(id: &str) -> ManagedSession {
        ManagedSession::new(session(id))
    }

    #[test]
    fn listing_preserves_insertion_order() {
        let manager = SessionManager::new(60_000);
        manager.add(managed("b"));
        manager.add(managed("a"));
        manager.add(managed("c"));
        let ids: Vec<String> = manager
            .list()
            .into_iter()
            .map(|s| s.id.into_string())
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(manager.count(), 3);
    }

    #[test]
    fn touch_bumps_activity_and_ignores_unknown_ids() {
        let manager = SessionManager::new(60_000);
        manager.add(managed("s1"));
        manager
            .with_session(&SessionId::new("s1"), |m| {
                m.session.last_activity_at_ms = 0;
            })
            .unwrap();

        manager.touch(&SessionId::new("s1"));
        assert!(manager.get(&SessionId::new("s1")).unwrap().last_activity_at_ms > 0);

        // Unknown id is a no-op, not an error.
        manager.touch(&SessionId::new("ghost"));
    }

    #[test]
    fn ref_maps_are_per_window() {
        let manager = SessionManager::new(60_000);
        manager.add(managed("s1"));
        let id = SessionId::new("s1");

        let mut map = RefMap::new();
        map.rebuild_from_snapshot(&[]);
        manager.set_ref_map(&id, WindowId::new("w1"), map).unwrap();

        assert!(manager.get_ref_map(&id, &WindowId::new("w1")).is_some());
        assert!(manager.get_ref_map(&id, &WindowId::new("w2")).is_none());

        manager.clear_ref_maps(&id).unwrap();
        assert!(manager.get_ref_map(&id, &WindowId::new("w1")).is_none());
    }

    #[tokio::test]
    async fn cleanup_stale_evicts_exactly_the_expired() {
        let manager = SessionManager::new(1_000);
        manager.add(managed("fresh"));
        manager.add(managed("stale"));
        manager
            .with_session(&SessionId::new("stale"), |m| {
                m.session.last_activity_at_ms = now_unix_ms() - 10_000;
            })
            .unwrap();

        let failures = manager.cleanup_stale().await;
        assert!(failures.is_empty());
        assert!(manager.has(&SessionId::new("fresh")));
        assert!(!manager.has(&SessionId::new("stale")));
    }

    #[tokio::test]
    async fn cleanup_runs_hooks_lifo_with_driver_close_last() {
        let driver = Arc::new(ScriptedDriver::new());
        let mut m = managed("s1");
        m.driver = Some(driver.clone());
        m.driver_session = Some(DriverSession::new("d1"));

        let d = driver.clone();
        m.push_cleanup(Box::new(move || {
            Box::pin(async move {
                d.record("first_registered");
                Ok(())
            })
        }));
        let d = driver.clone();
        m.push_cleanup(Box::new(move || {
            Box::pin(async move {
                d.record("second_registered");
                Ok(())
            })
        }));

        let failures = run_cleanup(m).await;
        assert!(failures.is_empty());
        assert_eq!(
            driver.recorded_calls(),
            vec!["second_registered", "first_registered", "close"]
        );
    }

    #[tokio::test]
    async fn cleanup_failures_are_collected_not_raised() {
        let mut m = managed("s1");
        m.push_cleanup(Box::new(|| {
            Box::pin(async { Err(gantry_types::ServerError::internal("hook exploded")) })
        }));

        let failures = run_cleanup(m).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(
            failures[0].error.code(),
            gantry_types::ErrorCode::InternalError
        );
    }

    #[tokio::test]
    async fn reset_tears_down_everything() {
        let manager = SessionManager::new(60_000);
        manager.add(managed("a"));
        manager.add(managed("b"));
        let failures = manager.reset("test shutdown").await;
        assert!(failures.is_empty());
        assert_eq!(manager.count(), 0);
    }
}
