//! Subprocess management for launch orchestration.

use std::time::Duration;

/// RAII guard that kills a child process (and its process group on Unix) on
/// drop.
///
/// Wrap a spawned `tokio::process::Child` immediately after `spawn()` so the
/// child cannot outlive a cancelled launch. Call `disarm()` once the process
/// has been shut down deliberately.
#[derive(Debug)]
pub struct ChildGuard {
    child: Option<tokio::process::Child>,
}

impl ChildGuard {
    #[must_use]
    pub fn new(child: tokio::process::Child) -> Self {
        Self { child: Some(child) }
    }

    pub fn child_mut(&mut self) -> &mut tokio::process::Child {
        self.child.as_mut().expect("child present")
    }

    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(tokio::process::Child::id)
    }

    pub fn disarm(&mut self) {
        self.child = None;
    }

    /// Send the graceful signal, give the child a short grace period, then
    /// force-kill whatever is left. Best-effort throughout.
    pub async fn shutdown_gracefully(&mut self, grace: Duration) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        if let Some(pid) = child.id() {
            signal_group_graceful(pid);
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }
        if tokio::time::timeout(grace, child.wait()).await.is_err() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        self.child = None;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                unsafe {
                    if libc::killpg(pid as i32, libc::SIGKILL) == -1 {
                        let _ = child.start_kill();
                    }
                }
            }
            let _ = child.try_wait();
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
            let _ = child.try_wait();
        }
    }
}

/// Send SIGTERM to the child's process group (Unix). No-op elsewhere; the
/// Windows path relies on `start_kill`.
pub fn signal_group_graceful(pid: u32) {
    #[cfg(unix)]
    unsafe {
        if libc::killpg(pid as i32, libc::SIGTERM) == -1 {
            let _ = libc::kill(pid as i32, libc::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

/// Put the child in its own session (Unix only) so the whole process group
/// can be signalled together.
pub fn set_new_session(cmd: &mut tokio::process::Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        unsafe {
            cmd.as_std_mut().pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                // Linux-only: tie the child's fate to ours so a crashed
                // server does not leave dev servers running.
                #[cfg(target_os = "linux")]
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }
    #[cfg(not(unix))]
    {
        let _ = cmd;
    }
}

#[cfg(test)]
mod tests {
    use std::process::Stdio;
    use std::time::Duration;

    use super::{ChildGuard, set_new_session};

    #[cfg(unix)]
    #[tokio::test]
    async fn graceful_shutdown_reaps_a_sleeping_child() {
        let mut cmd = tokio::process::Command::new("sleep");
        cmd.arg("30").stdout(Stdio::null()).stderr(Stdio::null());
        set_new_session(&mut cmd);
        let child = cmd.spawn().unwrap();

        let mut guard = ChildGuard::new(child);
        assert!(guard.id().is_some());
        guard.shutdown_gracefully(Duration::from_secs(5)).await;
        assert!(guard.id().is_none());
    }
}
