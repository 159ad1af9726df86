//! Dev-server spawn and readiness matching.
//!
//! The dev server runs under the detected shell with piped output. Pump
//! tasks feed both streams into the launch collectors; readiness completes
//! on the first line matching the pattern, and the deadline sends the child
//! the graceful signal before failing the launch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::{Regex, RegexBuilder};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use gantry_types::{ServerError, now_unix_ms};

use crate::diagnostics::{LaunchDiagnostics, LaunchEventKind, ReadinessRecord};
use crate::process::{ChildGuard, set_new_session};
use crate::shell::CommandShell;

pub const DEFAULT_READINESS_TIMEOUT_MS: u64 = 30_000;
const READINESS_SIGNAL_NAME: &str = "dev_server_ready";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct DevServerConfig {
    pub command: String,
    pub cwd: PathBuf,
    /// Compiled case-insensitively; a launch without a pattern skips the
    /// readiness wait entirely.
    pub ready_pattern: Option<String>,
    pub timeout_ms: u64,
    pub env: Vec<(String, String)>,
}

/// A running dev server. Dropping the handle kills the child; prefer
/// [`DevServerHandle::shutdown`] for a graceful stop.
#[derive(Debug)]
pub struct DevServerHandle {
    guard: ChildGuard,
    pub pid: Option<u32>,
}

impl DevServerHandle {
    /// Graceful signal, short grace period, then force kill.
    pub async fn shutdown(mut self) {
        self.guard.shutdown_gracefully(SHUTDOWN_GRACE).await;
    }
}

/// Compile a user-supplied readiness pattern, always case-insensitive.
pub fn compile_ready_pattern(pattern: &str) -> Result<Regex, ServerError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ServerError::invalid_input(format!("Invalid ready pattern '{pattern}': {e}")))
}

enum Stream {
    Stdout,
    Stderr,
}

fn pump<R>(
    mut reader: R,
    diagnostics: Arc<LaunchDiagnostics>,
    stream: Stream,
    pattern: Option<Regex>,
    ready_tx: mpsc::Sender<String>,
) where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
            let completed = {
                let collector = match stream {
                    Stream::Stdout => &diagnostics.stdout,
                    Stream::Stderr => &diagnostics.stderr,
                };
                collector
                    .lock()
                    .expect("collector poisoned")
                    .push_chunk(&chunk)
            };
            if let Some(pattern) = &pattern {
                for line in &completed {
                    if pattern.is_match(line) {
                        let _ = ready_tx.try_send(line.clone());
                    }
                }
            }
        }
        let flushed = {
            let collector = match stream {
                Stream::Stdout => &diagnostics.stdout,
                Stream::Stderr => &diagnostics.stderr,
            };
            collector.lock().expect("collector poisoned").flush()
        };
        if let (Some(pattern), Some(line)) = (&pattern, flushed) {
            if pattern.is_match(&line) {
                let _ = ready_tx.try_send(line);
            }
        }
    });
}

/// Spawn the dev server and wait for its readiness signal.
pub async fn start_dev_server(
    config: DevServerConfig,
    diagnostics: Arc<LaunchDiagnostics>,
) -> Result<DevServerHandle, ServerError> {
    let pattern = config
        .ready_pattern
        .as_deref()
        .map(compile_ready_pattern)
        .transpose()?;

    let shell = CommandShell::detect();
    let mut cmd = shell.command(&config.command);
    cmd.current_dir(&config.cwd);
    for (key, value) in &config.env {
        cmd.env(key, value);
    }
    set_new_session(&mut cmd);

    let mut child = cmd.spawn().map_err(|e| {
        ServerError::launch_failed(format!(
            "Failed to spawn dev server '{}' under {shell}: {e}",
            config.command
        ))
    })?;
    let pid = child.id();
    diagnostics.record_event(
        LaunchEventKind::Process,
        format!("dev server spawned (pid {pid:?}, shell {shell})"),
    );

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut guard = ChildGuard::new(child);

    let (ready_tx, mut ready_rx) = mpsc::channel::<String>(4);
    if let Some(stdout) = stdout {
        pump(
            stdout,
            diagnostics.clone(),
            Stream::Stdout,
            pattern.clone(),
            ready_tx.clone(),
        );
    }
    if let Some(stderr) = stderr {
        pump(
            stderr,
            diagnostics.clone(),
            Stream::Stderr,
            pattern.clone(),
            ready_tx.clone(),
        );
    }
    drop(ready_tx);

    if pattern.is_some() {
        let started_at_ms = now_unix_ms();
        let started = Instant::now();
        let outcome =
            tokio::time::timeout(Duration::from_millis(config.timeout_ms), ready_rx.recv()).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        let finished_at_ms = now_unix_ms();

        match outcome {
            Ok(Some(line)) => {
                diagnostics.record_event(
                    LaunchEventKind::Signal,
                    format!("readiness signal matched: {line}"),
                );
                diagnostics
                    .readiness
                    .lock()
                    .expect("readiness timeline poisoned")
                    .push(ReadinessRecord {
                        signal_name: READINESS_SIGNAL_NAME.to_string(),
                        attempt: 1,
                        started_at_ms,
                        finished_at_ms,
                        duration_ms,
                        ready: true,
                        timed_out: false,
                        detail: Some(line),
                    });
            }
            Ok(None) | Err(_) => {
                let timed_out = outcome.is_err();
                diagnostics
                    .readiness
                    .lock()
                    .expect("readiness timeline poisoned")
                    .push(ReadinessRecord {
                        signal_name: READINESS_SIGNAL_NAME.to_string(),
                        attempt: 1,
                        started_at_ms,
                        finished_at_ms,
                        duration_ms,
                        ready: false,
                        timed_out,
                        detail: None,
                    });
                diagnostics.record_event(
                    LaunchEventKind::Signal,
                    "sending graceful signal to dev server",
                );
                guard.shutdown_gracefully(SHUTDOWN_GRACE).await;

                let message = if timed_out {
                    "Timed out waiting for dev server readiness signal".to_string()
                } else {
                    "Dev server exited before emitting a readiness signal".to_string()
                };
                return Err(ServerError::LaunchFailed {
                    message,
                    diagnostics: Some(diagnostics.snapshot()),
                });
            }
        }
    }

    Ok(DevServerHandle { guard, pid })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gantry_types::ErrorCode;

    use super::{DevServerConfig, compile_ready_pattern, start_dev_server};
    use crate::diagnostics::LaunchDiagnostics;

    fn config(command: &str, pattern: Option<&str>, timeout_ms: u64) -> DevServerConfig {
        DevServerConfig {
            command: command.to_string(),
            cwd: std::env::temp_dir(),
            ready_pattern: pattern.map(ToString::to_string),
            timeout_ms,
            env: Vec::new(),
        }
    }

    #[test]
    fn invalid_pattern_is_invalid_input() {
        let err = compile_ready_pattern("[unclosed").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn readiness_matches_case_insensitively() {
        let diagnostics = Arc::new(LaunchDiagnostics::new());
        let handle = start_dev_server(
            config("echo 'Server Ready in 120ms'; sleep 5", Some("ready"), 5_000),
            diagnostics.clone(),
        )
        .await
        .unwrap();

        let records = diagnostics
            .readiness
            .lock()
            .unwrap()
            .records()
            .to_vec();
        assert_eq!(records.len(), 1);
        assert!(records[0].ready);
        assert!(records[0].detail.as_deref().unwrap().contains("Ready"));
        handle.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_the_child_and_reports_the_timeline() {
        let diagnostics = Arc::new(LaunchDiagnostics::new());
        let err = start_dev_server(
            config("echo 'still starting'; sleep 30", Some("ready"), 150),
            diagnostics.clone(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), ErrorCode::LaunchFailed);
        assert!(
            err.to_string()
                .contains("Timed out waiting for dev server readiness signal")
        );
        let details = err.details().expect("timeout carries diagnostics");
        assert!(details["readiness"][0]["timed_out"].as_bool().unwrap());
        assert_eq!(details["stdout_tail"][0], "still starting");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn child_exit_without_signal_fails_the_launch() {
        let diagnostics = Arc::new(LaunchDiagnostics::new());
        let err = start_dev_server(
            config("echo 'boot failed' >&2; exit 1", Some("ready"), 5_000),
            diagnostics.clone(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), ErrorCode::LaunchFailed);
        assert!(err.to_string().contains("exited before"));
        let details = err.details().unwrap();
        assert_eq!(details["stderr_tail"][0], "boot failed");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn no_pattern_skips_the_readiness_wait() {
        let diagnostics = Arc::new(LaunchDiagnostics::new());
        let handle = start_dev_server(config("sleep 5", None, 100), diagnostics.clone())
            .await
            .unwrap();
        assert!(diagnostics.readiness.lock().unwrap().records().is_empty());
        handle.shutdown().await;
    }
}
