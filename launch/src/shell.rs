//! Shell selection for dev-server command strings.
//!
//! Dev-server commands are non-interactive `sh -c` style command lines run
//! under a fixed launch policy, so selection favors a predictable POSIX
//! shell over the operator's login shell (whose `-c` dialect may differ,
//! e.g. fish or nushell).

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

/// Shell a dev-server command line runs under.
#[derive(Debug, Clone)]
pub struct CommandShell {
    program: PathBuf,
    invocation: &'static [&'static str],
    name: &'static str,
}

impl CommandShell {
    /// Pick the shell for this platform: bash then `/bin/sh` on Unix;
    /// pwsh, then powershell, then cmd on Windows.
    #[must_use]
    pub fn detect() -> Self {
        platform_shell()
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Build the process invocation for one command line, with stdio wired
    /// for the launch output collectors.
    #[must_use]
    pub fn command(&self, command_line: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.invocation)
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl std::fmt::Display for CommandShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(not(windows))]
fn platform_shell() -> CommandShell {
    if let Ok(program) = which::which("bash") {
        return CommandShell {
            program,
            invocation: &["-c"],
            name: "bash",
        };
    }
    CommandShell {
        program: PathBuf::from("/bin/sh"),
        invocation: &["-c"],
        name: "sh",
    }
}

#[cfg(windows)]
fn platform_shell() -> CommandShell {
    for name in ["pwsh", "powershell"] {
        if let Ok(program) = which::which(name) {
            return CommandShell {
                program,
                invocation: &["-NoProfile", "-Command"],
                name,
            };
        }
    }
    let program = std::env::var_os("ComSpec")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\Windows\System32\cmd.exe"));
    CommandShell {
        program,
        invocation: &["/C"],
        name: "cmd",
    }
}
