//! One-shot command execution
//!
//! Fallback path used when no persistent session exists for a shell kind:
//! each command runs in a dedicated process with a hard wall-clock limit.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

use crate::domain::shell::ShellKind;
use crate::domain::types::EXIT_TIMEOUT;

/// Captured output of a one-shot process.
#[derive(Debug)]
pub struct OneShotOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run one wrapped command in a fresh shell process.
///
/// Exceeding `limit` kills the process; whatever output had arrived is
/// kept, the exit code becomes 124 and `[TIMEOUT]` is appended to stderr.
/// Spawn failures are reported as exit code 1, never as an error.
pub async fn run_one_shot(
    kind: ShellKind,
    wrapped: &str,
    cwd: &Path,
    limit: Duration,
) -> OneShotOutput {
    let executable = kind.executable();
    let mut command = Command::new(&executable);
    command
        .args(kind.one_shot_args(wrapped))
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("failed to spawn {executable}: {e}");
            return OneShotOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("failed to spawn {executable}: {e}"),
            };
        }
    };

    let stdout_task = child.stdout.take().map(|pipe| tokio::spawn(read_all(pipe)));
    let stderr_task = child.stderr.take().map(|pipe| tokio::spawn(read_all(pipe)));

    let (exit_code, timed_out) = match timeout(limit, child.wait()).await {
        Ok(Ok(status)) => (status.code().unwrap_or(-1), false),
        Ok(Err(e)) => {
            warn!("wait failed for one-shot {} command: {e}", kind.as_str());
            (1, false)
        }
        Err(_) => {
            warn!(
                "one-shot {} command timed out after {:?}",
                kind.as_str(),
                limit
            );
            let _ = child.kill().await;
            (EXIT_TIMEOUT, true)
        }
    };

    let stdout = collect(stdout_task).await;
    let mut stderr = collect(stderr_task).await;
    if timed_out {
        stderr = format!("{stderr}\n[TIMEOUT]").trim().to_string();
    }

    OneShotOutput {
        exit_code,
        stdout,
        stderr,
    }
}

async fn read_all<R>(mut pipe: R) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

async fn collect(task: Option<tokio::task::JoinHandle<String>>) -> String {
    match task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}
