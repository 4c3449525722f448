//! Sequential command execution with cwd continuity
//!
//! Runs an ordered batch for one shell kind. Every command is wrapped with
//! a directory-change prefix and a marker suffix so the resulting working
//! directory can be recovered from the command's own output, then
//! re-clamped to the sandbox root. The batch stops at the first failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::PolicyConfig;
use crate::domain::shell::ShellKind;
use crate::domain::types::{BatchOutcome, CommandBatch, CommandResult, EXIT_SESSION_ERROR};
use crate::error::Result;
use crate::infra::process::run_one_shot;
use crate::infra::session::{SessionPool, SESSION_CLOSED};

/// Default wall-clock limit for one-shot commands.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes command batches for a single shell kind.
///
/// Prefers the pooled persistent session when one is open for the kind;
/// otherwise each command runs in a dedicated one-shot process.
pub struct CommandExecutor {
    kind: ShellKind,
    policy: Arc<PolicyConfig>,
    sessions: Arc<SessionPool>,
    command_timeout: Duration,
}

impl CommandExecutor {
    pub fn new(kind: ShellKind, policy: Arc<PolicyConfig>, sessions: Arc<SessionPool>) -> Self {
        Self {
            kind,
            policy,
            sessions,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    /// Execute the batch in order, stopping at the first failing command.
    pub async fn execute(&self, batch: &CommandBatch) -> Result<BatchOutcome> {
        batch.validate()?;

        let start = batch
            .cwd
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.policy.root_dir.clone());
        let mut cwd = self.policy.clamp(&start);

        let mut results = Vec::with_capacity(batch.commands.len());
        for command in &batch.commands {
            let result = self.run_single(command, &cwd).await;
            cwd = self.policy.clamp(Path::new(&result.cwd));
            let exit_code = result.exit_code;
            results.push(result);

            if exit_code != 0 {
                warn!(
                    "{} batch halted: '{command}' exited with {exit_code}",
                    self.kind.tool_name()
                );
                return Ok(BatchOutcome {
                    success: false,
                    results,
                    cwd: cwd.display().to_string(),
                });
            }
        }

        Ok(BatchOutcome {
            success: true,
            results,
            cwd: cwd.display().to_string(),
        })
    }

    async fn run_single(&self, command: &str, cwd: &Path) -> CommandResult {
        let wrapped = self.kind.wrap(command, cwd);
        info!(
            "{}: running | cwd={} | cmd={}",
            self.kind.tool_name(),
            cwd.display(),
            command
        );

        let (exit_code, raw_stdout, stderr) = match self.sessions.get(self.kind) {
            Some(session) => {
                let output = session.lock().await.run(&wrapped).await;
                if output.trim() == SESSION_CLOSED {
                    (
                        EXIT_SESSION_ERROR,
                        String::new(),
                        format!("[SESSION ERROR] {SESSION_CLOSED}"),
                    )
                } else {
                    (0, output, String::new())
                }
            }
            None => {
                let out = run_one_shot(self.kind, &wrapped, cwd, self.command_timeout).await;
                (out.exit_code, out.stdout, out.stderr)
            }
        };

        let (stdout, new_cwd) = split_marker_output(&raw_stdout, self.kind.cwd_marker(), cwd);
        CommandResult {
            command: command.to_string(),
            exit_code,
            stdout,
            stderr: stderr.trim().to_string(),
            cwd: new_cwd,
        }
    }
}

/// Split captured output at the marker line.
///
/// Everything before the marker is the command's real output; the line
/// after it, when present and non-empty, is the new working directory. A
/// missing marker (e.g. output truncated by a read timeout) means all
/// captured text is output and the cwd stays unchanged. A command whose own
/// output contains the literal marker text would confuse this split; the
/// markers are chosen to make that collision vanishingly unlikely.
fn split_marker_output(raw: &str, marker: &str, current: &Path) -> (String, String) {
    let lines: Vec<&str> = raw.lines().collect();
    match lines.iter().position(|line| line.trim() == marker) {
        Some(idx) => {
            let stdout = lines[..idx].join("\n").trim().to_string();
            let cwd = lines
                .get(idx + 1)
                .map(|line| line.trim())
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| current.display().to_string());
            (stdout, cwd)
        }
        None => (raw.trim().to_string(), current.display().to_string()),
    }
}
