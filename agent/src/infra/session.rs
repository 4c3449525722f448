//! Persistent shell sessions
//!
//! One long-lived shell subprocess per shell kind, reused across commands so
//! shell-level state (environment, history, cwd) carries over between calls.
//! Reader tasks pump the process's stdout and stderr into a single queue,
//! decoupling output production from consumption; `run` delimits each
//! command's output with a per-call sentinel.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::domain::shell::ShellKind;
use crate::error::{Error, Result};

/// Returned by [`ShellSession::run`] when the session's stdin is gone.
pub const SESSION_CLOSED: &str = "[session closed]";

/// A long-lived shell subprocess with line-oriented request/response.
///
/// Callers must serialize access: one in-flight `run` per session. The
/// read deadline bounds how long `run` waits, not the command itself: a
/// command that outlives the deadline keeps running, and its remaining
/// output is drained (as unrelated lines) by the next call.
pub struct ShellSession {
    kind: ShellKind,
    child: Child,
    stdin: Option<ChildStdin>,
    output_rx: mpsc::UnboundedReceiver<String>,
    read_timeout: Duration,
}

impl ShellSession {
    /// Spawn the shell in `cwd` and start pumping its merged output.
    pub fn spawn(kind: ShellKind, cwd: &Path, read_timeout: Duration) -> Result<Self> {
        let executable = kind.executable();
        let mut command = Command::new(&executable);
        command
            .args(kind.session_args())
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| Error::SessionSpawnFailed(format!("{executable}: {e}")))?;

        let stdin = child.stdin.take();
        let (tx, output_rx) = mpsc::unbounded_channel();

        // stdout and stderr feed the same queue, merging the two streams.
        if let Some(stdout) = child.stdout.take() {
            spawn_line_pump(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_pump(stderr, tx);
        }

        info!("{} session started in {}", kind.as_str(), cwd.display());
        Ok(Self {
            kind,
            child,
            stdin,
            output_rx,
            read_timeout,
        })
    }

    /// Run one command and collect combined output until the sentinel line
    /// arrives or the read deadline elapses.
    ///
    /// On deadline, whatever was collected so far is returned; the command's
    /// completion is not guaranteed. A closed stdin yields the literal
    /// [`SESSION_CLOSED`] marker instead of an error.
    pub async fn run(&mut self, command: &str) -> String {
        let sentinel = next_sentinel();
        let payload = format!("{command}\n{} {sentinel}\n", self.kind.echo_builtin());

        let Some(stdin) = self.stdin.as_mut() else {
            return SESSION_CLOSED.to_string();
        };
        if stdin.write_all(payload.as_bytes()).await.is_err()
            || stdin.flush().await.is_err()
        {
            warn!("{} session stdin is gone", self.kind.as_str());
            self.stdin = None;
            return SESSION_CLOSED.to_string();
        }

        let deadline = Instant::now() + self.read_timeout;
        let mut collected = String::new();
        loop {
            match timeout_at(deadline, self.output_rx.recv()).await {
                Ok(Some(line)) => {
                    let done = line.contains(&sentinel);
                    collected.push_str(&line);
                    collected.push('\n');
                    if done {
                        break;
                    }
                }
                Ok(None) => {
                    // Both pumps ended: the process's output is closed.
                    debug!("{} session output stream closed", self.kind.as_str());
                    break;
                }
                Err(_) => {
                    warn!(
                        "{} session read timed out after {:?}",
                        self.kind.as_str(),
                        self.read_timeout
                    );
                    break;
                }
            }
        }
        collected
    }

    /// Best-effort kill of the subprocess. Idempotent, never fails.
    pub fn terminate(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!("{} session already terminated: {e}", self.kind.as_str());
        }
        self.stdin = None;
    }
}

fn spawn_line_pump<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

/// Sentinel unique to one `run` call, derived from a high-resolution
/// timestamp. Collision with real command output is possible in principle
/// but vanishingly unlikely.
fn next_sentinel() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("__END_{nanos}__")
}

/// Registry of persistent sessions: at most one per shell kind per run.
///
/// Entries are mutex-guarded so command batches serialize on the session;
/// different shell kinds may run concurrently.
pub struct SessionPool {
    sessions: DashMap<ShellKind, Arc<Mutex<ShellSession>>>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Open a session for `kind`, replacing (and terminating) any existing
    /// one. Startup commands run once; their output is discarded.
    pub async fn open(
        &self,
        kind: ShellKind,
        cwd: &Path,
        read_timeout: Duration,
        startup_cmds: &[String],
    ) -> Result<()> {
        let mut session = ShellSession::spawn(kind, cwd, read_timeout)?;
        for cmd in startup_cmds {
            let _ = session.run(cmd).await;
        }
        if let Some(previous) = self.sessions.insert(kind, Arc::new(Mutex::new(session))) {
            previous.lock().await.terminate();
        }
        Ok(())
    }

    /// The live session for `kind`, if one is open.
    pub fn get(&self, kind: ShellKind) -> Option<Arc<Mutex<ShellSession>>> {
        self.sessions.get(&kind).map(|entry| entry.value().clone())
    }

    pub fn is_open(&self, kind: ShellKind) -> bool {
        self.sessions.contains_key(&kind)
    }

    /// Terminate every session. Called at agent teardown.
    pub async fn shutdown(&self) {
        for entry in self.sessions.iter() {
            entry.value().lock().await.terminate();
        }
        self.sessions.clear();
        info!("all shell sessions terminated");
    }
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new()
    }
}
