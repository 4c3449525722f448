//! Terminal agent CLI
//!
//! Interactive driver for the policy-guarded shell core: reads a command
//! line, routes it through policy screening and the approval loop, and
//! prints the structured result. Shell-related violations pause execution
//! and prompt for an approve/edit/reject/manual decision before continuing.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use terminal_agent::config::Config;
use terminal_agent::domain::shell::ShellKind;
use terminal_agent::domain::types::PendingApproval;
use terminal_agent::infra::runtime::LocalRuntime;
use terminal_agent::infra::session::SessionPool;
use terminal_agent::service::approval::{ApprovalCoordinator, ApprovalPrompt, DecisionInput};

/// Stdin/stdout prompt used by the CLI approval flow.
struct ConsolePrompt;

#[async_trait]
impl ApprovalPrompt for ConsolePrompt {
    async fn decide(&self, pending: &PendingApproval) -> DecisionInput {
        println!("\n=== Action requires approval ===");
        println!("tool: {}", pending.tool_name);
        println!(
            "{}",
            serde_json::to_string_pretty(&pending.action)
                .unwrap_or_else(|_| pending.action.to_string())
        );

        let choice = read_line("Decision ([a]pprove/[e]dit/[r]eject/[m]anual): ")
            .unwrap_or_default();
        let payload = match choice.trim().chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('e') => read_line("Replacement arguments (JSON object): "),
            Some('m') => read_line("Response text: "),
            _ => None,
        };
        DecisionInput { choice, payload }
    }
}

fn read_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    io::stdout().flush().ok();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) => None, // EOF
        Ok(_) => Some(line.trim().to_string()),
        Err(_) => None,
    }
}

/// Open a persistent session for `kind` unless one is already running.
async fn ensure_session(sessions: &SessionPool, config: &Config, kind: ShellKind) {
    if !config.session.persistent || sessions.is_open(kind) {
        return;
    }
    let read_timeout = Duration::from_secs(config.session.read_timeout_secs);
    if let Err(e) = sessions
        .open(
            kind,
            &config.policy.root_dir,
            read_timeout,
            &config.session.startup_cmds,
        )
        .await
    {
        // One-shot execution still works without a session.
        error!("failed to open persistent {} session: {e}", kind.as_str());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Log to stderr so results on stdout stay machine-readable.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Arc::new(Config::load()?);
    info!(
        "sandbox root: {} | enforce mode: {:?}",
        config.policy.root_dir.display(),
        config.policy.enforce_mode
    );

    let sessions = Arc::new(SessionPool::new());
    let mut shell = config.default_shell;
    ensure_session(&sessions, &config, shell).await;

    let runtime = Arc::new(LocalRuntime::new(config.clone(), sessions.clone()));
    let coordinator = ApprovalCoordinator::new(runtime, Arc::new(ConsolePrompt));
    let session_id = uuid::Uuid::new_v4().simple().to_string();

    println!(
        ">_ terminal agent: using {} by default.\n\
         Type 'exit' to quit, or 'use bash' / 'use powershell' to switch.",
        shell.as_str()
    );

    loop {
        let Some(line) = read_line("> ") else { break };

        match line.to_ascii_lowercase().as_str() {
            "" => continue,
            "exit" | "quit" => break,
            "use bash" | "bash" => {
                shell = ShellKind::Bash;
                ensure_session(&sessions, &config, shell).await;
                println!("switched to bash");
                continue;
            }
            "use powershell" | "powershell" | "pwsh" => {
                shell = ShellKind::PowerShell;
                ensure_session(&sessions, &config, shell).await;
                println!("switched to powershell");
                continue;
            }
            _ => {}
        }

        let input = json!({
            "tool": shell.tool_name(),
            "commands": [line],
        });
        match coordinator.run(input, &session_id).await {
            Ok(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
            Err(e) => error!("invocation failed: {e}"),
        }
    }

    sessions.shutdown().await;
    println!("session ended");
    Ok(())
}
