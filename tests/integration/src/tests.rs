//! Integration tests for the terminal agent core
//!
//! Every test uses a fresh tempdir as its sandbox root and real
//! `/bin/bash` subprocesses.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use integration_tests::*;
use terminal_agent::config::{EnforceMode, PolicyConfig};
use terminal_agent::domain::shell::ShellKind;
use terminal_agent::domain::types::{CommandBatch, ResumeDecision, ResumePayload, EXIT_TIMEOUT};
use terminal_agent::infra::runtime::{AgentRuntime, LocalRuntime};
use terminal_agent::infra::session::{SessionPool, ShellSession, SESSION_CLOSED};
use terminal_agent::service::approval::ApprovalCoordinator;
use terminal_agent::service::executor::CommandExecutor;

fn bash_executor(root: &Path, sessions: Arc<SessionPool>) -> CommandExecutor {
    let policy = Arc::new(PolicyConfig {
        root_dir: root.to_path_buf(),
        ..PolicyConfig::default()
    });
    CommandExecutor::new(ShellKind::Bash, policy, sessions)
}

fn batch(commands: &[&str]) -> CommandBatch {
    CommandBatch {
        commands: commands.iter().map(|c| c.to_string()).collect(),
        cwd: None,
    }
}

fn canon(path: &Path) -> String {
    path.canonicalize()
        .expect("canonicalize")
        .display()
        .to_string()
}

// ============================================================================
// Executor tests (one-shot path)
// ============================================================================

#[tokio::test]
async fn echo_hello_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    let exec = bash_executor(root.path(), Arc::new(SessionPool::new()));

    let outcome = exec.execute(&batch(&["echo hello"])).await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.results.len(), 1);
    let result = &outcome.results[0];
    assert_eq!(result.command, "echo hello");
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "hello");
    assert_eq!(result.stderr, "");
    assert_eq!(result.cwd, canon(root.path()));
    assert_eq!(outcome.cwd, canon(root.path()));
}

#[tokio::test]
async fn pwd_is_idempotent_from_the_same_start() {
    let root = tempfile::tempdir().unwrap();
    let exec = bash_executor(root.path(), Arc::new(SessionPool::new()));

    let first = exec.execute(&batch(&["pwd"])).await.unwrap();
    let second = exec.execute(&batch(&["pwd"])).await.unwrap();

    assert_eq!(first.results[0].cwd, second.results[0].cwd);
    assert_eq!(first.cwd, second.cwd);
}

#[tokio::test]
async fn batch_halts_at_first_failing_command() {
    let root = tempfile::tempdir().unwrap();
    let exec = bash_executor(root.path(), Arc::new(SessionPool::new()));

    let outcome = exec
        .execute(&batch(&[
            "echo first",
            "ls /definitely-not-a-real-path-xyz",
            "echo never",
        ]))
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[0].stdout, "first");
    assert_ne!(outcome.results[1].exit_code, 0);
    assert!(!outcome.results[1].stderr.is_empty());
}

#[tokio::test]
async fn cd_propagates_across_commands() {
    let root = tempfile::tempdir().unwrap();
    let exec = bash_executor(root.path(), Arc::new(SessionPool::new()));

    let outcome = exec
        .execute(&batch(&["mkdir -p sub", "cd sub", "pwd"]))
        .await
        .unwrap();

    assert!(outcome.success);
    let sub = canon(&root.path().join("sub"));
    assert_eq!(outcome.results[2].stdout, sub);
    assert_eq!(outcome.cwd, sub);
}

#[tokio::test]
async fn starting_cwd_outside_sandbox_is_clamped_to_root() {
    let root = tempfile::tempdir().unwrap();
    let exec = bash_executor(root.path(), Arc::new(SessionPool::new()));

    let outcome = exec
        .execute(&CommandBatch {
            commands: vec!["pwd".to_string()],
            cwd: Some("/etc".to_string()),
        })
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.results[0].stdout, canon(root.path()));
}

#[tokio::test]
async fn escaping_cd_is_reclamped_before_the_next_command() {
    let root = tempfile::tempdir().unwrap();
    let exec = bash_executor(root.path(), Arc::new(SessionPool::new()));

    let outcome = exec.execute(&batch(&["cd ..", "pwd"])).await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.results[1].stdout, canon(root.path()));
    assert_eq!(outcome.cwd, canon(root.path()));
}

#[tokio::test]
async fn one_shot_timeout_reports_124_and_marker() {
    let root = tempfile::tempdir().unwrap();
    let exec = bash_executor(root.path(), Arc::new(SessionPool::new()))
        .with_timeout(Duration::from_millis(500));

    let start = Instant::now();
    let outcome = exec.execute(&batch(&["sleep 5"])).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(4));
    assert!(!outcome.success);
    assert_eq!(outcome.results[0].exit_code, EXIT_TIMEOUT);
    assert!(outcome.results[0].stderr.contains("[TIMEOUT]"));
}

// ============================================================================
// Session tests
// ============================================================================

#[tokio::test]
async fn session_runs_commands_and_returns_output() {
    let root = tempfile::tempdir().unwrap();
    let mut session =
        ShellSession::spawn(ShellKind::Bash, root.path(), Duration::from_secs(5)).unwrap();

    let out = session.run("echo from-session").await;
    assert!(out.contains("from-session"));

    session.terminate();
}

#[tokio::test]
async fn slow_command_with_short_read_timeout_returns_partial_output() {
    let root = tempfile::tempdir().unwrap();
    let mut session =
        ShellSession::spawn(ShellKind::Bash, root.path(), Duration::from_millis(400)).unwrap();

    let start = Instant::now();
    let out = session.run("sleep 3 && echo late").await;

    assert!(
        start.elapsed() < Duration::from_secs(2),
        "run must give up at the read deadline"
    );
    assert!(!out.contains("late"));

    session.terminate();
}

#[tokio::test]
async fn terminate_is_idempotent_and_closes_the_session() {
    let root = tempfile::tempdir().unwrap();
    let mut session =
        ShellSession::spawn(ShellKind::Bash, root.path(), Duration::from_secs(1)).unwrap();

    session.terminate();
    session.terminate();

    let out = session.run("echo anything").await;
    assert_eq!(out, SESSION_CLOSED);
}

#[tokio::test]
async fn executor_prefers_the_pooled_session() {
    let root = tempfile::tempdir().unwrap();
    let sessions = Arc::new(SessionPool::new());
    sessions
        .open(ShellKind::Bash, root.path(), Duration::from_secs(5), &[])
        .await
        .unwrap();
    let exec = bash_executor(root.path(), sessions.clone());

    let outcome = exec.execute(&batch(&["echo via-session"])).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.results[0].stdout, "via-session");
    assert_eq!(outcome.results[0].exit_code, 0);

    let outcome = exec
        .execute(&batch(&["mkdir -p nest", "cd nest"]))
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.cwd, canon(&root.path().join("nest")));

    sessions.shutdown().await;
}

#[tokio::test]
async fn terminated_session_fails_the_batch() {
    let root = tempfile::tempdir().unwrap();
    let sessions = Arc::new(SessionPool::new());
    sessions
        .open(ShellKind::Bash, root.path(), Duration::from_secs(5), &[])
        .await
        .unwrap();
    let exec = bash_executor(root.path(), sessions.clone());

    sessions
        .get(ShellKind::Bash)
        .unwrap()
        .lock()
        .await
        .terminate();

    let outcome = exec
        .execute(&batch(&["echo unreachable", "echo also-unreachable"]))
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].exit_code, 1);
    assert!(outcome.results[0].stderr.contains("[SESSION ERROR]"));
}

#[tokio::test]
async fn startup_commands_run_before_first_use() {
    let root = tempfile::tempdir().unwrap();
    let sessions = Arc::new(SessionPool::new());
    sessions
        .open(
            ShellKind::Bash,
            root.path(),
            Duration::from_secs(5),
            &["export GREETING=hi-there".to_string()],
        )
        .await
        .unwrap();

    let session = sessions.get(ShellKind::Bash).unwrap();
    let out = session.lock().await.run("echo $GREETING").await;
    assert!(out.contains("hi-there"));

    sessions.shutdown().await;
}

// ============================================================================
// Policy + approval flow tests (LocalRuntime)
// ============================================================================

#[tokio::test]
async fn deny_listed_command_is_surfaced_for_approval_not_executed() {
    let root = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(root.path()));
    let runtime = LocalRuntime::new(config, Arc::new(SessionPool::new()));

    let outcome = runtime
        .invoke(json!({"tool": "bash_tool", "commands": ["rm -rf /"]}), "s1")
        .await
        .unwrap();
    assert_eq!(outcome["status"], "interrupted");

    let interrupt = runtime.current_suspension("s1").await.unwrap().unwrap();
    let request = &interrupt[0]["action_request"];
    assert_eq!(request["tool"], "bash_tool");
    assert_eq!(request["cmd"], "rm -rf /");

    let rejected = runtime
        .resume(ResumePayload::single(ResumeDecision::Reject, "bash_tool"), "s1")
        .await
        .unwrap();
    assert_eq!(rejected["status"], "rejected");
    assert!(runtime.current_suspension("s1").await.unwrap().is_none());
}

#[tokio::test]
async fn approve_executes_the_suspended_batch() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    // Denying `echo` lets the approval path run something harmless.
    config.policy.dangerous_bash.push("echo".to_string());
    let runtime = LocalRuntime::new(Arc::new(config), Arc::new(SessionPool::new()));

    let outcome = runtime
        .invoke(
            json!({"tool": "bash_tool", "commands": ["echo approved-run"]}),
            "s1",
        )
        .await
        .unwrap();
    assert_eq!(outcome["status"], "interrupted");

    let outcome = runtime
        .resume(ResumePayload::single(ResumeDecision::Approve, "bash_tool"), "s1")
        .await
        .unwrap();
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["results"][0]["stdout"], "approved-run");
}

#[tokio::test]
async fn edit_replaces_the_batch_before_execution() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.policy.dangerous_bash.push("echo".to_string());
    let runtime = LocalRuntime::new(Arc::new(config), Arc::new(SessionPool::new()));

    runtime
        .invoke(
            json!({"tool": "bash_tool", "commands": ["echo original"]}),
            "s1",
        )
        .await
        .unwrap();

    let decision = ResumeDecision::Edit {
        args: json!({"commands": ["echo edited"]}),
    };
    let outcome = runtime
        .resume(ResumePayload::single(decision, "bash_tool"), "s1")
        .await
        .unwrap();
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["results"][0]["stdout"], "edited");
}

#[tokio::test]
async fn warn_only_executes_and_reports_warnings() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.policy.enforce_mode = EnforceMode::WarnOnly;
    config.policy.dangerous_bash.push("echo".to_string());
    let runtime = LocalRuntime::new(Arc::new(config), Arc::new(SessionPool::new()));

    let outcome = runtime
        .invoke(
            json!({"tool": "bash_tool", "commands": ["echo flagged"]}),
            "s1",
        )
        .await
        .unwrap();

    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["results"][0]["stdout"], "flagged");
    assert!(outcome["warnings"][0]
        .as_str()
        .unwrap()
        .contains("Dangerous"));
}

#[tokio::test]
async fn defer_mode_suspends_even_compliant_commands() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.policy.enforce_mode = EnforceMode::DeferToApproval;
    let runtime = LocalRuntime::new(Arc::new(config), Arc::new(SessionPool::new()));

    let outcome = runtime
        .invoke(json!({"tool": "bash_tool", "commands": ["echo hi"]}), "s1")
        .await
        .unwrap();
    assert_eq!(outcome["status"], "interrupted");
    assert!(runtime.current_suspension("s1").await.unwrap().is_some());
}

// ============================================================================
// Coordinator end-to-end (real runtime, scripted human)
// ============================================================================

#[tokio::test]
async fn coordinator_approve_flow_runs_the_command() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.policy.dangerous_bash.push("echo".to_string());
    let runtime = Arc::new(LocalRuntime::new(
        Arc::new(config),
        Arc::new(SessionPool::new()),
    ));
    let prompt = Arc::new(ScriptedPrompt::new(vec![ScriptedPrompt::reply("a")]));
    let coordinator = ApprovalCoordinator::new(runtime, prompt);

    let outcome = coordinator
        .run(json!({"tool": "bash_tool", "commands": ["echo ok"]}), "s1")
        .await
        .unwrap();

    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["results"][0]["stdout"], "ok");
}

#[tokio::test]
async fn coordinator_defaults_unrecognized_input_to_reject() {
    let root = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(root.path()));
    let runtime = Arc::new(LocalRuntime::new(config, Arc::new(SessionPool::new())));
    let prompt = Arc::new(ScriptedPrompt::new(vec![ScriptedPrompt::reply(
        "hmm, not sure",
    )]));
    let coordinator = ApprovalCoordinator::new(runtime, prompt);

    let outcome = coordinator
        .run(json!({"tool": "bash_tool", "commands": ["sudo ls"]}), "s1")
        .await
        .unwrap();

    assert_eq!(outcome["status"], "rejected");
}

#[tokio::test]
async fn coordinator_edit_flow_substitutes_arguments() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.policy.dangerous_bash.push("echo".to_string());
    let runtime = Arc::new(LocalRuntime::new(
        Arc::new(config),
        Arc::new(SessionPool::new()),
    ));
    let prompt = Arc::new(ScriptedPrompt::new(vec![
        ScriptedPrompt::reply_with_payload("e", r#"{"commands": ["echo patched"]}"#),
    ]));
    let coordinator = ApprovalCoordinator::new(runtime, prompt);

    let outcome = coordinator
        .run(json!({"tool": "bash_tool", "commands": ["echo original"]}), "s1")
        .await
        .unwrap();

    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["results"][0]["stdout"], "patched");
}
