//! Orchestration runtime contract and a local reference implementation
//!
//! The core never owns the suspension mechanism itself; it consumes this
//! three-operation contract. [`LocalRuntime`] is the minimal realization
//! used by the CLI and tests: policy screening in front of the command
//! executor, with a single pending-suspension slot per session id. It is
//! not a task graph or checkpoint store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::{Config, EnforceMode, PolicyConfig};
use crate::domain::shell::ShellKind;
use crate::domain::types::{CommandBatch, ResumePayload, ToolInvocation};
use crate::error::{Error, Result};
use crate::infra::session::SessionPool;
use crate::service::executor::CommandExecutor;
use crate::service::policy::PolicyValidator;

/// Suspension/resumption contract supplied by the orchestration runtime.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Drive one invocation for `session_id`.
    async fn invoke(&self, input: Value, session_id: &str) -> Result<Value>;

    /// Raw interrupt value of the currently suspended task, if any.
    async fn current_suspension(&self, session_id: &str) -> Result<Option<Value>>;

    /// Apply a decision to the suspended task and continue it.
    async fn resume(&self, payload: ResumePayload, session_id: &str) -> Result<Value>;
}

/// A suspended tool invocation held until a decision arrives.
struct Suspended {
    kind: ShellKind,
    batch: CommandBatch,
    interrupt: Value,
}

/// Reference [`AgentRuntime`]: validates each command against the policy,
/// suspends per the enforcement mode, and executes approved batches.
pub struct LocalRuntime {
    policy: Arc<PolicyConfig>,
    validator: PolicyValidator,
    sessions: Arc<SessionPool>,
    command_timeout: Duration,
    pending: DashMap<String, Suspended>,
}

impl LocalRuntime {
    pub fn new(config: Arc<Config>, sessions: Arc<SessionPool>) -> Self {
        let policy = Arc::new(config.policy.clone());
        Self {
            validator: PolicyValidator::new(policy.clone()),
            policy,
            sessions,
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            pending: DashMap::new(),
        }
    }

    fn executor(&self, kind: ShellKind) -> CommandExecutor {
        CommandExecutor::new(kind, self.policy.clone(), self.sessions.clone())
            .with_timeout(self.command_timeout)
    }

    fn suspend(
        &self,
        session_id: &str,
        kind: ShellKind,
        batch: CommandBatch,
        command: &str,
        reason: &str,
        cwd: &std::path::Path,
    ) -> Value {
        let interrupt = json!([{
            "action_request": {
                "tool": kind.tool_name(),
                "cmd": command,
                "reason": reason,
                "cwd": cwd.display().to_string(),
            }
        }]);
        self.pending.insert(
            session_id.to_string(),
            Suspended {
                kind,
                batch,
                interrupt,
            },
        );
        warn!(
            "{} suspended for approval | cmd={command} | reason={reason}",
            kind.tool_name()
        );
        json!({"status": "interrupted", "tool": kind.tool_name()})
    }

    async fn execute(
        &self,
        kind: ShellKind,
        batch: &CommandBatch,
        warnings: Vec<String>,
    ) -> Result<Value> {
        let outcome = self.executor(kind).execute(batch).await?;
        let mut value = serde_json::to_value(&outcome)?;
        if !warnings.is_empty() {
            value["warnings"] = Value::from(warnings);
        }
        Ok(value)
    }
}

#[async_trait]
impl AgentRuntime for LocalRuntime {
    async fn invoke(&self, input: Value, session_id: &str) -> Result<Value> {
        let invocation: ToolInvocation = serde_json::from_value(input)?;
        let kind = ShellKind::from_tool_name(&invocation.tool)
            .ok_or_else(|| Error::UnknownTool(invocation.tool.clone()))?;
        let batch = invocation.batch;
        batch.validate()?;

        let cwd = PolicyConfig::resolve(
            &batch
                .cwd
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| self.policy.root_dir.clone()),
        );

        let mut violations = Vec::new();
        for command in &batch.commands {
            let verdict = self.validator.validate(command, kind, &cwd);
            if !verdict.allowed {
                violations.push((command.clone(), verdict.reason));
            }
        }

        match self.policy.enforce_mode {
            EnforceMode::AutoBlock if !violations.is_empty() => {
                let (command, reason) = violations[0].clone();
                Ok(self.suspend(session_id, kind, batch, &command, &reason, &cwd))
            }
            EnforceMode::DeferToApproval => {
                let (command, reason) = violations.into_iter().next().unwrap_or_else(|| {
                    (batch.commands[0].clone(), "awaiting approval".to_string())
                });
                Ok(self.suspend(session_id, kind, batch, &command, &reason, &cwd))
            }
            EnforceMode::WarnOnly => {
                let warnings = violations.into_iter().map(|(_, reason)| reason).collect();
                self.execute(kind, &batch, warnings).await
            }
            EnforceMode::AutoBlock => self.execute(kind, &batch, Vec::new()).await,
        }
    }

    async fn current_suspension(&self, session_id: &str) -> Result<Option<Value>> {
        Ok(self
            .pending
            .get(session_id)
            .map(|entry| entry.interrupt.clone()))
    }

    async fn resume(&self, payload: ResumePayload, session_id: &str) -> Result<Value> {
        let (_, suspended) = self
            .pending
            .remove(session_id)
            .ok_or_else(|| Error::NoPendingApproval(session_id.to_string()))?;
        let decision = payload
            .decisions
            .first()
            .ok_or_else(|| Error::InvalidRequest("resume payload carries no decisions".to_string()))?;

        match decision.kind.as_str() {
            "approve" => {
                info!("{} approved; executing batch", suspended.kind.tool_name());
                self.execute(suspended.kind, &suspended.batch, Vec::new())
                    .await
            }
            "edit" => {
                let batch = match decision.args.clone() {
                    Some(Value::Object(map)) if !map.is_empty() => {
                        match serde_json::from_value::<CommandBatch>(Value::Object(map)) {
                            Ok(edited) => edited,
                            Err(e) => {
                                warn!("unusable edit arguments ({e}); keeping original batch");
                                suspended.batch
                            }
                        }
                    }
                    _ => suspended.batch,
                };
                info!("{} edited; executing batch", suspended.kind.tool_name());
                self.execute(suspended.kind, &batch, Vec::new()).await
            }
            "response" => Ok(json!({
                "status": "responded",
                "tool": suspended.kind.tool_name(),
                "response": decision.response.clone().unwrap_or_default(),
            })),
            _ => {
                info!("{} rejected; nothing executed", suspended.kind.tool_name());
                Ok(json!({
                    "status": "rejected",
                    "tool": suspended.kind.tool_name(),
                }))
            }
        }
    }
}
