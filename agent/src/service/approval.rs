//! Human-in-the-loop approval coordination
//!
//! Watches the orchestration runtime for suspended tool actions, presents
//! each one for a decision, and resumes the runtime until nothing remains
//! pending. The coordinator holds no state of its own; suspension identity
//! lives entirely in the runtime, keyed by session id.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::domain::types::{PendingApproval, ResumeDecision, ResumePayload};
use crate::error::Result;
use crate::infra::runtime::AgentRuntime;

/// Raw human reply to an approval prompt.
#[derive(Debug, Clone, Default)]
pub struct DecisionInput {
    /// Free-form choice text, e.g. "a", "approve", "reject".
    pub choice: String,
    /// Structured-edit JSON or manual-response text, when the choice takes one.
    pub payload: Option<String>,
}

/// Presents a pending action and collects the human reply.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApprovalPrompt: Send + Sync {
    async fn decide(&self, pending: &PendingApproval) -> DecisionInput;
}

/// Drives suspended executions to completion.
pub struct ApprovalCoordinator<R, P> {
    runtime: Arc<R>,
    prompt: Arc<P>,
}

impl<R: AgentRuntime, P: ApprovalPrompt> ApprovalCoordinator<R, P> {
    pub fn new(runtime: Arc<R>, prompt: Arc<P>) -> Self {
        Self { runtime, prompt }
    }

    /// Invoke the runtime and settle every approval point it raises.
    ///
    /// A batch may trigger more than one approval; the loop re-queries the
    /// runtime after each resume until no suspension remains. Failures while
    /// querying or resuming are logged and treated as "no further pending
    /// approvals".
    pub async fn run(&self, input: Value, session_id: &str) -> Result<Value> {
        let mut outcome = self.runtime.invoke(input, session_id).await?;

        loop {
            let suspension = match self.runtime.current_suspension(session_id).await {
                Ok(suspension) => suspension,
                Err(e) => {
                    warn!("failed to query suspensions; assuming none remain: {e}");
                    break;
                }
            };
            let Some(value) = suspension else { break };

            let pending = PendingApproval::from_interrupt(value, session_id);
            info!("action '{}' awaiting approval", pending.tool_name);

            let reply = self.prompt.decide(&pending).await;
            let decision = parse_decision(&reply);
            let payload = ResumePayload::single(decision, &pending.tool_name);

            match self.runtime.resume(payload, session_id).await {
                Ok(next) => outcome = next,
                Err(e) => {
                    error!("resume failed; abandoning pending approvals: {e}");
                    break;
                }
            }
        }

        Ok(outcome)
    }
}

/// Map a raw reply onto a decision. Anything unrecognized rejects; the
/// ambiguous case must never approve.
pub fn parse_decision(input: &DecisionInput) -> ResumeDecision {
    let choice = input.choice.trim().to_ascii_lowercase();
    if choice.starts_with('a') {
        ResumeDecision::Approve
    } else if choice.starts_with('e') {
        let args = match input.payload.as_deref().map(serde_json::from_str::<Value>) {
            Some(Ok(value @ Value::Object(_))) => value,
            Some(_) => {
                warn!("malformed edit arguments; defaulting to an empty edit");
                Value::Object(Default::default())
            }
            None => Value::Object(Default::default()),
        };
        ResumeDecision::Edit { args }
    } else if choice.starts_with('m') {
        ResumeDecision::ManualResponse {
            text: input.payload.clone().unwrap_or_default(),
        }
    } else if choice.starts_with('r') {
        ResumeDecision::Reject
    } else {
        warn!("unrecognized decision '{}'; defaulting to reject", input.choice);
        ResumeDecision::Reject
    }
}
