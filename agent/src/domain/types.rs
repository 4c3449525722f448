//! Tool invocation, result, and approval types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Exit code reported when a one-shot command exceeds its timeout.
pub const EXIT_TIMEOUT: i32 = 124;
/// Exit code reported when the persistent session cannot be used.
pub const EXIT_SESSION_ERROR: i32 = 1;

/// Per-command execution record. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    #[serde(rename = "cmd")]
    pub command: String,
    #[serde(rename = "returncode")]
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Absolute working directory after this command ran.
    pub cwd: String,
}

/// Ordered list of commands submitted against one shell kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandBatch {
    pub commands: Vec<String>,
    /// Starting working directory; defaults to the sandbox root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

impl CommandBatch {
    /// Contract check: at least one non-blank command.
    pub fn validate(&self) -> Result<()> {
        if self.commands.is_empty() || self.commands.iter().all(|c| c.trim().is_empty()) {
            return Err(Error::InvalidRequest(
                "commands must contain at least one non-empty string".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tool invocation as delivered by the orchestration runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    #[serde(flatten)]
    pub batch: CommandBatch,
}

/// Outcome of a batch: all-or-nothing forward progress. Execution halts at
/// the first failing command; later commands never appear in `results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub success: bool,
    pub results: Vec<CommandResult>,
    /// Final working directory, clamped to the sandbox root.
    pub cwd: String,
}

/// A suspended action awaiting a human decision. Exists only between
/// suspension and resumption.
#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub tool_name: String,
    /// Opaque payload describing the requested command(s) and cwd.
    pub action: Value,
    pub session_id: String,
}

impl PendingApproval {
    /// Build from a raw interrupt value: either a single structure, or a
    /// non-empty sequence whose first element carries the action under
    /// `action_request`.
    pub fn from_interrupt(value: Value, session_id: &str) -> Self {
        let action = match value {
            Value::Array(mut items) if !items.is_empty() => {
                let first = items.remove(0);
                first.get("action_request").cloned().unwrap_or(first)
            }
            other => other,
        };
        let tool_name = extract_tool_name(&action);
        Self {
            tool_name,
            action,
            session_id: session_id.to_string(),
        }
    }
}

/// Best-effort extraction of the tool/action name from an action payload.
fn extract_tool_name(action: &Value) -> String {
    ["tool", "action", "name"]
        .iter()
        .find_map(|key| action.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

/// Human decision applied to a suspended action. Consumed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeDecision {
    Approve,
    Edit { args: Value },
    Reject,
    ManualResponse { text: String },
}

/// Wire form of one decision inside a resume payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

/// Payload handed back to the orchestration runtime to lift a suspension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    pub decisions: Vec<DecisionRecord>,
}

impl ResumePayload {
    /// Encode a single decision for `tool`.
    pub fn single(decision: ResumeDecision, tool: &str) -> Self {
        let record = match decision {
            ResumeDecision::Approve => DecisionRecord {
                kind: "approve".to_string(),
                tool: tool.to_string(),
                args: None,
                response: None,
            },
            ResumeDecision::Edit { args } => DecisionRecord {
                kind: "edit".to_string(),
                tool: tool.to_string(),
                args: Some(args),
                response: None,
            },
            ResumeDecision::Reject => DecisionRecord {
                kind: "reject".to_string(),
                tool: tool.to_string(),
                args: None,
                response: None,
            },
            ResumeDecision::ManualResponse { text } => DecisionRecord {
                kind: "response".to_string(),
                tool: tool.to_string(),
                args: None,
                response: Some(text),
            },
        };
        Self {
            decisions: vec![record],
        }
    }
}
