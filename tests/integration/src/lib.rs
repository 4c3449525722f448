//! Shared helpers for the terminal agent integration tests
//!
//! The tests run real `/bin/bash` processes inside tempdir sandbox roots.
//! PowerShell behavior is covered by pure unit tests in the agent crate, so
//! no `pwsh` installation is required here.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use terminal_agent::config::Config;
use terminal_agent::domain::types::PendingApproval;
use terminal_agent::service::approval::{ApprovalPrompt, DecisionInput};

/// Config rooted at `root`: jailing on, auto-block mode, default verb lists.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.policy.root_dir = root.to_path_buf();
    config
}

/// Approval prompt that pops pre-canned replies in order. Running out of
/// replies yields an empty input, which the coordinator maps to reject.
pub struct ScriptedPrompt {
    replies: Mutex<VecDeque<DecisionInput>>,
}

impl ScriptedPrompt {
    pub fn new(replies: Vec<DecisionInput>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
        }
    }

    pub fn reply(choice: &str) -> DecisionInput {
        DecisionInput {
            choice: choice.to_string(),
            payload: None,
        }
    }

    pub fn reply_with_payload(choice: &str, payload: &str) -> DecisionInput {
        DecisionInput {
            choice: choice.to_string(),
            payload: Some(payload.to_string()),
        }
    }
}

#[async_trait]
impl ApprovalPrompt for ScriptedPrompt {
    async fn decide(&self, _pending: &PendingApproval) -> DecisionInput {
        self.replies
            .lock()
            .expect("prompt replies lock")
            .pop_front()
            .unwrap_or_default()
    }
}
