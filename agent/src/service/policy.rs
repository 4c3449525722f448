//! Shell command policy validation
//!
//! Pure allow/deny decisions over a single command string. What happens to
//! a rejected verdict (block, warn, or defer to a human) is the caller's
//! responsibility, not the validator's.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::config::PolicyConfig;
use crate::domain::shell::ShellKind;

/// Outcome of validating one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: String,
}

impl Verdict {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Validates commands against the configured policy. Stateless per call;
/// safe to share across concurrent batches.
#[derive(Debug, Clone)]
pub struct PolicyValidator {
    config: Arc<PolicyConfig>,
}

impl PolicyValidator {
    pub fn new(config: Arc<PolicyConfig>) -> Self {
        Self { config }
    }

    /// Validate a single command for `kind` running in `cwd`.
    ///
    /// Checks run in order and stop at the first failure: empty command,
    /// length limit, deny-list, allow-list, sandbox containment.
    pub fn validate(&self, command: &str, kind: ShellKind, cwd: &Path) -> Verdict {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return Verdict::deny("Empty command.".to_string());
        }
        if command.len() > self.config.max_command_len {
            return Verdict::deny(format!(
                "Command too long (> {}).",
                self.config.max_command_len
            ));
        }

        let verb = first_token(trimmed);
        if self
            .config
            .denied_for(kind)
            .iter()
            .any(|entry| kind.verb_matches(verb, entry))
        {
            let reason = format!("Dangerous command '{verb}'.");
            warn!("policy violation: {reason} | cmd={command}");
            return Verdict::deny(reason);
        }
        if !self
            .config
            .allowed_for(kind)
            .iter()
            .any(|entry| kind.verb_matches(verb, entry))
        {
            let reason = match kind {
                ShellKind::Bash => format!("'{verb}' not in allowed Bash commands."),
                ShellKind::PowerShell => {
                    format!("'{verb}' not in allowed PowerShell commands.")
                }
            };
            warn!("policy violation: {reason}");
            return Verdict::deny(reason);
        }

        if self.config.enforce_root_jail && !self.config.within_root(cwd) {
            let reason = format!(
                "CWD '{}' is outside sandbox '{}'.",
                cwd.display(),
                self.config.root_dir.display()
            );
            warn!("policy violation: {reason}");
            return Verdict::deny(reason);
        }

        Verdict::allow()
    }
}

/// First whitespace-delimited token of a command: the verb.
fn first_token(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or("")
}
