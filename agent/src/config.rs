//! Agent configuration
//!
//! Everything is an explicit value constructed once at startup and shared
//! read-only; nothing reads ambient global state after `load`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::shell::ShellKind;

/// What happens when a policy verdict rejects a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforceMode {
    /// Deny outright and surface the action for human approval.
    AutoBlock,
    /// Allow, attaching the rejection reason as a warning.
    WarnOnly,
    /// Route every action to the human regardless of the verdict.
    DeferToApproval,
}

impl EnforceMode {
    /// Parse the configuration spelling of a mode.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto_block" => Some(EnforceMode::AutoBlock),
            "warn_only" => Some(EnforceMode::WarnOnly),
            "defer_to_approval" => Some(EnforceMode::DeferToApproval),
            _ => None,
        }
    }
}

/// Shell command policy: verb allow/deny lists, sandbox root, limits.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Whitelisted Bash command verbs
    #[serde(default = "default_allowed_bash")]
    pub allowed_bash: Vec<String>,

    /// Disallowed Bash command verbs
    #[serde(default = "default_dangerous_bash")]
    pub dangerous_bash: Vec<String>,

    /// Whitelisted PowerShell command verbs
    #[serde(default = "default_allowed_pwsh")]
    pub allowed_pwsh: Vec<String>,

    /// Disallowed PowerShell command verbs
    #[serde(default = "default_dangerous_pwsh")]
    pub dangerous_pwsh: Vec<String>,

    /// Sandbox root directory under which commands must run
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Whether the working directory must stay under `root_dir`
    #[serde(default = "default_enforce_root_jail")]
    pub enforce_root_jail: bool,

    /// Maximum characters allowed in a command string
    #[serde(default = "default_max_command_len")]
    pub max_command_len: usize,

    /// Enforcement mode applied to policy verdicts
    #[serde(default = "default_enforce_mode")]
    pub enforce_mode: EnforceMode,
}

impl PolicyConfig {
    /// Allow-list for a shell kind.
    pub fn allowed_for(&self, kind: ShellKind) -> &[String] {
        match kind {
            ShellKind::Bash => &self.allowed_bash,
            ShellKind::PowerShell => &self.allowed_pwsh,
        }
    }

    /// Deny-list for a shell kind.
    pub fn denied_for(&self, kind: ShellKind) -> &[String] {
        match kind {
            ShellKind::Bash => &self.dangerous_bash,
            ShellKind::PowerShell => &self.dangerous_pwsh,
        }
    }

    /// Resolve a path to an absolute, symlink-resolved form. Paths that do
    /// not exist fall back to a lexical absolute form.
    pub fn resolve(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// True when `cwd` is the sandbox root or a descendant of it. Always
    /// true when jailing is disabled.
    pub fn within_root(&self, cwd: &Path) -> bool {
        if !self.enforce_root_jail {
            return true;
        }
        Self::resolve(cwd).starts_with(Self::resolve(&self.root_dir))
    }

    /// Resolve `path` and replace it with the sandbox root if it escapes.
    pub fn clamp(&self, path: &Path) -> PathBuf {
        let resolved = Self::resolve(path);
        let root = Self::resolve(&self.root_dir);
        if self.enforce_root_jail && !resolved.starts_with(&root) {
            root
        } else {
            resolved
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_bash: default_allowed_bash(),
            dangerous_bash: default_dangerous_bash(),
            allowed_pwsh: default_allowed_pwsh(),
            dangerous_pwsh: default_dangerous_pwsh(),
            root_dir: default_root_dir(),
            enforce_root_jail: default_enforce_root_jail(),
            max_command_len: default_max_command_len(),
            enforce_mode: default_enforce_mode(),
        }
    }
}

/// Persistent shell session settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Whether to open a persistent session at agent start
    #[serde(default = "default_persistent")]
    pub persistent: bool,

    /// Timeout for reading command output from the session, in seconds
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Commands to pre-run once when the session starts
    #[serde(default)]
    pub startup_cmds: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            persistent: default_persistent(),
            read_timeout_secs: default_read_timeout_secs(),
            startup_cmds: Vec::new(),
        }
    }
}

/// Top-level agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Shell used when the caller does not pick one
    #[serde(default = "default_shell_kind")]
    pub default_shell: ShellKind,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub session: SessionConfig,

    /// Wall-clock limit for one-shot commands, in seconds
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_allowed_bash() -> Vec<String> {
    to_strings(&[
        "cd", "cp", "ls", "cat", "find", "touch", "echo", "grep", "pwd", "mkdir", "wget", "sort",
        "head", "tail", "du",
    ])
}

fn default_dangerous_bash() -> Vec<String> {
    to_strings(&[
        "rm", "mv", "rmdir", "sudo", "chmod", "chown", "dd", "mkfs", "shutdown", "reboot", "halt",
    ])
}

fn default_allowed_pwsh() -> Vec<String> {
    to_strings(&[
        "Get-ChildItem",
        "Set-Location",
        "Get-Content",
        "Select-String",
        "Copy-Item",
        "New-Item",
        "Get-Process",
        "Get-Service",
        "Get-Date",
        "Invoke-WebRequest",
        "Sort-Object",
        "Measure-Object",
    ])
}

fn default_dangerous_pwsh() -> Vec<String> {
    to_strings(&[
        "Remove-Item",
        "Stop-Process",
        "Restart-Computer",
        "Stop-Computer",
        "Set-ExecutionPolicy",
        "Invoke-Expression",
        "Invoke-Command",
        "New-Service",
        "Remove-Service",
        "Format-Volume",
        "New-LocalUser",
        "Remove-LocalUser",
    ])
}

fn default_root_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn default_enforce_root_jail() -> bool {
    true
}

fn default_max_command_len() -> usize {
    8000
}

fn default_enforce_mode() -> EnforceMode {
    EnforceMode::AutoBlock
}

fn default_persistent() -> bool {
    true
}

fn default_read_timeout_secs() -> u64 {
    5
}

fn default_shell_kind() -> ShellKind {
    if cfg!(windows) {
        ShellKind::PowerShell
    } else {
        ShellKind::Bash
    }
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        // Start with default config as base
        let mut config = Config::default();

        // Override with environment variables
        if let Ok(val) = std::env::var("SHELL_DEFAULT_KIND") {
            if let Some(kind) = ShellKind::parse(&val) {
                config.default_shell = kind;
            }
        }
        if let Ok(val) = std::env::var("SHELL_ROOT_DIR") {
            config.policy.root_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SHELL_ALLOWED_BASH") {
            config.policy.allowed_bash = parse_list(&val);
        }
        if let Ok(val) = std::env::var("SHELL_DANGEROUS_BASH") {
            config.policy.dangerous_bash = parse_list(&val);
        }
        if let Ok(val) = std::env::var("SHELL_ALLOWED_PWSH") {
            config.policy.allowed_pwsh = parse_list(&val);
        }
        if let Ok(val) = std::env::var("SHELL_DANGEROUS_PWSH") {
            config.policy.dangerous_pwsh = parse_list(&val);
        }
        if let Ok(val) = std::env::var("SHELL_ENFORCE_ROOT_JAIL") {
            if let Ok(flag) = val.parse() {
                config.policy.enforce_root_jail = flag;
            }
        }
        if let Ok(val) = std::env::var("SHELL_MAX_COMMAND_LEN") {
            if let Ok(len) = val.parse() {
                config.policy.max_command_len = len;
            }
        }
        if let Ok(val) = std::env::var("SHELL_ENFORCE_MODE") {
            if let Some(mode) = EnforceMode::parse(&val) {
                config.policy.enforce_mode = mode;
            }
        }
        if let Ok(val) = std::env::var("SHELL_PERSISTENT_SESSION") {
            if let Ok(flag) = val.parse() {
                config.session.persistent = flag;
            }
        }
        if let Ok(val) = std::env::var("SHELL_READ_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.session.read_timeout_secs = secs;
            }
        }
        if let Ok(val) = std::env::var("SHELL_STARTUP_CMDS") {
            config.session.startup_cmds = parse_list(&val);
        }
        if let Ok(val) = std::env::var("SHELL_COMMAND_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.command_timeout_secs = secs;
            }
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_shell: default_shell_kind(),
            policy: PolicyConfig::default(),
            session: SessionConfig::default(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

/// Parse a comma-separated list, dropping blanks.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
