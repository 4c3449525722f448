//! Shell kinds: executable resolution and command wrapping

use std::path::Path;

use serde::Deserialize;

/// Fixed marker separating a command's output from its trailing cwd line.
/// Distinct per shell kind and from the per-call session sentinel.
const BASH_CWD_MARKER: &str = "__CWD_MARKER__c41f9d2e__";
const PWSH_CWD_MARKER: &str = "__CWD_MARKER__8a73b0d5__";

/// Which shell a session or command batch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    Bash,
    PowerShell,
}

impl ShellKind {
    /// Parse a shell name as used in configuration ("bash" / "powershell").
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bash" => Some(ShellKind::Bash),
            "powershell" | "pwsh" => Some(ShellKind::PowerShell),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShellKind::Bash => "bash",
            ShellKind::PowerShell => "powershell",
        }
    }

    /// Tool name this shell kind is exposed under.
    pub fn tool_name(&self) -> &'static str {
        match self {
            ShellKind::Bash => "bash_tool",
            ShellKind::PowerShell => "powershell_tool",
        }
    }

    /// Inverse of [`tool_name`](Self::tool_name).
    pub fn from_tool_name(name: &str) -> Option<Self> {
        match name {
            "bash_tool" => Some(ShellKind::Bash),
            "powershell_tool" => Some(ShellKind::PowerShell),
            _ => None,
        }
    }

    /// Resolve the shell executable.
    ///
    /// Bash prefers the fixed system location and falls back to PATH lookup;
    /// PowerShell prefers the cross-platform `pwsh`, then the legacy Windows
    /// names.
    pub fn executable(&self) -> String {
        match self {
            ShellKind::Bash => {
                if Path::new("/bin/bash").exists() {
                    "/bin/bash".to_string()
                } else {
                    "bash".to_string()
                }
            }
            ShellKind::PowerShell => {
                if on_path("pwsh") {
                    "pwsh".to_string()
                } else if on_path("powershell") {
                    "powershell".to_string()
                } else if cfg!(windows) {
                    "powershell.exe".to_string()
                } else {
                    "pwsh".to_string()
                }
            }
        }
    }

    /// Arguments for spawning a persistent session reading commands from stdin.
    pub fn session_args(&self) -> &'static [&'static str] {
        match self {
            ShellKind::Bash => &[],
            ShellKind::PowerShell => &["-NoLogo", "-NoProfile"],
        }
    }

    /// Arguments for running one wrapped command in a fresh process.
    pub fn one_shot_args(&self, wrapped: &str) -> Vec<String> {
        match self {
            ShellKind::Bash => vec!["-c".to_string(), wrapped.to_string()],
            ShellKind::PowerShell => vec![
                "-NoLogo".to_string(),
                "-NoProfile".to_string(),
                "-Command".to_string(),
                wrapped.to_string(),
            ],
        }
    }

    /// Builtin used to echo the per-call session sentinel.
    pub fn echo_builtin(&self) -> &'static str {
        match self {
            ShellKind::Bash => "echo",
            ShellKind::PowerShell => "Write-Output",
        }
    }

    /// Fixed cwd marker for this shell kind.
    pub fn cwd_marker(&self) -> &'static str {
        match self {
            ShellKind::Bash => BASH_CWD_MARKER,
            ShellKind::PowerShell => PWSH_CWD_MARKER,
        }
    }

    /// Wrap a command with a directory-change prefix and an output boundary
    /// suffix so the resulting cwd can be recovered from the output.
    pub fn wrap(&self, command: &str, cwd: &Path) -> String {
        match self {
            ShellKind::Bash => format!(
                "cd {} && {}; echo {}; pwd",
                cwd.display(),
                command,
                BASH_CWD_MARKER
            ),
            ShellKind::PowerShell => format!(
                "Set-Location {}; {}; Write-Output {}; (Get-Location).Path",
                cwd.display(),
                command,
                PWSH_CWD_MARKER
            ),
        }
    }

    /// Verb comparison: PowerShell cmdlets match case-insensitively, Bash
    /// verbs are case-sensitive.
    pub fn verb_matches(&self, verb: &str, entry: &str) -> bool {
        match self {
            ShellKind::Bash => verb == entry,
            ShellKind::PowerShell => verb.eq_ignore_ascii_case(entry),
        }
    }
}

fn on_path(name: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        dir.join(name).is_file() || (cfg!(windows) && dir.join(format!("{name}.exe")).is_file())
    })
}
