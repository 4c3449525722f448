//! Policy-guarded terminal agent core
//!
//! Executes shell command batches (Bash or PowerShell) under an allow-list
//! policy, confined to a sandbox root directory, with a human approval step
//! in front of anything the policy rejects. Working-directory continuity is
//! preserved across commands, either through a persistent shell session or
//! through one-shot processes.

pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod service;

pub use config::{Config, EnforceMode, PolicyConfig, SessionConfig};
pub use error::{Error, Result};
