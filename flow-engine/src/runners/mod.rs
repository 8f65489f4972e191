// Runners Module
// Command execution collaborators used by the flow runners

pub mod process;

// Re-export key types
pub use process::{ProcessConfig, ProcessExecutor};

use crate::command::{CmdResult, Command};
use crate::environment::Environment;

/// Executes one command against an environment.
///
/// Implementations never fail with a Rust error: a command that cannot be
/// started yields a [`CmdResult`] whose `error` is set, so it still flows
/// through assertion and hooks.
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &Command, env: &Environment) -> CmdResult;
}
