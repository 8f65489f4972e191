// Process Executor
// Runs flow commands as child processes and captures their output

use crate::command::{CmdResult, Command};
use crate::environment::Environment;
use crate::runners::CommandExecutor;

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command as ProcessCommand;
use tokio::task::JoinHandle;

/// How long output readers may run after a timed-out process was killed
const OUTPUT_GRACE: Duration = Duration::from_millis(500);

/// Configuration for process execution
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Working directory for every command (None = current directory)
    pub working_dir: Option<PathBuf>,
    /// Timeout applied when a command has none of its own
    pub default_timeout: Option<Duration>,
    /// Whether children inherit the parent process environment
    pub inherit_env: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            default_timeout: None,
            inherit_env: true,
        }
    }
}

/// Executor backed by `tokio::process`
pub struct ProcessExecutor {
    config: ProcessConfig,
}

impl ProcessExecutor {
    /// Create an executor with the default configuration
    pub fn new() -> Self {
        Self {
            config: ProcessConfig::default(),
        }
    }

    /// Create an executor with the given configuration
    pub fn with_config(config: ProcessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, command: &Command, env: &Environment) -> CmdResult {
        let resolved = command.resolve(env);
        let rendered = resolved.to_string();

        if env.is_dry() {
            tracing::info!(command = %rendered, "dry run, not executing");
            return CmdResult::success(rendered, "");
        }

        let start = Instant::now();

        let mut cmd = ProcessCommand::new(&resolved.program);
        cmd.args(&resolved.args);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        if !self.config.inherit_env {
            cmd.env_clear();
        }
        cmd.stdin(if resolved.input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!(command = %rendered, error = %e, "failed to spawn process");
                let mut result = CmdResult::failed_to_start(
                    rendered,
                    format!("failed to spawn '{}': {}", resolved.program, e),
                );
                result.duration = start.elapsed();
                return result;
            }
        };

        if let (Some(input), Some(mut stdin)) = (resolved.input.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                // The child may exit without reading its input
                let _ = stdin.write_all(input.as_bytes()).await;
            });
        }

        // Read output streams concurrently so neither pipe fills up
        let stdout_handle = child.stdout.take().map(|mut out| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = out.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).into_owned()
            })
        });
        let stderr_handle = child.stderr.take().map(|mut err| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = err.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let timeout = resolved.timeout.or(self.config.default_timeout);
        let (status, timed_out) = match timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, child.wait()).await;
                match waited {
                    Ok(status) => (status, false),
                    Err(_) => {
                        tracing::debug!(command = %rendered, ?limit, "process timed out, killing");
                        let _ = child.kill().await;
                        (child.wait().await, true)
                    }
                }
            }
            None => (child.wait().await, false),
        };

        // Grandchildren may still hold the pipes open after a kill
        let grace = timed_out.then_some(OUTPUT_GRACE);
        let stdout = collect_output(stdout_handle, grace).await;
        let stderr = collect_output(stderr_handle, grace).await;

        let (exit_code, error) = match status {
            Ok(status) => (status.code(), None),
            Err(e) => (None, Some(format!("failed to wait for process: {}", e))),
        };

        CmdResult {
            command: rendered,
            stdout,
            stderr,
            exit_code: if timed_out { None } else { exit_code },
            error,
            timed_out,
            duration: start.elapsed(),
        }
    }
}

/// Join an output reader; with a grace period, give up and abort it when the
/// period expires
async fn collect_output(handle: Option<JoinHandle<String>>, grace: Option<Duration>) -> String {
    let Some(mut handle) = handle else {
        return String::new();
    };
    match grace {
        None => handle.await.unwrap_or_default(),
        Some(grace) => match tokio::time::timeout(grace, &mut handle).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => {
                tracing::debug!(?grace, "output still open after kill, abandoning reader");
                handle.abort();
                String::new()
            }
        },
    }
}
