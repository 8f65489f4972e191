// Commands, Results and Expectations
// Value types describing one external invocation, its outcome, and the
// assertions made against that outcome

use crate::environment::Environment;
use crate::error::FlowResult;

use regex::Regex;
use std::fmt;
use std::time::Duration;

/// Immutable description of one external invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Program to run
    pub program: String,
    /// Arguments, possibly containing `{{NAME}}` placeholders
    pub args: Vec<String>,
    /// Data written to the process standard input
    pub input: Option<String>,
    /// Per-command timeout (overrides the executor default)
    pub timeout: Option<Duration>,
    /// Whether placeholders are expanded against the environment
    pub expand: bool,
}

/// A command with every placeholder resolved against an environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub input: Option<String>,
    pub timeout: Option<Duration>,
}

impl Command {
    /// Create a command for the given program
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            input: None,
            timeout: None,
            expand: true,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed `input` to the process standard input
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Kill the process if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Pass arguments through verbatim
    pub fn no_expand(mut self) -> Self {
        self.expand = false;
        self
    }

    /// Resolve placeholders against `env`
    pub fn resolve(&self, env: &Environment) -> ResolvedCommand {
        let expand = |s: &String| {
            if self.expand {
                env.expand(s)
            } else {
                s.clone()
            }
        };

        ResolvedCommand {
            program: expand(&self.program),
            args: self.args.iter().map(expand).collect(),
            input: self.input.as_ref().map(expand),
            timeout: self.timeout,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

impl fmt::Display for ResolvedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured outcome of running a command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdResult {
    /// Rendered command line that produced this result
    pub command: String,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code (None if the process never exited normally)
    pub exit_code: Option<i32>,
    /// Execution error (process could not start, IO failure)
    pub error: Option<String>,
    /// Whether the process was killed after its timeout
    pub timed_out: bool,
    /// Wall-clock duration
    pub duration: Duration,
}

impl CmdResult {
    /// Successful result with the given stdout
    pub fn success(command: impl Into<String>, stdout: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            stdout: stdout.into(),
            exit_code: Some(0),
            ..Default::default()
        }
    }

    /// Result for a process that exited with `code`
    pub fn exited(command: impl Into<String>, code: i32) -> Self {
        Self {
            command: command.into(),
            exit_code: Some(code),
            ..Default::default()
        }
    }

    /// Result for a process that could not be run at all
    pub fn failed_to_start(command: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Exit code 0, no execution error and no timeout
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0) && self.error.is_none() && !self.timed_out
    }

    /// Describe why this result is not a bare success
    pub fn check_success(&self) -> Result<(), String> {
        if let Some(err) = &self.error {
            return Err(format!("command could not run: {}", err));
        }
        if self.timed_out {
            return Err("command timed out".to_string());
        }
        match self.exit_code {
            Some(0) => Ok(()),
            Some(code) => Err(format!(
                "exit code {}, expected 0{}",
                code,
                stderr_suffix(&self.stderr)
            )),
            None => Err("command did not exit normally".to_string()),
        }
    }
}

/// An assertion against a [`CmdResult`]
#[derive(Debug, Clone)]
pub struct Expected {
    /// Required exit code; defaults to 0 unless a timeout is expected
    pub exit_code: Option<i32>,
    /// Pattern that must match standard output
    pub stdout: Option<Regex>,
    /// Pattern that must match standard error
    pub stderr: Option<Regex>,
    /// Whether the command is expected to time out
    pub timed_out: bool,
}

impl Default for Expected {
    fn default() -> Self {
        Self::new()
    }
}

impl Expected {
    pub fn new() -> Self {
        Self {
            exit_code: None,
            stdout: None,
            stderr: None,
            timed_out: false,
        }
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn stdout(mut self, pattern: &str) -> FlowResult<Self> {
        self.stdout = Some(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn stderr(mut self, pattern: &str) -> FlowResult<Self> {
        self.stderr = Some(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn timeout(mut self) -> Self {
        self.timed_out = true;
        self
    }

    /// Check `result` against this expectation, describing the first mismatch
    pub fn matches(&self, result: &CmdResult) -> Result<(), String> {
        if let Some(err) = &result.error {
            return Err(format!("command could not run: {}", err));
        }

        if self.timed_out != result.timed_out {
            return Err(if self.timed_out {
                "expected command to time out".to_string()
            } else {
                "command timed out".to_string()
            });
        }

        if !self.timed_out {
            let expected = self.exit_code.unwrap_or(0);
            if result.exit_code != Some(expected) {
                return Err(format!(
                    "exit code {}, expected {}{}",
                    result
                        .exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "none".to_string()),
                    expected,
                    stderr_suffix(&result.stderr)
                ));
            }
        }

        if let Some(pattern) = &self.stdout {
            if !pattern.is_match(&result.stdout) {
                return Err(format!(
                    "stdout does not match /{}/: {:?}",
                    pattern.as_str(),
                    result.stdout
                ));
            }
        }

        if let Some(pattern) = &self.stderr {
            if !pattern.is_match(&result.stderr) {
                return Err(format!(
                    "stderr does not match /{}/: {:?}",
                    pattern.as_str(),
                    result.stderr
                ));
            }
        }

        Ok(())
    }
}

/// One flow step: a command and its ordered expectations
#[derive(Debug, Clone)]
pub struct CmdWithExp {
    pub command: Command,
    pub expected: Vec<Expected>,
}

impl CmdWithExp {
    pub fn new(command: Command, expected: Vec<Expected>) -> Self {
        Self { command, expected }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(" (stderr: {})", trimmed)
    }
}
