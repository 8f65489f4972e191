// Engine Errors
// Error taxonomy shared by the flow runners, the parser and the suite

use thiserror::Error;

/// Errors produced by the flow engine
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// A step result did not match one of its expectations
    #[error("step {step} ({command}) failed: {reason}")]
    StepAssertion {
        step: usize,
        command: String,
        reason: String,
    },

    /// The flow finished without establishing a variable it provides
    #[error("flow did not provide variable '{0}'")]
    MissingProvided(String),

    /// A hook reported a failure
    #[error("hook failed: {0}")]
    Hook(String),

    /// A concurrently dispatched combination panicked
    #[error("combination task panicked: {0}")]
    TaskPanicked(String),

    /// Flow file could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// Flow definition is semantically invalid
    #[error("invalid flow: {0}")]
    InvalidFlow(String),

    /// An expectation pattern is not a valid regular expression
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for FlowError {
    fn from(err: std::io::Error) -> Self {
        FlowError::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for FlowError {
    fn from(err: serde_yaml::Error) -> Self {
        match err.location() {
            Some(loc) => FlowError::Parse(format!(
                "{} (line {}, column {})",
                err,
                loc.line(),
                loc.column()
            )),
            None => FlowError::Parse(err.to_string()),
        }
    }
}

impl From<regex::Error> for FlowError {
    fn from(err: regex::Error) -> Self {
        FlowError::InvalidPattern(err.to_string())
    }
}

impl FlowError {
    /// Build a hook failure from any displayable message
    pub fn hook(message: impl Into<String>) -> Self {
        FlowError::Hook(message.into())
    }

    /// Whether this error is fatal to a single combination run (as opposed to
    /// a load-time error in a flow definition)
    pub fn is_run_failure(&self) -> bool {
        matches!(
            self,
            FlowError::StepAssertion { .. }
                | FlowError::MissingProvided(_)
                | FlowError::Hook(_)
                | FlowError::TaskPanicked(_)
        )
    }
}

/// Result alias used throughout the crate
pub type FlowResult<T> = Result<T, FlowError>;
