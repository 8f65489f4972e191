// Assertion Logic
// Verifies command results against expectations and records failures

use crate::command::{CmdResult, Expected};
use crate::error::{FlowError, FlowResult};

use std::fmt;
use std::sync::{Arc, Mutex};

// =============================================================================
// Failure records
// =============================================================================

/// How a failed verification is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertMode {
    /// Record the failure and abort the current combination
    Assert,
    /// Record the failure and keep going
    Check,
}

/// Category of a recorded failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A flow step did not match its expectations
    StepAssertion,
    /// A flow finished without a variable it provides
    MissingProvided,
    /// A hook reported an error
    Hook,
    /// A compensating step did not match its expectations
    RollbackMismatch,
    /// A concurrently dispatched combination panicked
    TaskPanicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::StepAssertion => write!(f, "step"),
            FailureKind::MissingProvided => write!(f, "provides"),
            FailureKind::Hook => write!(f, "hook"),
            FailureKind::RollbackMismatch => write!(f, "rollback"),
            FailureKind::TaskPanicked => write!(f, "panic"),
        }
    }
}

/// A single recorded failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    /// Flow the failure belongs to
    pub flow: String,
    /// Rendered matrix combination
    pub combination: String,
    /// Index of the step (or rollback entry) involved, if any
    pub step: Option<usize>,
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.flow)?;
        if !self.combination.is_empty() {
            write!(f, " {}", self.combination)?;
        }
        if let Some(step) = self.step {
            write!(f, " step {}", step)?;
        }
        write!(f, ": {}", self.message)
    }
}

// =============================================================================
// Reporting context
// =============================================================================

/// Test-reporting context shared by every combination of a run.
///
/// Implementations must be safe to call from concurrently running
/// combinations.
pub trait Reporter: Send + Sync {
    fn record(&self, failure: Failure);
}

/// Reporter that keeps every failure in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryReporter {
    failures: Arc<Mutex<Vec<Failure>>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the failures recorded so far
    pub fn failures(&self) -> Vec<Failure> {
        match self.failures.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Whether nothing has been recorded
    pub fn is_clean(&self) -> bool {
        self.failures().is_empty()
    }

    /// Failures of one kind
    pub fn failures_of(&self, kind: FailureKind) -> Vec<Failure> {
        self.failures()
            .into_iter()
            .filter(|f| f.kind == kind)
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn record(&self, failure: Failure) {
        let mut guard = match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(failure);
    }
}

/// Reporting scope for one combination of one flow
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub reporter: &'a dyn Reporter,
    pub flow: &'a str,
    pub combination: &'a str,
}

impl<'a> Scope<'a> {
    pub fn new(reporter: &'a dyn Reporter, flow: &'a str, combination: &'a str) -> Self {
        Self {
            reporter,
            flow,
            combination,
        }
    }

    /// Record a failure in this scope
    pub fn record(&self, kind: FailureKind, step: Option<usize>, message: impl Into<String>) {
        self.reporter.record(Failure {
            kind,
            flow: self.flow.to_string(),
            combination: self.combination.to_string(),
            step,
            message: message.into(),
        });
    }
}

// =============================================================================
// Verification
// =============================================================================

/// Verify `result` against `expected`.
///
/// An empty `expected` list means the command must simply succeed. In
/// [`AssertMode::Assert`] the first mismatch is recorded and returned as an
/// error. In [`AssertMode::Check`] every mismatch is recorded and the number
/// of mismatches is returned.
pub fn verify(
    mode: AssertMode,
    scope: &Scope<'_>,
    step: usize,
    result: &CmdResult,
    expected: &[Expected],
) -> FlowResult<usize> {
    let kind = match mode {
        AssertMode::Assert => FailureKind::StepAssertion,
        AssertMode::Check => FailureKind::RollbackMismatch,
    };

    let outcomes: Vec<Result<(), String>> = if expected.is_empty() {
        vec![result.check_success()]
    } else {
        expected.iter().map(|exp| exp.matches(result)).collect()
    };

    let mut mismatches = 0;
    for outcome in outcomes {
        let Err(reason) = outcome else {
            continue;
        };
        scope.record(
            kind,
            Some(step),
            format!("{}: {}", result.command, reason),
        );
        match mode {
            AssertMode::Assert => {
                return Err(FlowError::StepAssertion {
                    step,
                    command: result.command.clone(),
                    reason,
                });
            }
            AssertMode::Check => mismatches += 1,
        }
    }

    Ok(mismatches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(reporter: &MemoryReporter) -> Scope<'_> {
        Scope::new(reporter, "app-create", "{platform=go}")
    }

    #[test]
    fn test_assert_bare_success() {
        let reporter = MemoryReporter::new();
        let ok = CmdResult::success("true", "");

        assert_eq!(
            verify(AssertMode::Assert, &scope(&reporter), 0, &ok, &[]).unwrap(),
            0
        );
        assert!(reporter.is_clean());
    }

    #[test]
    fn test_assert_stops_at_first_mismatch() {
        let reporter = MemoryReporter::new();
        let res = CmdResult::exited("false", 1);
        let expected = vec![
            Expected::new().exit_code(0),
            Expected::new().stdout("never").unwrap(),
        ];

        let err = verify(AssertMode::Assert, &scope(&reporter), 3, &res, &expected).unwrap_err();
        assert!(matches!(err, FlowError::StepAssertion { step: 3, .. }));

        let failures = reporter.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::StepAssertion);
        assert_eq!(failures[0].step, Some(3));
    }

    #[test]
    fn test_check_records_every_mismatch() {
        let reporter = MemoryReporter::new();
        let res = CmdResult::exited("false", 1);
        let expected = vec![
            Expected::new().exit_code(0),
            Expected::new().exit_code(1),
            Expected::new().exit_code(0).stdout("x").unwrap(),
        ];

        let mismatches =
            verify(AssertMode::Check, &scope(&reporter), 0, &res, &expected).unwrap();
        assert_eq!(mismatches, 2);
        assert_eq!(reporter.failures_of(FailureKind::RollbackMismatch).len(), 2);
    }

    #[test]
    fn test_failure_display() {
        let failure = Failure {
            kind: FailureKind::MissingProvided,
            flow: "app-create".to_string(),
            combination: "{platform=go}".to_string(),
            step: None,
            message: "APP not set".to_string(),
        };
        assert_eq!(
            failure.to_string(),
            "[provides] app-create {platform=go}: APP not set"
        );
    }

    #[test]
    fn test_reporter_is_shared_across_clones() {
        let reporter = MemoryReporter::new();
        let clone = reporter.clone();
        scope(&clone).record(FailureKind::Hook, None, "boom");
        assert_eq!(reporter.failures().len(), 1);
    }
}
