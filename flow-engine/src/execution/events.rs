// Execution Events
// Progress reporting and event types for flow runs and rollbacks

use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<FlowEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<FlowEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Which driver produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Run,
    Rollback,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Run => write!(f, "run"),
            Phase::Rollback => write!(f, "rollback"),
        }
    }
}

/// Events emitted while a flow runs or rolls back
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// Matrix expanded, combinations about to be dispatched
    FlowStarted {
        flow: String,
        phase: Phase,
        combinations: usize,
        parallel: bool,
    },

    /// Every dispatched combination finished
    FlowCompleted {
        flow: String,
        phase: Phase,
        success: bool,
        duration: Duration,
    },

    /// Combination skipped because a required variable is absent
    CombinationSkipped {
        flow: String,
        combination: String,
        missing: String,
    },

    /// Combination dispatched to a runner
    CombinationStarted {
        flow: String,
        phase: Phase,
        combination: String,
    },

    /// Combination finished
    CombinationCompleted {
        flow: String,
        phase: Phase,
        combination: String,
        success: bool,
        error: Option<String>,
    },

    /// Step (or rollback entry) about to execute
    StepStarted {
        flow: String,
        phase: Phase,
        combination: String,
        step_index: usize,
        command: String,
    },

    /// Step (or rollback entry) executed and verified
    StepCompleted {
        flow: String,
        phase: Phase,
        combination: String,
        step_index: usize,
        exit_code: Option<i32>,
        duration: Duration,
        passed: bool,
    },
}

impl FlowEvent {
    /// Create a step completed event
    pub fn step_completed(
        flow: impl Into<String>,
        phase: Phase,
        combination: impl Into<String>,
        step_index: usize,
        exit_code: Option<i32>,
        duration: Duration,
        passed: bool,
    ) -> Self {
        Self::StepCompleted {
            flow: flow.into(),
            phase,
            combination: combination.into(),
            step_index,
            exit_code,
            duration,
            passed,
        }
    }

    /// Create a step started event
    pub fn step_started(
        flow: impl Into<String>,
        phase: Phase,
        combination: impl Into<String>,
        step_index: usize,
        command: impl Into<String>,
    ) -> Self {
        Self::StepStarted {
            flow: flow.into(),
            phase,
            combination: combination.into(),
            step_index,
            command: command.into(),
        }
    }

    /// Name of the flow this event belongs to
    pub fn flow(&self) -> &str {
        match self {
            FlowEvent::FlowStarted { flow, .. }
            | FlowEvent::FlowCompleted { flow, .. }
            | FlowEvent::CombinationSkipped { flow, .. }
            | FlowEvent::CombinationStarted { flow, .. }
            | FlowEvent::CombinationCompleted { flow, .. }
            | FlowEvent::StepStarted { flow, .. }
            | FlowEvent::StepCompleted { flow, .. } => flow,
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: FlowEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: FlowEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: FlowEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_channel() {
        let (tx, mut rx) = progress_channel();

        tx.send_event(FlowEvent::step_started("deploy", Phase::Run, "{}", 0, "echo"));
        tx.send_event(FlowEvent::step_completed(
            "deploy",
            Phase::Run,
            "{}",
            0,
            Some(0),
            Duration::from_millis(5),
            true,
        ));

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, FlowEvent::StepStarted { step_index: 0, .. }));

        let second = rx.recv().await.unwrap();
        assert!(matches!(second, FlowEvent::StepCompleted { passed: true, .. }));
        assert_eq!(second.flow(), "deploy");
    }

    #[test]
    fn test_optional_sender() {
        let sender: Option<ProgressSender> = None;
        // Should not panic
        sender.send_event(FlowEvent::step_started("f", Phase::Rollback, "{}", 1, "rm"));
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (tx, rx) = progress_channel();
        drop(rx);
        tx.send_event(FlowEvent::CombinationSkipped {
            flow: "f".to_string(),
            combination: "{}".to_string(),
            missing: "TEAM".to_string(),
        });
    }
}
