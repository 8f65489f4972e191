// Execution Flow
// The ExecFlow aggregate: ordered steps, compensating steps, hooks, variable
// contracts and the parametrization matrix, plus its run/rollback drivers

use crate::command::{CmdWithExp, Command, Expected};
use crate::environment::Environment;
use crate::error::FlowError;
use crate::execution::events::{Phase, ProgressSender};
use crate::execution::hooks::{Hook, HookPosition, HookRegistry};
use crate::execution::matrix::{Combination, MatrixEntry};
use crate::execution::{rollback, runner, scheduler};
use crate::runners::CommandExecutor;
use crate::testing::Reporter;

use std::sync::Arc;
use std::time::Duration;

/// Collaborators shared by every combination of a run
#[derive(Clone)]
pub struct FlowContext {
    pub executor: Arc<dyn CommandExecutor>,
    pub reporter: Arc<dyn Reporter>,
    pub events: Option<ProgressSender>,
}

impl FlowContext {
    pub fn new(executor: Arc<dyn CommandExecutor>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            executor,
            reporter,
            events: None,
        }
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.events = Some(tx);
        self
    }
}

/// A declarative flow: ordered steps driven over every matrix combination
#[derive(Debug, Clone, Default)]
pub struct ExecFlow {
    pub(crate) name: String,
    pub(crate) actions: Vec<CmdWithExp>,
    pub(crate) rollback: Vec<CmdWithExp>,
    pub(crate) hooks: HookRegistry,
    pub(crate) provides: Vec<String>,
    pub(crate) requires: Vec<String>,
    pub(crate) matrix: Vec<MatrixEntry>,
    pub(crate) parallel: bool,
    pub(crate) max_parallel: Option<usize>,
}

impl ExecFlow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Append a step. An empty `expected` list means the command must succeed.
    pub fn add(&mut self, command: Command, expected: Vec<Expected>) -> &mut Self {
        self.actions.push(CmdWithExp::new(command, expected));
        self
    }

    /// Append a compensating step. Rollback runs these last-added first.
    pub fn add_rollback(&mut self, command: Command, expected: Vec<Expected>) -> &mut Self {
        self.rollback.push(CmdWithExp::new(command, expected));
        self
    }

    /// Register a hook after the most recently added step, or before the
    /// first step when none has been added yet.
    pub fn add_hook(&mut self, hook: Hook) -> &mut Self {
        let position = match self.actions.len() {
            0 => HookPosition::PreRun,
            n => HookPosition::AfterStep(n - 1),
        };
        self.add_hook_at(position, hook)
    }

    /// Register a hook at an explicit position
    pub fn add_hook_at(&mut self, position: HookPosition, hook: Hook) -> &mut Self {
        self.hooks.register(position, hook);
        self
    }

    /// Declare a variable this flow must leave present
    pub fn provides(&mut self, name: impl Into<String>) -> &mut Self {
        self.provides.push(name.into());
        self
    }

    /// Declare a variable that must be present for a combination to run
    pub fn requires(&mut self, name: impl Into<String>) -> &mut Self {
        self.requires.push(name.into());
        self
    }

    /// Expand `local` over every candidate of the environment variable `source`.
    /// Entries expand in the order they are declared.
    pub fn matrix(&mut self, local: impl Into<String>, source: impl Into<String>) -> &mut Self {
        self.matrix.push(MatrixEntry::new(local, source));
        self
    }

    /// Run combinations as independent concurrent tasks
    pub fn parallel(&mut self, parallel: bool) -> &mut Self {
        self.parallel = parallel;
        self
    }

    /// Bound the number of concurrently running combinations (parallel flows only)
    pub fn max_parallel(&mut self, limit: usize) -> &mut Self {
        self.max_parallel = Some(limit);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn actions(&self) -> &[CmdWithExp] {
        &self.actions
    }

    pub fn rollback_steps(&self) -> &[CmdWithExp] {
        &self.rollback
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn provided(&self) -> &[String] {
        &self.provides
    }

    pub fn required(&self) -> &[String] {
        &self.requires
    }

    pub fn matrix_entries(&self) -> &[MatrixEntry] {
        &self.matrix
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Run every surviving matrix combination of this flow.
    ///
    /// Returns once all combinations have finished. Failures are recorded in
    /// the context's reporter and summarised in the report; they never abort
    /// sibling combinations.
    pub async fn run(&self, env: &Environment, ctx: &FlowContext) -> FlowReport {
        let flow = Arc::new(self.clone());
        scheduler::for_expanded(flow, env, ctx, Phase::Run, runner::run_once).await
    }

    /// Run the compensating steps of every surviving matrix combination
    pub async fn rollback(&self, env: &Environment, ctx: &FlowContext) -> FlowReport {
        let flow = Arc::new(self.clone());
        scheduler::for_expanded(flow, env, ctx, Phase::Rollback, rollback::rollback_once).await
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Terminal state of one combination
#[derive(Debug, Clone)]
pub enum InstanceStatus {
    /// Every step and check passed
    Done,
    /// A fatal failure stopped the combination
    Failed(FlowError),
    /// Rollback finished with this many recorded mismatches
    Mismatched(usize),
    /// A required variable was absent; nothing ran
    Skipped { missing: String },
}

impl InstanceStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, InstanceStatus::Done)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, InstanceStatus::Skipped { .. })
    }

    /// Failed or mismatched
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            InstanceStatus::Failed(_) | InstanceStatus::Mismatched(_)
        )
    }
}

/// Outcome of one expanded combination
#[derive(Debug, Clone)]
pub struct InstanceReport {
    pub combination: Combination,
    pub status: InstanceStatus,
    /// Environment as the combination left it (None when nothing ran or the
    /// task panicked)
    pub env: Option<Environment>,
}

/// Outcome of one `run` or `rollback` call
#[derive(Debug, Clone)]
pub struct FlowReport {
    pub flow: String,
    pub phase: Phase,
    /// One entry per expanded combination, in expansion order
    pub instances: Vec<InstanceReport>,
    pub duration: Duration,
}

impl FlowReport {
    /// No combination failed (skipped combinations do not count)
    pub fn success(&self) -> bool {
        !self.instances.iter().any(|i| i.status.is_failure())
    }

    pub fn completed(&self) -> usize {
        self.instances.iter().filter(|i| i.status.is_done()).count()
    }

    pub fn failed(&self) -> usize {
        self.instances
            .iter()
            .filter(|i| i.status.is_failure())
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.instances
            .iter()
            .filter(|i| i.status.is_skipped())
            .count()
    }

    /// Environments of every combination that reached `Done`
    pub fn done_environments(&self) -> impl Iterator<Item = &Environment> {
        self.instances
            .iter()
            .filter(|i| i.status.is_done())
            .filter_map(|i| i.env.as_ref())
    }
}
