// Flow Suite
// Runs an ordered list of flows over one base environment, publishing each
// flow's provided variables to the flows that follow

use crate::environment::Environment;
use crate::execution::flow::{ExecFlow, FlowContext, FlowReport};

use std::time::{Duration, Instant};

/// Ordered collection of flows sharing a base environment
#[derive(Debug, Clone, Default)]
pub struct FlowSuite {
    name: String,
    flows: Vec<ExecFlow>,
}

/// Outcome of running or rolling back a suite
#[derive(Debug, Clone)]
pub struct SuiteReport {
    pub suite: String,
    /// One report per flow, in the order the flows were driven
    pub flows: Vec<FlowReport>,
    pub duration: Duration,
}

impl SuiteReport {
    pub fn success(&self) -> bool {
        self.flows.iter().all(FlowReport::success)
    }

    pub fn failed(&self) -> usize {
        self.flows.iter().map(FlowReport::failed).sum()
    }

    pub fn completed(&self) -> usize {
        self.flows.iter().map(FlowReport::completed).sum()
    }

    pub fn skipped(&self) -> usize {
        self.flows.iter().map(FlowReport::skipped).sum()
    }
}

impl FlowSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flows: Vec::new(),
        }
    }

    pub fn add_flow(&mut self, flow: ExecFlow) -> &mut Self {
        self.flows.push(flow);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flows(&self) -> &[ExecFlow] {
        &self.flows
    }

    /// Keep only the flows whose names are listed, preserving suite order
    pub fn select(&self, names: &[String]) -> Self {
        Self {
            name: self.name.clone(),
            flows: self
                .flows
                .iter()
                .filter(|f| names.iter().any(|n| n == f.name()))
                .cloned()
                .collect(),
        }
    }

    /// Run every flow in order.
    ///
    /// After each flow, the values its `Done` combinations hold for the
    /// variables it provides are appended to the base environment, so later
    /// flows can require and expand over them. A failing flow does not stop
    /// the suite; later flows are gated by their own requirements. Returns the
    /// report and the resulting base environment.
    pub async fn run(&self, env: &Environment, ctx: &FlowContext) -> (SuiteReport, Environment) {
        let start = Instant::now();
        let mut base = env.clone();
        let mut reports = Vec::with_capacity(self.flows.len());

        tracing::info!(suite = %self.name, flows = self.flows.len(), "running suite");

        for flow in &self.flows {
            let report = flow.run(&base, ctx).await;
            for done in report.done_environments() {
                base.merge_provided(done, flow.provided());
            }
            reports.push(report);
        }

        let report = SuiteReport {
            suite: self.name.clone(),
            flows: reports,
            duration: start.elapsed(),
        };
        (report, base)
    }

    /// Roll back every flow, last flow first
    pub async fn rollback(&self, env: &Environment, ctx: &FlowContext) -> SuiteReport {
        let start = Instant::now();
        let mut reports = Vec::with_capacity(self.flows.len());

        tracing::info!(suite = %self.name, flows = self.flows.len(), "rolling back suite");

        for flow in self.flows.iter().rev() {
            reports.push(flow.rollback(env, ctx).await);
        }

        SuiteReport {
            suite: self.name.clone(),
            flows: reports,
            duration: start.elapsed(),
        }
    }
}
