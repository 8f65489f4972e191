// Test Support
// Scripted command executor used by the engine's unit tests

use crate::command::{CmdResult, Command};
use crate::environment::Environment;
use crate::execution::FlowContext;
use crate::runners::CommandExecutor;
use crate::testing::MemoryReporter;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recorded invocation
#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Executor that records every call and answers from a script keyed by the
/// resolved program name. Unscripted programs succeed with empty output.
#[derive(Clone, Default)]
pub(crate) struct ScriptedExecutor {
    responses: Arc<HashMap<String, CmdResult>>,
    delay: Option<Duration>,
    state: Arc<Mutex<State>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, program: &str, result: CmdResult) -> Self {
        let mut responses = (*self.responses).clone();
        responses.insert(program.to_string(), result);
        self.responses = Arc::new(responses);
        self
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.program).collect()
    }

    pub fn args(&self) -> Vec<Vec<String>> {
        self.calls().into_iter().map(|c| c.args).collect()
    }

    /// Highest number of calls observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }
}

#[async_trait::async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, command: &Command, env: &Environment) -> CmdResult {
        let resolved = command.resolve(env);
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call {
                program: resolved.program.clone(),
                args: resolved.args.clone(),
            });
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.state.lock().unwrap().in_flight -= 1;

        let mut result = self
            .responses
            .get(&resolved.program)
            .cloned()
            .unwrap_or_else(|| CmdResult::success("", ""));
        result.command = resolved.to_string();
        result
    }
}

/// Flow context wired to a scripted executor and an in-memory reporter
pub(crate) fn context(executor: &ScriptedExecutor, reporter: &MemoryReporter) -> FlowContext {
    FlowContext::new(Arc::new(executor.clone()), Arc::new(reporter.clone()))
}
