// Flow File Parser
// Loads YAML flow files, validates them and builds executable suites

use crate::command::{CmdWithExp, Command, Expected};
use crate::environment::Environment;
use crate::error::{FlowError, FlowResult};
use crate::execution::{ExecFlow, FlowSuite, Hook};
use crate::parser::models::*;

use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Flow file parser
pub struct FlowParser;

impl FlowParser {
    /// Parse a flow file from a YAML string
    pub fn parse(content: &str) -> FlowResult<FlowFile> {
        let file: FlowFile = serde_yaml::from_str(content)?;
        Ok(file)
    }

    /// Parse a flow file from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> FlowResult<FlowFile> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| FlowError::Io(format!("failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parse and reject semantically invalid files
    pub fn parse_and_validate(content: &str) -> FlowResult<FlowFile> {
        let file = Self::parse(content)?;
        Self::validate(&file).map_err(|errors| FlowError::InvalidFlow(errors.join("; ")))?;
        Ok(file)
    }

    /// Check a parsed file, collecting every problem found
    pub fn validate(file: &FlowFile) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for (index, flow) in file.flows.iter().enumerate() {
            if flow.name.trim().is_empty() {
                errors.push(format!("flow #{} has an empty name", index + 1));
            } else if !seen.insert(flow.name.as_str()) {
                errors.push(format!("duplicate flow name '{}'", flow.name));
            }

            if !flow.provides.is_empty() && flow.steps.is_empty() {
                errors.push(format!(
                    "flow '{}' provides variables but has no steps",
                    flow.name
                ));
            }

            if let Err(err) = matrix_entries(flow) {
                errors.push(err.to_string());
            }

            if flow.max_parallel == Some(0) {
                errors.push(format!("flow '{}': max-parallel must be at least 1", flow.name));
            }

            for (kind, steps) in [("step", &flow.steps), ("rollback step", &flow.rollback)] {
                for (step_index, step) in steps.iter().enumerate() {
                    if step.run.to_argv().is_empty() {
                        errors.push(format!(
                            "flow '{}' {} {}: empty command",
                            flow.name, kind, step_index
                        ));
                    }
                    for pattern in step_patterns(step) {
                        if let Err(err) = Regex::new(pattern) {
                            errors.push(format!(
                                "flow '{}' {} {}: invalid pattern /{}/: {}",
                                flow.name, kind, step_index, pattern, err
                            ));
                        }
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl FlowFile {
    /// Initial environment declared by the file
    pub fn environment(&self) -> FlowResult<Environment> {
        let mut env = Environment::new();
        for (name, value) in &self.env {
            env.set(name.clone(), scalar_list(name, value)?);
        }
        Ok(env)
    }

    /// Build the executable suite. `default_name` is used when the file does
    /// not name itself.
    pub fn to_suite(&self, default_name: &str) -> FlowResult<FlowSuite> {
        let name = self.name.as_deref().unwrap_or(default_name);
        let mut suite = FlowSuite::new(name);
        for def in &self.flows {
            suite.add_flow(def.to_flow()?);
        }
        Ok(suite)
    }
}

impl FlowDef {
    /// Convert into an executable flow
    pub fn to_flow(&self) -> FlowResult<ExecFlow> {
        let mut flow = ExecFlow::new(self.name.clone());

        for (local, source) in matrix_entries(self)? {
            flow.matrix(local, source);
        }
        for name in &self.requires {
            flow.requires(name.clone());
        }
        for name in &self.provides {
            flow.provides(name.clone());
        }
        flow.parallel(self.parallel);
        if let Some(limit) = self.max_parallel {
            flow.max_parallel(limit);
        }

        for step in &self.steps {
            let built = step.to_step()?;
            flow.add(built.command, built.expected);
            for (var, pattern) in &step.capture {
                flow.add_hook(Hook::capture(var.clone(), Regex::new(pattern)?));
            }
        }
        for step in &self.rollback {
            let built = step.to_step()?;
            flow.add_rollback(built.command, built.expected);
        }

        Ok(flow)
    }
}

impl StepDef {
    /// Convert into a command with its expectations
    pub fn to_step(&self) -> FlowResult<CmdWithExp> {
        let mut argv = self.run.to_argv().into_iter();
        let program = argv
            .next()
            .ok_or_else(|| FlowError::InvalidFlow("step has an empty command".to_string()))?;

        let mut command = Command::new(program).args(argv);
        if let Some(input) = &self.input {
            command = command.with_input(input.clone());
        }
        if let Some(secs) = self.timeout {
            command = command.with_timeout(Duration::from_secs(secs));
        }
        if self.no_expand {
            command = command.no_expand();
        }

        let expected = self
            .expect
            .iter()
            .map(ExpectDef::to_expected)
            .collect::<FlowResult<Vec<_>>>()?;

        Ok(CmdWithExp::new(command, expected))
    }
}

impl ExpectDef {
    pub fn to_expected(&self) -> FlowResult<Expected> {
        let mut expected = Expected::new();
        if let Some(code) = self.exit_code {
            expected = expected.exit_code(code);
        }
        if let Some(pattern) = &self.stdout {
            expected = expected.stdout(pattern)?;
        }
        if let Some(pattern) = &self.stderr {
            expected = expected.stderr(pattern)?;
        }
        if self.timeout {
            expected = expected.timeout();
        }
        Ok(expected)
    }
}

/// Matrix entries in declared order; both sides must be non-empty strings
fn matrix_entries(flow: &FlowDef) -> FlowResult<Vec<(String, String)>> {
    flow.matrix
        .iter()
        .map(|(local, source)| match (local.as_str(), source.as_str()) {
            (Some(local), Some(source)) if !local.is_empty() && !source.is_empty() => {
                Ok((local.to_string(), source.to_string()))
            }
            _ => Err(FlowError::InvalidFlow(format!(
                "flow '{}': matrix entries must map a local name to a variable name",
                flow.name
            ))),
        })
        .collect()
}

fn step_patterns(step: &StepDef) -> impl Iterator<Item = &str> {
    step.expect
        .iter()
        .flat_map(|e| e.stdout.iter().chain(e.stderr.iter()))
        .chain(step.capture.values())
        .map(String::as_str)
}

fn scalar_list(name: &str, value: &serde_yaml::Value) -> FlowResult<Vec<String>> {
    use serde_yaml::Value;

    let scalar = |v: &Value| match v {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(FlowError::InvalidFlow(format!(
            "env '{}': values must be scalars",
            name
        ))),
    };

    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items.iter().map(scalar).collect(),
        other => Ok(vec![scalar(other)?]),
    }
}
