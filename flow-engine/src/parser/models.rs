// Flow File Data Models
// Serializable types describing flows, their steps and expectations in YAML

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root of a flow file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FlowFile {
    /// Suite name
    #[serde(default)]
    pub name: Option<String>,

    /// Initial environment: each entry is a scalar or a list of candidates
    #[serde(default)]
    pub env: BTreeMap<String, serde_yaml::Value>,

    /// Flows, run in the order they are listed
    #[serde(default)]
    pub flows: Vec<FlowDef>,
}

/// One flow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowDef {
    pub name: String,

    /// Local name -> environment variable expanded over, in declared order
    #[serde(default)]
    pub matrix: serde_yaml::Mapping,

    /// Variables that must be present for a combination to run
    #[serde(default)]
    pub requires: Vec<String>,

    /// Variables the flow must leave present
    #[serde(default)]
    pub provides: Vec<String>,

    /// Run combinations concurrently
    #[serde(default)]
    pub parallel: bool,

    /// Concurrency bound for parallel flows
    #[serde(default, rename = "max-parallel")]
    pub max_parallel: Option<usize>,

    #[serde(default)]
    pub steps: Vec<StepDef>,

    /// Compensating steps, undone last-listed first
    #[serde(default)]
    pub rollback: Vec<StepDef>,
}

/// One step: a command line plus optional expectations and captures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDef {
    pub run: CommandLine,

    /// Data written to standard input
    #[serde(default)]
    pub input: Option<String>,

    /// Timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Disable `{{NAME}}` expansion
    #[serde(default, rename = "no-expand")]
    pub no_expand: bool,

    /// Expectations; none means the command must simply succeed
    #[serde(default)]
    pub expect: Vec<ExpectDef>,

    /// Variable -> regex captured from stdout after the step
    #[serde(default)]
    pub capture: BTreeMap<String, String>,
}

/// Command line as a single string (split on whitespace) or an argv list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CommandLine {
    Line(String),
    Argv(Vec<String>),
}

impl CommandLine {
    /// Split into program and arguments
    pub fn to_argv(&self) -> Vec<String> {
        match self {
            CommandLine::Line(line) => line.split_whitespace().map(String::from).collect(),
            CommandLine::Argv(argv) => argv.clone(),
        }
    }
}

/// Serializable form of an expectation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ExpectDef {
    #[serde(default, rename = "exit-code")]
    pub exit_code: Option<i32>,

    /// Regex matched against stdout
    #[serde(default)]
    pub stdout: Option<String>,

    /// Regex matched against stderr
    #[serde(default)]
    pub stderr: Option<String>,

    /// Expect the command to time out
    #[serde(default)]
    pub timeout: bool,
}
