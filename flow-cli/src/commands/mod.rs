// CLI Commands
// Shared flow-file arguments and the environment/executor setup behind them

pub mod rollback;
pub mod run;
pub mod validate;

use crate::output;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use color_eyre::eyre::{bail, eyre};
use color_eyre::Result;

use flow_engine::{
    progress_channel, Environment, FlowContext, FlowParser, FlowSuite, MemoryReporter,
    ProcessConfig, ProcessExecutor, ProgressReceiver,
};

/// Arguments shared by `run` and `rollback`
#[derive(Args, Debug)]
pub struct FlowArgs {
    /// Path to the flow YAML file
    pub file: PathBuf,

    /// Set a variable (can be repeated, format: NAME=v1,v2)
    #[arg(long = "var", short = 'v', value_name = "NAME=VALUES")]
    pub variables: Vec<String>,

    /// Import process environment variables starting with this prefix; they
    /// override the file's `env:` block and are overridden by `--var`
    #[arg(long, value_name = "PREFIX")]
    pub env_prefix: Option<String>,

    /// Log commands instead of running them; expectations are not checked
    #[arg(long)]
    pub dry_run: bool,

    /// Bound the number of combinations running at once in parallel flows
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_parallel: Option<u64>,

    /// Working directory for every command
    #[arg(long, short = 'w', value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Default command timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Only drive the named flows (can be repeated)
    #[arg(long = "flow", value_name = "NAME")]
    pub flows: Vec<String>,
}

/// Everything a command needs to drive a suite
pub struct Prepared {
    pub suite: FlowSuite,
    pub env: Environment,
    pub ctx: FlowContext,
    pub reporter: MemoryReporter,
    pub events: ProgressReceiver,
}

/// Load the flow file and build the environment, executor and context
pub fn prepare(args: &FlowArgs) -> Result<Prepared> {
    let file = load(&args.file)?;

    let default_name = args
        .file
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("flows");
    let mut suite = file.to_suite(default_name)?;

    if !args.flows.is_empty() {
        for name in &args.flows {
            if !suite.flows().iter().any(|f| f.name() == name) {
                bail!("Unknown flow '{}' in {}", name, args.file.display());
            }
        }
        suite = suite.select(&args.flows);
    }

    if let Some(limit) = args.max_parallel {
        let limit = usize::try_from(limit)?;
        let mut bounded = FlowSuite::new(suite.name());
        for flow in suite.flows() {
            let mut flow = flow.clone();
            flow.max_parallel(limit);
            bounded.add_flow(flow);
        }
        suite = bounded;
    }

    let imported = args
        .env_prefix
        .as_deref()
        .map(|prefix| Environment::from_vars(prefix, std::env::vars()));
    let mut env = layered_environment(
        file.environment()?,
        imported.as_ref(),
        parse_variables(&args.variables)?,
    );
    env.set_dry(args.dry_run);

    let working_dir = match &args.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let config = ProcessConfig {
        working_dir: Some(working_dir),
        default_timeout: args.timeout.map(Duration::from_secs),
        ..ProcessConfig::default()
    };

    let reporter = MemoryReporter::new();
    let (tx, events) = progress_channel();
    let ctx = FlowContext::new(
        Arc::new(ProcessExecutor::with_config(config)),
        Arc::new(reporter.clone()),
    )
    .with_progress(tx);

    output::info(&format!(
        "Suite '{}': {} flows{}",
        suite.name(),
        suite.flows().len(),
        if args.dry_run { " (dry run)" } else { "" }
    ));

    Ok(Prepared {
        suite,
        env,
        ctx,
        reporter,
        events,
    })
}

/// Parse and validate a flow file, reporting where it came from
pub fn load(path: &Path) -> Result<flow_engine::FlowFile> {
    if !path.exists() {
        bail!("Flow file not found: {}", path.display());
    }

    output::status("Parsing", &format!("{}", path.display()));
    let file = FlowParser::from_file(path).map_err(|e| eyre!("{}", e))?;
    FlowParser::validate(&file)
        .map_err(|errors| eyre!("{} validation error(s): {}", errors.len(), errors.join("; ")))?;
    Ok(file)
}

/// Layer variables over the file's `env:` block: imported process variables
/// override the file, `--var` assignments override both
pub fn layered_environment(
    declared: Environment,
    imported: Option<&Environment>,
    assignments: Vec<(String, Vec<String>)>,
) -> Environment {
    let mut env = declared;
    if let Some(imported) = imported {
        for name in imported.names() {
            env.set(name, imported.all(name));
        }
    }
    for (name, values) in assignments {
        env.set(name, values);
    }
    env
}

/// Parse `NAME=v1,v2` assignments; an empty value clears the variable
pub fn parse_variables(raw: &[String]) -> Result<Vec<(String, Vec<String>)>> {
    raw.iter()
        .map(|assignment| {
            let Some((name, values)) = assignment.split_once('=') else {
                bail!(
                    "Invalid variable format '{}'. Expected NAME=value[,value...]",
                    assignment
                );
            };
            if name.is_empty() {
                bail!("Invalid variable format '{}'. Name is empty", assignment);
            }
            let values = values
                .split(',')
                .filter(|v| !v.is_empty())
                .map(String::from)
                .collect();
            Ok((name.to_string(), values))
        })
        .collect()
}

/// Print recorded failures and exit non-zero when the run did not succeed
pub fn finish(success: bool, reporter: &MemoryReporter) {
    let failures = reporter.failures();
    if !failures.is_empty() {
        println!();
        output::error(&format!("{} failure(s):", failures.len()));
        for failure in &failures {
            output::failure(&failure.to_string());
        }
    }

    if !success {
        std::process::exit(1);
    }
}
