use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use flow_engine::{FlowParser, MatrixExpander};

/// Validate a flow YAML file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the flow YAML file
    pub file: PathBuf,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let path = &args.file;

    if !path.exists() {
        color_eyre::eyre::bail!("Flow file not found: {}", path.display());
    }

    // Step 1: Parse YAML syntax
    output::status("Validating", &format!("{}", path.display()));

    let file = match FlowParser::from_file(path) {
        Ok(file) => file,
        Err(e) => {
            output::error(&format!("Parse error: {}", e));
            std::process::exit(1);
        }
    };

    output::check("YAML syntax valid");

    // Step 2: Semantic validation
    match FlowParser::validate(&file) {
        Ok(()) => output::check("Semantic validation passed"),
        Err(errors) => {
            output::error(&format!("{} validation error(s):", errors.len()));
            for error in &errors {
                output::error(&format!("  - {}", error));
            }
            std::process::exit(1);
        }
    }

    // Step 3: Build the executable suite
    let env = file.environment()?;
    let suite = file.to_suite("flows")?;

    let steps: usize = suite.flows().iter().map(|f| f.actions().len()).sum();
    let rollback: usize = suite.flows().iter().map(|f| f.rollback_steps().len()).sum();
    output::check(&format!(
        "Structure: {} flows, {} steps, {} rollback steps",
        suite.flows().len(),
        steps,
        rollback
    ));

    for flow in suite.flows() {
        let combinations = MatrixExpander::count(flow.matrix_entries(), &env);
        output::dim(&format!(
            "    {} ({} combinations with the declared env{})",
            flow.name(),
            combinations,
            if flow.is_parallel() { ", parallel" } else { "" }
        ));
    }

    println!();
    output::success(&format!("{} is valid", path.display()));

    Ok(())
}
