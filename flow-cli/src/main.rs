// flowctl
// Command line runner for flow files

mod commands;
mod logging;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;

/// Run declarative command flows with matrix expansion and rollback
#[derive(Parser, Debug)]
#[command(name = "flowctl", version, about, long_about = None)]
struct Cli {
    /// Log filter (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Supported log formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// JSON lines
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every flow in a flow file
    Run(commands::FlowArgs),

    /// Run the compensating steps of every flow, last flow first
    Rollback(commands::FlowArgs),

    /// Validate a flow file without running it
    Validate(commands::validate::ValidateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init_tracing(&cli.log_level, cli.log_format)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Rollback(args) => commands::rollback::execute(args).await,
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
