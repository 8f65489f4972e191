// Flow Engine Library
// Declarative command flows with matrix expansion, hooks, assertions and rollback

pub mod command;
pub mod environment;
pub mod error;
pub mod execution;
pub mod parser;
pub mod runners;
pub mod testing;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use error::{FlowError, FlowResult};

pub use command::{CmdResult, CmdWithExp, Command, Expected, ResolvedCommand};
pub use environment::Environment;

// Re-export execution types
pub use execution::{
    progress_channel, Combination, ExecFlow, FlowContext, FlowEvent, FlowReport, FlowSuite, Hook,
    HookPosition, HookRegistry, InstanceReport, InstanceStatus, MatrixEntry, MatrixExpander, Phase,
    ProgressReceiver, ProgressSender, SuiteReport,
};

// Re-export parser types
pub use parser::{FlowFile, FlowParser};

// Re-export runner types
pub use runners::{CommandExecutor, ProcessConfig, ProcessExecutor};

// Re-export assertion types
pub use testing::{verify, AssertMode, Failure, FailureKind, MemoryReporter, Reporter, Scope};
