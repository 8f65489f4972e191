// Execution Engine Module
// Matrix expansion, fan-out scheduling, flow and rollback runners, hooks and
// suites of flows

pub mod events;
pub mod flow;
pub mod hooks;
pub mod matrix;
mod rollback;
mod runner;
mod scheduler;
pub mod suite;

// Re-export key types
pub use events::{progress_channel, FlowEvent, Phase, ProgressReceiver, ProgressSender};
pub use flow::{ExecFlow, FlowContext, FlowReport, InstanceReport, InstanceStatus};
pub use hooks::{Hook, HookPosition, HookRegistry};
pub use matrix::{Combination, MatrixEntry, MatrixExpander};
pub use suite::{FlowSuite, SuiteReport};
