// Assertion Module
// Fail-fast and record-and-continue verification of command results, and the
// reporting context failures are recorded into

pub mod assertions;

// Re-export key types
pub use assertions::{verify, AssertMode, Failure, FailureKind, MemoryReporter, Reporter, Scope};
