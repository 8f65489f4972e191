// Parser module for flow files
// Provides YAML parsing, validation, and conversion into executable suites

pub mod flow_file;
pub mod models;

pub use flow_file::FlowParser;
pub use models::*;
