//! Command-line interface for imageforge.
//!
//! Provides commands for running a worker pool, submitting and inspecting
//! tasks, and driving a queue-less batch run.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
