//! clickpool - bounded-concurrency end-to-end test orchestrator
//!
//! Discovers spec files, runs each through an external test runner as a
//! separate process with at most N running at once, and folds the results
//! into a single report whose verdict is the AND of every spec's verdict.

pub mod cli;
pub mod commands;
pub mod common;
pub mod discovery;
pub mod orchestrator;
pub mod pool;
pub mod report;
pub mod runner;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use discovery::TaskSpec;
pub use report::{Outcome, RunReport, TaskResult};
