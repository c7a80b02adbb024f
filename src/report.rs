//! Per-spec results and the aggregated run report

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::sync::mpsc;

use crate::common::Result;

/// Why a spec failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Ran past the runtime ceiling and was killed
    Timeout,
    /// Exited with a non-zero status
    Assertion,
    /// Terminated by a signal or without an exit code
    Crash,
    /// Produced more output than the buffer ceiling and was killed
    OutputLimit,
    /// The runner process could not be started
    Spawn,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureReason::Timeout => "timed out",
            FailureReason::Assertion => "assertion failed",
            FailureReason::Crash => "crashed",
            FailureReason::OutputLimit => "output limit exceeded",
            FailureReason::Spawn => "failed to start",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of one spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure {
        exit_code: Option<i32>,
        reason: FailureReason,
    },
}

impl Outcome {
    pub fn failure(exit_code: Option<i32>, reason: FailureReason) -> Self {
        Outcome::Failure { exit_code, reason }
    }
}

/// Result of running one spec, created once when its process is done
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub name: String,
    /// Combined stdout and stderr, in arrival order
    pub output: String,
    pub outcome: Outcome,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: Serializer>(duration: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u128(duration.as_millis())
}

impl TaskResult {
    pub fn new(name: impl Into<String>, output: String, outcome: Outcome, duration: Duration) -> Self {
        Self {
            name: name.into(),
            output,
            outcome,
            duration,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self.outcome, Outcome::Success)
    }
}

/// Pass/fail counts of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

/// All results of a run in completion order, plus the overall verdict
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub results: Vec<TaskResult>,
    pub overall: bool,
}

impl RunReport {
    pub fn new(results: Vec<TaskResult>) -> Self {
        let overall = results.iter().all(TaskResult::success);
        Self { results, overall }
    }

    /// Failed results, in completion order
    pub fn failures(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.iter().filter(|r| !r.success())
    }

    pub fn summary(&self) -> Summary {
        let failed = self.failures().count();
        Summary {
            total: self.results.len(),
            passed: self.results.len() - failed,
            failed,
        }
    }

    /// Write the captured output of every failed spec between named delimiters
    pub fn write_failure_logs<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        for result in self.failures() {
            writeln!(w, "---- start of {} log ----", result.name)?;
            writeln!(w, "{}", result.output)?;
            writeln!(w, "----- end of {} log -----", result.name)?;
        }
        Ok(())
    }

    /// Write the report as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Gathers results as specs finish
pub struct ResultCollector {
    expected: usize,
}

impl ResultCollector {
    /// `expected` is the number of specs admitted, used to size the report
    pub fn new(expected: usize) -> Self {
        Self { expected }
    }

    /// Drain `rx` until every sender is gone, then build the report
    pub async fn collect(self, mut rx: mpsc::UnboundedReceiver<TaskResult>) -> RunReport {
        let mut results = Vec::with_capacity(self.expected);
        while let Some(result) = rx.recv().await {
            results.push(result);
        }

        if results.len() != self.expected {
            tracing::warn!(
                expected = self.expected,
                received = results.len(),
                "Result count does not match admitted specs"
            );
        }

        RunReport::new(results)
    }
}
