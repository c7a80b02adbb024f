//! Discovery, pool and report wired into one run

use std::path::PathBuf;
use std::sync::Arc;

use crate::common::config::Config;
use crate::common::Result;
use crate::discovery::{discover, DiscoveryRule, TaskSpec};
use crate::pool::{Progress, WorkerPool};
use crate::report::RunReport;
use crate::runner::{resolve_program, ProcessRunner, RunnerConfig};

/// Everything a run needs, after config file and flags are merged
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub dir: PathBuf,
    pub rule: DiscoveryRule,
    pub concurrency: usize,
    pub runner: RunnerConfig,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dir: config.discovery.dir.clone(),
            rule: config.discovery_rule(),
            concurrency: config.pool.concurrency,
            runner: config.runner_config(),
        }
    }

    /// Specs in the order they will be dispatched
    pub fn discover(&self) -> Result<Vec<TaskSpec>> {
        discover(&self.dir, &self.rule)
    }
}

/// Run every discovered spec and return the report
///
/// Fails only when nothing can be started: bad concurrency, an unreadable or
/// empty spec directory, or a runner that is not on PATH.
pub async fn run(settings: &RunSettings, progress: Arc<dyn Progress>) -> Result<RunReport> {
    let pool = WorkerPool::new(settings.concurrency)?;
    let specs = settings.discover()?;

    let mut runner = settings.runner.clone();
    runner.program = resolve_program(&runner.program)?;

    tracing::info!(
        specs = specs.len(),
        concurrency = pool.limit(),
        runner = %runner.program.display(),
        "Starting run"
    );

    let report = pool
        .run(specs, Arc::new(ProcessRunner::new(runner)), progress)
        .await?;

    let summary = report.summary();
    tracing::info!(
        passed = summary.passed,
        failed = summary.failed,
        overall = report.overall,
        "Run finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use crate::pool::Silent;

    #[tokio::test]
    async fn test_zero_concurrency_fails_before_discovery() {
        let settings = RunSettings {
            concurrency: 0,
            dir: PathBuf::from("/definitely/missing"),
            ..RunSettings::from_config(&Config::default())
        };

        let err = run(&settings, Arc::new(Silent)).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_missing_dir_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RunSettings {
            dir: dir.path().join("nmclicktests"),
            ..RunSettings::from_config(&Config::default())
        };

        let err = run(&settings, Arc::new(Silent)).await.unwrap_err();
        assert!(matches!(err, Error::Discovery { .. }));
    }

    #[tokio::test]
    async fn test_unknown_runner_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("spec.a.js"), "").unwrap();

        let mut settings = RunSettings::from_config(&Config::default());
        settings.dir = dir.path().to_path_buf();
        settings.runner.program = PathBuf::from("definitely-not-a-real-runner-xyz");

        let err = run(&settings, Arc::new(Silent)).await.unwrap_err();
        assert!(matches!(err, Error::RunnerNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_end_to_end_with_shell_runner() {
        use std::sync::Mutex;

        struct Order(Mutex<Vec<String>>);
        impl Progress for Order {
            fn started(&self, spec: &TaskSpec) {
                self.0.lock().unwrap().push(spec.name.clone());
            }
            fn finished(&self, _result: &crate::report::TaskResult) {}
        }

        let dir = tempfile::tempdir().unwrap();
        for name in ["spec.b.js", "spec.generic.js", "spec.a.js"] {
            std::fs::write(dir.path().join(name), "echo running\n").unwrap();
        }

        let mut settings = RunSettings::from_config(&Config::default());
        settings.dir = dir.path().to_path_buf();
        settings.concurrency = 2;
        settings.runner.program = PathBuf::from("sh");

        let order = Arc::new(Order(Mutex::new(Vec::new())));
        let report = run(&settings, order.clone()).await.unwrap();

        assert_eq!(report.results.len(), 3);
        assert!(report.overall);
        assert_eq!(order.0.lock().unwrap()[0], "spec.generic.js");
    }
}
