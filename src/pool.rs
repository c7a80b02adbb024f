//! Bounded worker pool
//!
//! Specs are admitted in order, each once a slot is free. A slot is an owned
//! semaphore permit that travels with the spawned task and is released when
//! the task is done, so the next queued spec starts right away.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::common::{Error, Result};
use crate::discovery::TaskSpec;
use crate::report::{FailureReason, Outcome, ResultCollector, RunReport, TaskResult};

/// Runs a single spec to completion
///
/// Implementations must turn every failure into a [`TaskResult`]; the pool
/// has no error path for individual specs.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, spec: &TaskSpec) -> TaskResult;
}

/// Receives start and finish notices
pub trait Progress: Send + Sync {
    /// Called once before the first spec is admitted
    fn queued(&self, _specs: &[TaskSpec], _limit: usize) {}
    /// Called by the coordinator when a spec is admitted to a slot
    fn started(&self, spec: &TaskSpec);
    /// Called when a spec's result is known
    fn finished(&self, result: &TaskResult);
}

/// Progress sink that discards everything
pub struct Silent;

impl Progress for Silent {
    fn started(&self, _spec: &TaskSpec) {}
    fn finished(&self, _result: &TaskResult) {}
}

/// Fixed-size pool of concurrently running specs
pub struct WorkerPool {
    limit: usize,
    slots: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        Ok(Self {
            limit,
            slots: Arc::new(Semaphore::new(limit)),
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run every spec exactly once and collect the results
    ///
    /// Returns only after all specs have finished, whatever their outcome.
    pub async fn run(
        &self,
        specs: Vec<TaskSpec>,
        executor: Arc<dyn TaskExecutor>,
        progress: Arc<dyn Progress>,
    ) -> Result<RunReport> {
        let expected = specs.len();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();
        let mut admitted = HashMap::with_capacity(expected);

        progress.queued(&specs, self.limit);

        for spec in specs {
            let permit = Arc::clone(&self.slots)
                .acquire_owned()
                .await
                .map_err(|e| Error::Internal(format!("Worker pool closed: {}", e)))?;

            tracing::debug!(
                spec = %spec.name,
                in_flight = self.limit - self.slots.available_permits(),
                "Admitting spec"
            );
            progress.started(&spec);

            let executor = Arc::clone(&executor);
            let progress = Arc::clone(&progress);
            let tx = tx.clone();
            let task_spec = spec.clone();

            let handle = tasks.spawn(async move {
                // Slot is held until the spec is done
                let _permit = permit;
                let result = executor.execute(&task_spec).await;
                progress.finished(&result);
                let _ = tx.send(result);
            });
            admitted.insert(handle.id(), spec);
        }

        while let Some(joined) = tasks.join_next().await {
            let Err(e) = joined else { continue };

            let name = admitted
                .get(&e.id())
                .map(|s| s.name.clone())
                .unwrap_or_else(|| "<unknown>".to_string());
            tracing::error!(spec = %name, error = %e, "Spec task aborted");

            let result = TaskResult::new(
                name,
                format!("Spec task aborted: {}", e),
                Outcome::failure(None, FailureReason::Crash),
                Duration::ZERO,
            );
            progress.finished(&result);
            let _ = tx.send(result);
        }
        drop(tx);

        Ok(ResultCollector::new(expected).collect(rx).await)
    }
}
