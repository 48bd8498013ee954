use std::sync::Arc;
use std::time::Duration;

use clipforge_core::error::CoreError;
use clipforge_pipeline::Orchestrator;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

/// Spawns job executions in the background.
///
/// Each spawned task waits for a permit before calling
/// [`Orchestrator::execute`], so at most `max_concurrent` jobs generate at
/// the same time. Jobs waiting for a permit stay `queued`.
pub struct JobRunner {
    orchestrator: Arc<Orchestrator>,
    permits: Arc<Semaphore>,
    tasks: TaskTracker,
}

impl JobRunner {
    pub fn new(orchestrator: Arc<Orchestrator>, max_concurrent: usize) -> Self {
        Self {
            orchestrator,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tasks: TaskTracker::new(),
        }
    }

    /// Queue `job_id` for execution.
    pub fn spawn(&self, job_id: String) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let permits = Arc::clone(&self.permits);

        self.tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!(job_id = %job_id, "Job runner closed before execution");
                return;
            };

            match orchestrator.execute(&job_id, None).await {
                Ok(job) => {
                    tracing::info!(job_id = %job_id, status = %job.status, "Background execution finished");
                }
                // Cancelled or deleted while waiting for a permit.
                Err(CoreError::Conflict(msg)) => {
                    tracing::debug!(job_id = %job_id, reason = %msg, "Skipped job execution");
                }
                Err(CoreError::NotFound { .. }) => {
                    tracing::debug!(job_id = %job_id, "Job removed before execution");
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Background execution failed");
                }
            }
        });
    }

    /// Executions spawned and not yet finished, including those waiting
    /// for a permit.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Stop accepting work and wait up to `timeout` for running jobs.
    ///
    /// Returns `false` if executions were still running at the deadline;
    /// those jobs stay `processing` on disk and are resumed at next startup.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tasks.close();
        self.permits.close();
        tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok()
    }
}
