use async_trait::async_trait;
use lumen_core::models::UploadJob;

/// Executes the pipeline for one dequeued job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run the job to completion. An `Err` marks the job as failed; it is never retried.
    async fn handle(&self, job: &UploadJob) -> anyhow::Result<()>;

    /// Called once for a failed or panicked job, after `handle` returned.
    async fn on_failure(&self, job: &UploadJob, error: &anyhow::Error);
}
