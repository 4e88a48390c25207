//! Ingestion queue: FIFO wait list, bounded worker pool, shutdown.
//!
//! The scheduler task is the only consumer of the wait list. It acquires a worker slot
//! first and only then takes the head of the list, so waiting jobs keep their FIFO
//! position until a slot is actually free. Slots are released by a guard dropped when
//! the job's task ends, whether the job succeeded, failed or panicked.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use lumen_core::constants::{DEFAULT_MAX_WORKERS, MAX_WORKERS_CEILING};
use lumen_core::models::{EnqueueOutcome, UploadJob};
use lumen_core::IngestConfig;
use serde::Serialize;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::handler::JobHandler;

#[derive(Debug, Clone)]
pub struct IngestQueueConfig {
    pub max_workers: usize,
}

impl Default for IngestQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl From<&IngestConfig> for IngestQueueConfig {
    fn from(config: &IngestConfig) -> Self {
        Self {
            max_workers: config.max_workers,
        }
    }
}

/// Point-in-time view of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub active: usize,
    pub max_workers: usize,
    pub accepting: bool,
}

/// What happened to the work that was in the queue when it shut down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Accepted jobs that never started and were discarded
    pub dropped: usize,
}

/// Occupies one worker slot for the lifetime of a job.
struct ActiveSlot {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::UnboundedSender<UploadJob>,
    queued: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    semaphore: Arc<Semaphore>,
    max_workers: usize,
    shutdown: CancellationToken,
    scheduler: Arc<Mutex<Option<JoinHandle<usize>>>>,
}

impl IngestQueue {
    /// Create the queue and spawn its scheduler. Must be called inside a Tokio runtime.
    pub fn new(config: IngestQueueConfig, handler: Arc<dyn JobHandler>) -> Self {
        let max_workers = config.max_workers.clamp(1, MAX_WORKERS_CEILING);
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(max_workers));
        let shutdown = CancellationToken::new();

        let scheduler = tokio::spawn(Self::scheduler(
            rx,
            handler,
            semaphore.clone(),
            queued.clone(),
            active.clone(),
            shutdown.clone(),
        ));

        tracing::info!(max_workers, "Ingest queue started");

        Self {
            tx,
            queued,
            active,
            semaphore,
            max_workers,
            shutdown,
            scheduler: Arc::new(Mutex::new(Some(scheduler))),
        }
    }

    /// Append a job to the wait list. Never blocks; rejected only after shutdown.
    pub fn enqueue(&self, job: UploadJob) -> EnqueueOutcome {
        let upload_id = job.upload_id;
        if self.shutdown.is_cancelled() {
            tracing::warn!(upload_id = %upload_id, "Ingest queue is shut down, job rejected");
            return EnqueueOutcome {
                accepted: false,
                queue_depth: self.queued.load(Ordering::SeqCst),
            };
        }

        let queue_depth = self.queued.fetch_add(1, Ordering::SeqCst) + 1;
        if self.tx.send(job).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!(upload_id = %upload_id, "Ingest scheduler stopped, job rejected");
            return EnqueueOutcome {
                accepted: false,
                queue_depth: queue_depth - 1,
            };
        }

        tracing::info!(
            upload_id = %upload_id,
            queue_depth,
            active = self.active.load(Ordering::SeqCst),
            "Job enqueued"
        );

        EnqueueOutcome {
            accepted: true,
            queue_depth,
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.queued.load(Ordering::SeqCst),
            active: self.active.load(Ordering::SeqCst),
            max_workers: self.max_workers,
            accepting: !self.shutdown.is_cancelled(),
        }
    }

    /// Stop accepting jobs, discard the ones that have not started and wait for the
    /// in-flight ones to finish. Calling it again is a no-op.
    pub async fn shutdown(&self) -> ShutdownReport {
        tracing::info!("Initiating ingest queue shutdown");
        self.shutdown.cancel();

        let scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(scheduler) = scheduler else {
            return ShutdownReport::default();
        };

        let dropped = match scheduler.await {
            Ok(dropped) => dropped,
            Err(e) => {
                tracing::error!(error = %e, "Ingest scheduler task failed");
                0
            }
        };

        // Every slot back means every in-flight job has finished
        match self.semaphore.acquire_many(self.max_workers as u32).await {
            Ok(permits) => permits.forget(),
            Err(e) => tracing::warn!(error = %e, "Worker slots already closed"),
        }
        self.semaphore.close();

        tracing::info!(dropped, "Ingest queue stopped");
        ShutdownReport { dropped }
    }

    async fn scheduler(
        mut rx: mpsc::UnboundedReceiver<UploadJob>,
        handler: Arc<dyn JobHandler>,
        semaphore: Arc<Semaphore>,
        queued: Arc<AtomicUsize>,
        active: Arc<AtomicUsize>,
        shutdown: CancellationToken,
    ) -> usize {
        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            queued.fetch_sub(1, Ordering::SeqCst);
            active.fetch_add(1, Ordering::SeqCst);
            let slot = ActiveSlot {
                _permit: permit,
                active: active.clone(),
            };

            tracing::debug!(
                upload_id = %job.upload_id,
                queued = queued.load(Ordering::SeqCst),
                active = active.load(Ordering::SeqCst),
                "Job dequeued"
            );

            let handler = handler.clone();
            tokio::spawn(async move {
                let _slot = slot;
                run_job(handler.as_ref(), job).await;
            });
        }

        rx.close();
        let mut dropped = 0;
        while let Ok(job) = rx.try_recv() {
            queued.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!(upload_id = %job.upload_id, staging_key = %job.staging_key, "Dropping queued job on shutdown");
            dropped += 1;
        }
        dropped
    }
}

#[tracing::instrument(skip_all, fields(upload_id = %job.upload_id, owner_id = %job.owner_id))]
async fn run_job(handler: &dyn JobHandler, job: UploadJob) {
    let start = std::time::Instant::now();

    let outcome = AssertUnwindSafe(handler.handle(&job)).catch_unwind().await;
    let error = match outcome {
        Ok(Ok(())) => {
            tracing::info!(
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Job completed"
            );
            return;
        }
        Ok(Err(e)) => e,
        Err(panic) => anyhow::anyhow!("Job panicked: {}", panic_message(panic.as_ref())),
    };

    tracing::error!(
        error = %error,
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Job failed"
    );

    if AssertUnwindSafe(handler.on_failure(&job, &error))
        .catch_unwind()
        .await
        .is_err()
    {
        tracing::error!("Failure handler panicked");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn config_defaults_to_three_workers() {
        assert_eq!(IngestQueueConfig::default().max_workers, 3);
    }
}
