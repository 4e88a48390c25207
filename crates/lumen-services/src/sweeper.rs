use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lumen_core::IngestConfig;
use lumen_storage::{Storage, StorageResult};
use serde::Serialize;
use tokio::time::interval;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Periodically removes staging objects that were never turned into a catalog record:
/// uploads that were never finalized and jobs that died before staging cleanup.
pub struct OrphanSweeper {
    storage: Arc<dyn Storage>,
    staging_prefix: String,
    interval: Duration,
    max_age: Duration,
}

impl OrphanSweeper {
    pub fn new(
        storage: Arc<dyn Storage>,
        staging_prefix: impl Into<String>,
        interval: Duration,
        max_age: Duration,
    ) -> Self {
        Self {
            storage,
            staging_prefix: staging_prefix.into(),
            interval,
            max_age,
        }
    }

    pub fn from_config(config: &IngestConfig, storage: Arc<dyn Storage>) -> Self {
        Self::new(
            storage,
            config.staging_prefix.clone(),
            config.orphan_sweep_interval,
            config.orphan_max_age,
        )
    }

    /// Start the background sweep. The first pass runs immediately.
    /// Returns a JoinHandle for graceful shutdown
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_interval = interval(self.interval);

            loop {
                sweep_interval.tick().await;

                tracing::info!(prefix = %self.staging_prefix, "Starting scheduled orphan sweep");

                if let Err(e) = self.sweep_once().await {
                    tracing::error!(error = %e, "Orphan sweep failed");
                }
            }
        })
    }

    pub async fn sweep_once(&self) -> StorageResult<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Delete every staging object last modified more than `max_age` before `now`.
    #[tracing::instrument(
        skip(self),
        fields(cleanup.operation = "orphan_sweep", prefix = %self.staging_prefix)
    )]
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> StorageResult<SweepReport> {
        let objects = self.storage.list_by_prefix(&self.staging_prefix).await?;
        let mut report = SweepReport {
            scanned: objects.len(),
            ..Default::default()
        };

        for object in objects {
            // Timestamps in the future count as fresh
            let is_expired = (now - object.last_modified)
                .to_std()
                .map(|age| age > self.max_age)
                .unwrap_or(false);
            if !is_expired {
                continue;
            }

            match self.storage.delete(&object.key).await {
                Ok(()) => {
                    tracing::info!(
                        key = %object.key,
                        last_modified = %object.last_modified,
                        "Deleted orphaned staging object"
                    );
                    report.deleted += 1;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        key = %object.key,
                        "Failed to delete orphaned staging object"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            deleted = report.deleted,
            failed = report.failed,
            "Orphan sweep completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use lumen_storage::InMemoryStorage;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn sweeper(memory: &InMemoryStorage) -> OrphanSweeper {
        OrphanSweeper::new(
            Arc::new(memory.clone()),
            "uploads/",
            Duration::from_secs(6 * 60 * 60),
            DAY,
        )
    }

    #[tokio::test]
    async fn deletes_only_expired_staging_objects() {
        let memory = InMemoryStorage::new();
        let now = Utc::now();
        memory.insert("uploads/old.jpg", &b"old"[..], "image/jpeg");
        memory.insert("uploads/fresh.jpg", &b"fresh"[..], "image/jpeg");
        memory.insert("media/owner/upload_thumb.jpg", &b"keep"[..], "image/jpeg");
        memory.set_last_modified("uploads/old.jpg", now - ChronoDuration::hours(25));
        memory.set_last_modified("uploads/fresh.jpg", now - ChronoDuration::hours(23));
        memory.set_last_modified("media/owner/upload_thumb.jpg", now - ChronoDuration::days(30));

        let report = sweeper(&memory).sweep_at(now).await.unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.deleted, 1);
        assert!(!memory.contains("uploads/old.jpg"));
        assert!(memory.contains("uploads/fresh.jpg"));
        assert!(memory.contains("media/owner/upload_thumb.jpg"));
    }

    #[tokio::test]
    async fn failed_deletes_are_counted_not_raised() {
        let memory = InMemoryStorage::new();
        let now = Utc::now();
        memory.insert("uploads/old.jpg", &b"old"[..], "image/jpeg");
        memory.set_last_modified("uploads/old.jpg", now - ChronoDuration::days(2));
        memory.fail_deletes(true);

        let report = sweeper(&memory).sweep_at(now).await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(memory.contains("uploads/old.jpg"));
    }

    #[tokio::test]
    async fn future_timestamps_are_left_alone() {
        let memory = InMemoryStorage::new();
        let now = Utc::now();
        memory.insert("uploads/skewed.jpg", &b"x"[..], "image/jpeg");
        memory.set_last_modified("uploads/skewed.jpg", now + ChronoDuration::hours(1));

        let report = sweeper(&memory).sweep_at(now).await.unwrap();
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweep_runs_on_every_interval() {
        let memory = InMemoryStorage::new();
        memory.insert("uploads/old.jpg", &b"old"[..], "image/jpeg");
        memory.insert("uploads/fresh.jpg", &b"fresh"[..], "image/jpeg");
        memory.set_last_modified("uploads/old.jpg", Utc::now() - ChronoDuration::hours(25));

        let interval = Duration::from_secs(6 * 60 * 60);
        let handle = Arc::new(sweeper(&memory)).start();

        // First pass runs immediately
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!memory.contains("uploads/old.jpg"));
        assert!(memory.contains("uploads/fresh.jpg"));

        // Expires between passes: the next tick removes it
        memory.insert("uploads/later.jpg", &b"later"[..], "image/jpeg");
        memory.set_last_modified("uploads/later.jpg", Utc::now() - ChronoDuration::hours(30));
        tokio::time::sleep(interval + Duration::from_secs(1)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(!memory.contains("uploads/later.jpg"));
        assert!(memory.contains("uploads/fresh.jpg"));
        handle.abort();
    }
}
