//! Write ledger for compensating deletes.
//!
//! A job writes all of its derivatives through a [`WriteLedger`], which remembers each
//! key that was stored successfully. If a later stage fails, [`WriteLedger::rollback`]
//! deletes exactly those keys.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;

use crate::traits::{Storage, StorageResult};

/// Outcome of a rollback pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackSummary {
    pub deleted: usize,
    pub failed: usize,
}

pub struct WriteLedger {
    storage: Arc<dyn Storage>,
    written: Mutex<Vec<String>>,
}

impl WriteLedger {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            written: Mutex::new(Vec::new()),
        }
    }

    /// Store an object and record its key. Failed puts are not recorded.
    pub async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String> {
        let url = self.storage.put(key, data, content_type).await?;
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.to_string());
        Ok(url)
    }

    /// Keys written so far, in write order
    pub fn written_keys(&self) -> Vec<String> {
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Delete every recorded key. Best-effort: failures are logged and counted, never
    /// returned. Running it again only retries deletes, so repeated calls converge on the
    /// same end state.
    pub async fn rollback(&self) -> RollbackSummary {
        let keys = self.written_keys();
        let results =
            futures::future::join_all(keys.iter().map(|key| self.storage.delete(key))).await;

        let mut summary = RollbackSummary::default();
        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(()) => summary.deleted += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(error = %e, key = %key, "Rollback delete failed");
                }
            }
        }

        if !keys.is_empty() {
            tracing::info!(
                deleted = summary.deleted,
                failed = summary.failed,
                "Rollback completed"
            );
        }

        summary
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::InMemoryStorage;

    #[tokio::test]
    async fn rollback_removes_only_recorded_writes() {
        let memory = InMemoryStorage::new();
        memory.insert("uploads/raw.gif", Bytes::from_static(b"raw"), "image/gif");
        let ledger = WriteLedger::new(Arc::new(memory.clone()));

        ledger
            .put("media/o/u_thumb.jpg", Bytes::from_static(b"t"), "image/jpeg")
            .await
            .unwrap();
        assert_eq!(
            memory.content_type("media/o/u_thumb.jpg").as_deref(),
            Some("image/jpeg")
        );
        memory.fail_puts_after(0);
        assert!(ledger
            .put("media/o/u_small.jpg", Bytes::from_static(b"s"), "image/jpeg")
            .await
            .is_err());
        assert_eq!(ledger.written_keys(), vec!["media/o/u_thumb.jpg"]);

        let first = ledger.rollback().await;
        assert_eq!(first, RollbackSummary { deleted: 1, failed: 0 });
        assert_eq!(memory.keys(), vec!["uploads/raw.gif"]);

        // idempotent
        let second = ledger.rollback().await;
        assert_eq!(second, first);
        assert_eq!(memory.keys(), vec!["uploads/raw.gif"]);
    }

    #[tokio::test]
    async fn rollback_failures_are_counted() {
        let memory = InMemoryStorage::new();
        let ledger = WriteLedger::new(Arc::new(memory.clone()));
        ledger
            .put("media/o/u_full.jpg", Bytes::from_static(b"f"), "image/jpeg")
            .await
            .unwrap();
        memory.fail_deletes(true);
        assert_eq!(ledger.rollback().await.failed, 1);
        memory.clear_failures();
        assert_eq!(ledger.rollback().await.deleted, 1);
        assert!(memory.is_empty());
    }
}
