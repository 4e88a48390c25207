use std::sync::Arc;

use lumen_core::models::CatalogRecord;
use lumen_storage::{delete_family, family_keys, AssetBase, Storage};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Number of size/format combinations a delete was issued for
    pub attempted: usize,
    /// Deletes that returned success, including ones for absent objects
    pub succeeded: usize,
}

/// Removes every stored rendition of an asset when its catalog record is deleted.
pub struct AssetJanitor {
    storage: Arc<dyn Storage>,
}

impl AssetJanitor {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    #[tracing::instrument(skip(self), fields(base = %base))]
    pub async fn purge(&self, base: &AssetBase) -> PurgeReport {
        let attempted = family_keys(base).len();
        let succeeded = delete_family(self.storage.as_ref(), base).await;

        tracing::info!(attempted, succeeded, "Asset renditions purged");
        PurgeReport {
            attempted,
            succeeded,
        }
    }

    pub async fn purge_record(&self, record: &CatalogRecord) -> PurgeReport {
        let base = AssetBase::new(record.fields.owner_id, record.fields.upload_id);
        self.purge(&base).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_storage::InMemoryStorage;
    use uuid::Uuid;

    #[tokio::test]
    async fn purge_removes_every_rendition_and_tolerates_gaps() {
        let memory = InMemoryStorage::new();
        let base = AssetBase::new(Uuid::new_v4(), Uuid::new_v4());
        let other = AssetBase::new(Uuid::new_v4(), Uuid::new_v4());
        for key in [
            format!("{}_thumb.jpg", base),
            format!("{}_original.png", base),
            format!("{}_video.mp4", base),
            format!("{}_thumb.jpg", other),
        ] {
            memory.insert(&key, &b"x"[..], "application/octet-stream");
        }

        let report = AssetJanitor::new(Arc::new(memory.clone())).purge(&base).await;

        assert_eq!(report.attempted, report.succeeded);
        assert_eq!(memory.keys(), vec![format!("{}_thumb.jpg", other)]);
    }
}
