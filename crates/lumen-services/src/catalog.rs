//! Catalog store collaborator.
//!
//! The pipeline only ever creates records and reads them back by id. Two stores ship
//! with the crate: an in-memory map for tests and embedding, and an append-only JSON
//! lines file used by the CLI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use lumen_core::models::{CatalogRecord, NewCatalogRecord};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Catalog record could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Catalog IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Create a record; the store assigns its id.
    async fn create(&self, record: NewCatalogRecord) -> anyhow::Result<CatalogRecord>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<CatalogRecord>>;
}

fn assign_id(fields: NewCatalogRecord) -> CatalogRecord {
    CatalogRecord {
        id: Uuid::new_v4(),
        fields,
        created_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct InMemoryCatalog {
    records: RwLock<HashMap<Uuid, CatalogRecord>>,
    fail_creates: AtomicBool,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `create` fail until reset.
    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<CatalogRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn create(&self, record: NewCatalogRecord) -> anyhow::Result<CatalogRecord> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("injected failure".to_string()).into());
        }
        let record = assign_id(record);
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<CatalogRecord>> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }
}

/// Append-only catalog: one JSON record per line.
pub struct JsonlCatalog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in the file. A missing file is an empty catalog.
    pub async fn load_all(&self) -> Result<Vec<CatalogRecord>, CatalogError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(CatalogError::from))
            .collect()
    }
}

#[async_trait]
impl CatalogStore for JsonlCatalog {
    async fn create(&self, record: NewCatalogRecord) -> anyhow::Result<CatalogRecord> {
        let record = assign_id(record);
        let mut line = serde_json::to_string(&record).map_err(CatalogError::from)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(CatalogError::from)?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(CatalogError::from)?;
        file.write_all(line.as_bytes())
            .await
            .map_err(CatalogError::from)?;
        file.flush().await.map_err(CatalogError::from)?;

        tracing::debug!(record_id = %record.id, path = %self.path.display(), "Catalog record appended");
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<CatalogRecord>> {
        let records = self.load_all().await?;
        Ok(records.into_iter().find(|record| record.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::models::{ExtractedMetadata, ModerationStatus, VariantSet};

    fn new_record() -> NewCatalogRecord {
        NewCatalogRecord {
            upload_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: Some("Harbor at dusk".to_string()),
            category: None,
            location: None,
            camera_model: None,
            coordinates: None,
            tags: vec!["harbor".to_string()],
            moderation_status: ModerationStatus::Pending,
            content_type: "image/jpeg".to_string(),
            file_size: 1024,
            variants: VariantSet::default(),
            metadata: ExtractedMetadata::default(),
        }
    }

    #[tokio::test]
    async fn in_memory_create_then_find() {
        let catalog = InMemoryCatalog::new();
        let created = catalog.create(new_record()).await.unwrap();
        let found = catalog.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.fields.upload_id, created.fields.upload_id);
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn in_memory_injected_failure() {
        let catalog = InMemoryCatalog::new();
        catalog.fail_creates(true);
        assert!(catalog.create(new_record()).await.is_err());
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn jsonl_appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = JsonlCatalog::new(dir.path().join("nested").join("catalog.jsonl"));

        assert!(catalog.load_all().await.unwrap().is_empty());

        let first = catalog.create(new_record()).await.unwrap();
        let second = catalog.create(new_record()).await.unwrap();

        let all = catalog.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        let found = catalog.find_by_id(second.id).await.unwrap().unwrap();
        assert_eq!(found.fields.upload_id, second.fields.upload_id);
        assert!(catalog.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
        assert_ne!(first.id, second.id);
    }
}
