use crate::keys::validate_key;
use crate::traits::{ObjectSummary, Storage, StorageError, StorageResult, StoredObject};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use lumen_core::models::mime_from_extension;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/lumen")
    /// * `base_url` - Base URL for serving files (e.g., "http://localhost:4000/media")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
        })
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Rejects keys containing path traversal sequences that could escape the base
    /// storage directory.
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        validate_key(storage_key)?;

        let path = self.base_path.join(storage_key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    fn path_to_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn summary_for(&self, key: &str, path: &Path) -> StorageResult<ObjectSummary> {
        let meta = match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(StorageError::NotFound(key.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => return Err(StorageError::BackendError(e.to_string())),
        };
        let last_modified: DateTime<Utc> = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(ObjectSummary {
            key: key.to_string(),
            last_modified,
            size: meta.len(),
        })
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> StorageResult<String> {
        let path = self.key_to_path(key)?;
        let size = data.len();

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(self.public_url(key))
    }

    async fn get(&self, key_or_url: &str) -> StorageResult<StoredObject> {
        let key = self.key_from_url(key_or_url);
        let path = self.key_to_path(&key)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key));
        }

        let data = fs::read(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        let size = data.len() as u64;
        let content_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_from_extension)
            .map(String::from);

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage download successful"
        );

        Ok(StoredObject {
            data: Bytes::from(data),
            content_type,
            content_length: size,
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;

        tracing::debug!(path = %path.display(), key = %key, "Local storage delete successful");

        Ok(())
    }

    async fn presign_put(
        &self,
        _key: &str,
        _content_type: &str,
        _expires_in: Duration,
    ) -> StorageResult<String> {
        Err(StorageError::ConfigError(
            "Presigned uploads are only supported by the S3 backend".to_string(),
        ))
    }

    async fn list_by_prefix(&self, prefix: &str) -> StorageResult<Vec<ObjectSummary>> {
        let mut found = Vec::new();
        let mut pending = vec![self.base_path.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::BackendError(e.to_string())),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Some(key) = self.path_to_key(&path) else {
                    continue;
                };
                if key.starts_with(prefix) {
                    found.push(self.summary_for(&key, &path).await?);
                }
            }
        }

        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectSummary> {
        let path = self.key_to_path(key)?;
        self.summary_for(key, &path).await
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn storage(dir: &tempfile::TempDir) -> LocalStorage {
        LocalStorage::new(dir.path(), "http://localhost:4000/media".to_string())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_local_storage_put_get() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;

        let data = Bytes::from_static(b"test data");
        let url = storage
            .put("media/a/b_thumb.jpg", data.clone(), "image/jpeg")
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:4000/media/media/a/b_thumb.jpg");

        let by_key = storage.get("media/a/b_thumb.jpg").await.unwrap();
        assert_eq!(by_key.data, data);
        assert_eq!(by_key.content_type.as_deref(), Some("image/jpeg"));

        let by_url = storage.get(&url).await.unwrap();
        assert_eq!(by_url.content_length, data.len() as u64);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;

        let result = storage.get("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.delete("../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.exists("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;

        assert!(matches!(
            storage.get("uploads/missing.jpg").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(storage.delete("uploads/missing.jpg").await.is_ok());
        assert!(!storage.exists("uploads/missing.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_by_prefix_is_recursive() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;

        for key in ["uploads/a.jpg", "uploads/b.gif", "media/o/u_thumb.jpg"] {
            storage
                .put(key, Bytes::from_static(b"x"), "application/octet-stream")
                .await
                .unwrap();
        }

        let staged = storage.list_by_prefix("uploads/").await.unwrap();
        let keys: Vec<&str> = staged.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["uploads/a.jpg", "uploads/b.gif"]);

        let all = storage.list_by_prefix("").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_presign_is_unsupported() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir).await;
        let result = storage
            .presign_put("uploads/x.jpg", "image/jpeg", Duration::from_secs(60))
            .await;
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }
}
