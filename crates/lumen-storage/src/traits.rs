//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use lumen_core::IngestError;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for IngestError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => {
                IngestError::fatal_input(format!("Staged object not found: {}", key))
            }
            StorageError::InvalidKey(msg) => IngestError::fatal_input(msg),
            other => IngestError::storage(other.to_string()),
        }
    }
}

/// Object downloaded from storage
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    /// Content type as reported by the backend, which may be missing or wrong
    pub content_type: Option<String>,
    pub content_length: u64,
}

/// One entry of a prefix listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem, in-memory) implement this trait so the
/// pipeline never couples to a particular provider.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upload bytes to `key` and return the public URL of the object
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String>;

    /// Download an object. Accepts either a storage key or a public URL of this backend.
    async fn get(&self, key_or_url: &str) -> StorageResult<StoredObject>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Generate a presigned PUT URL for direct uploads.
    ///
    /// Clients upload with HTTP PUT to the returned URL. Backends without URL signing
    /// return a `ConfigError`.
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// List every object whose key starts with `prefix`
    async fn list_by_prefix(&self, prefix: &str) -> StorageResult<Vec<ObjectSummary>>;

    /// Metadata of a single object, `NotFound` if it does not exist
    async fn head(&self, key: &str) -> StorageResult<ObjectSummary>;

    /// Check if a file exists
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self.head(key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Public URL an object at `key` is served from
    fn public_url(&self, key: &str) -> String;

    /// Map a public URL of this backend back to its storage key. Anything else is
    /// assumed to already be a key.
    fn key_from_url(&self, key_or_url: &str) -> String {
        let base = self.public_url("");
        key_or_url
            .strip_prefix(base.as_str())
            .unwrap_or(key_or_url)
            .to_string()
    }

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
