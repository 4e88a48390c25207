//! Ingest service
//!
//! The thin layer an API handler calls. Presigning and discarding touch only the staging
//! area. Finalizing validates the request synchronously, so `Validation` errors reach the
//! caller directly, and then hands the job to the queue without waiting for processing.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lumen_core::models::{
    extension_for_mime, mime_from_extension, normalize_mime, EnqueueOutcome,
    FinalizeUploadRequest, PresignedUploadRequest, PresignedUploadResponse, UploadJob,
};
use lumen_core::validation::{validate_coordinates, validate_tag_count, validate_title};
use lumen_core::{IngestConfig, IngestError, IngestResult};
use lumen_processing::classify;
use lumen_storage::keys::validate_key;
use lumen_storage::{staging_key, Storage, StorageError};
use lumen_worker::{IngestQueue, QueueStats};
use uuid::Uuid;

/// Staging side of an upload: issuing upload URLs and dropping abandoned uploads.
pub struct StagingArea {
    storage: Arc<dyn Storage>,
    prefix: String,
    presigned_url_ttl: Duration,
}

impl StagingArea {
    pub fn new(
        storage: Arc<dyn Storage>,
        prefix: impl Into<String>,
        presigned_url_ttl: Duration,
    ) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
            presigned_url_ttl,
        }
    }

    pub fn from_config(config: &IngestConfig, storage: Arc<dyn Storage>) -> Self {
        Self::new(storage, config.staging_prefix.clone(), config.presigned_url_ttl)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Allocate an upload id and a time-boxed URL the client can PUT raw bytes to.
    #[tracing::instrument(skip(self, request), fields(owner_id = %request.owner_id))]
    pub async fn presign_upload(
        &self,
        request: PresignedUploadRequest,
    ) -> IngestResult<PresignedUploadResponse> {
        let content_type = normalize_mime(&request.content_type);
        if classify(&content_type, &[]).is_none() {
            return Err(IngestError::validation(format!(
                "Unsupported content type: {}",
                request.content_type
            )));
        }

        let extension = upload_extension(&request.filename, &content_type).ok_or_else(|| {
            IngestError::validation(format!("Unsupported file type: {}", request.filename))
        })?;

        let upload_id = Uuid::new_v4();
        let key = staging_key(&self.prefix, upload_id, extension);
        let presigned_url = self
            .storage
            .presign_put(&key, &content_type, self.presigned_url_ttl)
            .await?;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.presigned_url_ttl)
                .map_err(|e| IngestError::Internal(format!("Invalid presign TTL: {}", e)))?;

        tracing::info!(
            upload_id = %upload_id,
            staging_key = %key,
            content_type = %content_type,
            "Issued presigned upload URL"
        );

        Ok(PresignedUploadResponse {
            upload_id,
            presigned_url,
            staging_key: key,
            expires_at,
        })
    }

    /// Delete a staged upload that the client abandoned before finalizing.
    #[tracing::instrument(skip(self))]
    pub async fn discard_staged(&self, staging_key: &str, upload_id: Uuid) -> IngestResult<()> {
        self.check_key(staging_key, upload_id)?;
        self.storage.delete(staging_key).await?;
        tracing::info!("Discarded staged upload");
        Ok(())
    }

    /// The key must sit directly under the staging prefix and be named after the upload.
    pub fn check_key(&self, key: &str, upload_id: Uuid) -> IngestResult<()> {
        validate_key(key).map_err(|e| IngestError::validation(e.to_string()))?;

        let name = key
            .strip_prefix(self.prefix.as_str())
            .filter(|name| !name.contains('/'))
            .ok_or_else(|| IngestError::validation("Staging key is outside the staging area"))?;

        let stem = name.split_once('.').map_or(name, |(stem, _)| stem);
        if stem != upload_id.to_string() {
            return Err(IngestError::validation(
                "Staging key does not belong to this upload",
            ));
        }
        Ok(())
    }
}

pub struct IngestService {
    staging: StagingArea,
    storage: Arc<dyn Storage>,
    queue: IngestQueue,
    max_upload_size_bytes: u64,
}

impl IngestService {
    pub fn new(staging: StagingArea, queue: IngestQueue, max_upload_size_bytes: u64) -> Self {
        Self {
            storage: staging.storage.clone(),
            staging,
            queue,
            max_upload_size_bytes,
        }
    }

    pub fn from_config(
        config: &IngestConfig,
        storage: Arc<dyn Storage>,
        queue: IngestQueue,
    ) -> Self {
        Self::new(
            StagingArea::from_config(config, storage),
            queue,
            config.max_upload_size_bytes,
        )
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub async fn presign_upload(
        &self,
        request: PresignedUploadRequest,
    ) -> IngestResult<PresignedUploadResponse> {
        self.staging.presign_upload(request).await
    }

    pub async fn discard_staged(&self, staging_key: &str, upload_id: Uuid) -> IngestResult<()> {
        self.staging.discard_staged(staging_key, upload_id).await
    }

    /// Validate a finished upload and enqueue it. Returns as soon as the job is queued.
    #[tracing::instrument(skip(self, request), fields(upload_id = %request.upload_id, staging_key = %request.staging_key))]
    pub async fn finalize(&self, request: FinalizeUploadRequest) -> IngestResult<EnqueueOutcome> {
        self.staging.check_key(&request.staging_key, request.upload_id)?;

        let title = validate_title(request.title.as_deref())?;
        let coordinates = request.coordinates.map(validate_coordinates).transpose()?;
        validate_tag_count(&request.tags)?;

        let object = match self.storage.head(&request.staging_key).await {
            Ok(object) => object,
            Err(StorageError::NotFound(_)) => {
                return Err(IngestError::validation(
                    "Uploaded file not found, upload it before finalizing",
                ))
            }
            Err(e) => return Err(e.into()),
        };
        if object.size == 0 {
            return Err(IngestError::validation("Uploaded file is empty"));
        }
        if object.size > self.max_upload_size_bytes {
            return Err(IngestError::validation(format!(
                "File size {} bytes exceeds the maximum of {} bytes",
                object.size, self.max_upload_size_bytes
            )));
        }

        let job = UploadJob {
            staging_key: request.staging_key,
            upload_id: request.upload_id,
            owner_id: request.owner_id,
            is_privileged: request.is_privileged,
            title,
            category: request.category,
            location: request.location,
            camera_model: request.camera_model,
            coordinates,
            tags: request.tags,
            declared_content_type: request.content_type.map(|ct| normalize_mime(&ct)),
        };

        let outcome = self.queue.enqueue(job);
        if !outcome.accepted {
            tracing::warn!("Upload passed validation but the queue is shut down");
        }
        Ok(outcome)
    }
}

/// Extension for the staging key: the filename's if it is a known media extension,
/// otherwise the canonical one for the content type.
fn upload_extension(filename: &str, content_type: &str) -> Option<&'static str> {
    let from_name = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .and_then(|ext| mime_from_extension(&ext))
        .and_then(extension_for_mime);
    from_name.or_else(|| extension_for_mime(content_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_prefers_known_filename_extension() {
        assert_eq!(upload_extension("IMG_0001.PNG", "image/jpeg"), Some("png"));
        assert_eq!(upload_extension("no-extension", "image/gif"), Some("gif"));
        assert_eq!(upload_extension("notes.txt", "image/webp"), Some("webp"));
        assert_eq!(upload_extension("notes.txt", "text/plain"), None);
    }
}
