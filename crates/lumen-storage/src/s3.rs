use crate::keys::validate_key;
use crate::traits::{ObjectSummary, Storage, StorageError, StorageResult, StoredObject};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, ObjectMeta, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    Result as ObjectResult,
};
use std::time::Duration;

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
    public_base_url: Option<String>,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    /// * `public_base_url` - Optional CDN or public origin that objects are served from
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        public_base_url: Option<String>,
    ) -> StorageResult<Self> {
        // Credentials come from the standard AWS environment variables.
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store,
            bucket,
            region,
            endpoint_url,
            public_base_url,
        })
    }

    fn base_url(&self) -> String {
        if let Some(ref public) = self.public_base_url {
            public.trim_end_matches('/').to_string()
        } else if let Some(ref endpoint) = self.endpoint_url {
            // Path-style addressing works with every S3-compatible provider
            format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket)
        } else {
            format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region)
        }
    }

    fn location(key: &str) -> StorageResult<Path> {
        validate_key(key)?;
        Ok(Path::from(key.to_string()))
    }

    fn summary(meta: ObjectMeta) -> ObjectSummary {
        ObjectSummary {
            key: meta.location.to_string(),
            last_modified: meta.last_modified,
            size: meta.size as u64,
        }
    }
}

#[async_trait]
impl Storage for S3Storage {
    #[tracing::instrument(skip(self, data), fields(bucket = %self.bucket, size_bytes = data.len()))]
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String> {
        let location = Self::location(key)?;
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        let result: ObjectResult<_> = self
            .store
            .put_opts(&location, PutPayload::from(data), options)
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(self.public_url(key))
    }

    async fn get(&self, key_or_url: &str) -> StorageResult<StoredObject> {
        let key = self.key_from_url(key_or_url);
        let location = Self::location(&key)?;
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.get(&location).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.clone()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 download failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let content_type = result.attributes.get(&Attribute::ContentType).map(|v| {
            let value: &str = v.as_ref();
            value.to_string()
        });

        let data = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;
        let size = data.len() as u64;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(StoredObject {
            data,
            content_type,
            content_length: size,
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let location = Self::location(key)?;

        let result: ObjectResult<_> = self.store.delete(&location).await;

        match result {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                return Err(StorageError::DeleteFailed(e.to_string()));
            }
        }

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn presign_put(
        &self,
        key: &str,
        _content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let location = Self::location(key)?;
        let url_result: ObjectResult<_> = self
            .store
            .signed_url(Method::PUT, &location, expires_in)
            .await;

        let url = url_result
            .map_err(|e| StorageError::BackendError(e.to_string()))?
            .to_string();

        Ok(url)
    }

    async fn list_by_prefix(&self, prefix: &str) -> StorageResult<Vec<ObjectSummary>> {
        let start = std::time::Instant::now();
        let location = Path::from(prefix.to_string());

        let objects: Vec<ObjectMeta> = self
            .store
            .list(Some(&location))
            .try_collect()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        tracing::debug!(
            bucket = %self.bucket,
            prefix = %prefix,
            count = objects.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 list successful"
        );

        // Path::from drops the trailing slash, so filter on the raw prefix again
        Ok(objects
            .into_iter()
            .map(Self::summary)
            .filter(|o| o.key.starts_with(prefix))
            .collect())
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectSummary> {
        let location = Self::location(key)?;
        match self.store.head(&location).await {
            Ok(meta) => Ok(Self::summary(meta)),
            Err(ObjectStoreError::NotFound { .. }) => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url(), key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
