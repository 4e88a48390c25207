//! Configuration module
//!
//! Settings for storage, the worker pool, the external transcoder and the orphan sweep.
//! Values come from the process environment (after loading `.env`), each with a default.

use std::env;
use std::time::Duration;

use crate::constants::{
    ANIMATED_TRANSCODE_MAX_BYTES, ANIMATED_TRANSCODE_MIN_BYTES, DEFAULT_MAX_UPLOAD_SIZE_MB,
    DEFAULT_MAX_WORKERS, DEFAULT_ORPHAN_MAX_AGE, DEFAULT_ORPHAN_SWEEP_INTERVAL,
    DEFAULT_PRESIGNED_URL_TTL, DEFAULT_STAGING_PREFIX, MAX_WORKERS_CEILING, MIB,
    TRANSCODE_TIMEOUT,
};
use crate::storage_types::StorageBackend;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Ingestion pipeline configuration
#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub environment: String,
    pub log_format: LogFormat,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, R2, ...)
    pub s3_public_base_url: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub staging_prefix: String,
    pub presigned_url_ttl: Duration,
    pub max_upload_size_bytes: u64,
    // Worker pool
    pub max_workers: usize,
    // External transcoder
    pub transcode_enabled: bool,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub transcode_timeout: Duration,
    pub transcode_min_bytes: u64,
    pub transcode_max_bytes: u64,
    // Orphan sweep
    pub orphan_sweep_interval: Duration,
    pub orphan_max_age: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_format: LogFormat::Pretty,
            storage_backend: StorageBackend::S3,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            s3_public_base_url: None,
            local_storage_path: None,
            local_storage_base_url: None,
            staging_prefix: DEFAULT_STAGING_PREFIX.to_string(),
            presigned_url_ttl: DEFAULT_PRESIGNED_URL_TTL,
            max_upload_size_bytes: DEFAULT_MAX_UPLOAD_SIZE_MB * MIB,
            max_workers: DEFAULT_MAX_WORKERS,
            transcode_enabled: true,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            transcode_timeout: TRANSCODE_TIMEOUT,
            transcode_min_bytes: ANIMATED_TRANSCODE_MIN_BYTES,
            transcode_max_bytes: ANIMATED_TRANSCODE_MAX_BYTES,
            orphan_sweep_interval: DEFAULT_ORPHAN_SWEEP_INTERVAL,
            orphan_max_age: DEFAULT_ORPHAN_MAX_AGE,
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(|v| v.trim().to_lowercase()) {
        Some(v) if ["1", "true", "yes", "on"].contains(&v.as_str()) => true,
        Some(v) if ["0", "false", "no", "off"].contains(&v.as_str()) => false,
        _ => default,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl IngestConfig {
    /// Load configuration from `.env` and the process environment.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let storage_backend = match non_empty(lookup("STORAGE_BACKEND")) {
            Some(value) => value.parse::<StorageBackend>()?,
            None => defaults.storage_backend,
        };

        let log_format = match non_empty(lookup("LOG_FORMAT")).map(|v| v.to_lowercase()) {
            Some(v) if v == "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let mut staging_prefix =
            non_empty(lookup("STAGING_PREFIX")).unwrap_or(defaults.staging_prefix);
        if !staging_prefix.ends_with('/') {
            staging_prefix.push('/');
        }

        let max_upload_size_mb = parse_or(lookup("MAX_UPLOAD_SIZE_MB"), DEFAULT_MAX_UPLOAD_SIZE_MB);

        let config = Self {
            environment: non_empty(lookup("ENVIRONMENT"))
                .or_else(|| non_empty(lookup("APP_ENV")))
                .unwrap_or(defaults.environment),
            log_format,
            storage_backend,
            s3_bucket: non_empty(lookup("S3_BUCKET")),
            s3_region: non_empty(lookup("S3_REGION")).or_else(|| non_empty(lookup("AWS_REGION"))),
            s3_endpoint: non_empty(lookup("S3_ENDPOINT")),
            s3_public_base_url: non_empty(lookup("S3_PUBLIC_BASE_URL")),
            local_storage_path: non_empty(lookup("LOCAL_STORAGE_PATH")),
            local_storage_base_url: non_empty(lookup("LOCAL_STORAGE_BASE_URL")),
            staging_prefix,
            presigned_url_ttl: Duration::from_secs(parse_or(
                lookup("PRESIGNED_URL_TTL_SECS"),
                defaults.presigned_url_ttl.as_secs(),
            )),
            max_upload_size_bytes: max_upload_size_mb * MIB,
            max_workers: parse_or(lookup("INGEST_MAX_WORKERS"), defaults.max_workers)
                .clamp(1, MAX_WORKERS_CEILING),
            transcode_enabled: parse_bool(lookup("TRANSCODE_ENABLED"), defaults.transcode_enabled),
            ffmpeg_path: non_empty(lookup("FFMPEG_PATH")).unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: non_empty(lookup("FFPROBE_PATH")).unwrap_or(defaults.ffprobe_path),
            transcode_timeout: Duration::from_secs(parse_or(
                lookup("TRANSCODE_TIMEOUT_SECS"),
                defaults.transcode_timeout.as_secs(),
            )),
            transcode_min_bytes: parse_or(
                lookup("TRANSCODE_MIN_BYTES"),
                defaults.transcode_min_bytes,
            ),
            transcode_max_bytes: parse_or(
                lookup("TRANSCODE_MAX_BYTES"),
                defaults.transcode_max_bytes,
            ),
            orphan_sweep_interval: Duration::from_secs(parse_or(
                lookup("ORPHAN_SWEEP_INTERVAL_SECS"),
                defaults.orphan_sweep_interval.as_secs(),
            )),
            orphan_max_age: Duration::from_secs(parse_or(
                lookup("ORPHAN_MAX_AGE_SECS"),
                defaults.orphan_max_age.as_secs(),
            )),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    anyhow::bail!("S3_BUCKET is required when STORAGE_BACKEND=s3");
                }
                if self.s3_region.is_none() {
                    anyhow::bail!("S3_REGION or AWS_REGION is required when STORAGE_BACKEND=s3");
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() || self.local_storage_base_url.is_none() {
                    anyhow::bail!(
                        "LOCAL_STORAGE_PATH and LOCAL_STORAGE_BASE_URL are required when STORAGE_BACKEND=local"
                    );
                }
            }
            StorageBackend::Memory => {}
        }

        if self.transcode_min_bytes > self.transcode_max_bytes {
            anyhow::bail!(
                "TRANSCODE_MIN_BYTES ({}) must not exceed TRANSCODE_MAX_BYTES ({})",
                self.transcode_min_bytes,
                self.transcode_max_bytes
            );
        }

        if self.transcode_timeout.is_zero() {
            anyhow::bail!("TRANSCODE_TIMEOUT_SECS must be greater than zero");
        }

        if self.orphan_sweep_interval.is_zero() {
            anyhow::bail!("ORPHAN_SWEEP_INTERVAL_SECS must be greater than zero");
        }

        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_for_local_backend() {
        let config = IngestConfig::from_lookup(lookup_from(&[
            ("STORAGE_BACKEND", "local"),
            ("LOCAL_STORAGE_PATH", "/var/lib/lumen"),
            ("LOCAL_STORAGE_BASE_URL", "http://localhost:4000/media"),
        ]))
        .unwrap();

        assert_eq!(config.storage_backend, StorageBackend::Local);
        assert_eq!(config.max_workers, DEFAULT_MAX_WORKERS);
        assert!(config.transcode_enabled);
        assert_eq!(config.transcode_timeout, Duration::from_secs(300));
        assert_eq!(config.staging_prefix, "uploads/");
        assert_eq!(config.orphan_max_age, Duration::from_secs(86_400));
        assert_eq!(config.orphan_sweep_interval, Duration::from_secs(21_600));
    }

    #[test]
    fn s3_requires_bucket_and_region() {
        let err = IngestConfig::from_lookup(lookup_from(&[("STORAGE_BACKEND", "s3")])).unwrap_err();
        assert!(err.to_string().contains("S3_BUCKET"));

        let config = IngestConfig::from_lookup(lookup_from(&[
            ("S3_BUCKET", "photos"),
            ("AWS_REGION", "eu-west-1"),
        ]))
        .unwrap();
        assert_eq!(config.s3_region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn worker_count_is_clamped() {
        let config = IngestConfig::from_lookup(lookup_from(&[
            ("STORAGE_BACKEND", "memory"),
            ("INGEST_MAX_WORKERS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.max_workers, 1);

        let config = IngestConfig::from_lookup(lookup_from(&[
            ("STORAGE_BACKEND", "memory"),
            ("INGEST_MAX_WORKERS", "500"),
        ]))
        .unwrap();
        assert_eq!(config.max_workers, MAX_WORKERS_CEILING);
    }

    #[test]
    fn transcoding_can_be_disabled() {
        let config = IngestConfig::from_lookup(lookup_from(&[
            ("STORAGE_BACKEND", "memory"),
            ("TRANSCODE_ENABLED", "false"),
        ]))
        .unwrap();
        assert!(!config.transcode_enabled);
    }

    #[test]
    fn staging_prefix_gets_trailing_slash() {
        let config = IngestConfig::from_lookup(lookup_from(&[
            ("STORAGE_BACKEND", "memory"),
            ("STAGING_PREFIX", "incoming"),
        ]))
        .unwrap();
        assert_eq!(config.staging_prefix, "incoming/");
    }

    #[test]
    fn inverted_transcode_window_is_rejected() {
        let err = IngestConfig::from_lookup(lookup_from(&[
            ("STORAGE_BACKEND", "memory"),
            ("TRANSCODE_MIN_BYTES", "100"),
            ("TRANSCODE_MAX_BYTES", "10"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("TRANSCODE_MIN_BYTES"));
    }

    #[test]
    fn invalid_backend_is_an_error() {
        assert!(IngestConfig::from_lookup(lookup_from(&[("STORAGE_BACKEND", "ftp")])).is_err());
    }
}
