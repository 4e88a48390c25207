//! Fixed limits and thresholds of the ingestion pipeline.

use std::time::Duration;

pub const MIB: u64 = 1024 * 1024;

/// Animated images above this size are candidates for video transcoding; below it
/// they are stored as-is.
pub const ANIMATED_TRANSCODE_MIN_BYTES: u64 = 2 * MIB;

/// Inputs above this size are never handed to the transcoder.
pub const ANIMATED_TRANSCODE_MAX_BYTES: u64 = 50 * MIB;

/// Hard wall-clock limit for a single transcode invocation.
pub const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Ceiling for the ffprobe call and poster frame extraction, which only touch the
/// already encoded output.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest edge of transcoded video output.
pub const TRANSCODE_MAX_DIMENSION: u32 = 1080;

/// Frame rate transcoded animations are normalized to.
pub const TRANSCODE_FRAME_RATE: u32 = 24;

/// Constant-quality factor passed to the encoder.
pub const TRANSCODE_CRF: u32 = 23;

pub const THUMBNAIL_SIZE: u32 = 200;
pub const SMALL_SIZE: u32 = 500;
pub const REGULAR_MAX_DIMENSION: u32 = 1000;

/// Bounding box of the inline preview.
pub const INLINE_PREVIEW_SIZE: u32 = 20;

pub const DERIVATIVE_JPEG_QUALITY: u8 = 82;
pub const FULL_SIZE_JPEG_QUALITY: u8 = 90;

pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_LENGTH: usize = 50;
pub const MAX_TITLE_LENGTH: usize = 200;

pub const DEFAULT_MAX_WORKERS: usize = 3;
pub const MAX_WORKERS_CEILING: usize = 16;

pub const DEFAULT_STAGING_PREFIX: &str = "uploads/";
pub const MEDIA_PREFIX: &str = "media/";

pub const DEFAULT_PRESIGNED_URL_TTL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_ORPHAN_SWEEP_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_ORPHAN_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

pub const DEFAULT_MAX_UPLOAD_SIZE_MB: u64 = 50;
