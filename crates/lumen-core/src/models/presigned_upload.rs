use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Coordinates;

/// Request for a pre-signed staging upload URL
#[derive(Debug, Clone, Deserialize)]
pub struct PresignedUploadRequest {
    pub owner_id: Uuid,
    /// Original filename, used only for its extension
    pub filename: String,
    pub content_type: String,
}

/// Pre-signed URL the client uploads raw bytes to
#[derive(Debug, Clone, Serialize)]
pub struct PresignedUploadResponse {
    pub upload_id: Uuid,
    pub presigned_url: String,
    pub staging_key: String,
    pub expires_at: DateTime<Utc>,
}

/// Finalize request coming from the API layer after the client finished its upload
#[derive(Debug, Clone, Deserialize)]
pub struct FinalizeUploadRequest {
    pub staging_key: String,
    pub upload_id: Uuid,
    pub owner_id: Uuid,
    #[serde(default)]
    pub is_privileged: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub camera_model: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}
