use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Coordinates, ExtractedMetadata, VariantSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    Approved,
    Pending,
}

impl ModerationStatus {
    /// Privileged uploaders skip the moderation queue.
    pub fn for_actor(is_privileged: bool) -> Self {
        if is_privileged {
            ModerationStatus::Approved
        } else {
            ModerationStatus::Pending
        }
    }
}

/// Initial field set of a catalog record, built by the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCatalogRecord {
    pub upload_id: Uuid,
    pub owner_id: Uuid,
    pub title: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub camera_model: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub tags: Vec<String>,
    pub moderation_status: ModerationStatus,
    pub content_type: String,
    pub file_size: u64,
    pub variants: VariantSet,
    pub metadata: ExtractedMetadata,
}

/// Record as stored by the catalog, with its server-assigned id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub fields: NewCatalogRecord,
    pub created_at: DateTime<Utc>,
}
