use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// WGS84 geographic position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// One accepted upload waiting to be processed.
///
/// Created when a finalize request passes validation and lives only in the in-memory
/// queue until its pipeline terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
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
    /// Content type reported by the client when the upload URL was issued
    #[serde(default)]
    pub declared_content_type: Option<String>,
}

impl UploadJob {
    pub fn new(staging_key: impl Into<String>, upload_id: Uuid, owner_id: Uuid) -> Self {
        Self {
            staging_key: staging_key.into(),
            upload_id,
            owner_id,
            is_privileged: false,
            title: None,
            category: None,
            location: None,
            camera_model: None,
            coordinates: None,
            tags: Vec::new(),
            declared_content_type: None,
        }
    }

    /// File extension of the staged object, lowercased.
    pub fn staging_extension(&self) -> Option<String> {
        let name = self.staging_key.rsplit('/').next()?;
        let (_, ext) = name.rsplit_once('.')?;
        if ext.is_empty() {
            None
        } else {
            Some(ext.to_ascii_lowercase())
        }
    }
}

/// Immediate answer to an enqueue request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnqueueOutcome {
    pub accepted: bool,
    pub queue_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_extension_is_lowercased() {
        let job = UploadJob::new("uploads/abc.JPG", Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(job.staging_extension().as_deref(), Some("jpg"));
    }

    #[test]
    fn staging_extension_ignores_dots_in_prefix() {
        let job = UploadJob::new("uploads.v2/abc", Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(job.staging_extension(), None);
    }
}
