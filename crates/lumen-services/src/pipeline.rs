//! Upload pipeline orchestrator
//!
//! One job moves through
//! `downloaded → metadata_extracted | metadata_skipped → variants_generated → cataloged →
//! staging_cleaned → notified`, or from any stage to `failed → rolled_back → notified`.
//!
//! Every object the job writes goes through a [`WriteLedger`]. When a stage fails after
//! writes happened (a partial variant upload, a catalog error) the ledger deletes exactly
//! those objects, so no catalog record ever points at a missing variant and no variant
//! outlives a failed job. The staged raw object is never part of the rollback.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use async_trait::async_trait;
use lumen_core::models::{
    mime_from_extension, CatalogRecord, ExtractedMetadata, ModerationStatus, NewCatalogRecord,
    NewNotification, UploadJob,
};
use lumen_core::validation::{normalize_tags, validate_coordinates, validate_title};
use lumen_core::{IngestError, IngestResult};
use lumen_processing::{detect, extract_metadata, should_extract_metadata, VariantGenerator};
use lumen_storage::{AssetBase, Storage, WriteLedger};
use lumen_worker::JobHandler;

use crate::catalog::CatalogStore;
use crate::notify::{spawn_notification, Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Downloaded,
    MetadataExtracted,
    MetadataSkipped,
    VariantsGenerated,
    Cataloged,
    StagingCleaned,
    Notified,
    Failed,
    RolledBack,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Downloaded => "downloaded",
            PipelineStage::MetadataExtracted => "metadata_extracted",
            PipelineStage::MetadataSkipped => "metadata_skipped",
            PipelineStage::VariantsGenerated => "variants_generated",
            PipelineStage::Cataloged => "cataloged",
            PipelineStage::StagingCleaned => "staging_cleaned",
            PipelineStage::Notified => "notified",
            PipelineStage::Failed => "failed",
            PipelineStage::RolledBack => "rolled_back",
        }
    }
}

impl Display for PipelineStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Catalog fields taken from the job, validated before anything is downloaded.
struct JobFields {
    title: Option<String>,
    coordinates: Option<lumen_core::models::Coordinates>,
    tags: Vec<String>,
}

impl JobFields {
    fn from_job(job: &UploadJob) -> IngestResult<Self> {
        Ok(Self {
            title: validate_title(job.title.as_deref())?,
            coordinates: job.coordinates.map(validate_coordinates).transpose()?,
            tags: normalize_tags(&job.tags),
        })
    }
}

pub struct UploadPipeline {
    storage: Arc<dyn Storage>,
    catalog: Arc<dyn CatalogStore>,
    notifier: Arc<dyn Notifier>,
    variants: VariantGenerator,
}

impl UploadPipeline {
    pub fn new(
        storage: Arc<dyn Storage>,
        catalog: Arc<dyn CatalogStore>,
        notifier: Arc<dyn Notifier>,
        variants: VariantGenerator,
    ) -> Self {
        Self {
            storage,
            catalog,
            notifier,
            variants,
        }
    }

    /// Run one job. On success the staged object has been removed (best-effort) and the
    /// owner notified. On failure every object the job wrote has been rolled back; the
    /// failure notification is left to [`JobHandler::on_failure`].
    #[tracing::instrument(skip_all, fields(upload_id = %job.upload_id, staging_key = %job.staging_key))]
    pub async fn process(&self, job: &UploadJob) -> IngestResult<CatalogRecord> {
        let start = std::time::Instant::now();
        let ledger = WriteLedger::new(self.storage.clone());

        let record = match self.run(job, &ledger).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(
                    stage = %PipelineStage::Failed,
                    error = %e,
                    error_code = e.error_code(),
                    written = ledger.written_keys().len(),
                    "Pipeline failed"
                );
                if !ledger.is_empty() {
                    let summary = ledger.rollback().await;
                    tracing::warn!(
                        stage = %PipelineStage::RolledBack,
                        deleted = summary.deleted,
                        failed = summary.failed,
                        "Rolled back objects written by failed job"
                    );
                }
                return Err(e);
            }
        };

        match self.storage.delete(&job.staging_key).await {
            Ok(()) => tracing::info!(stage = %PipelineStage::StagingCleaned, "Staging object deleted"),
            Err(e) => tracing::warn!(
                error = %e,
                "Failed to delete staging object, orphan sweep will remove it"
            ),
        }

        let notification =
            NewNotification::upload_completed(job.owner_id, job.upload_id, record.id);
        if let Err(e) = spawn_notification(self.notifier.clone(), notification).await {
            tracing::warn!(error = %e, "Notification task failed");
        }

        tracing::info!(
            stage = %PipelineStage::Notified,
            record_id = %record.id,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload published"
        );

        Ok(record)
    }

    async fn run(&self, job: &UploadJob, ledger: &WriteLedger) -> IngestResult<CatalogRecord> {
        let fields = JobFields::from_job(job)?;

        let object = self.storage.get(&job.staging_key).await?;
        let data = object.data;
        let file_size = data.len() as u64;
        tracing::info!(stage = %PipelineStage::Downloaded, size_bytes = file_size, "Staged object downloaded");

        // The store's reported type is unreliable for some formats, so the extension wins
        let extension = job.staging_extension();
        let declared = extension
            .as_deref()
            .and_then(mime_from_extension)
            .map(str::to_string)
            .or_else(|| job.declared_content_type.clone())
            .or(object.content_type);
        let detection = detect(declared.as_deref(), &data, extension.as_deref())?;

        let metadata = if should_extract_metadata(
            detection.kind,
            file_size,
            self.variants.animated_threshold(),
        ) {
            let metadata = extract_metadata(data.clone()).await;
            tracing::info!(
                stage = %PipelineStage::MetadataExtracted,
                colors = metadata.dominant_colors.len(),
                has_camera = !metadata.camera.is_empty(),
                "Metadata extracted"
            );
            metadata
        } else {
            tracing::info!(stage = %PipelineStage::MetadataSkipped, kind = ?detection.kind, "Metadata extraction skipped");
            ExtractedMetadata::default()
        };

        let base = AssetBase::new(job.owner_id, job.upload_id);
        let variants = self.variants.generate(data, &detection, &base, ledger).await?;
        tracing::info!(
            stage = %PipelineStage::VariantsGenerated,
            written = ledger.written_keys().len(),
            "Variants stored"
        );

        let new_record = NewCatalogRecord {
            upload_id: job.upload_id,
            owner_id: job.owner_id,
            title: fields.title,
            category: job.category.clone(),
            location: job.location.clone(),
            camera_model: job
                .camera_model
                .clone()
                .or_else(|| metadata.camera.model.clone()),
            coordinates: fields.coordinates,
            tags: fields.tags,
            moderation_status: ModerationStatus::for_actor(job.is_privileged),
            content_type: detection.mime().to_string(),
            file_size,
            variants,
            metadata,
        };

        let record = self
            .catalog
            .create(new_record)
            .await
            .map_err(|e| IngestError::catalog(format!("{:#}", e)))?;
        tracing::info!(stage = %PipelineStage::Cataloged, record_id = %record.id, "Catalog record created");

        Ok(record)
    }
}

#[async_trait]
impl JobHandler for UploadPipeline {
    async fn handle(&self, job: &UploadJob) -> anyhow::Result<()> {
        self.process(job).await?;
        Ok(())
    }

    async fn on_failure(&self, job: &UploadJob, error: &anyhow::Error) {
        let (reason, error_code) = match error.downcast_ref::<IngestError>() {
            Some(e) => (e.user_message(), e.error_code()),
            None => {
                let e = IngestError::Internal(error.to_string());
                (e.user_message(), e.error_code())
            }
        };

        let notification =
            NewNotification::upload_failed(job.owner_id, job.upload_id, &reason, error_code);
        if let Err(e) = spawn_notification(self.notifier.clone(), notification).await {
            tracing::warn!(error = %e, "Notification task failed");
        }

        tracing::info!(
            stage = %PipelineStage::Notified,
            upload_id = %job.upload_id,
            error_code,
            "Owner notified of failed upload"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::models::Coordinates;
    use uuid::Uuid;

    #[test]
    fn job_fields_normalize_tags_and_title() {
        let mut job = UploadJob::new("uploads/x.jpg", Uuid::new_v4(), Uuid::new_v4());
        job.title = Some("  Harbor  ".to_string());
        job.tags = vec!["Red".into(), "red".into(), " Blue ".into(), "red".into()];
        let fields = JobFields::from_job(&job).unwrap();
        assert_eq!(fields.title.as_deref(), Some("Harbor"));
        assert_eq!(fields.tags, vec!["red", "blue"]);
    }

    #[test]
    fn job_fields_reject_out_of_range_coordinates() {
        let mut job = UploadJob::new("uploads/x.jpg", Uuid::new_v4(), Uuid::new_v4());
        job.coordinates = Some(Coordinates {
            latitude: 95.0,
            longitude: 10.0,
        });
        assert!(matches!(
            JobFields::from_job(&job),
            Err(IngestError::Validation(_))
        ));
    }

    #[test]
    fn stage_names_are_snake_case() {
        assert_eq!(PipelineStage::MetadataSkipped.to_string(), "metadata_skipped");
        assert_eq!(PipelineStage::RolledBack.as_str(), "rolled_back");
    }
}
