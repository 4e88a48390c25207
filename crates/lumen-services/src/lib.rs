//! Lumen Services Layer
//!
//! This crate hosts the orchestration around the processing primitives: the upload
//! pipeline that turns a staged file into a catalog record (with rollback on failure),
//! the ingest service the API layer calls to presign, finalize and discard uploads, the
//! periodic orphan sweep and asset purge. The catalog and notification systems are
//! external collaborators reached through the traits in [`catalog`] and [`notify`].

pub mod catalog;
pub mod ingest;
pub mod janitor;
pub mod notify;
pub mod pipeline;
pub mod sweeper;

pub use catalog::{CatalogError, CatalogStore, InMemoryCatalog, JsonlCatalog};
pub use ingest::{IngestService, StagingArea};
pub use janitor::{AssetJanitor, PurgeReport};
pub use notify::{spawn_notification, InMemoryNotifier, LogNotifier, Notifier};
pub use pipeline::{PipelineStage, UploadPipeline};
pub use sweeper::{OrphanSweeper, SweepReport};
