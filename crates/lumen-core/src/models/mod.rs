//! Data models for the ingestion pipeline
//!
//! Each sub-module covers one artifact the pipeline produces or consumes.

mod catalog;
mod job;
mod media_type;
mod metadata;
mod notification;
mod presigned_upload;
mod variant;

pub use catalog::*;
pub use job::*;
pub use media_type::*;
pub use metadata::*;
pub use notification::*;
pub use presigned_upload::*;
pub use variant::*;
