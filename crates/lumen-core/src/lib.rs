//! Lumen Core Library
//!
//! This crate provides the domain models, error taxonomy, configuration and validation
//! shared by every part of the media-ingestion pipeline (storage, processing, worker,
//! services).

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::IngestConfig;
pub use error::{IngestError, IngestResult};
pub use storage_types::StorageBackend;
