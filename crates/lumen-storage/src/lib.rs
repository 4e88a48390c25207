//! Lumen Storage Library
//!
//! Storage abstraction and backends for the ingestion pipeline: an S3-compatible
//! backend built on `object_store`, a local filesystem backend and, behind the `memory`
//! feature, an in-memory backend used by tests.
//!
//! # Storage key format
//!
//! - Staging uploads: `{staging_prefix}{upload_id}.{ext}` (default prefix `uploads/`)
//! - Derivatives: `media/{owner_id}/{upload_id}_{size_tag}.{ext}`
//!
//! Keys must not contain `..` or a leading `/`. Key generation is centralized in the
//! [`keys`] module so every backend and caller agrees on the layout.

pub mod factory;
pub mod keys;
pub mod ledger;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::{delete_family, family_keys, staging_key, variant_key, AssetBase, SizeTag};
pub use ledger::{RollbackSummary, WriteLedger};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use lumen_core::StorageBackend;
#[cfg(feature = "memory")]
pub use memory::InMemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ObjectSummary, Storage, StorageError, StorageResult, StoredObject};
