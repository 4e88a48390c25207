//! Shared key generation for storage backends.
//!
//! Derivative keys are the asset base followed by a size tag and an extension, e.g.
//! `media/{owner_id}/{upload_id}_thumb.jpg`. Deleting "every size of an asset" walks the
//! fixed set of tag and extension combinations instead of scanning a prefix, so missing
//! objects are simply skipped.

use std::fmt::{Display, Formatter, Result as FmtResult};

use lumen_core::constants::MEDIA_PREFIX;
use uuid::Uuid;

use crate::traits::{Storage, StorageError, StorageResult};

/// Size suffix of a derivative key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeTag {
    Thumb,
    Small,
    Regular,
    Full,
    Original,
    Poster,
    Video,
}

impl SizeTag {
    pub const ALL: [SizeTag; 7] = [
        SizeTag::Thumb,
        SizeTag::Small,
        SizeTag::Regular,
        SizeTag::Full,
        SizeTag::Original,
        SizeTag::Poster,
        SizeTag::Video,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeTag::Thumb => "thumb",
            SizeTag::Small => "small",
            SizeTag::Regular => "regular",
            SizeTag::Full => "full",
            SizeTag::Original => "original",
            SizeTag::Poster => "poster",
            SizeTag::Video => "video",
        }
    }
}

impl Display for SizeTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Every extension a derivative can be written with.
pub const FAMILY_EXTENSIONS: &[&str] = &[
    "jpg", "png", "webp", "gif", "svg", "bmp", "ico", "tiff", "mp4", "mov", "webm", "mkv", "avi",
    "bin",
];

/// Key prefix shared by all derivatives of one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBase(String);

impl AssetBase {
    pub fn new(owner_id: Uuid, upload_id: Uuid) -> Self {
        AssetBase(format!("{}{}/{}", MEDIA_PREFIX, owner_id, upload_id))
    }

    /// Wrap an existing base such as `media/{owner}/{upload}`.
    pub fn parse(base: &str) -> StorageResult<Self> {
        validate_key(base)?;
        if base.ends_with('/') {
            return Err(StorageError::InvalidKey(format!(
                "Asset base must not end with '/': {}",
                base
            )));
        }
        Ok(AssetBase(base.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AssetBase {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// `{prefix}{upload_id}.{ext}`; the prefix is expected to end with `/`.
pub fn staging_key(prefix: &str, upload_id: Uuid, ext: &str) -> String {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() {
        format!("{}{}", prefix, upload_id)
    } else {
        format!("{}{}.{}", prefix, upload_id, ext)
    }
}

pub fn variant_key(base: &AssetBase, tag: SizeTag, ext: &str) -> String {
    format!("{}_{}.{}", base.as_str(), tag.as_str(), ext)
}

/// All keys a derivative of `base` could have been written to.
pub fn family_keys(base: &AssetBase) -> Vec<String> {
    SizeTag::ALL
        .iter()
        .flat_map(|tag| FAMILY_EXTENSIONS.iter().map(move |ext| variant_key(base, *tag, ext)))
        .collect()
}

/// Reject keys that are empty, absolute or contain parent-directory segments.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.contains("..") || key.starts_with('/') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// Delete every derivative of `base`. Failures are logged and skipped. Returns the number
/// of delete calls that succeeded (including ones for objects that did not exist).
pub async fn delete_family(storage: &dyn Storage, base: &AssetBase) -> usize {
    let keys = family_keys(base);
    let results = futures::future::join_all(keys.iter().map(|key| storage.delete(key))).await;

    let mut deleted = 0;
    for (key, result) in keys.iter().zip(results) {
        match result {
            Ok(()) => deleted += 1,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Failed to delete asset derivative");
            }
        }
    }

    tracing::info!(
        base = %base,
        attempted = keys.len(),
        succeeded = deleted,
        "Asset family delete finished"
    );

    deleted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_key_layout() {
        let id = Uuid::nil();
        assert_eq!(
            staging_key("uploads/", id, ".PNG"),
            format!("uploads/{}.png", id)
        );
    }

    #[test]
    fn variant_key_layout() {
        let owner = Uuid::new_v4();
        let upload = Uuid::new_v4();
        let base = AssetBase::new(owner, upload);
        assert_eq!(
            variant_key(&base, SizeTag::Thumb, "jpg"),
            format!("media/{}/{}_thumb.jpg", owner, upload)
        );
    }

    #[test]
    fn family_covers_every_tag_and_extension() {
        let base = AssetBase::new(Uuid::new_v4(), Uuid::new_v4());
        let keys = family_keys(&base);
        assert_eq!(keys.len(), SizeTag::ALL.len() * FAMILY_EXTENSIONS.len());
        assert!(keys.contains(&variant_key(&base, SizeTag::Video, "mp4")));
        assert!(keys.contains(&variant_key(&base, SizeTag::Original, "gif")));
    }

    #[test]
    fn invalid_bases_are_rejected() {
        assert!(AssetBase::parse("../media/x").is_err());
        assert!(AssetBase::parse("/media/x").is_err());
        assert!(AssetBase::parse("media/x/").is_err());
        assert!(AssetBase::parse("media/a/b").is_ok());
    }
}
