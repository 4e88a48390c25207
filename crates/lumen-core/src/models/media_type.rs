//! Media type resolution types.
//!
//! The content type of an upload can come from three places of different reliability.
//! [`MediaTypeSource`] keeps track of where a type came from and
//! [`MediaTypeSource::resolve`] applies the precedence in one place.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "mime", rename_all = "snake_case")]
pub enum MediaTypeSource {
    /// Type supplied by the caller of the variant generator
    Declared(String),
    /// Type recognized from the leading bytes of the content
    Sniffed(String),
    /// Type guessed from the file extension of the key
    ExtensionGuess(String),
}

impl MediaTypeSource {
    /// Pick the first usable type: declared, then sniffed, then extension guess.
    ///
    /// Generic types such as `application/octet-stream` carry no information and are
    /// treated as absent.
    pub fn resolve(
        declared: Option<&str>,
        sniffed: Option<&str>,
        extension: Option<&str>,
    ) -> Option<MediaTypeSource> {
        let usable = |mime: Option<&str>| {
            mime.map(normalize_mime)
                .filter(|m| !m.is_empty() && !is_generic_mime(m))
        };

        usable(declared)
            .map(MediaTypeSource::Declared)
            .or_else(|| usable(sniffed).map(MediaTypeSource::Sniffed))
            .or_else(|| {
                extension
                    .and_then(mime_from_extension)
                    .map(|m| MediaTypeSource::ExtensionGuess(m.to_string()))
            })
    }

    pub fn mime(&self) -> &str {
        match self {
            MediaTypeSource::Declared(m)
            | MediaTypeSource::Sniffed(m)
            | MediaTypeSource::ExtensionGuess(m) => m,
        }
    }
}

/// Processing class an input falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    RasterPhoto,
    Animated,
    /// Scalable-vector and legacy raster formats that renderers scale natively
    VectorOrLegacy,
    Video,
}

/// Lowercase and strip parameters (`image/JPEG; charset=x` becomes `image/jpeg`).
pub fn normalize_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn is_generic_mime(mime: &str) -> bool {
    matches!(
        mime,
        "application/octet-stream" | "binary/octet-stream" | "application/unknown"
    )
}

pub fn mime_from_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => return None,
    };
    Some(mime)
}

pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let ext = match normalize_mime(mime).as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "image/tiff" => "tiff",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        "video/x-matroska" => "mkv",
        "video/x-msvideo" => "avi",
        _ => return None,
    };
    Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_type_wins() {
        let resolved =
            MediaTypeSource::resolve(Some("image/gif"), Some("image/png"), Some("jpg")).unwrap();
        assert_eq!(resolved, MediaTypeSource::Declared("image/gif".to_string()));
    }

    #[test]
    fn generic_declared_type_falls_through_to_sniffed() {
        let resolved = MediaTypeSource::resolve(
            Some("application/octet-stream"),
            Some("image/png"),
            Some("jpg"),
        )
        .unwrap();
        assert_eq!(resolved, MediaTypeSource::Sniffed("image/png".to_string()));
    }

    #[test]
    fn extension_is_last_resort() {
        let resolved = MediaTypeSource::resolve(None, None, Some("MP4")).unwrap();
        assert_eq!(resolved, MediaTypeSource::ExtensionGuess("video/mp4".to_string()));
        assert_eq!(resolved.mime(), "video/mp4");
        assert!(MediaTypeSource::resolve(None, None, Some("xyz")).is_none());
    }

    #[test]
    fn mime_parameters_are_stripped() {
        assert_eq!(normalize_mime("Image/JPEG; q=1"), "image/jpeg");
        assert_eq!(extension_for_mime("image/vnd.microsoft.icon"), Some("ico"));
    }
}
