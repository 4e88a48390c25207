//! Media type detection and classification.

use image::ImageFormat;
use lumen_core::models::{normalize_mime, MediaKind, MediaTypeSource};
use lumen_core::{IngestError, IngestResult};

/// Resolved type of an input and the processing class it falls into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub source: MediaTypeSource,
    pub kind: MediaKind,
}

impl Detection {
    pub fn mime(&self) -> &str {
        self.source.mime()
    }
}

/// Recognize the format from the leading bytes.
pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    if let Ok(format) = image::guess_format(data) {
        let mime = match format {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Ico => "image/x-icon",
            ImageFormat::Tiff => "image/tiff",
            _ => return None,
        };
        return Some(mime);
    }

    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return match &data[8..12] {
            // HEIF family containers are still images we do not handle
            b"avif" | b"avis" | b"heic" | b"heix" | b"mif1" | b"msf1" => None,
            b"qt  " => Some("video/quicktime"),
            _ => Some("video/mp4"),
        };
    }

    if data.starts_with(&[0x1a, 0x45, 0xdf, 0xa3]) {
        let head = &data[..data.len().min(64)];
        if head.windows(4).any(|w| w == b"webm") {
            return Some("video/webm");
        }
        return Some("video/x-matroska");
    }

    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"AVI " {
        return Some("video/x-msvideo");
    }

    if looks_like_svg(data) {
        return Some("image/svg+xml");
    }

    None
}

fn looks_like_svg(data: &[u8]) -> bool {
    let head = &data[..data.len().min(1024)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    (text.starts_with("<svg") || text.starts_with("<?xml")) && text.contains("<svg")
}

/// WebP with the animation bit set in its VP8X header.
fn is_animated_webp(data: &[u8]) -> bool {
    data.len() >= 21
        && data.starts_with(b"RIFF")
        && &data[8..12] == b"WEBP"
        && &data[12..16] == b"VP8X"
        && data[20] & 0x02 != 0
}

/// PNG carrying an `acTL` chunk ahead of its image data.
fn is_apng(data: &[u8]) -> bool {
    const SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
    if !data.starts_with(SIGNATURE) {
        return false;
    }

    let mut offset = SIGNATURE.len();
    while offset + 8 <= data.len() {
        let len = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;
        match &data[offset + 4..offset + 8] {
            b"acTL" => return true,
            b"IDAT" | b"IEND" => return false,
            _ => {}
        }
        offset = offset.saturating_add(12).saturating_add(len);
    }
    false
}

/// Map a resolved MIME type to its processing class. `None` means unsupported.
pub fn classify(mime: &str, data: &[u8]) -> Option<MediaKind> {
    let mime = normalize_mime(mime);
    if mime.starts_with("video/") {
        return Some(MediaKind::Video);
    }

    let kind = match mime.as_str() {
        "image/gif" => MediaKind::Animated,
        "image/png" | "image/apng" if is_apng(data) => MediaKind::Animated,
        "image/webp" if is_animated_webp(data) => MediaKind::Animated,
        "image/jpeg" | "image/jpg" | "image/png" | "image/webp" => MediaKind::RasterPhoto,
        "image/svg+xml" | "image/bmp" | "image/x-icon" | "image/vnd.microsoft.icon"
        | "image/tiff" => MediaKind::VectorOrLegacy,
        _ => return None,
    };
    Some(kind)
}

/// Resolve the type of an input (declared, then sniffed, then extension) and classify it.
pub fn detect(
    declared: Option<&str>,
    data: &[u8],
    extension: Option<&str>,
) -> IngestResult<Detection> {
    let sniffed = sniff_mime(data);
    let source = MediaTypeSource::resolve(declared, sniffed, extension)
        .ok_or_else(|| IngestError::fatal_input("Unable to determine media type"))?;

    let kind = classify(source.mime(), data).ok_or_else(|| {
        IngestError::fatal_input(format!("Unsupported media type: {}", source.mime()))
    })?;

    tracing::debug!(mime = %source.mime(), source = ?source, kind = ?kind, "Media type detected");

    Ok(Detection { source, kind })
}
