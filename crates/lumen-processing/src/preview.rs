//! Tiny inline previews embedded as data URIs.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use lumen_core::constants::INLINE_PREVIEW_SIZE;

/// Render a preview that fits in a [`INLINE_PREVIEW_SIZE`] box as a PNG data URI.
pub fn inline_preview(img: &DynamicImage) -> anyhow::Result<String> {
    let small = img.thumbnail(INLINE_PREVIEW_SIZE, INLINE_PREVIEW_SIZE);
    let mut buffer = Vec::new();
    small.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(&buffer)))
}

/// Decode `data` (first frame for animations) and render its inline preview.
pub fn inline_preview_from_bytes(data: &[u8]) -> anyhow::Result<String> {
    let img = image::load_from_memory(data)?;
    inline_preview(&img)
}

/// Soft-failing variant used by the variant generator: failures are logged and the
/// preview is omitted.
pub(crate) async fn try_inline_preview(data: bytes::Bytes) -> Option<String> {
    let result = tokio::task::spawn_blocking(move || inline_preview_from_bytes(&data)).await;
    match result {
        Ok(Ok(preview)) => Some(preview),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Inline preview generation failed");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Inline preview task failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    #[test]
    fn preview_fits_bounding_box() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 100, Rgb([1, 2, 3])));
        let preview = inline_preview(&img).unwrap();
        assert!(preview.starts_with("data:image/png;base64,"));

        let encoded = preview.trim_start_matches("data:image/png;base64,");
        let decoded = STANDARD.decode(encoded).unwrap();
        let back = image::load_from_memory(&decoded).unwrap();
        let (w, h) = back.dimensions();
        assert!(w <= INLINE_PREVIEW_SIZE && h <= INLINE_PREVIEW_SIZE);
        assert_eq!(w, INLINE_PREVIEW_SIZE);
    }

    #[test]
    fn garbage_has_no_preview() {
        assert!(inline_preview_from_bytes(b"<svg></svg>").is_err());
    }
}
