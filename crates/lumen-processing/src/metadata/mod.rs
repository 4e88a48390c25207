//! Metadata extraction
//!
//! Both extractors are best-effort: a failure in either one is logged and yields an
//! empty result for that part, never an error for the job.

pub mod colors;
pub mod camera;

use bytes::Bytes;
use lumen_core::models::{CameraInfo, ExtractedMetadata, MediaKind};

pub use colors::{dominant_colors, extract_dominant_colors};
pub use camera::extract_camera_info;

/// Extractors assume static raster content; video and large animations are skipped.
pub fn should_extract_metadata(kind: MediaKind, size_bytes: u64, animated_threshold: u64) -> bool {
    match kind {
        MediaKind::Video => false,
        MediaKind::Animated => size_bytes <= animated_threshold,
        MediaKind::RasterPhoto | MediaKind::VectorOrLegacy => true,
    }
}

/// Run color and EXIF extraction concurrently and join both.
#[tracing::instrument(skip(data), fields(size_bytes = data.len()))]
pub async fn extract_metadata(data: Bytes) -> ExtractedMetadata {
    let start = std::time::Instant::now();
    let color_data = data.clone();

    let (colors, camera) = tokio::join!(
        tokio::task::spawn_blocking(move || extract_dominant_colors(&color_data)),
        tokio::task::spawn_blocking(move || extract_camera_info(&data)),
    );

    let dominant_colors = match colors {
        Ok(Ok(colors)) => colors,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Dominant color extraction failed");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Dominant color task failed");
            Vec::new()
        }
    };

    let camera = match camera {
        Ok(Ok(camera)) => camera,
        Ok(Err(e)) => {
            // Most uploads simply carry no EXIF block
            tracing::debug!(error = %e, "No camera metadata extracted");
            CameraInfo::default()
        }
        Err(e) => {
            tracing::warn!(error = %e, "EXIF extraction task failed");
            CameraInfo::default()
        }
    };

    tracing::info!(
        colors = dominant_colors.len(),
        has_camera = !camera.is_empty(),
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Metadata extraction completed"
    );

    ExtractedMetadata {
        dominant_colors,
        camera,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use lumen_core::models::ColorName;
    use std::io::Cursor;

    #[tokio::test]
    async fn extraction_degrades_per_extractor() {
        let img = RgbImage::from_pixel(32, 32, Rgb([20, 200, 40]));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();

        let metadata = extract_metadata(Bytes::from(buffer)).await;
        assert_eq!(metadata.dominant_colors, vec![ColorName::Green]);
        assert!(metadata.camera.is_empty());
    }

    #[tokio::test]
    async fn garbage_yields_empty_metadata() {
        let metadata = extract_metadata(Bytes::from_static(b"garbage")).await;
        assert!(metadata.is_empty());
    }

    #[test]
    fn skip_rules() {
        let threshold = 2 * 1024 * 1024;
        assert!(!should_extract_metadata(MediaKind::Video, 10, threshold));
        assert!(should_extract_metadata(MediaKind::Animated, 1024, threshold));
        assert!(!should_extract_metadata(MediaKind::Animated, threshold + 1, threshold));
        assert!(should_extract_metadata(MediaKind::RasterPhoto, u64::MAX, threshold));
    }
}
