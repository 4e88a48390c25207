//! Decoding, resizing and re-encoding of raster images.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use lumen_core::{IngestError, IngestResult};

/// Re-encoded image ready for upload
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Bytes,
    pub content_type: &'static str,
    pub extension: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Decode an image. Undecodable input is fatal for the job.
pub fn decode(data: &[u8]) -> IngestResult<DynamicImage> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| IngestError::fatal_input(format!("Failed to read image: {}", e)))?
        .decode()
        .map_err(|e| IngestError::fatal_input(format!("Failed to decode image: {}", e)))
}

/// Read dimensions from the header without decoding pixel data.
pub fn dimensions(data: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Center-crop to a square of `size` pixels. Images smaller than `size` are cropped to
/// their shorter edge instead of being upscaled.
pub fn square_crop(img: &DynamicImage, size: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    let side = size.min(w).min(h).max(1);
    img.resize_to_fill(side, side, FilterType::Lanczos3)
}

/// Scale down so neither edge exceeds `max`, keeping the aspect ratio.
pub fn bounded(img: &DynamicImage, max: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w <= max && h <= max {
        return img.clone();
    }
    img.resize(max, max, FilterType::Lanczos3)
}

/// Encode as JPEG, or as PNG when the image has an alpha channel.
pub fn encode(img: &DynamicImage, quality: u8) -> IngestResult<EncodedImage> {
    let (width, height) = img.dimensions();
    let mut buffer = Vec::with_capacity(width as usize * height as usize / 4);

    if img.color().has_alpha() {
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| IngestError::Internal(format!("PNG encoding failed: {}", e)))?;
        return Ok(EncodedImage {
            data: Bytes::from(buffer),
            content_type: "image/png",
            extension: "png",
            width,
            height,
        });
    }

    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(|e| IngestError::Internal(format!("JPEG encoding failed: {}", e)))?;

    Ok(EncodedImage {
        data: Bytes::from(buffer),
        content_type: "image/jpeg",
        extension: "jpg",
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn create_test_image(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);
        img.write_to(&mut cursor, ImageFormat::Png).unwrap();
        buffer
    }

    #[test]
    fn test_decode_invalid_image() {
        let result = decode(b"not an image");
        assert!(matches!(result, Err(IngestError::FatalInput(_))));
    }

    #[test]
    fn test_dimensions_from_header() {
        let data = create_test_image(64, 32);
        assert_eq!(dimensions(&data), Some((64, 32)));
        assert_eq!(dimensions(b"nope"), None);
    }

    #[test]
    fn test_square_crop() {
        let img = decode(&create_test_image(800, 400)).unwrap();
        assert_eq!(square_crop(&img, 200).dimensions(), (200, 200));
        // never upscales
        assert_eq!(square_crop(&img, 500).dimensions(), (400, 400));
    }

    #[test]
    fn test_bounded_keeps_aspect_ratio() {
        let img = decode(&create_test_image(2000, 1000)).unwrap();
        assert_eq!(bounded(&img, 1000).dimensions(), (1000, 500));

        let small = decode(&create_test_image(300, 200)).unwrap();
        assert_eq!(bounded(&small, 1000).dimensions(), (300, 200));
    }

    #[test]
    fn test_encode_opaque_as_jpeg() {
        let img = decode(&create_test_image(50, 50)).unwrap();
        let encoded = encode(&img, 82).unwrap();
        assert_eq!(encoded.content_type, "image/jpeg");
        assert_eq!(image::guess_format(&encoded.data).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_encode_alpha_as_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 0])));
        let encoded = encode(&img, 82).unwrap();
        assert_eq!(encoded.extension, "png");
    }
}
