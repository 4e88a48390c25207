//! Dominant color extraction by quantized hue sampling.

use std::collections::HashMap;

use image::imageops::FilterType;
use image::DynamicImage;
use lumen_core::models::ColorName;

/// Edge of the downsampled image colors are counted on
const SAMPLE_SIZE: u32 = 64;
/// Fully transparent-ish pixels are ignored
const MIN_ALPHA: u8 = 128;
/// A bucket must cover at least this share of sampled pixels to be reported
const MIN_SHARE: f32 = 0.05;
pub const MAX_DOMINANT_COLORS: usize = 3;

fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * (((b - r) / delta) + 2.0)
    } else {
        60.0 * (((r - g) / delta) + 4.0)
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    (hue, saturation, max)
}

/// Map one pixel to its color bucket.
pub fn bucket(r: u8, g: u8, b: u8) -> ColorName {
    let (h, s, v) = rgb_to_hsv(r, g, b);

    if v < 0.2 {
        return ColorName::Black;
    }
    if s < 0.15 {
        return if v > 0.85 {
            ColorName::White
        } else {
            ColorName::Gray
        };
    }

    match h {
        h if !(15.0..345.0).contains(&h) => ColorName::Red,
        h if h < 45.0 => {
            if v < 0.6 {
                ColorName::Brown
            } else {
                ColorName::Orange
            }
        }
        h if h < 70.0 => ColorName::Yellow,
        h if h < 165.0 => ColorName::Green,
        h if h < 195.0 => ColorName::Teal,
        h if h < 255.0 => ColorName::Blue,
        h if h < 290.0 => ColorName::Purple,
        _ => ColorName::Pink,
    }
}

/// Most frequent color buckets of an image, most dominant first.
pub fn dominant_colors(img: &DynamicImage) -> Vec<ColorName> {
    let sample = img
        .resize(SAMPLE_SIZE, SAMPLE_SIZE, FilterType::Triangle)
        .to_rgba8();

    let mut counts: HashMap<ColorName, u32> = HashMap::new();
    let mut total = 0u32;
    for pixel in sample.pixels() {
        let [r, g, b, a] = pixel.0;
        if a < MIN_ALPHA {
            continue;
        }
        *counts.entry(bucket(r, g, b)).or_insert(0) += 1;
        total += 1;
    }

    if total == 0 {
        return Vec::new();
    }

    let mut ranked: Vec<(ColorName, u32)> = counts.into_iter().collect();
    // Ties broken by name so results are deterministic
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));

    ranked
        .into_iter()
        .filter(|(_, count)| *count as f32 / total as f32 >= MIN_SHARE)
        .take(MAX_DOMINANT_COLORS)
        .map(|(color, _)| color)
        .collect()
}

/// Decode and extract dominant colors.
pub fn extract_dominant_colors(data: &[u8]) -> anyhow::Result<Vec<ColorName>> {
    let img = image::load_from_memory(data)?;
    Ok(dominant_colors(&img))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn primary_colors_bucket_as_expected() {
        assert_eq!(bucket(230, 20, 20), ColorName::Red);
        assert_eq!(bucket(20, 200, 40), ColorName::Green);
        assert_eq!(bucket(30, 60, 220), ColorName::Blue);
        assert_eq!(bucket(250, 250, 250), ColorName::White);
        assert_eq!(bucket(5, 5, 5), ColorName::Black);
        assert_eq!(bucket(128, 128, 128), ColorName::Gray);
        assert_eq!(bucket(120, 70, 20), ColorName::Brown);
    }

    #[test]
    fn split_image_reports_both_halves() {
        let mut img = RgbaImage::from_pixel(100, 100, Rgba([230, 20, 20, 255]));
        for x in 0..40 {
            for y in 0..100 {
                img.put_pixel(x, y, Rgba([30, 60, 220, 255]));
            }
        }
        let colors = dominant_colors(&DynamicImage::ImageRgba8(img));
        assert_eq!(colors[0], ColorName::Red);
        assert!(colors.contains(&ColorName::Blue));
    }

    #[test]
    fn transparent_image_has_no_colors() {
        let img = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 0]));
        assert!(dominant_colors(&DynamicImage::ImageRgba8(img)).is_empty());
    }

    #[test]
    fn undecodable_input_is_an_error() {
        assert!(extract_dominant_colors(b"nope").is_err());
    }
}
