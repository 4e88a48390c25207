//! Camera metadata from embedded EXIF tags (kamadak-exif).

use std::io::Cursor;

use exif::{In, Reader, Tag, Value};
use lumen_core::models::CameraInfo;

fn ascii(exif: &exif::Exif, tag: Tag) -> Option<String> {
    match exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(ref parts) => {
            let first = parts.first()?;
            let text = String::from_utf8_lossy(first);
            let text = text.trim_matches(char::from(0)).trim();
            if text.is_empty() {
                None
            } else {
                Some(text.to_string())
            }
        }
        _ => None,
    }
}

fn rational(exif: &exif::Exif, tag: Tag) -> Option<f64> {
    match exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(ref v) if !v.is_empty() && v[0].denom != 0 => Some(v[0].to_f64()),
        _ => None,
    }
}

fn unsigned(exif: &exif::Exif, tag: Tag) -> Option<u32> {
    match exif.get_field(tag, In::PRIMARY)?.value {
        Value::Short(ref v) if !v.is_empty() => Some(v[0] as u32),
        Value::Long(ref v) if !v.is_empty() => Some(v[0]),
        _ => None,
    }
}

/// Render an exposure time the way photographers write it: "1/250" below one second,
/// plain seconds otherwise.
pub fn format_shutter_speed(seconds: f64) -> Option<String> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    if seconds < 1.0 {
        let denom = (1.0 / seconds).round() as u64;
        Some(format!("1/{}", denom))
    } else {
        let rounded = (seconds * 10.0).round() / 10.0;
        Some(format!("{}", rounded))
    }
}

/// Parse camera settings. Fails when the container has no readable EXIF block.
pub fn extract_camera_info(data: &[u8]) -> anyhow::Result<CameraInfo> {
    let exif = Reader::new().read_from_container(&mut Cursor::new(data))?;

    Ok(CameraInfo {
        make: ascii(&exif, Tag::Make),
        model: ascii(&exif, Tag::Model),
        focal_length_mm: rational(&exif, Tag::FocalLength),
        aperture: rational(&exif, Tag::FNumber),
        shutter_speed: rational(&exif, Tag::ExposureTime).and_then(format_shutter_speed),
        iso: unsigned(&exif, Tag::PhotographicSensitivity),
    })
}
