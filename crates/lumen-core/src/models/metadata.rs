use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

/// Coarse color family produced by hue bucketing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorName {
    Red,
    Orange,
    Yellow,
    Green,
    Teal,
    Blue,
    Purple,
    Pink,
    Brown,
    Black,
    White,
    Gray,
}

impl ColorName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorName::Red => "red",
            ColorName::Orange => "orange",
            ColorName::Yellow => "yellow",
            ColorName::Green => "green",
            ColorName::Teal => "teal",
            ColorName::Blue => "blue",
            ColorName::Purple => "purple",
            ColorName::Pink => "pink",
            ColorName::Brown => "brown",
            ColorName::Black => "black",
            ColorName::White => "white",
            ColorName::Gray => "gray",
        }
    }
}

impl Display for ColorName {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Capture settings read from embedded EXIF tags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length_mm: Option<f64>,
    /// f-number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aperture: Option<f64>,
    /// Exposure time rendered as "1/250" or "2.5"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutter_speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso: Option<u32>,
}

impl CameraInfo {
    pub fn is_empty(&self) -> bool {
        self == &CameraInfo::default()
    }
}

/// Metadata derived from image content. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub dominant_colors: Vec<ColorName>,
    pub camera: CameraInfo,
}

impl ExtractedMetadata {
    pub fn is_empty(&self) -> bool {
        self.dominant_colors.is_empty() && self.camera.is_empty()
    }
}
