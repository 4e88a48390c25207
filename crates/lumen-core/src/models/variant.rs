use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

/// Named rendition slot of a processed asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VariantName {
    Thumbnail,
    Small,
    Regular,
    Original,
    PosterFrame,
    FullSizeDisplay,
}

impl VariantName {
    pub const ALL: [VariantName; 6] = [
        VariantName::Thumbnail,
        VariantName::Small,
        VariantName::Regular,
        VariantName::Original,
        VariantName::PosterFrame,
        VariantName::FullSizeDisplay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VariantName::Thumbnail => "thumbnail",
            VariantName::Small => "small",
            VariantName::Regular => "regular",
            VariantName::Original => "original",
            VariantName::PosterFrame => "posterFrame",
            VariantName::FullSizeDisplay => "fullSizeDisplay",
        }
    }
}

impl Display for VariantName {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Transcoded video attached to a variant set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub video_url: String,
    pub duration_seconds: f64,
}

/// Output of variant generation for one job.
///
/// Built once and then handed to the catalog record; treat as immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantSet {
    pub urls: BTreeMap<VariantName, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub is_video: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoInfo>,
}

// Fallback orders for each artifact kind. A slot missing from the set falls through to
// the next entry.
const DISPLAY_ORDER: &[VariantName] = &[
    VariantName::Regular,
    VariantName::Original,
    VariantName::Small,
];
const THUMBNAIL_ORDER: &[VariantName] = &[
    VariantName::Thumbnail,
    VariantName::Small,
    VariantName::Regular,
    VariantName::Original,
];
const FULL_SIZE_ORDER: &[VariantName] = &[
    VariantName::FullSizeDisplay,
    VariantName::Original,
    VariantName::Regular,
];

impl VariantSet {
    pub fn get(&self, name: VariantName) -> Option<&str> {
        self.urls.get(&name).map(String::as_str)
    }

    pub fn insert(&mut self, name: VariantName, url: impl Into<String>) {
        self.urls.insert(name, url.into());
    }

    /// Put the same URL in every nominal size slot, for assets stored once as-is.
    pub fn fill_all_sizes(&mut self, url: &str) {
        for name in [
            VariantName::Thumbnail,
            VariantName::Small,
            VariantName::Regular,
            VariantName::Original,
            VariantName::FullSizeDisplay,
        ] {
            self.insert(name, url);
        }
    }

    /// Slots for a video-shaped asset: the video is the original, the poster frame (or the
    /// video when there is none) fills the poster and thumbnail slots.
    pub fn insert_video_urls(&mut self, video_url: String, poster_url: Option<String>) {
        let poster = poster_url.unwrap_or_else(|| video_url.clone());
        self.insert(VariantName::Thumbnail, poster.clone());
        self.insert(VariantName::PosterFrame, poster);
        self.insert(VariantName::Original, video_url);
    }

    fn resolve(&self, order: &[VariantName]) -> Option<&str> {
        order.iter().find_map(|name| self.get(*name))
    }

    /// URL shown in the main viewer: regular, then original, then small.
    pub fn display_url(&self) -> Option<&str> {
        self.resolve(DISPLAY_ORDER)
    }

    /// URL for grid tiles: thumbnail, then small, regular, original.
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.resolve(THUMBNAIL_ORDER)
    }

    /// URL for the full-size lightbox: full-size display, then original, then regular.
    pub fn full_size_url(&self) -> Option<&str> {
        self.resolve(FULL_SIZE_ORDER)
    }

    /// Poster image for video assets: poster frame, then thumbnail, then the video itself.
    pub fn poster_url(&self) -> Option<&str> {
        self.get(VariantName::PosterFrame)
            .or_else(|| self.get(VariantName::Thumbnail))
            .or_else(|| self.video.as_ref().map(|v| v.video_url.as_str()))
    }

    /// Every distinct storage URL referenced by this set.
    pub fn referenced_urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = self.urls.values().map(String::as_str).collect();
        if let Some(video) = &self.video {
            urls.push(video.video_url.as_str());
        }
        urls.sort_unstable();
        urls.dedup();
        urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefers_regular() {
        let mut set = VariantSet::default();
        set.insert(VariantName::Small, "s");
        set.insert(VariantName::Original, "o");
        set.insert(VariantName::Regular, "r");
        assert_eq!(set.display_url(), Some("r"));
    }

    #[test]
    fn display_falls_back_to_original_then_small() {
        let mut set = VariantSet::default();
        set.insert(VariantName::Small, "s");
        assert_eq!(set.display_url(), Some("s"));
        set.insert(VariantName::Original, "o");
        assert_eq!(set.display_url(), Some("o"));
    }

    #[test]
    fn empty_set_resolves_nothing() {
        let set = VariantSet::default();
        assert_eq!(set.display_url(), None);
        assert_eq!(set.thumbnail_url(), None);
        assert_eq!(set.poster_url(), None);
    }

    #[test]
    fn poster_falls_back_to_video_url() {
        let set = VariantSet {
            is_video: true,
            video: Some(VideoInfo {
                video_url: "v.mp4".to_string(),
                duration_seconds: 3.2,
            }),
            ..Default::default()
        };
        assert_eq!(set.poster_url(), Some("v.mp4"));
    }

    #[test]
    fn video_slots_use_poster_for_thumbnails() {
        let mut set = VariantSet::default();
        set.insert_video_urls("v.mp4".to_string(), Some("p.jpg".to_string()));
        assert_eq!(set.display_url(), Some("v.mp4"));
        assert_eq!(set.thumbnail_url(), Some("p.jpg"));
        assert_eq!(set.poster_url(), Some("p.jpg"));

        let mut bare = VariantSet::default();
        bare.insert_video_urls("v.mp4".to_string(), None);
        assert_eq!(bare.thumbnail_url(), Some("v.mp4"));
        assert_eq!(bare.poster_url(), Some("v.mp4"));
    }

    #[test]
    fn fill_all_sizes_shares_one_url() {
        let mut set = VariantSet::default();
        set.fill_all_sizes("a.gif");
        assert_eq!(set.thumbnail_url(), Some("a.gif"));
        assert_eq!(set.full_size_url(), Some("a.gif"));
        assert_eq!(set.referenced_urls(), vec!["a.gif"]);
    }

    #[test]
    fn variant_names_serialize_camel_case() {
        let json = serde_json::to_string(&VariantName::FullSizeDisplay).unwrap();
        assert_eq!(json, "\"fullSizeDisplay\"");
    }
}
