//! Input validation and normalization applied before a job is enqueued and again when
//! the catalog record is built.

use crate::constants::{MAX_TAGS, MAX_TAG_LENGTH, MAX_TITLE_LENGTH};
use crate::error::{IngestError, IngestResult};
use crate::models::Coordinates;

/// Trim, lowercase and deduplicate tags, keeping the order of first occurrence.
///
/// Tags longer than [`MAX_TAG_LENGTH`] characters are truncated and at most [`MAX_TAGS`]
/// entries are kept. Empty tags are dropped.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = distinct_tags(tags);
    out.truncate(MAX_TAGS);
    out
}

fn distinct_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag: String = tag
            .as_ref()
            .trim()
            .to_lowercase()
            .chars()
            .take(MAX_TAG_LENGTH)
            .collect();
        let tag = tag.trim_end().to_string();
        if tag.is_empty() || out.contains(&tag) {
            continue;
        }
        out.push(tag);
    }
    out
}

/// Reject tag lists with more than [`MAX_TAGS`] distinct tags. Duplicates that collapse
/// under normalization do not count.
pub fn validate_tag_count(tags: &[String]) -> IngestResult<()> {
    let distinct = distinct_tags(tags).len();
    if distinct > MAX_TAGS {
        return Err(IngestError::validation(format!(
            "At most {} tags are allowed, got {}",
            MAX_TAGS, distinct
        )));
    }
    Ok(())
}

/// Check WGS84 bounds. Valid coordinates are returned unchanged.
pub fn validate_coordinates(coords: Coordinates) -> IngestResult<Coordinates> {
    if !coords.latitude.is_finite() || !(-90.0..=90.0).contains(&coords.latitude) {
        return Err(IngestError::validation(
            "Latitude must be between -90 and 90",
        ));
    }
    if !coords.longitude.is_finite() || !(-180.0..=180.0).contains(&coords.longitude) {
        return Err(IngestError::validation(
            "Longitude must be between -180 and 180",
        ));
    }
    Ok(coords)
}

/// Trim the title; blank titles become `None`.
pub fn validate_title(title: Option<&str>) -> IngestResult<Option<String>> {
    let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(IngestError::validation(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(Some(title.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_trimmed_lowercased_and_deduplicated() {
        assert_eq!(
            normalize_tags(["Red", "red", " Blue ", "red"]),
            vec!["red".to_string(), "blue".to_string()]
        );
    }

    #[test]
    fn tag_normalization_is_idempotent() {
        let once = normalize_tags(["Sunset", " BEACH", "sunset", "", "  "]);
        let twice = normalize_tags(&once);
        assert_eq!(once, twice);
        assert_eq!(once, vec!["sunset", "beach"]);
    }

    #[test]
    fn tags_are_capped() {
        let many: Vec<String> = (0..30).map(|i| format!("tag{}", i)).collect();
        let normalized = normalize_tags(&many);
        assert_eq!(normalized.len(), MAX_TAGS);
        assert_eq!(normalized[0], "tag0");

        let long = "x".repeat(80);
        assert_eq!(normalize_tags([long])[0].len(), MAX_TAG_LENGTH);
    }

    #[test]
    fn too_many_distinct_tags_is_a_validation_error() {
        let many: Vec<String> = (0..21).map(|i| i.to_string()).collect();
        assert!(matches!(
            validate_tag_count(&many),
            Err(IngestError::Validation(_))
        ));
    }

    #[test]
    fn duplicate_tags_do_not_count_toward_the_limit() {
        let repeated: Vec<String> = std::iter::repeat("Red".to_string()).take(21).collect();
        assert!(validate_tag_count(&repeated).is_ok());

        let mut mixed: Vec<String> = (0..20).map(|i| format!("tag{}", i)).collect();
        mixed.extend(["TAG0", " tag1 ", "tag2"].map(String::from));
        assert!(validate_tag_count(&mixed).is_ok());
        assert_eq!(normalize_tags(&mixed).len(), MAX_TAGS);
    }

    #[test]
    fn out_of_range_latitude_is_rejected() {
        let result = validate_coordinates(Coordinates {
            latitude: 95.0,
            longitude: 10.0,
        });
        assert!(matches!(result, Err(IngestError::Validation(_))));
    }

    #[test]
    fn valid_coordinates_pass_unchanged() {
        let coords = Coordinates {
            latitude: 45.5,
            longitude: -73.6,
        };
        assert_eq!(validate_coordinates(coords).unwrap(), coords);
    }

    #[test]
    fn nan_longitude_is_rejected() {
        assert!(validate_coordinates(Coordinates {
            latitude: 0.0,
            longitude: f64::NAN,
        })
        .is_err());
    }

    #[test]
    fn titles_are_trimmed_and_bounded() {
        assert_eq!(validate_title(Some("  Dawn ")).unwrap().as_deref(), Some("Dawn"));
        assert_eq!(validate_title(Some("   ")).unwrap(), None);
        assert!(validate_title(Some(&"a".repeat(201))).is_err());
    }
}
