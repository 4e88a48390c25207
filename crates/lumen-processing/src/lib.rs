//! Lumen Processing Library
//!
//! Everything that looks at media bytes: type detection and classification, metadata
//! extraction (dominant colors, EXIF), resizing and re-encoding, inline previews, the
//! external transcoder adapter and the variant generator that ties them together.

pub mod detect;
pub mod metadata;
pub mod preview;
pub mod raster;
pub mod transcode;
pub mod variants;

pub use detect::{classify, detect, sniff_mime, Detection};
pub use metadata::{extract_metadata, should_extract_metadata};
pub use preview::inline_preview;
pub use transcode::{
    FfmpegTranscoder, TranscodeError, TranscodeOutput, Transcoder, VideoInspection,
};
pub use variants::VariantGenerator;
