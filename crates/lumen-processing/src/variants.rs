//! Variant generator
//!
//! Applies the per-kind policy:
//!
//! | Kind | Behavior |
//! |---|---|
//! | Animated, above threshold, transcoding on | transcode to video; on failure store as-is |
//! | Animated otherwise | store as-is, one URL for every size slot |
//! | Vector / legacy raster | store as-is, rasterized inline preview where possible |
//! | Raster photo | thumbnail + small (square crops), regular (bounded), full re-encode, original verbatim |
//! | Video | store as-is, then poster frame and duration |
//!
//! Every write goes through the caller's [`WriteLedger`], so on error the caller can
//! roll back exactly what was written.

use std::sync::Arc;

use bytes::Bytes;
use image::GenericImageView;
use lumen_core::constants::{
    DERIVATIVE_JPEG_QUALITY, FULL_SIZE_JPEG_QUALITY, REGULAR_MAX_DIMENSION, SMALL_SIZE,
    THUMBNAIL_SIZE,
};
use lumen_core::models::{extension_for_mime, MediaKind, VariantName, VariantSet, VideoInfo};
use lumen_core::{IngestConfig, IngestError, IngestResult};
use lumen_storage::{variant_key, AssetBase, SizeTag, WriteLedger};

use crate::detect::Detection;
use crate::preview::{inline_preview, try_inline_preview};
use crate::raster::{self, EncodedImage};
use crate::transcode::{TranscodeOutput, Transcoder};

struct RasterDerivatives {
    width: u32,
    height: u32,
    thumbnail: EncodedImage,
    small: EncodedImage,
    regular: EncodedImage,
    full: EncodedImage,
    preview: Option<String>,
}

fn render_raster(data: &[u8]) -> IngestResult<RasterDerivatives> {
    let img = raster::decode(data)?;
    let (width, height) = img.dimensions();

    let thumbnail = raster::encode(
        &raster::square_crop(&img, THUMBNAIL_SIZE),
        DERIVATIVE_JPEG_QUALITY,
    )?;
    let small = raster::encode(&raster::square_crop(&img, SMALL_SIZE), DERIVATIVE_JPEG_QUALITY)?;
    let regular = raster::encode(
        &raster::bounded(&img, REGULAR_MAX_DIMENSION),
        DERIVATIVE_JPEG_QUALITY,
    )?;
    let full = raster::encode(&img, FULL_SIZE_JPEG_QUALITY)?;

    let preview = match inline_preview(&img) {
        Ok(preview) => Some(preview),
        Err(e) => {
            tracing::warn!(error = %e, "Inline preview generation failed");
            None
        }
    };

    Ok(RasterDerivatives {
        width,
        height,
        thumbnail,
        small,
        regular,
        full,
        preview,
    })
}

pub struct VariantGenerator {
    transcoder: Arc<dyn Transcoder>,
    transcode_animated: bool,
    animated_threshold: u64,
}

impl VariantGenerator {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        transcode_animated: bool,
        animated_threshold: u64,
    ) -> Self {
        Self {
            transcoder,
            transcode_animated,
            animated_threshold,
        }
    }

    pub fn from_config(config: &IngestConfig, transcoder: Arc<dyn Transcoder>) -> Self {
        Self::new(
            transcoder,
            config.transcode_enabled,
            config.transcode_min_bytes,
        )
    }

    pub fn animated_threshold(&self) -> u64 {
        self.animated_threshold
    }

    /// Produce and store the variants of one input.
    ///
    /// Corrupt input fails with `FatalInput` before anything is written. A storage failure
    /// after some writes succeeded is returned as is; the successful writes are in `ledger`.
    #[tracing::instrument(skip_all, fields(base = %base, kind = ?detection.kind, size_bytes = data.len()))]
    pub async fn generate(
        &self,
        data: Bytes,
        detection: &Detection,
        base: &AssetBase,
        ledger: &WriteLedger,
    ) -> IngestResult<VariantSet> {
        let start = std::time::Instant::now();
        let mime = detection.mime().to_string();
        let extension = extension_for_mime(&mime).unwrap_or("bin");

        let variants = match detection.kind {
            MediaKind::Animated => {
                let size = data.len() as u64;
                if self.transcode_animated && size > self.animated_threshold {
                    match self
                        .transcoder
                        .transcode_animation(data.clone(), extension)
                        .await
                    {
                        Ok(output) => {
                            self.store_transcoded(data, output, base, ledger).await?
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Transcode failed, storing animation as-is");
                            self.store_as_is(data, &mime, extension, base, ledger).await?
                        }
                    }
                } else {
                    self.store_as_is(data, &mime, extension, base, ledger).await?
                }
            }
            MediaKind::VectorOrLegacy => {
                self.store_as_is(data, &mime, extension, base, ledger).await?
            }
            MediaKind::RasterPhoto => {
                self.store_raster(data, &mime, extension, base, ledger)
                    .await?
            }
            MediaKind::Video => self.store_video(data, &mime, extension, base, ledger).await?,
        };

        tracing::info!(
            variants = variants.urls.len(),
            is_video = variants.is_video,
            has_preview = variants.inline_preview.is_some(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Variants generated"
        );

        Ok(variants)
    }

    async fn store_as_is(
        &self,
        data: Bytes,
        mime: &str,
        extension: &str,
        base: &AssetBase,
        ledger: &WriteLedger,
    ) -> IngestResult<VariantSet> {
        let dimensions = raster::dimensions(&data);
        // No rasterizer for SVG in the stack
        let preview = if mime == "image/svg+xml" {
            None
        } else {
            try_inline_preview(data.clone()).await
        };

        let key = variant_key(base, SizeTag::Original, extension);
        let url = ledger.put(&key, data, mime).await?;

        let mut variants = VariantSet {
            inline_preview: preview,
            width: dimensions.map(|(w, _)| w),
            height: dimensions.map(|(_, h)| h),
            ..Default::default()
        };
        variants.fill_all_sizes(&url);
        Ok(variants)
    }

    async fn store_transcoded(
        &self,
        original: Bytes,
        output: TranscodeOutput,
        base: &AssetBase,
        ledger: &WriteLedger,
    ) -> IngestResult<VariantSet> {
        let video_key = variant_key(base, SizeTag::Video, "mp4");
        let video_url = ledger.put(&video_key, output.video, "video/mp4").await?;

        let (poster_url, preview) = match output.poster {
            Some(poster) => {
                let key = variant_key(base, SizeTag::Poster, "jpg");
                let url = ledger.put(&key, poster.clone(), "image/jpeg").await?;
                (Some(url), try_inline_preview(poster).await)
            }
            None => (None, try_inline_preview(original).await),
        };

        let mut variants = VariantSet {
            inline_preview: preview,
            width: output.width,
            height: output.height,
            is_video: true,
            video: Some(VideoInfo {
                video_url: video_url.clone(),
                duration_seconds: output.duration_seconds,
            }),
            ..Default::default()
        };
        variants.insert_video_urls(video_url, poster_url);
        Ok(variants)
    }

    async fn store_raster(
        &self,
        data: Bytes,
        mime: &str,
        extension: &str,
        base: &AssetBase,
        ledger: &WriteLedger,
    ) -> IngestResult<VariantSet> {
        let input = data.clone();
        let derivatives = tokio::task::spawn_blocking(move || render_raster(&input))
            .await
            .map_err(|e| IngestError::Internal(format!("Image processing task failed: {}", e)))??;

        let original_key = variant_key(base, SizeTag::Original, extension);
        let original_url = ledger.put(&original_key, data, mime).await?;

        let uploads = [
            (VariantName::Thumbnail, SizeTag::Thumb, derivatives.thumbnail),
            (VariantName::Small, SizeTag::Small, derivatives.small),
            (VariantName::Regular, SizeTag::Regular, derivatives.regular),
            (VariantName::FullSizeDisplay, SizeTag::Full, derivatives.full),
        ];

        let results =
            futures::future::join_all(uploads.into_iter().map(|(name, tag, image)| async move {
                let key = variant_key(base, tag, image.extension);
                let url = ledger.put(&key, image.data, image.content_type).await?;
                Ok::<_, IngestError>((name, url))
            }))
            .await;

        let mut variants = VariantSet {
            inline_preview: derivatives.preview,
            width: Some(derivatives.width),
            height: Some(derivatives.height),
            ..Default::default()
        };
        variants.insert(VariantName::Original, original_url);

        for result in results {
            let (name, url) = result?;
            variants.insert(name, url);
        }

        Ok(variants)
    }

    async fn store_video(
        &self,
        data: Bytes,
        mime: &str,
        extension: &str,
        base: &AssetBase,
        ledger: &WriteLedger,
    ) -> IngestResult<VariantSet> {
        let key = variant_key(base, SizeTag::Original, extension);
        let video_url = ledger.put(&key, data.clone(), mime).await?;

        let inspection = match self.transcoder.inspect_video(data, extension).await {
            Ok(inspection) => inspection,
            Err(e) => {
                tracing::warn!(error = %e, "Video inspection failed, storing without poster");
                Default::default()
            }
        };

        let (poster_url, preview) = match inspection.poster {
            Some(poster) => {
                let key = variant_key(base, SizeTag::Poster, "jpg");
                let url = ledger.put(&key, poster.clone(), "image/jpeg").await?;
                (Some(url), try_inline_preview(poster).await)
            }
            None => (None, None),
        };

        let mut variants = VariantSet {
            inline_preview: preview,
            width: inspection.width,
            height: inspection.height,
            is_video: true,
            video: Some(VideoInfo {
                video_url: video_url.clone(),
                duration_seconds: inspection.duration_seconds.unwrap_or(0.0),
            }),
            ..Default::default()
        };
        variants.insert_video_urls(video_url, poster_url);
        Ok(variants)
    }
}
