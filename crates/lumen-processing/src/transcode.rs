//! External transcoder adapter (ffmpeg / ffprobe).
//!
//! Converts large animated images to H.264 video, extracts poster frames and reads
//! durations. A missing binary, an input outside the size window or a timeout are all
//! reported as [`TranscodeError`] so callers can fall back to storing the original.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bytes::Bytes;
use lumen_core::constants::{
    PROBE_TIMEOUT, TRANSCODE_CRF, TRANSCODE_FRAME_RATE, TRANSCODE_MAX_DIMENSION,
};
use lumen_core::IngestConfig;
use tokio::process::Command;
use tokio::sync::OnceCell;

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("Transcoder unavailable: {0}")]
    Unavailable(String),

    #[error("Input size {size} bytes outside transcode window [{min}, {max}]")]
    OutOfRange { size: u64, min: u64, max: u64 },

    #[error("Transcode timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transcode failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of converting an animation to video
#[derive(Debug, Clone)]
pub struct TranscodeOutput {
    pub video: Bytes,
    pub poster: Option<Bytes>,
    pub duration_seconds: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Poster frame and probe data of an uploaded video
#[derive(Debug, Clone, Default)]
pub struct VideoInspection {
    pub poster: Option<Bytes>,
    pub duration_seconds: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert an animated image to an MP4 with poster frame and duration.
    async fn transcode_animation(
        &self,
        input: Bytes,
        extension: &str,
    ) -> Result<TranscodeOutput, TranscodeError>;

    /// Extract the first frame and probe data of a video.
    async fn inspect_video(
        &self,
        input: Bytes,
        extension: &str,
    ) -> Result<VideoInspection, TranscodeError>;
}

/// Validate that a path doesn't contain shell metacharacters or dangerous sequences
fn validate_binary_path(path: &str) -> anyhow::Result<()> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(anyhow!("Path contains dangerous characters: {}", path));
    }
    if path.contains("..") {
        return Err(anyhow!("Path contains directory traversal: {}", path));
    }
    Ok(())
}

fn safe_extension(extension: &str) -> String {
    let ext: String = extension
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_ascii_lowercase();
    if ext.is_empty() {
        "bin".to_string()
    } else {
        ext
    }
}

/// Video filter chain: bound the longest edge, force even dimensions for yuv420p and
/// normalize the frame rate.
pub fn transcode_filter() -> String {
    format!(
        "scale='min({max},iw)':'min({max},ih)':force_original_aspect_ratio=decrease,\
         scale=trunc(iw/2)*2:trunc(ih/2)*2,fps={fps}",
        max = TRANSCODE_MAX_DIMENSION,
        fps = TRANSCODE_FRAME_RATE
    )
}

#[derive(Debug, Clone, Copy)]
struct ProbeData {
    duration_seconds: Option<f64>,
    width: Option<u32>,
    height: Option<u32>,
}

pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
    timeout: Duration,
    probe_timeout: Duration,
    min_bytes: u64,
    max_bytes: u64,
    available: OnceCell<bool>,
}

impl FfmpegTranscoder {
    pub fn new(
        ffmpeg_path: String,
        ffprobe_path: String,
        timeout: Duration,
        min_bytes: u64,
        max_bytes: u64,
    ) -> anyhow::Result<Self> {
        validate_binary_path(&ffmpeg_path).context("Invalid ffmpeg_path")?;
        validate_binary_path(&ffprobe_path).context("Invalid ffprobe_path")?;

        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
            timeout,
            probe_timeout: timeout.min(PROBE_TIMEOUT),
            min_bytes,
            max_bytes,
            available: OnceCell::new(),
        })
    }

    pub fn from_config(config: &IngestConfig) -> anyhow::Result<Self> {
        Self::new(
            config.ffmpeg_path.clone(),
            config.ffprobe_path.clone(),
            config.transcode_timeout,
            config.transcode_min_bytes,
            config.transcode_max_bytes,
        )
    }

    /// Whether both binaries answer `-version`. Probed once and cached.
    pub async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                let ffmpeg = binary_responds(&self.ffmpeg_path).await;
                let ffprobe = binary_responds(&self.ffprobe_path).await;
                if !(ffmpeg && ffprobe) {
                    tracing::warn!(
                        ffmpeg_path = %self.ffmpeg_path,
                        ffprobe_path = %self.ffprobe_path,
                        ffmpeg_found = ffmpeg,
                        ffprobe_found = ffprobe,
                        "Transcoder binaries not available, video features disabled"
                    );
                }
                ffmpeg && ffprobe
            })
            .await
    }

    async fn ensure_available(&self) -> Result<(), TranscodeError> {
        if self.is_available().await {
            Ok(())
        } else {
            Err(TranscodeError::Unavailable(self.ffmpeg_path.clone()))
        }
    }

    async fn run_ffmpeg(&self, args: &[String], timeout: Duration) -> Result<(), TranscodeError> {
        let child = Command::new(&self.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        // Dropping the future on timeout kills the child process
        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| TranscodeError::Timeout(timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscodeError::Failed(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    async fn extract_first_frame(&self, video_path: &Path, poster_path: &Path) -> Option<Bytes> {
        let args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            video_path.to_string_lossy().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-q:v".to_string(),
            "3".to_string(),
            poster_path.to_string_lossy().to_string(),
        ];

        match self.run_ffmpeg(&args, self.probe_timeout).await {
            Ok(()) => match tokio::fs::read(poster_path).await {
                Ok(data) if !data.is_empty() => Some(Bytes::from(data)),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "Poster frame file unreadable");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Poster frame extraction failed");
                None
            }
        }
    }

    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffprobe",
        process.executable.path = %self.ffprobe_path,
        ffmpeg.operation = "probe"
    ))]
    async fn probe(&self, path: &Path) -> anyhow::Result<ProbeData> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-select_streams",
                "v:0",
            ])
            .arg(path)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.probe_timeout, output)
            .await
            .map_err(|_| anyhow!("ffprobe timed out"))?
            .context("Failed to execute ffprobe")?;

        if !output.status.success() {
            return Err(anyhow!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        let probe_data: serde_json::Value =
            serde_json::from_slice(&output.stdout).context("Failed to parse ffprobe output")?;
        Ok(parse_probe(&probe_data))
    }

    fn check_window(&self, size: u64) -> Result<(), TranscodeError> {
        if size < self.min_bytes || size > self.max_bytes {
            return Err(TranscodeError::OutOfRange {
                size,
                min: self.min_bytes,
                max: self.max_bytes,
            });
        }
        Ok(())
    }
}

async fn binary_responds(path: &str) -> bool {
    Command::new(path)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

fn parse_probe(probe: &serde_json::Value) -> ProbeData {
    let stream = probe["streams"].get(0);
    let format_duration = probe["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok());
    let stream_duration = stream
        .and_then(|s| s["duration"].as_str())
        .and_then(|d| d.parse::<f64>().ok());

    ProbeData {
        duration_seconds: format_duration.or(stream_duration).filter(|d| *d > 0.0),
        width: stream.and_then(|s| s["width"].as_u64()).map(|w| w as u32),
        height: stream.and_then(|s| s["height"].as_u64()).map(|h| h as u32),
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    #[tracing::instrument(skip(self, input), fields(
        process.executable.name = "ffmpeg",
        size_bytes = input.len(),
        ffmpeg.operation = "transcode"
    ))]
    async fn transcode_animation(
        &self,
        input: Bytes,
        extension: &str,
    ) -> Result<TranscodeOutput, TranscodeError> {
        self.ensure_available().await?;
        self.check_window(input.len() as u64)?;

        let start = std::time::Instant::now();
        // Removed with everything in it when dropped, on every return path
        let scratch = tempfile::Builder::new()
            .prefix("lumen-transcode-")
            .tempdir()?;
        let input_path = scratch.path().join(format!("input.{}", safe_extension(extension)));
        let output_path = scratch.path().join("output.mp4");
        let poster_path = scratch.path().join("poster.jpg");

        tokio::fs::write(&input_path, &input).await?;

        let args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
            "-vf".to_string(),
            transcode_filter(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "medium".to_string(),
            "-crf".to_string(),
            TRANSCODE_CRF.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-an".to_string(),
            output_path.to_string_lossy().to_string(),
        ];

        self.run_ffmpeg(&args, self.timeout).await?;

        let video = Bytes::from(tokio::fs::read(&output_path).await?);
        if video.is_empty() {
            return Err(TranscodeError::Failed("ffmpeg produced an empty file".to_string()));
        }

        let probe = self
            .probe(&output_path)
            .await
            .map_err(|e| TranscodeError::Failed(format!("{:#}", e)))?;
        let duration_seconds = probe
            .duration_seconds
            .ok_or_else(|| TranscodeError::Failed("Could not read video duration".to_string()))?;

        let poster = self.extract_first_frame(&output_path, &poster_path).await;

        tracing::info!(
            input_bytes = input.len(),
            output_bytes = video.len(),
            duration_seconds,
            has_poster = poster.is_some(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Animation transcoded to video"
        );

        Ok(TranscodeOutput {
            video,
            poster,
            duration_seconds,
            width: probe.width,
            height: probe.height,
        })
    }

    #[tracing::instrument(
        skip(self, input),
        fields(size_bytes = input.len(), ffmpeg.operation = "inspect")
    )]
    async fn inspect_video(
        &self,
        input: Bytes,
        extension: &str,
    ) -> Result<VideoInspection, TranscodeError> {
        self.ensure_available().await?;

        let scratch = tempfile::Builder::new()
            .prefix("lumen-inspect-")
            .tempdir()?;
        let input_path = scratch.path().join(format!("input.{}", safe_extension(extension)));
        let poster_path = scratch.path().join("poster.jpg");
        tokio::fs::write(&input_path, &input).await?;

        let probe = match self.probe(&input_path).await {
            Ok(probe) => Some(probe),
            Err(e) => {
                tracing::warn!(error = %e, "Video probe failed");
                None
            }
        };
        let poster = self.extract_first_frame(&input_path, &poster_path).await;

        Ok(VideoInspection {
            poster,
            duration_seconds: probe.and_then(|p| p.duration_seconds),
            width: probe.and_then(|p| p.width),
            height: probe.and_then(|p| p.height),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcoder(ffmpeg: &str) -> FfmpegTranscoder {
        FfmpegTranscoder::new(
            ffmpeg.to_string(),
            "ffprobe".to_string(),
            Duration::from_secs(30),
            10,
            100,
        )
        .unwrap()
    }

    #[test]
    fn rejects_shell_metacharacters_in_paths() {
        let result = FfmpegTranscoder::new(
            "ffmpeg; rm -rf /".to_string(),
            "ffprobe".to_string(),
            Duration::from_secs(1),
            0,
            1,
        );
        assert!(result.is_err());
    }

    #[test]
    fn filter_bounds_dimension_and_frame_rate() {
        let filter = transcode_filter();
        assert!(filter.contains("min(1080,iw)"));
        assert!(filter.contains("fps=24"));
    }

    #[test]
    fn probe_output_parsing() {
        let probe = serde_json::json!({
            "streams": [{"width": 640, "height": 360}],
            "format": {"duration": "3.250000"}
        });
        let parsed = parse_probe(&probe);
        assert_eq!(parsed.duration_seconds, Some(3.25));
        assert_eq!(parsed.width, Some(640));
        assert_eq!(parsed.height, Some(360));

        let empty = parse_probe(&serde_json::json!({}));
        assert_eq!(empty.duration_seconds, None);
    }

    #[test]
    fn extensions_are_sanitized() {
        assert_eq!(safe_extension("GIF"), "gif");
        assert_eq!(safe_extension("../x"), "x");
        assert_eq!(safe_extension(""), "bin");
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let t = transcoder("/nonexistent/lumen-ffmpeg");
        assert!(!t.is_available().await);
        let err = t
            .transcode_animation(Bytes::from(vec![0u8; 50]), "gif")
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Unavailable(_)));
    }

    #[tokio::test]
    async fn out_of_window_input_is_skipped() {
        let t = transcoder("ffmpeg");
        if !t.is_available().await {
            eprintln!("ffmpeg not installed, skipping");
            return;
        }
        let err = t
            .transcode_animation(Bytes::from(vec![0u8; 5]), "gif")
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::OutOfRange { size: 5, .. }));
    }

    #[test]
    fn probe_steps_get_a_shorter_timeout() {
        let t = transcoder("ffmpeg");
        assert_eq!(t.timeout, Duration::from_secs(30));
        assert_eq!(t.probe_timeout, Duration::from_secs(30));

        let slow = FfmpegTranscoder::new(
            "ffmpeg".to_string(),
            "ffprobe".to_string(),
            Duration::from_secs(300),
            0,
            1,
        )
        .unwrap();
        assert_eq!(slow.probe_timeout, PROBE_TIMEOUT);

        let fast = FfmpegTranscoder::new(
            "ffmpeg".to_string(),
            "ffprobe".to_string(),
            Duration::from_millis(200),
            0,
            1,
        )
        .unwrap();
        assert_eq!(fast.probe_timeout, Duration::from_millis(200));
    }

    fn transcode_scratch_dirs() -> Vec<std::path::PathBuf> {
        std::fs::read_dir(std::env::temp_dir())
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.file_name().to_string_lossy().starts_with("lumen-transcode-"))
                    .map(|e| e.path())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_encoder_times_out_and_cleans_up_scratch() {
        use std::os::unix::fs::PermissionsExt;

        let bin_dir = tempfile::tempdir().unwrap();
        let script = bin_dir.path().join("fake-ffmpeg");
        std::fs::write(
            &script,
            "#!/bin/sh\nif [ \"$1\" = \"-version\" ]; then exit 0; fi\nsleep 30\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let script = script.to_string_lossy().to_string();

        let t = FfmpegTranscoder::new(
            script.clone(),
            script,
            Duration::from_millis(300),
            10,
            100,
        )
        .unwrap();
        assert!(t.is_available().await);

        let before = transcode_scratch_dirs();
        let start = std::time::Instant::now();
        let err = t
            .transcode_animation(Bytes::from(vec![0u8; 50]), "gif")
            .await
            .unwrap_err();

        assert!(matches!(err, TranscodeError::Timeout(d) if d == Duration::from_millis(300)));
        assert!(start.elapsed() < Duration::from_secs(10));
        let leaked: Vec<_> = transcode_scratch_dirs()
            .into_iter()
            .filter(|dir| !before.contains(dir))
            .collect();
        assert!(leaked.is_empty(), "scratch dirs left behind: {:?}", leaked);
    }
}
