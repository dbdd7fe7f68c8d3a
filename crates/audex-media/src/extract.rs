//! Audio extraction over scoped temporary files.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// The domain transform of the conversion stage.
///
/// Implementations must not leak scratch resources on any exit path;
/// everything an extraction touches is released when the call returns,
/// whether it succeeded or failed.
#[async_trait]
pub trait AudioTransform: Send + Sync {
    /// Extract the audio track of a video payload as MP3 bytes.
    async fn extract_audio(&self, input: &[u8]) -> MediaResult<Vec<u8>>;
}

/// Audio extraction by spawning the system FFmpeg binary.
///
/// Scratch files live in a per-call [`tempfile::TempDir`], which removes
/// them when it is dropped — on success, on transform error, and when the
/// future is cancelled.
pub struct FfmpegExtractor {
    ffmpeg: PathBuf,
    /// VBR quality passed as `-q:a` (0 best, 9 worst)
    quality: u8,
}

impl FfmpegExtractor {
    /// Locate FFmpeg on PATH and build an extractor.
    pub fn new() -> MediaResult<Self> {
        let ffmpeg =
            which::which("ffmpeg").map_err(|e| MediaError::FfmpegNotFound(e.to_string()))?;
        debug!("Using ffmpeg at {}", ffmpeg.display());
        Ok(Self { ffmpeg, quality: 2 })
    }

    /// Use an explicit FFmpeg binary path.
    pub fn with_binary(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            quality: 2,
        }
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }
}

#[async_trait]
impl AudioTransform for FfmpegExtractor {
    async fn extract_audio(&self, input: &[u8]) -> MediaResult<Vec<u8>> {
        let scratch = tempfile::tempdir()?;
        let input_path = scratch.path().join("source");
        let output_path = scratch.path().join("audio.mp3");

        tokio::fs::write(&input_path, input).await?;

        let output = Command::new(&self.ffmpeg)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-i")
            .arg(&input_path)
            .arg("-vn")
            .arg("-acodec")
            .arg("libmp3lame")
            .arg("-q:a")
            .arg(self.quality.to_string())
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::transform_failed(stderr.trim().to_string()));
        }

        let bytes = tokio::fs::read(&output_path).await?;
        if bytes.is_empty() {
            return Err(MediaError::EmptyOutput);
        }

        debug!(
            "Extracted {} audio bytes from {} input bytes",
            bytes.len(),
            input.len()
        );

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn garbage_input_is_a_transform_failure() {
        let extractor = FfmpegExtractor::new().expect("ffmpeg on PATH");

        let err = extractor
            .extract_audio(b"definitely not a video")
            .await
            .unwrap_err();

        assert!(err.is_transform_failure() || matches!(err, MediaError::TransformFailed(_)));
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and a sample clip at testdata/sample.mp4"]
    async fn sample_clip_yields_mp3_bytes() {
        let extractor = FfmpegExtractor::new().expect("ffmpeg on PATH");
        let input = tokio::fs::read("testdata/sample.mp4").await.unwrap();

        let audio = extractor.extract_audio(&input).await.unwrap();

        assert!(!audio.is_empty());
        // MP3 starts with an ID3 tag or an MPEG frame sync.
        assert!(audio.starts_with(b"ID3") || audio[0] == 0xFF);
    }
}
