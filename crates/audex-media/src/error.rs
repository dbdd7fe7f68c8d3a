//! Media error types.

use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg binary not found: {0}")]
    FfmpegNotFound(String),

    #[error("Transform failed: {0}")]
    TransformFailed(String),

    #[error("Transform produced no output")]
    EmptyOutput,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub fn transform_failed(msg: impl Into<String>) -> Self {
        Self::TransformFailed(msg.into())
    }

    /// True for payload-level failures (corrupt or unsupported input),
    /// which are terminal for the job — as opposed to environment
    /// problems that may clear up on retry.
    pub fn is_transform_failure(&self) -> bool {
        matches!(
            self,
            MediaError::TransformFailed(_) | MediaError::EmptyOutput
        )
    }
}
