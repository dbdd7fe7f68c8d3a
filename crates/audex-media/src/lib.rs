//! FFmpeg-based audio extraction.
//!
//! This crate provides:
//! - The [`AudioTransform`] trait the conversion worker is generic over
//! - [`FfmpegExtractor`], the production implementation

pub mod error;
pub mod extract;

pub use error::{MediaError, MediaResult};
pub use extract::{AudioTransform, FfmpegExtractor};
