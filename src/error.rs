//! Error types for the `stillscan` crate.
//!
//! This module defines [`StillscanError`], the unified error type returned by
//! all fallible operations in the crate. Errors carry enough context to
//! diagnose the problem without additional logging at the call site.

use std::{io::Error as IoError, path::PathBuf};

use image::ImageError;
use thiserror::Error;

/// The unified error type for all `stillscan` operations.
///
/// Every public method that can fail returns `Result<T, StillscanError>`.
/// Per-frame scoring failures are deliberately *not* represented here: a
/// metric failure on a single frame is logged and the frame keeps its
/// default score, so the run continues. Only conditions that end the run
/// surface as this type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StillscanError {
    /// The video file could not be opened.
    #[error("Failed to open video file at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to the source constructor.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// A frame could not be decoded mid-stream.
    #[error("Failed to decode video frame: {0}")]
    DecodeError(String),

    /// The crate was built without the `ffmpeg` feature, so no video
    /// decoder is available.
    #[error("Video decoding is not available in this build (enable the `ffmpeg` feature)")]
    DecoderUnavailable,

    /// The reference image has a zero dimension.
    #[error("Reference image has zero width or height")]
    EmptyReference,

    /// A configuration value was rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The scoring pool terminated while work was still being dispatched.
    #[error("Scoring pool terminated unexpectedly")]
    PoolTerminated,

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while loading or saving rasters.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// The run was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for StillscanError {
    fn from(error: ffmpeg_next::Error) -> Self {
        StillscanError::DecodeError(error.to_string())
    }
}
