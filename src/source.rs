//! Frame sources.
//!
//! A [`FrameSource`] is a strictly sequential decode cursor: each call to
//! [`next_frame`](FrameSource::next_frame) yields the next grayscale raster,
//! already conformed to the reference dimensions, or `Ok(None)` once the
//! stream is exhausted. End-of-stream is the normal way a run ends, never an
//! error.
//!
//! [`SyntheticSource`] is the in-memory implementation used by tests,
//! benchmarks, and doc examples. The FFmpeg-backed decoder lives in
//! [`VideoSource`](crate::VideoSource) behind the `ffmpeg` feature.
//!
//! # Example
//!
//! ```
//! use image::GrayImage;
//! use stillscan::{FrameSource, SyntheticSource};
//!
//! let frames = vec![
//!     GrayImage::from_pixel(32, 24, image::Luma([200])),
//!     GrayImage::from_pixel(32, 24, image::Luma([40])),
//! ];
//! let mut source = SyntheticSource::new(frames, 25.0);
//!
//! assert!(source.next_frame().unwrap().is_some());
//! assert!(source.next_frame().unwrap().is_some());
//! assert!(source.next_frame().unwrap().is_none());
//! ```

use std::collections::VecDeque;

use image::{GrayImage, imageops};

use crate::error::StillscanError;

/// A sequential source of grayscale frames.
///
/// Implementations own the decode cursor; there is no seeking. Frames must
/// be returned in presentation order, conformed to the reference dimensions
/// the source was constructed with (see [`conform_raster`]).
pub trait FrameSource {
    /// Decode and return the next frame, or `Ok(None)` at end-of-stream.
    fn next_frame(&mut self) -> Result<Option<GrayImage>, StillscanError>;

    /// Nominal frame rate for index→timestamp conversion.
    ///
    /// Returns `0.0` when unknown; the pipeline then falls back to a
    /// configured or default rate.
    fn frames_per_second(&self) -> f64;
}

/// Resize `raster` to the given dimensions when its shape differs.
///
/// Uses bilinear (triangle) filtering so the policy is deterministic across
/// sources. Rasters that already match are returned untouched.
pub(crate) fn conform_raster(raster: GrayImage, width: u32, height: u32) -> GrayImage {
    if raster.dimensions() == (width, height) {
        raster
    } else {
        imageops::resize(&raster, width, height, imageops::FilterType::Triangle)
    }
}

/// An in-memory [`FrameSource`] over a fixed list of rasters.
///
/// Frames are handed out in order and the source reports exhaustion once
/// the list is empty. When target dimensions are set, each frame is
/// conformed on the way out, matching the behaviour of the video decoder.
pub struct SyntheticSource {
    frames: VecDeque<GrayImage>,
    fps: f64,
    target: Option<(u32, u32)>,
}

impl SyntheticSource {
    /// Create a source over `frames` with a nominal frame rate.
    ///
    /// Pass `0.0` for `fps` to simulate a container that reports no rate.
    pub fn new(frames: Vec<GrayImage>, fps: f64) -> Self {
        Self {
            frames: frames.into(),
            fps,
            target: None,
        }
    }

    /// Conform every yielded frame to the given dimensions.
    #[must_use]
    pub fn with_target_dimensions(mut self, width: u32, height: u32) -> Self {
        self.target = Some((width, height));
        self
    }

    /// Number of frames not yet yielded.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<GrayImage>, StillscanError> {
        let Some(raster) = self.frames.pop_front() else {
            return Ok(None);
        };
        let raster = match self.target {
            Some((width, height)) => conform_raster(raster, width, height),
            None => raster,
        };
        Ok(Some(raster))
    }

    fn frames_per_second(&self) -> f64 {
        self.fps
    }
}
