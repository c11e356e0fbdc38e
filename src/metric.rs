//! Similarity metrics.
//!
//! A [`SimilarityMetric`] maps two equal-shaped grayscale rasters to a
//! scalar in `[0, 1]`, where 1.0 means identical. The pipeline treats the
//! metric as opaque: workers call [`SimilarityMetric::score`] and record the
//! result, and a per-frame failure is logged rather than propagated.
//!
//! Two metrics ship with the crate:
//!
//! - [`Ssim`] — global-statistics structural similarity. The default, and
//!   the metric the stock thresholds were tuned against.
//! - [`PixelDiff`] — complement of the mean absolute pixel difference.
//!   Cheaper and cruder; useful for hard cuts between flat title cards.
//!
//! [`MetricKind`] selects between them by name.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use image::GrayImage;
use thiserror::Error;

const SSIM_C1: f32 = 0.01 * 0.01;
const SSIM_C2: f32 = 0.03 * 0.03;

/// Errors a metric can raise for a single frame pair.
///
/// These never abort a run: the worker logs the failure and leaves the
/// frame's score slot at its default.
#[derive(Debug, Error)]
pub enum MetricError {
    /// The two rasters have different dimensions.
    #[error("raster shape mismatch: reference is {expected_width}x{expected_height}, frame is {actual_width}x{actual_height}")]
    ShapeMismatch {
        /// Reference width in pixels.
        expected_width: u32,
        /// Reference height in pixels.
        expected_height: u32,
        /// Frame width in pixels.
        actual_width: u32,
        /// Frame height in pixels.
        actual_height: u32,
    },

    /// One of the rasters has no pixels.
    #[error("cannot score an empty raster")]
    EmptyRaster,
}

/// A perceptual similarity function over grayscale rasters.
///
/// Implementations must be [`Send`] and [`Sync`]: the scoring pool shares
/// one metric instance across all worker threads.
pub trait SimilarityMetric: Send + Sync {
    /// Short stable name, used in logs and CLI output.
    fn name(&self) -> &'static str;

    /// Score `frame` against `reference`. Returns a value in `[0, 1]`.
    fn score(&self, reference: &GrayImage, frame: &GrayImage) -> Result<f32, MetricError>;
}

fn check_shapes(reference: &GrayImage, frame: &GrayImage) -> Result<(), MetricError> {
    if reference.width() == 0 || reference.height() == 0 || frame.width() == 0 || frame.height() == 0
    {
        return Err(MetricError::EmptyRaster);
    }
    if reference.dimensions() != frame.dimensions() {
        return Err(MetricError::ShapeMismatch {
            expected_width: reference.width(),
            expected_height: reference.height(),
            actual_width: frame.width(),
            actual_height: frame.height(),
        });
    }
    Ok(())
}

/// Global-statistics structural similarity.
///
/// Computes means, variances, and covariance over the whole raster (pixels
/// normalised to `[0, 1]`) and applies the SSIM formula with the standard
/// stabilisers c1 = 0.01², c2 = 0.03². The raw SSIM value is clamped to
/// `[0, 1]`; structurally inverted content therefore scores 0 rather than
/// negative. Identical rasters score exactly 1.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ssim;

impl Ssim {
    /// Create the metric.
    pub fn new() -> Self {
        Self
    }
}

impl SimilarityMetric for Ssim {
    fn name(&self) -> &'static str {
        "ssim"
    }

    fn score(&self, reference: &GrayImage, frame: &GrayImage) -> Result<f32, MetricError> {
        check_shapes(reference, frame)?;

        let a = reference.as_raw();
        let b = frame.as_raw();
        let len = a.len().min(b.len());

        let mut sum_a = 0.0f64;
        let mut sum_b = 0.0f64;
        for idx in 0..len {
            sum_a += f64::from(a[idx]) / 255.0;
            sum_b += f64::from(b[idx]) / 255.0;
        }
        let mean_a = sum_a / len as f64;
        let mean_b = sum_b / len as f64;

        let mut var_a = 0.0f64;
        let mut var_b = 0.0f64;
        let mut cov = 0.0f64;
        for idx in 0..len {
            let da = f64::from(a[idx]) / 255.0 - mean_a;
            let db = f64::from(b[idx]) / 255.0 - mean_b;
            var_a += da * da;
            var_b += db * db;
            cov += da * db;
        }
        let denom = len.saturating_sub(1).max(1) as f64;
        var_a /= denom;
        var_b /= denom;
        cov /= denom;

        let c1 = f64::from(SSIM_C1);
        let c2 = f64::from(SSIM_C2);
        let numerator = (2.0 * mean_a * mean_b + c1) * (2.0 * cov + c2);
        // The denominator is bounded below by c1 * c2, so the division is
        // always defined (all-black identical rasters must score 1.0).
        let denominator = (mean_a * mean_a + mean_b * mean_b + c1) * (var_a + var_b + c2);
        let ssim = numerator / denominator;

        Ok(ssim.clamp(0.0, 1.0) as f32)
    }
}

/// Complement of the mean absolute pixel difference.
///
/// `1 − mean(|a − b|) / 255`. Identical rasters score exactly 1.0; a black
/// frame against a white frame scores 0.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelDiff;

impl PixelDiff {
    /// Create the metric.
    pub fn new() -> Self {
        Self
    }
}

impl SimilarityMetric for PixelDiff {
    fn name(&self) -> &'static str {
        "pixel"
    }

    fn score(&self, reference: &GrayImage, frame: &GrayImage) -> Result<f32, MetricError> {
        check_shapes(reference, frame)?;

        let a = reference.as_raw();
        let b = frame.as_raw();
        let len = a.len().min(b.len());

        let mut total = 0.0f64;
        for idx in 0..len {
            total += f64::from(a[idx].abs_diff(b[idx]));
        }
        let mean = total / (len as f64 * 255.0);

        Ok((1.0 - mean).clamp(0.0, 1.0) as f32)
    }
}

/// Selector for the shipped metrics.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MetricKind {
    /// Global-statistics SSIM (default).
    Ssim,
    /// Mean absolute difference complement.
    PixelDiff,
}

impl MetricKind {
    /// The stable name accepted by [`FromStr`] and shown in help output.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Ssim => "ssim",
            MetricKind::PixelDiff => "pixel",
        }
    }

    /// Instantiate the metric behind a shared handle.
    pub fn build(&self) -> Arc<dyn SimilarityMetric> {
        match self {
            MetricKind::Ssim => Arc::new(Ssim::new()),
            MetricKind::PixelDiff => Arc::new(PixelDiff::new()),
        }
    }
}

/// Error returned when parsing an unknown metric name.
#[derive(Debug)]
pub struct MetricKindParseError(pub String);

impl fmt::Display for MetricKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown metric '{}' (expected 'ssim' or 'pixel')", self.0)
    }
}

impl std::error::Error for MetricKindParseError {}

impl FromStr for MetricKind {
    type Err = MetricKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "ssim" => Ok(MetricKind::Ssim),
            "pixel" => Ok(MetricKind::PixelDiff),
            _ => Err(MetricKindParseError(lower)),
        }
    }
}
