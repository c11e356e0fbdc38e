//! # stillscan
//!
//! Locate a scene-transition boundary inside a video by scoring successive
//! frames against a fixed reference still image.
//!
//! `stillscan` decodes frames sequentially, scores them in parallel against
//! the reference with a perceptual similarity metric, and watches the score
//! stream for the configured transition: either the *end* of the segment the
//! reference belongs to (scores collapse) or the *start* of the segment the
//! reference opens (scores jump). The classic use is skipping a recap or
//! title sequence: give it the intro's last frame and it reports where the
//! intro ends.
//!
//! ## Quick Start
//!
//! ```
//! use image::GrayImage;
//! use stillscan::{BoundarySearch, SearchOptions, SearchOutcome, SyntheticSource};
//!
//! // Fifty frames of the "intro", then a hard cut.
//! let reference = GrayImage::from_pixel(64, 48, image::Luma([200]));
//! let mut frames = vec![reference.clone(); 50];
//! frames.push(GrayImage::from_pixel(64, 48, image::Luma([20])));
//! let mut source = SyntheticSource::new(frames, 25.0);
//!
//! let search = BoundarySearch::new(reference, SearchOptions::new());
//! match search.run(&mut source)? {
//!     SearchOutcome::Found(event) => println!("intro ends at frame {}", event.frame_index),
//!     SearchOutcome::Exhausted { frames_scanned } => {
//!         println!("no boundary in {frames_scanned} frames")
//!     }
//! }
//! # Ok::<(), stillscan::StillscanError>(())
//! ```
//!
//! Real videos go through [`VideoSource`] (requires the `ffmpeg` feature):
//!
//! ```no_run
//! # #[cfg(feature = "ffmpeg")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use stillscan::{BoundarySearch, SearchOptions, VideoSource};
//!
//! let reference = image::open("intro_last_frame.png")?.to_luma8();
//! let (width, height) = reference.dimensions();
//! let mut source = VideoSource::open("episode.mkv", width, height)?;
//!
//! let search = BoundarySearch::new(reference, SearchOptions::new().with_score_log("out.csv"));
//! let outcome = search.run(&mut source)?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "ffmpeg"))]
//! # fn main() {}
//! ```
//!
//! ## How a run works
//!
//! - A single **dispatcher** pulls up to the batch size of frames from the
//!   source and enqueues them on a bounded channel, tagged with their local
//!   index.
//! - A long-lived **pool** of scoring workers dequeues frames, scores each
//!   against the reference, and writes into the batch's score buffer at the
//!   frame's index. Indices are disjoint, so the buffer needs no lock.
//! - After a per-batch barrier, the **detector** scans the scores in order,
//!   carrying its state across batches, and either reports a
//!   [`BoundaryEvent`] or moves on to the next batch.
//!
//! Worker count, batch size, queue capacity, timeouts, per-batch deadline,
//! CSV logging, debug images, and cancellation are all configured through
//! [`SearchOptions`].
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ffmpeg` | [`VideoSource`], FFmpeg-backed decoding (needs the FFmpeg development libraries) |

pub mod config;
pub mod detector;
mod dispatch;
pub mod error;
pub mod metric;
mod pipeline;
mod pool;
pub mod progress;
mod report;
pub mod source;
#[cfg(feature = "ffmpeg")]
pub mod video;

pub use config::{
    DEFAULT_BATCH_SIZE, DEFAULT_DISPATCH_TIMEOUT, DEFAULT_LAG_CORRECTION, DEFAULT_POLL_TIMEOUT,
    DEFAULT_QUEUE_CAPACITY, FALLBACK_FPS, MAX_LAG_CORRECTION, SearchOptions,
};
pub use detector::BoundaryRule;
pub use error::StillscanError;
pub use metric::{MetricError, MetricKind, MetricKindParseError, PixelDiff, SimilarityMetric, Ssim};
pub use pipeline::{BoundaryEvent, BoundarySearch, SearchOutcome};
pub use progress::{CancellationToken, ScoreCallback};
pub use report::format_timestamp;
pub use source::{FrameSource, SyntheticSource};
#[cfg(feature = "ffmpeg")]
pub use video::VideoSource;
