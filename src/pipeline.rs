//! The batch-windowed scoring pipeline.
//!
//! [`BoundarySearch`] owns the reference raster, the metric, and the
//! options, and drives the whole run: spawn the scoring pool once, then for
//! each batch dispatch frames, wait out the barrier, log and publish the
//! scores, and hand them to the detector. Batches execute strictly one
//! after another; the only parallelism is inside the pool.
//!
//! The per-batch barrier is the completion channel: the dispatcher clones a
//! sender into every work item, workers send one unit per handled item, and
//! the driver drains the receiver until it disconnects. At that point every
//! dispatched item has been scored (or abandoned by a dying worker) and the
//! score buffer can be read without synchronisation.

use std::sync::Arc;

use image::GrayImage;

use crate::config::{FALLBACK_FPS, SearchOptions};
use crate::detector::{RunningState, scan_batch};
use crate::dispatch::dispatch_batch;
use crate::error::StillscanError;
use crate::metric::{SimilarityMetric, Ssim};
use crate::pool::{ScoreBuffer, ScoringPool};
use crate::report::{ScoreLog, save_debug_image};
use crate::source::FrameSource;

/// A located segment boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryEvent {
    /// Global frame index of the boundary, lag correction already applied.
    pub frame_index: u64,
    /// `floor(frame_index / fps)`, whole seconds into the stream.
    pub timestamp_seconds: u64,
}

impl BoundaryEvent {
    /// The boundary position formatted as `MM:SS`.
    pub fn timestamp(&self) -> String {
        crate::report::format_timestamp(self.timestamp_seconds)
    }
}

/// Terminal result of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The active rule fired.
    Found(BoundaryEvent),
    /// The stream (or the configured frame cap) ran out first.
    Exhausted {
        /// Total frames scored before giving up.
        frames_scanned: u64,
    },
}

/// A configured boundary search, ready to run against a frame source.
///
/// # Example
///
/// ```
/// use image::GrayImage;
/// use stillscan::{BoundarySearch, SearchOptions, SearchOutcome, SyntheticSource};
///
/// let reference = GrayImage::from_pixel(64, 48, image::Luma([200]));
/// let mut frames = vec![reference.clone(); 50];
/// frames.push(GrayImage::from_pixel(64, 48, image::Luma([20])));
///
/// let mut source = SyntheticSource::new(frames, 25.0);
/// let search = BoundarySearch::new(reference, SearchOptions::new().with_workers(2));
/// match search.run(&mut source)? {
///     SearchOutcome::Found(event) => {
///         // The cut is at frame 50; one frame of lag correction reports 49.
///         assert_eq!(event.frame_index, 49);
///         assert_eq!(event.timestamp_seconds, 1);
///     }
///     SearchOutcome::Exhausted { .. } => unreachable!(),
/// }
/// # Ok::<(), stillscan::StillscanError>(())
/// ```
pub struct BoundarySearch {
    reference: Arc<GrayImage>,
    metric: Arc<dyn SimilarityMetric>,
    options: SearchOptions,
}

impl BoundarySearch {
    /// Create a search scoring with the default [`Ssim`] metric.
    pub fn new(reference: GrayImage, options: SearchOptions) -> Self {
        Self::with_metric(reference, Arc::new(Ssim::new()), options)
    }

    /// Create a search with an explicit metric.
    pub fn with_metric(
        reference: GrayImage,
        metric: Arc<dyn SimilarityMetric>,
        options: SearchOptions,
    ) -> Self {
        Self {
            reference: Arc::new(reference),
            metric,
            options,
        }
    }

    /// Dimensions every scored frame is conformed to.
    pub fn reference_dimensions(&self) -> (u32, u32) {
        self.reference.dimensions()
    }

    /// Run the search to completion over `source`.
    ///
    /// Scans batch by batch until the rule fires, the source is exhausted,
    /// the frame cap is reached, or a fatal error occurs. The scoring pool
    /// is spawned at the start of the run and joined before returning, on
    /// every path.
    pub fn run(&self, source: &mut dyn FrameSource) -> Result<SearchOutcome, StillscanError> {
        if self.reference.width() == 0 || self.reference.height() == 0 {
            return Err(StillscanError::EmptyReference);
        }
        if self.options.is_cancelled() {
            return Err(StillscanError::Cancelled);
        }

        let fps = self.resolve_fps(&*source);
        log::debug!(
            "searching for segment {} with metric '{}': {} workers, batch size {}, fps {fps}",
            self.options.rule.label(),
            self.metric.name(),
            self.options.workers,
            self.options.batch_size,
        );

        if let Some(dir) = &self.options.debug_images {
            save_debug_image(dir, "reference_grayscale.png", &self.reference);
        }

        let mut score_log = match &self.options.score_log {
            Some(path) => Some(ScoreLog::create(path)?),
            None => None,
        };

        let pool = ScoringPool::spawn(
            self.options.workers,
            self.options.queue_capacity,
            self.options.poll_timeout,
            Arc::clone(&self.reference),
            Arc::clone(&self.metric),
        )?;
        let result = self.run_batches(source, &pool, fps, score_log.as_mut());
        pool.shutdown();
        result
    }

    fn run_batches(
        &self,
        source: &mut dyn FrameSource,
        pool: &ScoringPool,
        fps: f64,
        mut score_log: Option<&mut ScoreLog>,
    ) -> Result<SearchOutcome, StillscanError> {
        let work_tx = pool.sender();
        let mut state = RunningState::new();

        loop {
            let batch_limit = match self.options.max_frames {
                Some(cap) => {
                    let remaining = cap.saturating_sub(state.frame_offset);
                    if remaining == 0 {
                        log::debug!("frame cap {cap} reached without a boundary");
                        break;
                    }
                    self.options
                        .batch_size
                        .min(usize::try_from(remaining).unwrap_or(usize::MAX))
                }
                None => self.options.batch_size,
            };

            let scores = Arc::new(ScoreBuffer::new(batch_limit));
            let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(batch_limit);
            let mut retained = self.options.debug_images.as_ref().map(|_| Vec::new());

            let outcome = dispatch_batch(
                source,
                &work_tx,
                &scores,
                &done_tx,
                &self.options,
                batch_limit,
                retained.as_mut(),
            );

            // Barrier: the receiver disconnects once the dispatcher's clone
            // (dropped here) and every item's clone are gone.
            drop(done_tx);
            let mut completed = 0usize;
            while done_rx.recv().is_ok() {
                completed += 1;
            }
            if completed < outcome.dispatched {
                log::warn!(
                    "batch handled {completed} of {} dispatched frames; missing slots keep the default score",
                    outcome.dispatched
                );
            }

            if let Some(error) = outcome.failure {
                return Err(error);
            }

            let offset = state.frame_offset;
            let batch_scores = scores.snapshot(outcome.dispatched);

            for (local, &score) in batch_scores.iter().enumerate() {
                self.options.observer.on_score(offset + local as u64, score);
            }
            if let Some(log) = score_log.as_mut() {
                log.append(offset, &batch_scores)?;
            }

            if let Some(hit) = scan_batch(
                &mut state,
                self.options.rule,
                self.options.lag_correction,
                &batch_scores,
            ) {
                if let Some(dir) = &self.options.debug_images
                    && let Some(retained) = &retained
                    && let Some(trigger) = retained.get(hit.trigger_local)
                {
                    save_debug_image(dir, "boundary_trigger_grayscale.png", trigger);
                }
                if let Some(log) = score_log.as_mut() {
                    log.flush()?;
                }
                let event = BoundaryEvent {
                    frame_index: hit.global_index,
                    timestamp_seconds: timestamp_seconds(hit.global_index, fps),
                };
                log::debug!(
                    "boundary at frame {} ({} into the stream)",
                    event.frame_index,
                    crate::report::format_timestamp(event.timestamp_seconds),
                );
                return Ok(SearchOutcome::Found(event));
            }

            log::debug!(
                "batch at offset {offset}: {} frames scored, no boundary",
                batch_scores.len()
            );

            if outcome.stalled {
                log::warn!(
                    "ending search after a stalled batch; {} frames scanned",
                    state.frame_offset
                );
                break;
            }
            if outcome.exhausted {
                break;
            }
        }

        if let Some(log) = score_log.as_mut() {
            log.flush()?;
        }
        Ok(SearchOutcome::Exhausted {
            frames_scanned: state.frame_offset,
        })
    }

    fn resolve_fps(&self, source: &dyn FrameSource) -> f64 {
        if let Some(fps) = self.options.fps_override {
            return fps;
        }
        let reported = source.frames_per_second();
        if reported.is_finite() && reported > 0.0 {
            reported
        } else {
            log::warn!("source reports no frame rate, assuming {FALLBACK_FPS}");
            FALLBACK_FPS
        }
    }
}

fn timestamp_seconds(frame_index: u64, fps: f64) -> u64 {
    (frame_index as f64 / fps).floor() as u64
}
