//! Search configuration.
//!
//! [`SearchOptions`] is a builder that threads the detection rule, pool
//! sizing, timeouts, output paths, score observers, and cancellation tokens
//! through [`BoundarySearch::run`](crate::BoundarySearch::run) without
//! polluting every function signature.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use stillscan::{BoundaryRule, CancellationToken, SearchOptions};
//!
//! let token = CancellationToken::new();
//! let options = SearchOptions::new()
//!     .with_rule(BoundaryRule::segment_start())
//!     .with_workers(4)
//!     .with_batch_size(500)
//!     .with_batch_deadline(Duration::from_secs(30))
//!     .with_cancellation(token.clone());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::detector::BoundaryRule;
use crate::progress::{CancellationToken, NoOpScores, ScoreCallback};

/// Default number of frames dispatched per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default capacity of the bounded work queue between the dispatcher and
/// the scoring workers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default worker dequeue timeout. Bounds how long a worker sleeps before
/// re-checking the pool shutdown flag.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Default enqueue timeout for the dispatcher. Expiry aborts the batch
/// rather than retrying.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Default lag correction subtracted from the triggering frame index when
/// reporting a boundary.
pub const DEFAULT_LAG_CORRECTION: u32 = 1;

/// Upper bound on the configurable lag correction.
pub const MAX_LAG_CORRECTION: u32 = 2;

/// Frame rate assumed when the container reports none and no override is
/// given. NTSC film rate, 24000/1001.
pub const FALLBACK_FPS: f64 = 23.976023976023978;

/// Configuration for a boundary search.
///
/// Carries the detection rule plus pool-, timeout-, output-, and
/// cancellation-related settings. Pass it to
/// [`BoundarySearch::new`](crate::BoundarySearch::new).
///
/// All fields have defaults — a default-constructed options object runs the
/// end-of-segment rule over batches of [`DEFAULT_BATCH_SIZE`] frames with one
/// worker per available core and produces no file output.
#[derive(Clone)]
pub struct SearchOptions {
    /// Active detection rule. Defaults to the end-of-segment rule.
    pub(crate) rule: BoundaryRule,
    /// Frames subtracted from the trigger index when reporting. 0..=2.
    pub(crate) lag_correction: u32,
    /// Frames dispatched per batch.
    pub(crate) batch_size: usize,
    /// Scoring worker count.
    pub(crate) workers: usize,
    /// Bounded work queue capacity.
    pub(crate) queue_capacity: usize,
    /// Worker dequeue timeout.
    pub(crate) poll_timeout: Duration,
    /// Dispatcher enqueue timeout.
    pub(crate) dispatch_timeout: Duration,
    /// Optional wall-clock deadline per batch. `None` means unbounded.
    pub(crate) batch_deadline: Option<Duration>,
    /// Optional cap on the total number of frames scanned.
    pub(crate) max_frames: Option<u64>,
    /// Frame rate override for timestamp conversion.
    pub(crate) fps_override: Option<f64>,
    /// CSV score log destination. `None` disables the log.
    pub(crate) score_log: Option<PathBuf>,
    /// Directory for debug PNGs. `None` disables them.
    pub(crate) debug_images: Option<PathBuf>,
    /// Score observer. Defaults to a no-op.
    pub(crate) observer: Arc<dyn ScoreCallback>,
    /// Cancellation token. `None` means never cancelled.
    pub(crate) cancellation: Option<CancellationToken>,
}

impl Debug for SearchOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SearchOptions")
            .field("rule", &self.rule)
            .field("lag_correction", &self.lag_correction)
            .field("batch_size", &self.batch_size)
            .field("workers", &self.workers)
            .field("queue_capacity", &self.queue_capacity)
            .field("poll_timeout", &self.poll_timeout)
            .field("dispatch_timeout", &self.dispatch_timeout)
            .field("batch_deadline", &self.batch_deadline)
            .field("max_frames", &self.max_frames)
            .field("fps_override", &self.fps_override)
            .field("score_log", &self.score_log)
            .field("debug_images", &self.debug_images)
            .field("has_observer", &true)
            .field("has_cancellation", &self.cancellation.is_some())
            .finish()
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchOptions {
    /// Create a new configuration with default settings.
    ///
    /// Defaults: end-of-segment rule, lag correction 1, batch size 1000,
    /// one worker per available core, queue capacity 64, 1s poll timeout,
    /// 2s dispatch timeout, no batch deadline, no frame cap, no file
    /// output, no observer, no cancellation.
    pub fn new() -> Self {
        Self {
            rule: BoundaryRule::segment_end(),
            lag_correction: DEFAULT_LAG_CORRECTION,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: default_worker_count(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            batch_deadline: None,
            max_frames: None,
            fps_override: None,
            score_log: None,
            debug_images: None,
            observer: Arc::new(NoOpScores),
            cancellation: None,
        }
    }

    /// Select the active detection rule.
    ///
    /// Exactly one rule runs per search; see [`BoundaryRule`] for the two
    /// modes and their thresholds.
    #[must_use]
    pub fn with_rule(mut self, rule: BoundaryRule) -> Self {
        self.rule = rule;
        self
    }

    /// Set the lag correction subtracted from the triggering frame index
    /// when reporting a boundary. Clamped to 0..=[`MAX_LAG_CORRECTION`].
    #[must_use]
    pub fn with_lag_correction(mut self, lag: u32) -> Self {
        self.lag_correction = lag.min(MAX_LAG_CORRECTION);
        self
    }

    /// Set how many frames are dispatched per batch.
    ///
    /// Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the scoring worker count.
    ///
    /// Clamped to a minimum of 1; a single worker degenerates to a
    /// sequential scan.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the bounded work queue capacity. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the worker dequeue timeout.
    ///
    /// Workers that time out re-check the shutdown flag before polling
    /// again, so this bounds shutdown latency.
    #[must_use]
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set the dispatcher enqueue timeout.
    ///
    /// Expiry is treated as a producer stall: the batch is aborted with
    /// whatever was already dispatched, not retried.
    #[must_use]
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    /// Set a wall-clock deadline per batch.
    ///
    /// On expiry the dispatcher stops pulling frames and the batch proceeds
    /// with the indices filled so far.
    #[must_use]
    pub fn with_batch_deadline(mut self, deadline: Duration) -> Self {
        self.batch_deadline = Some(deadline);
        self
    }

    /// Cap the total number of frames scanned across all batches.
    ///
    /// Reaching the cap without a boundary terminates the search as
    /// not-found.
    #[must_use]
    pub fn with_max_frames(mut self, max: u64) -> Self {
        self.max_frames = Some(max);
        self
    }

    /// Override the frame rate used for index→timestamp conversion.
    ///
    /// Non-finite or non-positive values are ignored.
    #[must_use]
    pub fn with_fps(mut self, fps: f64) -> Self {
        if fps.is_finite() && fps > 0.0 {
            self.fps_override = Some(fps);
        }
        self
    }

    /// Write an `index,score` CSV to the given path.
    ///
    /// The file is truncated at the start of the run and appended to across
    /// batches, covering every scored frame in order.
    #[must_use]
    pub fn with_score_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.score_log = Some(path.into());
        self
    }

    /// Write debug PNGs (the grayscale reference and the boundary trigger
    /// frame) into the given directory.
    #[must_use]
    pub fn with_debug_images(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_images = Some(dir.into());
        self
    }

    /// Attach a score observer.
    ///
    /// The observer receives every score in global frame order, batch by
    /// batch.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ScoreCallback>) -> Self {
        self.observer = observer;
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled the dispatch loop stops and
    /// [`BoundarySearch::run`](crate::BoundarySearch::run) returns
    /// [`StillscanError::Cancelled`](crate::StillscanError::Cancelled).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns `true` if cancellation has been requested.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let options = SearchOptions::new();
        assert_eq!(options.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(options.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(options.lag_correction, DEFAULT_LAG_CORRECTION);
        assert!(options.workers >= 1);
        assert!(options.batch_deadline.is_none());
        assert!(options.score_log.is_none());
        assert!(!options.is_cancelled());
    }

    #[test]
    fn builders_clamp_to_minimums() {
        let options = SearchOptions::new()
            .with_batch_size(0)
            .with_workers(0)
            .with_queue_capacity(0);
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.workers, 1);
        assert_eq!(options.queue_capacity, 1);
    }

    #[test]
    fn lag_correction_clamps_to_maximum() {
        let options = SearchOptions::new().with_lag_correction(9);
        assert_eq!(options.lag_correction, MAX_LAG_CORRECTION);
    }

    #[test]
    fn invalid_fps_is_ignored() {
        let options = SearchOptions::new().with_fps(0.0).with_fps(f64::NAN);
        assert!(options.fps_override.is_none());

        let options = SearchOptions::new().with_fps(25.0);
        assert_eq!(options.fps_override, Some(25.0));
    }

    #[test]
    fn cancellation_is_observed_through_options() {
        let token = CancellationToken::new();
        let options = SearchOptions::new().with_cancellation(token.clone());
        assert!(!options.is_cancelled());
        token.cancel();
        assert!(options.is_cancelled());
    }
}
