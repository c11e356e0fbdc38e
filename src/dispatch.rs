//! The batch dispatcher.
//!
//! One batch at a time, the dispatcher pulls frames off the sequential
//! [`FrameSource`](crate::FrameSource) and enqueues them for the scoring
//! pool, tagged with their local index. It is the single producer in the
//! pipeline: decode order is preserved because nothing else touches the
//! source cursor.
//!
//! The dispatcher never blocks the run forever. Enqueueing uses a bounded
//! `send_timeout` (expiry aborts the batch), an optional wall-clock deadline
//! caps the whole batch, and cancellation is checked before every frame.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{SendTimeoutError, Sender};
use image::GrayImage;

use crate::config::SearchOptions;
use crate::error::StillscanError;
use crate::pool::{ScoreBuffer, WorkItem};
use crate::source::FrameSource;

/// What a single batch's dispatch loop produced.
#[derive(Default)]
pub(crate) struct DispatchOutcome {
    /// Number of frames actually enqueued; local indices [0, dispatched)
    /// are the only slots a worker may write this batch.
    pub(crate) dispatched: usize,
    /// The source reported end-of-stream inside this batch.
    pub(crate) exhausted: bool,
    /// The batch was cut short by a queue timeout or the batch deadline.
    /// The frames dispatched so far still get scored and aggregated.
    pub(crate) stalled: bool,
    /// A fatal condition (decode error, cancellation, dead pool). The
    /// driver still waits out the barrier before surfacing it.
    pub(crate) failure: Option<StillscanError>,
}

/// Dispatch up to `batch_limit` frames into the work channel.
///
/// `done_tx` is the batch's completion channel; every enqueued item carries
/// a clone, and the caller drains the receiver to disconnect to wait for
/// the batch (the barrier). `retained` collects a copy of each dispatched
/// raster when debug images are enabled; it holds only frames that were
/// actually enqueued.
pub(crate) fn dispatch_batch(
    source: &mut dyn FrameSource,
    work_tx: &Sender<WorkItem>,
    scores: &Arc<ScoreBuffer>,
    done_tx: &Sender<()>,
    options: &SearchOptions,
    batch_limit: usize,
    mut retained: Option<&mut Vec<GrayImage>>,
) -> DispatchOutcome {
    let deadline = options.batch_deadline.map(|budget| Instant::now() + budget);
    let mut outcome = DispatchOutcome::default();

    for index in 0..batch_limit {
        if options.is_cancelled() {
            outcome.failure = Some(StillscanError::Cancelled);
            break;
        }
        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            log::warn!(
                "batch deadline expired after {} dispatched frames, proceeding with partial batch",
                outcome.dispatched
            );
            outcome.stalled = true;
            break;
        }

        let raster = match source.next_frame() {
            Ok(Some(raster)) => raster,
            Ok(None) => {
                outcome.exhausted = true;
                break;
            }
            Err(error) => {
                outcome.failure = Some(error);
                break;
            }
        };

        let debug_copy = if retained.is_some() {
            Some(raster.clone())
        } else {
            None
        };
        let item = WorkItem {
            index,
            raster,
            scores: Arc::clone(scores),
            done: done_tx.clone(),
        };
        match work_tx.send_timeout(item, options.dispatch_timeout) {
            Ok(()) => {
                outcome.dispatched += 1;
                if let Some(retained) = retained.as_mut()
                    && let Some(copy) = debug_copy
                {
                    retained.push(copy);
                }
            }
            Err(SendTimeoutError::Timeout(_)) => {
                log::error!(
                    "work queue still full after {:?}, aborting batch at {} dispatched frames",
                    options.dispatch_timeout,
                    outcome.dispatched
                );
                outcome.stalled = true;
                break;
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                outcome.failure = Some(StillscanError::PoolTerminated);
                break;
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ScoreBuffer;
    use crate::progress::CancellationToken;
    use crate::source::SyntheticSource;
    use std::time::Duration;

    struct BrokenSource {
        yielded: bool,
    }

    impl FrameSource for BrokenSource {
        fn next_frame(&mut self) -> Result<Option<GrayImage>, StillscanError> {
            if self.yielded {
                Err(StillscanError::DecodeError("corrupt packet".into()))
            } else {
                self.yielded = true;
                Ok(Some(flat(1)))
            }
        }

        fn frames_per_second(&self) -> f64 {
            24.0
        }
    }

    fn flat(luma: u8) -> GrayImage {
        GrayImage::from_pixel(4, 4, image::Luma([luma]))
    }

    fn frames(count: usize) -> Vec<GrayImage> {
        (0..count).map(|i| flat(i as u8)).collect()
    }

    fn harness(capacity: usize) -> (
        crossbeam_channel::Sender<WorkItem>,
        crossbeam_channel::Receiver<WorkItem>,
        Arc<ScoreBuffer>,
        crossbeam_channel::Sender<()>,
    ) {
        let (work_tx, work_rx) = crossbeam_channel::bounded(capacity);
        let (done_tx, _done_rx) = crossbeam_channel::bounded(capacity);
        (work_tx, work_rx, Arc::new(ScoreBuffer::new(capacity)), done_tx)
    }

    #[test]
    fn dispatches_full_batch_with_sequential_indices() {
        let (work_tx, work_rx, buffer, done_tx) = harness(8);
        let mut source = SyntheticSource::new(frames(5), 24.0);
        let options = SearchOptions::new();

        let outcome =
            dispatch_batch(&mut source, &work_tx, &buffer, &done_tx, &options, 5, None);
        assert_eq!(outcome.dispatched, 5);
        assert!(!outcome.exhausted);
        assert!(!outcome.stalled);
        assert!(outcome.failure.is_none());

        let indices: Vec<usize> = work_rx.try_iter().map(|item| item.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn short_source_marks_exhaustion() {
        let (work_tx, _work_rx, buffer, done_tx) = harness(8);
        let mut source = SyntheticSource::new(frames(3), 24.0);
        let options = SearchOptions::new();

        let outcome =
            dispatch_batch(&mut source, &work_tx, &buffer, &done_tx, &options, 8, None);
        assert_eq!(outcome.dispatched, 3);
        assert!(outcome.exhausted);
        assert!(outcome.failure.is_none());
    }

    #[test]
    fn full_queue_without_consumers_stalls_the_batch() {
        let (work_tx, _work_rx, buffer, done_tx) = harness(1);
        let mut source = SyntheticSource::new(frames(4), 24.0);
        let options = SearchOptions::new().with_dispatch_timeout(Duration::from_millis(10));

        let outcome =
            dispatch_batch(&mut source, &work_tx, &buffer, &done_tx, &options, 4, None);
        assert_eq!(outcome.dispatched, 1);
        assert!(outcome.stalled);
        assert!(outcome.failure.is_none());
    }

    #[test]
    fn expired_deadline_stops_before_any_frame() {
        let (work_tx, _work_rx, buffer, done_tx) = harness(8);
        let mut source = SyntheticSource::new(frames(4), 24.0);
        let options = SearchOptions::new().with_batch_deadline(Duration::ZERO);

        let outcome =
            dispatch_batch(&mut source, &work_tx, &buffer, &done_tx, &options, 4, None);
        assert_eq!(outcome.dispatched, 0);
        assert!(outcome.stalled);
    }

    #[test]
    fn cancellation_is_fatal_for_the_run() {
        let (work_tx, _work_rx, buffer, done_tx) = harness(8);
        let mut source = SyntheticSource::new(frames(4), 24.0);
        let token = CancellationToken::new();
        token.cancel();
        let options = SearchOptions::new().with_cancellation(token);

        let outcome =
            dispatch_batch(&mut source, &work_tx, &buffer, &done_tx, &options, 4, None);
        assert_eq!(outcome.dispatched, 0);
        assert!(matches!(outcome.failure, Some(StillscanError::Cancelled)));
    }

    #[test]
    fn decode_error_is_fatal_after_partial_dispatch() {
        let (work_tx, _work_rx, buffer, done_tx) = harness(8);
        let mut source = BrokenSource { yielded: false };
        let options = SearchOptions::new();

        let outcome =
            dispatch_batch(&mut source, &work_tx, &buffer, &done_tx, &options, 4, None);
        assert_eq!(outcome.dispatched, 1);
        assert!(matches!(
            outcome.failure,
            Some(StillscanError::DecodeError(_))
        ));
    }

    #[test]
    fn dead_pool_surfaces_as_failure() {
        let (work_tx, work_rx, buffer, done_tx) = harness(2);
        drop(work_rx);
        let mut source = SyntheticSource::new(frames(2), 24.0);
        let options = SearchOptions::new();

        let outcome =
            dispatch_batch(&mut source, &work_tx, &buffer, &done_tx, &options, 2, None);
        assert!(matches!(
            outcome.failure,
            Some(StillscanError::PoolTerminated)
        ));
    }

    #[test]
    fn retained_copies_track_dispatched_frames_only() {
        let (work_tx, _work_rx, buffer, done_tx) = harness(1);
        let mut source = SyntheticSource::new(frames(4), 24.0);
        let options = SearchOptions::new().with_dispatch_timeout(Duration::from_millis(10));

        let mut retained = Vec::new();
        let outcome = dispatch_batch(
            &mut source,
            &work_tx,
            &buffer,
            &done_tx,
            &options,
            4,
            Some(&mut retained),
        );
        assert_eq!(outcome.dispatched, 1);
        assert_eq!(retained.len(), 1);
        assert_eq!(retained[0].get_pixel(0, 0).0, [0]);
    }
}
