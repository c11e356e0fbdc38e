//! The scoring worker pool.
//!
//! One pool is spawned per run and survives across batches. Workers pull
//! [`WorkItem`]s from a bounded channel, score each raster against the
//! shared reference, and write the result into the batch's [`ScoreBuffer`]
//! at the item's index. Index disjointness is the only safety requirement
//! on the buffer: the dispatcher issues each local index exactly once, and
//! the driver reads the buffer only after the batch's completion channel
//! has drained (see [`crate::pipeline`]).
//!
//! Shutdown is broadcast by closing the work channel; the poll timeout
//! exists so a worker parked on an empty queue still notices the stop flag.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use image::GrayImage;

use crate::error::StillscanError;
use crate::metric::SimilarityMetric;

/// Fixed-capacity score array for one batch.
///
/// Scores are stored as `f32` bit patterns in atomics so disjoint-index
/// writes from worker threads need no lock. Unwritten slots read as 0.0,
/// the maximally-dissimilar default.
pub(crate) struct ScoreBuffer {
    slots: Box<[AtomicU32]>,
}

impl ScoreBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || AtomicU32::new(0.0f32.to_bits()));
        Self {
            slots: slots.into_boxed_slice(),
        }
    }

    /// Store a score. `index` must be a local index issued by the
    /// dispatcher for this batch.
    pub(crate) fn record(&self, index: usize, score: f32) {
        self.slots[index].store(score.to_bits(), Ordering::Release);
    }

    /// Copy out the first `len` slots in index order.
    pub(crate) fn snapshot(&self, len: usize) -> Vec<f32> {
        self.slots[..len]
            .iter()
            .map(|slot| f32::from_bits(slot.load(Ordering::Acquire)))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// One frame's worth of scoring work.
///
/// Dropping the item releases its clone of the batch completion sender,
/// which is how a handled (or abandoned) item is accounted for by the
/// driver's barrier drain.
pub(crate) struct WorkItem {
    /// Local index within the batch; unique per batch.
    pub(crate) index: usize,
    /// Grayscale raster, already conformed to the reference dimensions.
    pub(crate) raster: GrayImage,
    /// The batch's shared score buffer.
    pub(crate) scores: Arc<ScoreBuffer>,
    /// Batch completion channel; one unit is sent per handled item.
    pub(crate) done: Sender<()>,
}

/// A fixed set of long-lived scoring threads.
pub(crate) struct ScoringPool {
    work_tx: Sender<WorkItem>,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl ScoringPool {
    /// Spawn `workers` named scoring threads sharing one bounded work
    /// channel of `queue_capacity` items.
    pub(crate) fn spawn(
        workers: usize,
        queue_capacity: usize,
        poll_timeout: Duration,
        reference: Arc<GrayImage>,
        metric: Arc<dyn SimilarityMetric>,
    ) -> Result<Self, StillscanError> {
        let (work_tx, work_rx) = crossbeam_channel::bounded::<WorkItem>(queue_capacity);
        let stop = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let work_rx = work_rx.clone();
            let stop = Arc::clone(&stop);
            let reference = Arc::clone(&reference);
            let metric = Arc::clone(&metric);
            let handle = std::thread::Builder::new()
                .name(format!("stillscan-score-{worker_id}"))
                .spawn(move || {
                    worker_loop(worker_id, &work_rx, &stop, poll_timeout, &reference, &*metric);
                })?;
            handles.push(handle);
        }

        Ok(Self {
            work_tx,
            stop,
            workers: handles,
        })
    }

    /// Clone the work channel sender for a dispatcher.
    pub(crate) fn sender(&self) -> Sender<WorkItem> {
        self.work_tx.clone()
    }

    /// Stop and join every worker.
    ///
    /// Sets the stop flag and closes the work channel, so each worker wakes
    /// exactly once more at the latest after one poll timeout. Any queued
    /// items are still drained and handled before the channel disconnects.
    pub(crate) fn shutdown(self) {
        self.stop.store(true, Ordering::Release);
        drop(self.work_tx);
        for handle in self.workers {
            if handle.join().is_err() {
                log::warn!("scoring worker panicked before shutdown");
            }
        }
    }
}

fn worker_loop(
    worker_id: usize,
    work_rx: &Receiver<WorkItem>,
    stop: &AtomicBool,
    poll_timeout: Duration,
    reference: &GrayImage,
    metric: &dyn SimilarityMetric,
) {
    loop {
        match work_rx.recv_timeout(poll_timeout) {
            Ok(item) => {
                match metric.score(reference, &item.raster) {
                    Ok(score) => item.scores.record(item.index, score),
                    Err(error) => {
                        // The slot keeps its default 0.0; the run goes on.
                        log::warn!(
                            "worker {worker_id}: scoring frame {} failed ({error}), keeping default score",
                            item.index
                        );
                    }
                }
                let _ = item.done.send(());
            }
            Err(RecvTimeoutError::Timeout) => {
                if stop.load(Ordering::Acquire) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::debug!("scoring worker {worker_id} exiting");
}
