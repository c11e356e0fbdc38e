//! Score observation and cancellation support.
//!
//! This module provides [`ScoreCallback`] for observing per-frame similarity
//! scores as batches complete, and [`CancellationToken`] for cooperative
//! cancellation of a running search.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use stillscan::{ScoreCallback, SearchOptions};
//!
//! struct PrintScores;
//!
//! impl ScoreCallback for PrintScores {
//!     fn on_score(&self, frame_index: u64, score: f32) {
//!         println!("{frame_index},{score}");
//!     }
//! }
//!
//! let options = SearchOptions::new().with_observer(Arc::new(PrintScores));
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Trait for observing per-frame similarity scores.
///
/// Implementations must be [`Send`] and [`Sync`]; the pipeline invokes the
/// callback from its driving thread, but the options object holding it is
/// shared across threads.
///
/// Scores are delivered in global frame order, once per batch, after the
/// batch's workers have finished. Callbacks are **infallible** — they observe
/// but cannot halt the search. Use [`CancellationToken`] to stop a run.
pub trait ScoreCallback: Send + Sync {
    /// Called once per scored frame, in ascending `frame_index` order.
    fn on_score(&self, frame_index: u64, score: f32);
}

/// A no-op implementation that discards all score notifications.
///
/// This is the default when no observer is configured.
pub(crate) struct NoOpScores;

impl ScoreCallback for NoOpScores {
    fn on_score(&self, _frame_index: u64, _score: f32) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it between threads; call [`cancel`](CancellationToken::cancel)
/// from any thread to request cancellation of the associated search. The
/// dispatch loop checks [`is_cancelled`](CancellationToken::is_cancelled)
/// before each frame, so cancellation takes effect at the next frame
/// boundary, never mid-score.
///
/// # Example
///
/// ```
/// use stillscan::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// // From another thread (or a signal handler, etc.):
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token will observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
