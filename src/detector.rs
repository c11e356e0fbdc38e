//! Boundary detection rules.
//!
//! A [`BoundaryRule`] is a pure predicate over the previous and current
//! similarity scores. The aggregator threads [`RunningState`] through
//! successive batches so the rule sees one continuous score stream even
//! though scoring happens in batch-sized windows.

/// Which transition a search is looking for, with its threshold.
///
/// Exactly one rule is active per run:
///
/// - [`SegmentEnd`](BoundaryRule::SegmentEnd) fits a reference taken from
///   *inside* the segment (e.g. the last frame of an intro): scores sit high
///   while the segment plays, then fall off a cliff at the cut. The rule
///   fires on the first score *after* the cliff.
/// - [`SegmentStart`](BoundaryRule::SegmentStart) fits a reference equal to
///   the segment's *first* frame: scores are low until the segment begins,
///   then jump above the threshold.
///
/// Both comparisons are strict, so a delta of exactly the configured drop
/// (or a score of exactly the configured threshold) does not fire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundaryRule {
    /// Fire when `current - previous < max_drop`.
    SegmentEnd {
        /// Score delta below which the rule fires. Negative.
        max_drop: f32,
    },
    /// Fire when `current > min_score`.
    SegmentStart {
        /// Score above which the rule fires.
        min_score: f32,
    },
}

impl BoundaryRule {
    /// Default drop threshold for the end rule.
    ///
    /// A fall of more than 0.4 between adjacent frames is far outside what
    /// compression artefacts or fades produce between similar shots; it
    /// only happens at a hard cut.
    pub const DEFAULT_END_DROP: f32 = -0.4;

    /// Default score threshold for the start rule.
    ///
    /// Scores above 0.8 against the reference are effectively "the same
    /// shot"; unrelated footage stays well below it.
    pub const DEFAULT_START_SCORE: f32 = 0.8;

    /// End-of-segment rule with the default drop threshold.
    pub fn segment_end() -> Self {
        BoundaryRule::SegmentEnd {
            max_drop: Self::DEFAULT_END_DROP,
        }
    }

    /// Start-of-segment rule with the default score threshold.
    pub fn segment_start() -> Self {
        BoundaryRule::SegmentStart {
            min_score: Self::DEFAULT_START_SCORE,
        }
    }

    /// Short mode label for console and JSON output.
    pub fn label(&self) -> &'static str {
        match self {
            BoundaryRule::SegmentEnd { .. } => "end",
            BoundaryRule::SegmentStart { .. } => "start",
        }
    }

    /// Evaluate the rule for one score transition.
    pub fn fires(&self, previous: f32, current: f32) -> bool {
        match *self {
            BoundaryRule::SegmentEnd { max_drop } => current - previous < max_drop,
            BoundaryRule::SegmentStart { min_score } => current > min_score,
        }
    }
}

/// Detection state carried across batches by the aggregator.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunningState {
    /// Last score seen by the detector. Starts at 0.0, so the end rule
    /// cannot fire on the very first frame of the stream.
    pub(crate) prev_score: f32,
    /// Global index of the first frame of the next batch.
    pub(crate) frame_offset: u64,
}

impl RunningState {
    pub(crate) fn new() -> Self {
        Self {
            prev_score: 0.0,
            frame_offset: 0,
        }
    }
}

/// A boundary located within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BoundaryHit {
    /// Reported frame index: trigger position minus the lag correction,
    /// saturating at zero.
    pub(crate) global_index: u64,
    /// Local index of the frame whose score fired the rule.
    pub(crate) trigger_local: usize,
}

/// Scan one batch's scores in index order.
///
/// `scores` must be the dispatched prefix of the batch buffer; unwritten
/// tail slots of a partial batch never reach the rule. On a hit the state
/// is left untouched (the run is over). Otherwise `prev_score` becomes the
/// last score of the batch and `frame_offset` advances by the number of
/// frames scanned.
pub(crate) fn scan_batch(
    state: &mut RunningState,
    rule: BoundaryRule,
    lag_correction: u32,
    scores: &[f32],
) -> Option<BoundaryHit> {
    let mut previous = state.prev_score;
    for (local, &current) in scores.iter().enumerate() {
        if rule.fires(previous, current) {
            let trigger_global = state.frame_offset + local as u64;
            return Some(BoundaryHit {
                global_index: trigger_global.saturating_sub(u64::from(lag_correction)),
                trigger_local: local,
            });
        }
        previous = current;
    }
    state.prev_score = previous;
    state.frame_offset += scores.len() as u64;
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_rule_fires_on_similarity_cliff() {
        let mut state = RunningState::new();
        let scores = [0.9, 0.88, 0.85, 0.3, 0.28];
        let hit = scan_batch(&mut state, BoundaryRule::segment_end(), 1, &scores).unwrap();
        // 0.85 -> 0.3 is a delta of -0.55; the trigger is index 3 and the
        // reported index is one frame earlier.
        assert_eq!(hit.trigger_local, 3);
        assert_eq!(hit.global_index, 2);
    }

    #[test]
    fn start_rule_fires_on_first_score_above_threshold() {
        let mut state = RunningState::new();
        let scores = [0.1, 0.2, 0.85, 0.9];
        let hit = scan_batch(&mut state, BoundaryRule::segment_start(), 1, &scores).unwrap();
        assert_eq!(hit.trigger_local, 2);
        assert_eq!(hit.global_index, 1);

        let mut state = RunningState::new();
        let hit = scan_batch(&mut state, BoundaryRule::segment_start(), 0, &scores).unwrap();
        assert_eq!(hit.global_index, 2);
    }

    #[test]
    fn strict_comparisons_do_not_fire_at_the_threshold() {
        let end = BoundaryRule::segment_end();
        assert!(!end.fires(0.8, 0.8 + BoundaryRule::DEFAULT_END_DROP));
        assert!(end.fires(0.8, 0.8 + BoundaryRule::DEFAULT_END_DROP - 0.001));

        let start = BoundaryRule::segment_start();
        assert!(!start.fires(0.0, BoundaryRule::DEFAULT_START_SCORE));
        assert!(start.fires(0.0, BoundaryRule::DEFAULT_START_SCORE + 0.001));
    }

    #[test]
    fn end_rule_cannot_fire_on_the_first_frame() {
        let mut state = RunningState::new();
        // prev starts at 0.0, so even a 0.0 opening score is not a drop.
        assert!(scan_batch(&mut state, BoundaryRule::segment_end(), 1, &[0.0, 0.1]).is_none());
    }

    #[test]
    fn state_carries_across_batch_seams() {
        let rule = BoundaryRule::segment_end();
        let mut state = RunningState::new();

        assert!(scan_batch(&mut state, rule, 1, &[0.9, 0.88]).is_none());
        assert_eq!(state.frame_offset, 2);
        assert!((state.prev_score - 0.88).abs() < 1e-6);

        // The cliff sits exactly on the seam: 0.88 at the end of batch one,
        // 0.3 at the start of batch two.
        let hit = scan_batch(&mut state, rule, 1, &[0.3, 0.28]).unwrap();
        assert_eq!(hit.trigger_local, 0);
        assert_eq!(hit.global_index, 1);
    }

    #[test]
    fn offset_advances_by_frames_scanned() {
        let rule = BoundaryRule::segment_end();
        let mut state = RunningState::new();
        for _ in 0..3 {
            assert!(scan_batch(&mut state, rule, 1, &[0.5; 4]).is_none());
        }
        assert_eq!(state.frame_offset, 12);

        // Partial batch: the offset advances by what was actually scanned.
        assert!(scan_batch(&mut state, rule, 1, &[0.5; 2]).is_none());
        assert_eq!(state.frame_offset, 14);
    }

    #[test]
    fn reported_index_combines_offset_and_lag() {
        let mut state = RunningState::new();
        state.frame_offset = 3 * 1000;
        let mut scores = vec![0.9; 500];
        scores.push(0.2);
        let hit = scan_batch(&mut state, BoundaryRule::segment_end(), 2, &scores).unwrap();
        assert_eq!(hit.trigger_local, 500);
        assert_eq!(hit.global_index, 3 * 1000 + 500 - 2);
    }

    #[test]
    fn lag_saturates_at_frame_zero() {
        let mut state = RunningState::new();
        let hit = scan_batch(&mut state, BoundaryRule::segment_start(), 2, &[0.95]).unwrap();
        assert_eq!(hit.global_index, 0);
    }

    #[test]
    fn empty_scan_leaves_state_untouched() {
        let mut state = RunningState::new();
        state.prev_score = 0.7;
        state.frame_offset = 42;
        assert!(scan_batch(&mut state, BoundaryRule::segment_end(), 1, &[]).is_none());
        assert!((state.prev_score - 0.7).abs() < 1e-6);
        assert_eq!(state.frame_offset, 42);
    }

    #[test]
    fn labels_match_modes() {
        assert_eq!(BoundaryRule::segment_end().label(), "end");
        assert_eq!(BoundaryRule::segment_start().label(), "start");
    }
}
