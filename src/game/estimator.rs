//! Confirmed finger-count estimation.
//!
//! A count is accepted once two consecutive samples agree.  Misses (no
//! hand in view) never disturb the pending candidate, but a long run of
//! them triggers a single idle nudge.  Pure state machine; the driver
//! loop lives in `game`.

use tracing::debug;

/// Sentinel for "no sample seen yet".  Outside the valid 0-10 range, so
/// the first real sample can never confirm on its own.
const NO_SAMPLE: i16 = -1;

/// What one observation step means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// A fresh candidate count, awaiting confirmation.
    Candidate(u8),
    /// The sample matched the pending candidate.
    Confirmed(u8),
    /// No hand in view.  `idle` is set exactly once per full streak.
    NoHand { idle: bool },
}

/// One estimation attempt.  Lives for the duration of a single
/// `estimate_count` call and is discarded afterward.
#[derive(Debug)]
pub struct CountEstimator {
    /// Last numeric sample, or `NO_SAMPLE` before the first one.
    previous: i16,
    /// Consecutive samples with no hand in view.
    no_hand_streak: u32,
    /// Streak length that triggers the idle nudge.
    idle_streak: u32,
}

impl CountEstimator {
    pub fn new(idle_streak: u32) -> Self {
        Self {
            previous: NO_SAMPLE,
            no_hand_streak: 0,
            idle_streak: idle_streak.max(1),
        }
    }

    /// Feed one sample (None = no hand detected this frame).
    pub fn observe(&mut self, sample: Option<u8>) -> Observation {
        match sample {
            Some(count) => {
                self.no_hand_streak = 0;
                if i16::from(count) == self.previous {
                    Observation::Confirmed(count)
                } else {
                    debug!(count, previous = self.previous, "new candidate count");
                    self.previous = i16::from(count);
                    Observation::Candidate(count)
                }
            }
            None => {
                self.no_hand_streak += 1;
                if self.no_hand_streak >= self.idle_streak {
                    self.no_hand_streak = 0;
                    Observation::NoHand { idle: true }
                } else {
                    Observation::NoHand { idle: false }
                }
            }
        }
    }

    /// Current no-hand streak length.
    pub fn no_hand_streak(&self) -> u32 {
        self.no_hand_streak
    }

    /// Pending candidate, if any sample has been seen.
    pub fn candidate(&self) -> Option<u8> {
        u8::try_from(self.previous).ok()
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Run a sample sequence, returning the confirmed count if any
    /// step confirmed, plus how many idle nudges fired.
    fn run(estimator: &mut CountEstimator, samples: &[Option<u8>]) -> (Option<u8>, u32) {
        let mut confirmed = None;
        let mut idle_count = 0;
        for &sample in samples {
            match estimator.observe(sample) {
                Observation::Confirmed(n) if confirmed.is_none() => confirmed = Some(n),
                Observation::NoHand { idle: true } => idle_count += 1,
                _ => {}
            }
        }
        (confirmed, idle_count)
    }

    #[test]
    fn test_single_sample_never_confirms() {
        let mut estimator = CountEstimator::new(100);
        assert_eq!(estimator.observe(Some(3)), Observation::Candidate(3));
        // Even a zero, which matches nothing the sentinel could be.
        let mut estimator = CountEstimator::new(100);
        assert_eq!(estimator.observe(Some(0)), Observation::Candidate(0));
    }

    #[test]
    fn test_two_equal_samples_confirm() {
        let mut estimator = CountEstimator::new(100);
        let (confirmed, _) = run(&mut estimator, &[Some(3), Some(3)]);
        assert_eq!(confirmed, Some(3));
    }

    #[test]
    fn test_candidate_replaced_then_confirmed() {
        let mut estimator = CountEstimator::new(100);
        let (confirmed, _) = run(&mut estimator, &[Some(2), Some(5), Some(5)]);
        assert_eq!(confirmed, Some(5));
    }

    #[test]
    fn test_candidate_survives_detection_gap() {
        let mut estimator = CountEstimator::new(100);
        let (confirmed, _) = run(&mut estimator, &[Some(4), None, Some(4)]);
        assert_eq!(confirmed, Some(4));
    }

    #[test]
    fn test_idle_fires_exactly_at_threshold() {
        let mut estimator = CountEstimator::new(100);
        for i in 1..=99 {
            assert_eq!(
                estimator.observe(None),
                Observation::NoHand { idle: false },
                "miss {i} should not nudge yet",
            );
        }
        assert_eq!(estimator.observe(None), Observation::NoHand { idle: true });
        assert_eq!(estimator.no_hand_streak(), 0, "streak resets after the nudge");
    }

    #[test]
    fn test_streak_restarts_after_idle() {
        let mut estimator = CountEstimator::new(100);
        let misses = vec![None; 250];
        let (_, idle_count) = run(&mut estimator, &misses);
        // 250 misses = two full streaks of 100 plus 50 leftover.
        assert_eq!(idle_count, 2);
        assert_eq!(estimator.no_hand_streak(), 50);
    }

    #[test]
    fn test_detection_resets_streak() {
        let mut estimator = CountEstimator::new(100);
        for _ in 0..60 {
            estimator.observe(None);
        }
        estimator.observe(Some(3));
        assert_eq!(estimator.no_hand_streak(), 0);

        // A fresh 99 misses must not nudge; the 100th consecutive does.
        let misses = vec![None; 99];
        let (_, idle_count) = run(&mut estimator, &misses);
        assert_eq!(idle_count, 0);
        assert_eq!(estimator.observe(None), Observation::NoHand { idle: true });
    }

    #[test]
    fn test_misses_keep_candidate() {
        let mut estimator = CountEstimator::new(100);
        estimator.observe(Some(7));
        for _ in 0..150 {
            estimator.observe(None);
        }
        assert_eq!(estimator.candidate(), Some(7));
        assert_eq!(estimator.observe(Some(7)), Observation::Confirmed(7));
    }

    #[test]
    fn test_custom_threshold() {
        let mut estimator = CountEstimator::new(3);
        assert_eq!(estimator.observe(None), Observation::NoHand { idle: false });
        assert_eq!(estimator.observe(None), Observation::NoHand { idle: false });
        assert_eq!(estimator.observe(None), Observation::NoHand { idle: true });
        assert_eq!(estimator.observe(None), Observation::NoHand { idle: false });
    }

    #[test]
    fn test_no_sample_yet() {
        let estimator = CountEstimator::new(100);
        assert_eq!(estimator.candidate(), None);
    }
}
