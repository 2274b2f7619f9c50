//! Finger counting from hand landmarks.
//!
//! Classifies each finger as open or closed from landmark geometry and
//! sums open fingers across hands.  All functions are pure.

use super::{Hand, HandLandmark, Handedness};

// ── Palm orientation ───────────────────────────────────────

/// Which way the fingers point in image space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    /// Fingers point up (wrist below the middle finger base).
    Up,
    /// Fingers point down.
    Down,
}

/// Determine palm orientation from wrist vs middle-finger-base height.
/// Image y grows downward, so an upright hand has the wrist lower.
pub fn palm_facing(hand: &Hand) -> Facing {
    let wrist = hand.landmark(HandLandmark::Wrist);
    let middle_base = hand.landmark(HandLandmark::MiddleMcp);
    if wrist.y > middle_base.y {
        Facing::Up
    } else {
        Facing::Down
    }
}

// ── Per-finger status ──────────────────────────────────────

/// Open/closed state of each finger on one hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerStatus {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl FingerStatus {
    /// Number of open fingers (0-5).
    pub fn open_count(&self) -> u8 {
        [self.thumb, self.index, self.middle, self.ring, self.pinky]
            .iter()
            .filter(|open| **open)
            .count() as u8
    }
}

/// A non-thumb finger is open when its tip extends past its PIP joint
/// away from the palm, in whichever direction the hand is facing.
fn finger_open(hand: &Hand, tip: HandLandmark, pip: HandLandmark, facing: Facing) -> bool {
    let tip_y = hand.landmark(tip).y;
    let pip_y = hand.landmark(pip).y;
    match facing {
        Facing::Up => tip_y < pip_y,
        Facing::Down => tip_y > pip_y,
    }
}

/// The thumb is open when its tip lies horizontally outside its MCP
/// joint, mirrored between left and right hands.
fn thumb_open(hand: &Hand) -> bool {
    let tip = hand.landmark(HandLandmark::ThumbTip);
    let base = hand.landmark(HandLandmark::ThumbMcp);
    match hand.handedness {
        Handedness::Right => tip.x < base.x,
        Handedness::Left => tip.x > base.x,
    }
}

/// Classify all five fingers of one hand.
pub fn finger_status(hand: &Hand) -> FingerStatus {
    let facing = palm_facing(hand);
    FingerStatus {
        thumb: thumb_open(hand),
        index: finger_open(hand, HandLandmark::IndexTip, HandLandmark::IndexPip, facing),
        middle: finger_open(
            hand,
            HandLandmark::MiddleTip,
            HandLandmark::MiddlePip,
            facing,
        ),
        ring: finger_open(hand, HandLandmark::RingTip, HandLandmark::RingPip, facing),
        pinky: finger_open(hand, HandLandmark::PinkyTip, HandLandmark::PinkyPip, facing),
    }
}

/// Total open fingers across at most two hands (0-10).
pub fn count_fingers(hands: &[Hand]) -> u8 {
    hands
        .iter()
        .take(2)
        .map(|hand| finger_status(hand).open_count())
        .sum()
}

// ── Test helpers ───────────────────────────────────────────

/// Flip a hand upside down (mirror every landmark vertically).
#[cfg(test)]
fn flipped(hand: &Hand) -> Hand {
    let mut flipped = hand.clone();
    for lm in &mut flipped.landmarks {
        lm.y = 1.0 - lm.y;
    }
    flipped
}

// ── Tests ──────────────────────────────────────────────────
