//! Hand landmark data structures.
//!
//! Models the 21 landmarks per hand produced by the external landmark
//! helper, in normalized image coordinates (x right, y down, both 0.0-1.0).

pub mod count;
pub mod oracle;

// ── Landmark definitions ───────────────────────────────────

/// The 21 hand landmarks, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandLandmark {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Total number of landmarks per hand.
pub const LANDMARK_COUNT: usize = 21;

impl HandLandmark {
    /// Convert landmark enum to array index (0-20).
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// String representation for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrist => "wrist",
            Self::ThumbCmc => "thumb-cmc",
            Self::ThumbMcp => "thumb-mcp",
            Self::ThumbIp => "thumb-ip",
            Self::ThumbTip => "thumb-tip",
            Self::IndexMcp => "index-mcp",
            Self::IndexPip => "index-pip",
            Self::IndexDip => "index-dip",
            Self::IndexTip => "index-tip",
            Self::MiddleMcp => "middle-mcp",
            Self::MiddlePip => "middle-pip",
            Self::MiddleDip => "middle-dip",
            Self::MiddleTip => "middle-tip",
            Self::RingMcp => "ring-mcp",
            Self::RingPip => "ring-pip",
            Self::RingDip => "ring-dip",
            Self::RingTip => "ring-tip",
            Self::PinkyMcp => "pinky-mcp",
            Self::PinkyPip => "pinky-pip",
            Self::PinkyDip => "pinky-dip",
            Self::PinkyTip => "pinky-tip",
        }
    }

}

// ── Handedness ─────────────────────────────────────────────

/// Which hand, as labeled by the landmark model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

// ── Landmark and hand ──────────────────────────────────────

/// A single landmark in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One detected hand: label, confidence, and all 21 landmarks.
#[derive(Debug, Clone)]
pub struct Hand {
    pub handedness: Handedness,
    /// Detection confidence (0.0-1.0).
    pub confidence: f32,
    /// 21 landmarks indexed by `HandLandmark`.
    pub landmarks: [Landmark; LANDMARK_COUNT],
}

impl Hand {
    /// Landmark accessor by name.
    pub fn landmark(&self, which: HandLandmark) -> Landmark {
        self.landmarks[which.index()]
    }

    /// Build a synthetic upright hand showing `open_fingers` fingers
    /// (0-5).  Fingers open in index, middle, ring, pinky, thumb order.
    /// Used by the scripted oracle and tests; the geometry is chosen so
    /// the counting rules read back exactly the requested count.
    pub fn showing(open_fingers: u8, handedness: Handedness) -> Hand {
        let open = open_fingers.min(5);
        let mut landmarks = [Landmark { x: 0.0, y: 0.0, z: 0.0 }; LANDMARK_COUNT];

        {
            let mut set = |which: HandLandmark, x: f32, y: f32| {
                landmarks[which.index()] = Landmark { x, y, z: 0.0 };
            };

            // Right-hand geometry, palm toward the camera, fingers up.
            set(HandLandmark::Wrist, 0.50, 0.90);

            set(HandLandmark::ThumbCmc, 0.42, 0.82);
            set(HandLandmark::ThumbMcp, 0.38, 0.74);
            set(HandLandmark::ThumbIp, 0.36, 0.68);
            let thumb_open = open >= 5;
            set(
                HandLandmark::ThumbTip,
                if thumb_open { 0.26 } else { 0.46 },
                0.64,
            );

            let fingers = [
                (
                    HandLandmark::IndexMcp,
                    HandLandmark::IndexPip,
                    HandLandmark::IndexDip,
                    HandLandmark::IndexTip,
                    0.44,
                ),
                (
                    HandLandmark::MiddleMcp,
                    HandLandmark::MiddlePip,
                    HandLandmark::MiddleDip,
                    HandLandmark::MiddleTip,
                    0.50,
                ),
                (
                    HandLandmark::RingMcp,
                    HandLandmark::RingPip,
                    HandLandmark::RingDip,
                    HandLandmark::RingTip,
                    0.56,
                ),
                (
                    HandLandmark::PinkyMcp,
                    HandLandmark::PinkyPip,
                    HandLandmark::PinkyDip,
                    HandLandmark::PinkyTip,
                    0.62,
                ),
            ];
            for (i, (mcp, pip, dip, tip, x)) in fingers.into_iter().enumerate() {
                set(mcp, x, 0.60);
                set(pip, x, 0.48);
                set(dip, x, 0.40);
                let finger_open = (i as u8) < open.min(4);
                set(tip, x, if finger_open { 0.28 } else { 0.56 });
            }
        }

        // Left hands are the mirror image around the vertical axis.
        if handedness == Handedness::Left {
            for lm in &mut landmarks {
                lm.x = 1.0 - lm.x;
            }
        }

        Hand {
            handedness,
            confidence: 1.0,
            landmarks,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_indices() {
        assert_eq!(HandLandmark::Wrist.index(), 0);
        assert_eq!(HandLandmark::ThumbTip.index(), 4);
        assert_eq!(HandLandmark::IndexTip.index(), 8);
        assert_eq!(HandLandmark::MiddleMcp.index(), 9);
        assert_eq!(HandLandmark::PinkyTip.index(), LANDMARK_COUNT - 1);
    }

    #[test]
    fn test_landmark_as_str() {
        assert_eq!(HandLandmark::Wrist.as_str(), "wrist");
        assert_eq!(HandLandmark::ThumbMcp.as_str(), "thumb-mcp");
        assert_eq!(HandLandmark::PinkyTip.as_str(), "pinky-tip");
    }

    #[test]
    fn test_handedness_as_str() {
        assert_eq!(Handedness::Left.as_str(), "left");
        assert_eq!(Handedness::Right.as_str(), "right");
    }

    #[test]
    fn test_showing_is_upright() {
        let hand = Hand::showing(3, Handedness::Right);
        let wrist = hand.landmark(HandLandmark::Wrist);
        let middle_base = hand.landmark(HandLandmark::MiddleMcp);
        assert!(
            wrist.y > middle_base.y,
            "wrist should sit below the middle finger base, got {:?} vs {:?}",
            wrist,
            middle_base,
        );
    }

    #[test]
    fn test_showing_mirrors_left() {
        let right = Hand::showing(5, Handedness::Right);
        let left = Hand::showing(5, Handedness::Left);
        for (r, l) in right.landmarks.iter().zip(left.landmarks.iter()) {
            assert!((r.x - (1.0 - l.x)).abs() < 1e-6);
            assert_eq!(r.y, l.y);
        }
    }
}
