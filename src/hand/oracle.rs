//! Vision oracle seam: where hand landmarks come from.
//!
//! `SubprocessOracle` drives an external landmark helper process over a
//! small stdin/stdout protocol (raw frames in, one JSON line out per
//! frame).  `ScriptedOracle` replays a fixed finger-count sequence for
//! the sim backend and tests.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{Hand, Handedness, Landmark, LANDMARK_COUNT};
use crate::frame::Frame;

/// Pixel channels sent to the helper (RGB).
const FRAME_CHANNELS: u32 = 3;

/// Default minimum detection confidence.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// Source of hand landmark detections.
///
/// An empty result means no hand in view; `Err` means the oracle itself
/// is broken (process died, protocol violation) and the caller should
/// unwind.
pub trait HandOracle: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Hand>>;
}

// ── Wire format ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireLandmark {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Deserialize)]
struct WireHand {
    handedness: String,
    score: f32,
    landmarks: Vec<WireLandmark>,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    #[serde(default)]
    hands: Vec<WireHand>,
    #[serde(default)]
    error: Option<String>,
}

/// Parse one reply line into hands, dropping entries the caller cannot
/// use.  An `error` field means "nothing detected", not a failure.
fn parse_detection(line: &str, min_confidence: f32) -> Result<Vec<Hand>> {
    let detection: WireDetection =
        serde_json::from_str(line.trim()).context("malformed oracle reply")?;

    if let Some(reason) = detection.error {
        debug!(reason, "oracle reported no detection");
        return Ok(Vec::new());
    }

    let mut hands = Vec::new();
    for wire in detection.hands {
        if wire.score < min_confidence {
            debug!(score = wire.score, "dropping low-confidence hand");
            continue;
        }
        if wire.landmarks.len() != LANDMARK_COUNT {
            warn!(
                count = wire.landmarks.len(),
                "hand with wrong landmark count, skipping"
            );
            continue;
        }
        let handedness = match wire.handedness.as_str() {
            "Left" | "left" => Handedness::Left,
            "Right" | "right" => Handedness::Right,
            other => {
                warn!(handedness = other, "unknown handedness label, skipping hand");
                continue;
            }
        };
        let mut landmarks = [Landmark { x: 0.0, y: 0.0, z: 0.0 }; LANDMARK_COUNT];
        for (slot, lm) in landmarks.iter_mut().zip(wire.landmarks.iter()) {
            *slot = Landmark {
                x: lm.x,
                y: lm.y,
                z: lm.z,
            };
        }
        hands.push(Hand {
            handedness,
            confidence: wire.score,
            landmarks,
        });
        if hands.len() == 2 {
            break;
        }
    }
    Ok(hands)
}

// ── Subprocess oracle ──────────────────────────────────────

/// Drives an external landmark helper: per frame, writes
/// `width, height, channels` as little-endian u32 followed by the raw
/// RGB bytes to the child's stdin, then reads one JSON line
/// `{"hands": [{"handedness", "score", "landmarks": [{x,y,z}; 21]}]}`
/// from its stdout.  The helper prints `READY` once its model is loaded.
pub struct SubprocessOracle {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    min_confidence: f32,
}

impl SubprocessOracle {
    /// Spawn the helper command (program plus whitespace-separated
    /// arguments) and wait for its READY handshake.
    pub fn spawn(command: &str, min_confidence: f32) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next().context("empty oracle command")?;
        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn hand oracle: {command}"))?;

        let stdin = child.stdin.take().context("oracle stdin unavailable")?;
        let stdout = child.stdout.take().context("oracle stdout unavailable")?;
        let mut stdout = BufReader::new(stdout);

        let mut line = String::new();
        stdout
            .read_line(&mut line)
            .context("reading oracle handshake")?;
        if !line.trim().eq_ignore_ascii_case("ready") {
            let _ = child.kill();
            bail!("unexpected oracle handshake: {line:?}");
        }
        info!(command, "hand oracle ready");

        Ok(Self {
            child,
            stdin,
            stdout,
            min_confidence,
        })
    }
}

impl HandOracle for SubprocessOracle {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Hand>> {
        self.stdin.write_all(&frame.width.to_le_bytes())?;
        self.stdin.write_all(&frame.height.to_le_bytes())?;
        self.stdin.write_all(&FRAME_CHANNELS.to_le_bytes())?;
        self.stdin
            .write_all(&frame.pixels)
            .context("writing frame to oracle")?;
        self.stdin.flush()?;

        let mut line = String::new();
        let n = self
            .stdout
            .read_line(&mut line)
            .context("reading oracle reply")?;
        if n == 0 {
            bail!("hand oracle closed its stdout");
        }
        parse_detection(&line, self.min_confidence)
    }
}

impl Drop for SubprocessOracle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

// ── Scripted oracle ────────────────────────────────────────

/// Replays a fixed sequence of finger counts, one entry per frame,
/// cycling when exhausted.  `None` entries mean no hand in view.
pub struct ScriptedOracle {
    script: Vec<Option<u8>>,
    position: usize,
}

impl ScriptedOracle {
    pub fn new(script: Vec<Option<u8>>) -> Self {
        Self {
            script,
            position: 0,
        }
    }

    /// Parse a script string like `"3,none,3,5,5"`.
    pub fn parse_script(text: &str) -> Result<Vec<Option<u8>>> {
        let mut script = Vec::new();
        for part in text.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if part.eq_ignore_ascii_case("none") {
                script.push(None);
                continue;
            }
            let count: u8 = part
                .parse()
                .with_context(|| format!("bad script entry {part:?}"))?;
            if count > 10 {
                bail!("script entry {count} out of range (0-10)");
            }
            script.push(Some(count));
        }
        if script.is_empty() {
            bail!("empty finger script");
        }
        Ok(script)
    }
}

impl HandOracle for ScriptedOracle {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Hand>> {
        let entry = self.script[self.position % self.script.len()];
        self.position += 1;
        Ok(match entry {
            Some(total) => hands_showing(total),
            None => Vec::new(),
        })
    }
}

/// Synthetic hands that read back as `total` fingers: one right hand
/// for 0-5, a right plus a left for 6-10.
pub fn hands_showing(total: u8) -> Vec<Hand> {
    let total = total.min(10);
    if total <= 5 {
        vec![Hand::showing(total, Handedness::Right)]
    } else {
        vec![
            Hand::showing(5, Handedness::Right),
            Hand::showing(total - 5, Handedness::Left),
        ]
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::count::count_fingers;

    fn test_frame() -> Frame {
        Frame {
            seq: 1,
            width: 2,
            height: 2,
            pixels: vec![0; 12],
        }
    }

    fn wire_hand(handedness: &str, score: f32) -> serde_json::Value {
        let landmarks: Vec<serde_json::Value> = (0..LANDMARK_COUNT)
            .map(|i| {
                serde_json::json!({
                    "x": i as f32 * 0.01,
                    "y": 0.5,
                    "z": 0.0,
                })
            })
            .collect();
        serde_json::json!({
            "handedness": handedness,
            "score": score,
            "landmarks": landmarks,
        })
    }

    #[test]
    fn test_parse_two_hands() {
        let line = serde_json::json!({
            "hands": [wire_hand("Right", 0.9), wire_hand("Left", 0.8)],
        })
        .to_string();
        let hands = parse_detection(&line, 0.5).unwrap();
        assert_eq!(hands.len(), 2);
        assert_eq!(hands[0].handedness, Handedness::Right);
        assert_eq!(hands[1].handedness, Handedness::Left);
        assert_eq!(hands[0].landmarks.len(), LANDMARK_COUNT);
    }

    #[test]
    fn test_parse_error_field_means_no_hand() {
        let line = r#"{"hands": [], "error": "no hand detected"}"#;
        let hands = parse_detection(line, 0.5).unwrap();
        assert!(hands.is_empty());
    }

    #[test]
    fn test_parse_filters_low_confidence() {
        let line = serde_json::json!({
            "hands": [wire_hand("Right", 0.2), wire_hand("Left", 0.9)],
        })
        .to_string();
        let hands = parse_detection(&line, 0.5).unwrap();
        assert_eq!(hands.len(), 1);
        assert_eq!(hands[0].handedness, Handedness::Left);
    }

    #[test]
    fn test_parse_skips_wrong_landmark_count() {
        let mut bad = wire_hand("Right", 0.9);
        bad["landmarks"] = serde_json::json!([{"x": 0.0, "y": 0.0, "z": 0.0}]);
        let line = serde_json::json!({ "hands": [bad] }).to_string();
        let hands = parse_detection(&line, 0.5).unwrap();
        assert!(hands.is_empty());
    }

    #[test]
    fn test_parse_skips_unknown_handedness() {
        let line = serde_json::json!({ "hands": [wire_hand("Both", 0.9)] }).to_string();
        let hands = parse_detection(&line, 0.5).unwrap();
        assert!(hands.is_empty());
    }

    #[test]
    fn test_parse_caps_at_two_hands() {
        let line = serde_json::json!({
            "hands": [
                wire_hand("Right", 0.9),
                wire_hand("Left", 0.9),
                wire_hand("Right", 0.9),
            ],
        })
        .to_string();
        let hands = parse_detection(&line, 0.5).unwrap();
        assert_eq!(hands.len(), 2);
    }

    #[test]
    fn test_parse_malformed_reply() {
        assert!(parse_detection("not json", 0.5).is_err());
    }

    #[test]
    fn test_parse_script() {
        let script = ScriptedOracle::parse_script("3, none ,5").unwrap();
        assert_eq!(script, vec![Some(3), None, Some(5)]);
    }

    #[test]
    fn test_parse_script_rejects_garbage() {
        assert!(ScriptedOracle::parse_script("3,banana").is_err());
        assert!(ScriptedOracle::parse_script("11").is_err());
        assert!(ScriptedOracle::parse_script("").is_err());
    }

    #[test]
    fn test_scripted_oracle_cycles() {
        let mut oracle = ScriptedOracle::new(vec![Some(2), None]);
        let frame = test_frame();
        assert_eq!(count_fingers(&oracle.detect(&frame).unwrap()), 2);
        assert!(oracle.detect(&frame).unwrap().is_empty());
        assert_eq!(count_fingers(&oracle.detect(&frame).unwrap()), 2);
    }

    #[test]
    fn test_hands_showing_totals() {
        for total in 0..=10u8 {
            let hands = hands_showing(total);
            assert_eq!(
                count_fingers(&hands),
                total,
                "hands_showing({total}) should count back as {total}",
            );
        }
    }
}
