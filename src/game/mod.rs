//! The arithmetic game: estimate a count, take a cube tap as the
//! operator, estimate again, speak the equation.

pub mod estimator;

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::hand::count::count_fingers;
use crate::hand::oracle::HandOracle;
use crate::robot::{Animation, CubeId, Rgb, Robot, MAX_HEAD_ANGLE};
use crate::session::Session;
use self::estimator::{CountEstimator, Observation};

/// Head pitch while watching for fingers, degrees.
pub const GAME_HEAD_ANGLE: f32 = MAX_HEAD_ANGLE / 4.0;

/// Blink cycles played to acknowledge a tap.
const BLINK_CYCLES: u32 = 4;

// ── Config ─────────────────────────────────────────────────

/// Tunables for one game round.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Consecutive no-hand samples before the idle nudge.
    pub idle_streak: u32,
    /// Frame poll interval for the estimation loop (ms).
    pub poll_ms: u64,
    /// Pause after announcing a candidate, giving the player time to
    /// adjust (ms).
    pub announce_pause_ms: u64,
    /// Delay between blink phases of the tap acknowledgment (ms).
    pub blink_step_ms: u64,
    /// Shutdown-check interval while waiting for a tap (ms).
    pub tap_poll_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            idle_streak: 100,
            poll_ms: 50,
            announce_pause_ms: 2000,
            blink_step_ms: 300,
            tap_poll_ms: 100,
        }
    }
}

// ── Operators ──────────────────────────────────────────────

/// The arithmetic operator chosen by tapping a cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
}

impl MathOp {
    /// Fixed cube-to-operator mapping.
    pub fn for_cube(cube: CubeId) -> MathOp {
        match cube {
            CubeId::Cube1 => Self::Add,
            CubeId::Cube2 => Self::Sub,
            CubeId::Cube3 => Self::Mul,
        }
    }

    /// Spoken form.
    pub fn word(&self) -> &'static str {
        match self {
            Self::Add => "plus",
            Self::Sub => "minus",
            Self::Mul => "times",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
        }
    }

    /// Apply the operator.  Subtraction may go negative.
    pub fn apply(&self, a: i32, b: i32) -> i32 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
        }
    }
}

/// Arming colors: cube1 red, cube2 blue, cube3 green.
pub fn cube_color(cube: CubeId) -> Rgb {
    match cube {
        CubeId::Cube1 => Rgb::RED,
        CubeId::Cube2 => Rgb::BLUE,
        CubeId::Cube3 => Rgb::GREEN,
    }
}

// ── Round outcome ──────────────────────────────────────────

/// A finished round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    pub first: u8,
    pub op: MathOp,
    pub second: u8,
    pub result: i32,
}

impl RoundOutcome {
    pub fn new(first: u8, op: MathOp, second: u8) -> Self {
        let result = op.apply(i32::from(first), i32::from(second));
        Self {
            first,
            op,
            second,
            result,
        }
    }

    /// The equation as the robot speaks it.  Negative results are
    /// spoken as "minus n".
    pub fn spoken(&self) -> String {
        let result = if self.result < 0 {
            format!("minus {}", -self.result)
        } else {
            self.result.to_string()
        };
        format!(
            "{} {} {} equals {}",
            self.first,
            self.op.word(),
            self.second,
            result,
        )
    }
}

// ── Estimation driver ──────────────────────────────────────

/// Run the confirmation loop against live frames until a count is
/// confirmed.  Returns Ok(None) when shutdown is requested first;
/// device and oracle failures propagate.
pub fn estimate_count(
    session: &Session,
    oracle: &mut dyn HandOracle,
    config: &GameConfig,
) -> Result<Option<u8>> {
    let robot = session.robot();
    let mut estimator = CountEstimator::new(config.idle_streak);
    let poll = Duration::from_millis(config.poll_ms);
    let mut seen_seq = 0u64;

    loop {
        if session.is_shutdown() {
            return Ok(None);
        }
        let Some(frame) = session.frames().latest_after(seen_seq) else {
            thread::sleep(poll);
            continue;
        };
        seen_seq = frame.seq;

        let hands = oracle.detect(&frame).context("hand oracle failed")?;
        let sample = if hands.is_empty() {
            None
        } else {
            Some(count_fingers(&hands))
        };

        match estimator.observe(sample) {
            Observation::Candidate(count) => {
                robot.say(&count.to_string())?;
                session.sleep_interruptible(Duration::from_millis(config.announce_pause_ms));
            }
            Observation::Confirmed(count) => {
                info!(count, "finger count confirmed");
                robot.play_animation(Animation::Happy)?;
                return Ok(Some(count));
            }
            Observation::NoHand { idle: true } => {
                debug!("no hand for a while, nudging the player");
                robot.play_animation(Animation::Bored)?;
                robot.set_head_angle(GAME_HEAD_ANGLE)?;
            }
            Observation::NoHand { idle: false } => {
                robot.play_animation(Animation::Thinking)?;
            }
        }
    }
}

// ── Round flow ─────────────────────────────────────────────

/// Acknowledge a tap by blinking opposite cube corners, then restore
/// the solid color.
pub fn blink_cube(robot: &dyn Robot, cube: CubeId, color: Rgb, step: Duration) -> Result<()> {
    let off = Rgb::OFF;
    for _ in 0..BLINK_CYCLES {
        robot.set_cube_corners(cube, [color, off, color, off])?;
        thread::sleep(step);
        robot.set_cube_corners(cube, [off, color, off, color])?;
        thread::sleep(step);
    }
    robot.set_cube_light(cube, color)?;
    Ok(())
}

/// Play one full round.  Returns Ok(None) when shutdown interrupts any
/// wait point.
pub fn play_round(
    session: &Session,
    oracle: &mut dyn HandOracle,
    config: &GameConfig,
) -> Result<Option<RoundOutcome>> {
    let robot = session.robot();

    robot.set_head_angle(GAME_HEAD_ANGLE)?;
    for cube in CubeId::ALL {
        robot.set_cube_light(cube, cube_color(cube))?;
    }

    robot.say("show me your first number")?;
    let Some(first) = estimate_count(session, oracle, config)? else {
        return Ok(None);
    };

    robot.say("tap a cube to pick the operation")?;
    session.drain_taps();
    info!("waiting for a cube tap");
    let Some(tap) = session.wait_for_tap(Duration::from_millis(config.tap_poll_ms)) else {
        return Ok(None);
    };
    let op = MathOp::for_cube(tap.cube);
    info!(cube = tap.cube.as_str(), op = op.symbol(), "cube tapped");
    robot.say(op.word())?;
    blink_cube(
        robot,
        tap.cube,
        cube_color(tap.cube),
        Duration::from_millis(config.blink_step_ms),
    )?;

    robot.say("now the second number")?;
    let Some(second) = estimate_count(session, oracle, config)? else {
        return Ok(None);
    };

    let outcome = RoundOutcome::new(first, op, second);
    info!(equation = %outcome.spoken(), "round complete");
    robot.say(&outcome.spoken())?;
    Ok(Some(outcome))
}

// ── Tests ──────────────────────────────────────────────────
