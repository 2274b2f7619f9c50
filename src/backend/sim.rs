//! Simulated rig — scripted detections, synthetic camera, timed taps.
//!
//! Lets the whole game run on a dev box with no robot and no camera:
//! frames come from a generated test card, detections from a script,
//! and taps from a timer.  The relay serves the synthetic feed like
//! the real thing.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::frame::{placeholder_pixels, PLACEHOLDER_HEIGHT, PLACEHOLDER_WIDTH};
use crate::hand::oracle::ScriptedOracle;
use crate::robot::sim::SimRobot;
use crate::session::Session;

use super::RunOptions;

/// Synthetic camera rate, roughly 10 fps.
const FEED_INTERVAL: Duration = Duration::from_millis(100);

/// Run the game against the simulated rig.
pub fn run(options: RunOptions) -> Result<()> {
    let script = ScriptedOracle::parse_script(&options.script)?;
    let mut oracle = ScriptedOracle::new(script);

    let robot = Arc::new(SimRobot::new());
    let session = Session::new(robot);
    info!("sim backend initialized");

    let watch = super::spawn_shutdown_watch(session.clone(), options.exit_after);
    let feed = spawn_synthetic_camera(session.clone());
    let relay = if options.no_relay {
        None
    } else {
        Some(super::spawn_relay(session.clone(), options.listen)?)
    };
    let tapper = options
        .tap
        .map(|cube| super::spawn_tap_injector(session.clone(), cube));

    let config = super::game_config(&options);
    let result = super::run_rounds(&session, &mut oracle, &config, options.rounds);

    session.request_shutdown();
    super::cleanup_device(session.robot());

    feed.join().ok();
    if let Some(handle) = tapper {
        handle.join().ok();
    }
    if let Some(handle) = relay {
        handle.join().ok();
    }
    watch.join().ok();

    info!("sim backend shutting down");
    result
}

/// Publish a gray test card with a slow-moving bright band, enough to
/// see motion in the relay stream.
fn spawn_synthetic_camera(session: Arc<Session>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut tick: u32 = 0;
        while !session.is_shutdown() {
            let mut pixels = placeholder_pixels(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT);
            let row = (tick % PLACEHOLDER_HEIGHT) as usize * PLACEHOLDER_WIDTH as usize * 3;
            for value in &mut pixels[row..row + PLACEHOLDER_WIDTH as usize * 3] {
                *value = 0xE0;
            }
            session
                .frames()
                .publish(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, pixels);
            tick = tick.wrapping_add(1);
            thread::sleep(FEED_INTERVAL);
        }
    })
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_synthetic_camera_publishes_frames() {
        let session = Session::new(Arc::new(SimRobot::new()));
        let feed = spawn_synthetic_camera(session.clone());

        let deadline = Instant::now() + Duration::from_secs(5);
        while session.frames().seq() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        let frame = session.frames().latest().expect("a frame is up");
        assert_eq!(frame.width, PLACEHOLDER_WIDTH);
        assert_eq!(frame.height, PLACEHOLDER_HEIGHT);
        assert!(
            frame.pixels.contains(&0xE0),
            "the moving band is in the card"
        );

        session.request_shutdown();
        feed.join().unwrap();
    }
}
