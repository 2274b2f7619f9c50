//! Replay rig — recorded camera frames through the real detector.
//!
//! Frames come from a directory of images played on a loop; detections
//! come from the hand detector subprocess.  Taps still come from the
//! injector (or the relay), and the robot is simulated.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::hand::oracle::{SubprocessOracle, DEFAULT_MIN_CONFIDENCE};
use crate::robot::sim::SimRobot;
use crate::session::Session;

use super::RunOptions;

/// Replay rate, roughly what the recorded camera delivered.
const FEED_INTERVAL: Duration = Duration::from_millis(100);

/// Run the game against recorded frames.
pub fn run(options: RunOptions) -> Result<()> {
    let Some(dir) = options.frames.clone() else {
        bail!("the replay backend needs --frames <dir>");
    };
    let paths = list_frames(&dir)?;
    info!(count = paths.len(), dir = %dir.display(), "replaying frames");

    let mut oracle = SubprocessOracle::spawn(&options.oracle_cmd, DEFAULT_MIN_CONFIDENCE)
        .context("starting the hand detector")?;

    let robot = Arc::new(SimRobot::new());
    let session = Session::new(robot);
    info!("replay backend initialized");

    let watch = super::spawn_shutdown_watch(session.clone(), options.exit_after);
    let feed = spawn_frame_feed(session.clone(), paths);
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

    info!("replay backend shutting down");
    result
}

fn is_image(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("png") | Some("jpg") | Some("jpeg")
    )
}

/// Sorted image paths under the frame directory.
fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading frame directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_image(path))
        .collect();
    paths.sort();
    if paths.is_empty() {
        bail!("no .png or .jpg frames under {}", dir.display());
    }
    Ok(paths)
}

/// Cycle the recorded frames through the session store.  Frames that
/// fail to decode are skipped, not fatal.
fn spawn_frame_feed(session: Arc<Session>, paths: Vec<PathBuf>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut index = 0usize;
        while !session.is_shutdown() {
            let path = &paths[index % paths.len()];
            index += 1;
            match image::open(path) {
                Ok(decoded) => {
                    let rgb = decoded.to_rgb8();
                    let (width, height) = rgb.dimensions();
                    session.frames().publish(width, height, rgb.into_raw());
                }
                Err(e) => {
                    warn!(path = %path.display(), "frame decode failed: {}", e);
                }
            }
            thread::sleep(FEED_INTERVAL);
        }
    })
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tallybot-{}-{}", tag, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_list_frames_sorted_and_filtered() {
        let dir = scratch_dir("frames");
        for name in ["b.png", "a.jpg", "notes.txt", "c.JPEG"] {
            fs::write(dir.join(name), b"x").unwrap();
        }

        let paths = list_frames(&dir).unwrap();
        let names: Vec<_> = paths
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png", "c.JPEG"]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_list_frames_rejects_empty_dir() {
        let dir = scratch_dir("empty");
        fs::write(dir.join("notes.txt"), b"x").unwrap();

        assert!(list_frames(&dir).is_err());

        fs::remove_dir_all(&dir).unwrap();
    }
}
