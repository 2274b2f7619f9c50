//! Backend abstraction — simulated and replay robot rigs.
//!
//! Both rigs drive the same game loop and relay; they differ in where
//! frames and detections come from.  The shared plumbing lives here:
//! signal handling, the shutdown watch, the tap injector, and the
//! round runner.

pub mod replay;
pub mod sim;

use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::game::{self, GameConfig};
use crate::hand::oracle::HandOracle;
use crate::relay;
use crate::robot::{CubeId, Rgb, Robot, TapEvent};
use crate::session::Session;

/// Backend type selector.
#[derive(Debug, Clone, Copy)]
pub enum BackendType {
    Sim,
    Replay,
}

/// Options shared by every backend.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Relay listen address.
    pub listen: SocketAddr,
    /// Skip starting the relay.
    pub no_relay: bool,
    /// Directory of recorded frames (replay backend).
    pub frames: Option<PathBuf>,
    /// Command line for the detector subprocess (replay backend).
    pub oracle_cmd: String,
    /// Scripted detector results (sim backend).
    pub script: String,
    /// Cube the injector taps; None waits for the relay instead.
    pub tap: Option<CubeId>,
    /// Rounds to play before exiting.
    pub rounds: u32,
    /// Consecutive no-hand samples before the idle nudge.
    pub idle_streak: u32,
    /// Exit after N seconds (testing).
    pub exit_after: Option<u64>,
}

/// Run the game with the selected backend.
pub fn run(backend: BackendType, options: RunOptions) -> Result<()> {
    match backend {
        BackendType::Sim => sim::run(options),
        BackendType::Replay => replay::run(options),
    }
}

fn game_config(options: &RunOptions) -> GameConfig {
    GameConfig {
        idle_streak: options.idle_streak,
        ..GameConfig::default()
    }
}

// ── Shared plumbing ────────────────────────────────────────

/// Period between injected taps.
const TAP_INTERVAL: Duration = Duration::from_secs(3);

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Bridge the signal flag and the optional exit timer into the
/// session's shutdown flag.
fn spawn_shutdown_watch(session: Arc<Session>, exit_after: Option<u64>) -> JoinHandle<()> {
    install_signal_handlers();
    let start_time = Instant::now();
    let exit_duration = exit_after.map(Duration::from_secs);
    thread::spawn(move || loop {
        if session.is_shutdown() {
            break;
        }
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("shutdown signal received");
            session.request_shutdown();
            break;
        }
        if let Some(dur) = exit_duration {
            if start_time.elapsed() >= dur {
                info!("exit timer fired after {}s", dur.as_secs());
                session.request_shutdown();
                break;
            }
        }
        thread::sleep(Duration::from_millis(50));
    })
}

/// Tap the same cube on a timer, standing in for a player.
fn spawn_tap_injector(session: Arc<Session>, cube: CubeId) -> JoinHandle<()> {
    let tx = session.tap_sender();
    thread::spawn(move || {
        while !session.is_shutdown() {
            session.sleep_interruptible(TAP_INTERVAL);
            if session.is_shutdown() {
                break;
            }
            debug!(cube = cube.as_str(), "injecting a tap");
            if tx.send(TapEvent { cube }).is_err() {
                break;
            }
        }
    })
}

/// Start the relay on its own thread.  The listener is bound here so
/// a bad address fails the run before any round starts.
fn spawn_relay(session: Arc<Session>, listen: SocketAddr) -> Result<JoinHandle<()>> {
    let listener = TcpListener::bind(listen)
        .with_context(|| format!("binding relay listener on {}", listen))?;
    info!(%listen, "relay listening");
    let handle = thread::spawn(move || {
        if let Err(e) = relay::run(session.clone(), listener) {
            warn!("relay stopped early: {:#}", e);
            session.request_shutdown();
        }
    });
    Ok(handle)
}

/// Play rounds until the count runs out or shutdown interrupts.
fn run_rounds(
    session: &Session,
    oracle: &mut dyn HandOracle,
    config: &GameConfig,
    rounds: u32,
) -> Result<()> {
    for round in 1..=rounds {
        info!(round, rounds, "starting round");
        match game::play_round(session, oracle, config).context("round failed")? {
            Some(outcome) => {
                info!(round, result = outcome.result, "round done");
            }
            None => {
                info!(round, "round interrupted by shutdown");
                break;
            }
        }
    }
    Ok(())
}

/// Best-effort device reset on the way out.
fn cleanup_device(robot: &dyn Robot) {
    for cube in CubeId::ALL {
        if let Err(e) = robot.set_cube_light(cube, Rgb::OFF) {
            debug!("cube light off failed during cleanup: {}", e);
        }
    }
    if let Err(e) = robot.move_head(0.0) {
        debug!("head stop failed during cleanup: {}", e);
    }
    if let Err(e) = robot.set_head_angle(0.0) {
        debug!("head reset failed during cleanup: {}", e);
    }
}

// ── Tests ──────────────────────────────────────────────────
