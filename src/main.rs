//! tallybot — a finger-counting arithmetic game for a desk robot.
//!
//! Show a number of fingers, tap a cube to pick an operator, show
//! another number, and the robot speaks the result.  A local web
//! relay mirrors the camera and offers manual controls.

mod backend;
mod frame;
mod game;
mod hand;
mod relay;
mod robot;
mod session;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::robot::CubeId;

#[derive(Parser, Debug)]
#[command(name = "tallybot", about = "Finger-counting arithmetic game")]
struct Cli {
    /// Backend to use: sim, replay, or auto
    #[arg(long, default_value = "auto")]
    backend: String,

    /// Relay listen address
    #[arg(long, default_value = "127.0.0.1:5000")]
    listen: SocketAddr,

    /// Run without the web relay
    #[arg(long)]
    no_relay: bool,

    /// Directory of recorded frames (replay backend)
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Hand detector command line (replay backend)
    #[arg(long, default_value = "python3 hand_oracle.py")]
    oracle_cmd: String,

    /// Scripted detections for the sim backend: counts or "none",
    /// comma separated
    #[arg(long, default_value = "3,3,none,5,5")]
    script: String,

    /// Cube the tap injector presses: cube1, cube2, cube3, or none
    #[arg(long, default_value = "cube1")]
    tap: String,

    /// Rounds to play before exiting
    #[arg(long, default_value_t = 1)]
    rounds: u32,

    /// Consecutive no-hand samples before the idle nudge
    #[arg(long, default_value_t = 100)]
    idle_streak: u32,

    /// Exit after N seconds (testing)
    #[arg(long)]
    exit_after: Option<u64>,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("tallybot {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tallybot=info".into()),
        )
        .init();

    info!("tallybot v{} starting", env!("CARGO_PKG_VERSION"));
    info!("backend: {}", cli.backend);

    let backend_type = match cli.backend.as_str() {
        "sim" => backend::BackendType::Sim,
        "replay" => backend::BackendType::Replay,
        "auto" => {
            if cli.frames.is_some() {
                info!("auto-detected: frame directory given, using replay backend");
                backend::BackendType::Replay
            } else {
                info!("auto-detected: no frame directory, using sim backend");
                backend::BackendType::Sim
            }
        }
        other => {
            eprintln!("Unknown backend: {other}. Use: sim, replay, or auto");
            std::process::exit(1);
        }
    };

    let tap = match cli.tap.as_str() {
        "none" => None,
        raw => match CubeId::parse(raw) {
            Some(cube) => Some(cube),
            None => {
                eprintln!("Unknown tap cube: {raw}. Use: cube1, cube2, cube3, or none");
                std::process::exit(1);
            }
        },
    };

    backend::run(
        backend_type,
        backend::RunOptions {
            listen: cli.listen,
            no_relay: cli.no_relay,
            frames: cli.frames,
            oracle_cmd: cli.oracle_cmd,
            script: cli.script,
            tap,
            rounds: cli.rounds,
            idle_streak: cli.idle_streak,
            exit_after: cli.exit_after,
        },
    )
}
