//! Shared session context for the game loop and the web relay.
//!
//! One `Session` is created at startup and injected into every worker:
//! it owns the robot handle (write-once), the latest-frame slot, the
//! cube-tap mailbox, and the cooperative shutdown flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::frame::FrameStore;
use crate::robot::{Robot, TapEvent};

pub struct Session {
    robot: Arc<dyn Robot>,
    frames: FrameStore,
    tap_tx: Sender<TapEvent>,
    /// Single consumer (the game loop); guarded so Session stays Sync.
    tap_rx: Mutex<Receiver<TapEvent>>,
    shutdown: AtomicBool,
}

impl Session {
    pub fn new(robot: Arc<dyn Robot>) -> Arc<Self> {
        let (tap_tx, tap_rx) = mpsc::channel();
        Arc::new(Self {
            robot,
            frames: FrameStore::new(),
            tap_tx,
            tap_rx: Mutex::new(tap_rx),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn robot(&self) -> &dyn Robot {
        self.robot.as_ref()
    }

    pub fn frames(&self) -> &FrameStore {
        &self.frames
    }

    /// Producer side of the tap mailbox, for the device backend.
    pub fn tap_sender(&self) -> Sender<TapEvent> {
        self.tap_tx.clone()
    }

    /// Discard queued taps.  Taps delivered while nobody was waiting
    /// must not satisfy a later wait.
    pub fn drain_taps(&self) {
        let rx = self.tap_rx.lock();
        while rx.try_recv().is_ok() {}
    }

    /// Block until a cube tap arrives, checking for shutdown every
    /// `poll`.  Returns None when shutdown is requested first.
    pub fn wait_for_tap(&self, poll: Duration) -> Option<TapEvent> {
        let rx = self.tap_rx.lock();
        loop {
            if self.is_shutdown() {
                return None;
            }
            match rx.recv_timeout(poll) {
                Ok(tap) => return Some(tap),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    pub fn request_shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            info!("shutdown requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Sleep in short slices, returning early on shutdown.
    pub fn sleep_interruptible(&self, total: Duration) {
        const SLICE: Duration = Duration::from_millis(50);
        let mut remaining = total;
        while !remaining.is_zero() {
            if self.is_shutdown() {
                return;
            }
            let step = remaining.min(SLICE);
            std::thread::sleep(step);
            remaining -= step;
        }
    }
}

// ── Tests ──────────────────────────────────────────────────
