//! Camera frames and the shared latest-frame slot.
//!
//! One writer (the camera feed) publishes into `FrameStore`; any number
//! of readers grab the most recent frame.  Readers that fall behind see
//! skipped frames, readers that poll faster than the feed see repeats.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder};
use parking_lot::Mutex;

/// Placeholder frame dimensions, used before the camera delivers.
pub const PLACEHOLDER_WIDTH: u32 = 320;
pub const PLACEHOLDER_HEIGHT: u32 = 240;

/// A single camera frame, tightly packed RGB8.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic sequence number assigned at publish time.
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Single-writer, many-reader slot holding the most recent frame.
pub struct FrameStore {
    latest: Mutex<Option<Arc<Frame>>>,
    seq: AtomicU64,
}

impl FrameStore {
    pub fn new() -> Self {
        Self {
            latest: Mutex::new(None),
            seq: AtomicU64::new(0),
        }
    }

    /// Replace the slot with a new frame.  Returns its sequence number.
    pub fn publish(&self, width: u32, height: u32, pixels: Vec<u8>) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let frame = Arc::new(Frame {
            seq,
            width,
            height,
            pixels,
        });
        *self.latest.lock() = Some(frame);
        seq
    }

    /// Most recent frame, if any has been published.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.latest.lock().clone()
    }

    /// Most recent frame only if newer than `seen_seq`.
    pub fn latest_after(&self, seen_seq: u64) -> Option<Arc<Frame>> {
        self.latest
            .lock()
            .as_ref()
            .filter(|frame| frame.seq > seen_seq)
            .cloned()
    }

    /// Sequence number of the newest published frame (0 if none).
    pub fn seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }
}

/// Encode a frame as PNG for the web relay.
pub fn encode_png(frame: &Frame) -> Result<Vec<u8>> {
    let expected = frame.width as usize * frame.height as usize * 3;
    if frame.pixels.len() != expected {
        bail!(
            "frame buffer is {} bytes, expected {} for {}x{}",
            frame.pixels.len(),
            expected,
            frame.width,
            frame.height,
        );
    }
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(
        &frame.pixels,
        frame.width,
        frame.height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

/// Mid-gray placeholder with a gentle vertical gradient, shown until
/// the camera delivers a real frame.
pub fn placeholder_pixels(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        let shade = 0x70 + (y * 0x20 / height.max(1)) as u8;
        for _ in 0..width {
            pixels.extend_from_slice(&[shade, shade, shade]);
        }
    }
    pixels
}

// ── Tests ──────────────────────────────────────────────────
