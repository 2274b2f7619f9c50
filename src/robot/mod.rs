//! Robot device seam: head, cube lights, speech, animations.
//!
//! Everything the game needs from the physical robot goes through the
//! `Robot` trait; calls are synchronous and block until the device has
//! accepted the command.  `SimRobot` is the in-process implementation.

pub mod sim;

use anyhow::Result;

/// Head pitch envelope in degrees.
pub const MIN_HEAD_ANGLE: f32 = -25.0;
pub const MAX_HEAD_ANGLE: f32 = 44.5;

// ── Colors ─────────────────────────────────────────────────

/// Cube light color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };
    pub const GREEN: Rgb = Rgb { r: 0, g: 255, b: 0 };
    pub const BLUE: Rgb = Rgb { r: 0, g: 0, b: 255 };

    /// Parse a strict `0xRRGGBB` string.  Returns None on anything else.
    pub fn parse_hex(text: &str) -> Option<Rgb> {
        let digits = text.trim().strip_prefix("0x")?;
        if digits.len() != 6 {
            return None;
        }
        let r = u8::from_str_radix(&digits[0..2], 16).ok()?;
        let g = u8::from_str_radix(&digits[2..4], 16).ok()?;
        let b = u8::from_str_radix(&digits[4..6], 16).ok()?;
        Some(Rgb { r, g, b })
    }

    /// Format back to `0xRRGGBB` for logs and responses.
    pub fn as_hex(&self) -> String {
        format!("0x{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

// ── Cubes ──────────────────────────────────────────────────

/// The three light cubes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeId {
    Cube1,
    Cube2,
    Cube3,
}

impl CubeId {
    pub const ALL: [CubeId; 3] = [CubeId::Cube1, CubeId::Cube2, CubeId::Cube3];

    /// Convert cube enum to array index (0-2).
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cube1 => "cube1",
            Self::Cube2 => "cube2",
            Self::Cube3 => "cube3",
        }
    }

    /// Parse `cube1`/`cube2`/`cube3` or a bare `1`/`2`/`3`.
    pub fn parse(text: &str) -> Option<CubeId> {
        match text.trim().to_ascii_lowercase().as_str() {
            "cube1" | "1" => Some(Self::Cube1),
            "cube2" | "2" => Some(Self::Cube2),
            "cube3" | "3" => Some(Self::Cube3),
            _ => None,
        }
    }
}

/// A cube was tapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapEvent {
    pub cube: CubeId,
}

// ── Animations ─────────────────────────────────────────────

/// Canned animations the game triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Animation {
    /// Short pondering gesture while no hand is in view.
    Thinking,
    /// Attention-seeking nudge after a long detection drought.
    Bored,
    /// Celebration on a confirmed count.
    Happy,
}

impl Animation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::Bored => "bored",
            Self::Happy => "happy",
        }
    }
}

// ── Device trait ───────────────────────────────────────────

/// Synchronous robot capability surface.
///
/// Implementations clamp head angles to the device envelope and return
/// `Err` only when the device connection itself is gone.
pub trait Robot: Send + Sync {
    /// Move the head to an absolute pitch in degrees.
    fn set_head_angle(&self, degrees: f32) -> Result<()>;

    /// Start continuous head motion; positive is up, zero stops.
    fn move_head(&self, velocity: f32) -> Result<()>;

    /// Light a whole cube in one color.
    fn set_cube_light(&self, cube: CubeId, color: Rgb) -> Result<()>;

    /// Light the four cube corners individually.
    fn set_cube_corners(&self, cube: CubeId, corners: [Rgb; 4]) -> Result<()>;

    /// Speak a line of text, blocking until done.
    fn say(&self, text: &str) -> Result<()>;

    /// Play a canned animation, blocking until done.
    fn play_animation(&self, animation: Animation) -> Result<()>;
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_valid() {
        assert_eq!(
            Rgb::parse_hex("0xFF8001"),
            Some(Rgb {
                r: 255,
                g: 128,
                b: 1
            }),
        );
        assert_eq!(Rgb::parse_hex("0x000000"), Some(Rgb::OFF));
    }

    #[test]
    fn test_parse_hex_rejects_bad_format() {
        assert_eq!(Rgb::parse_hex("FF8001"), None, "missing 0x prefix");
        assert_eq!(Rgb::parse_hex("0xFFF"), None, "too short");
        assert_eq!(Rgb::parse_hex("0xFF8001AA"), None, "too long");
        assert_eq!(Rgb::parse_hex("0xZZ0000"), None, "not hex");
        assert_eq!(Rgb::parse_hex(""), None);
    }

    #[test]
    fn test_hex_round_trip() {
        let color = Rgb { r: 18, g: 52, b: 86 };
        assert_eq!(Rgb::parse_hex(&color.as_hex()), Some(color));
    }

    #[test]
    fn test_cube_parse() {
        assert_eq!(CubeId::parse("cube1"), Some(CubeId::Cube1));
        assert_eq!(CubeId::parse("CUBE2"), Some(CubeId::Cube2));
        assert_eq!(CubeId::parse("3"), Some(CubeId::Cube3));
        assert_eq!(CubeId::parse("cube4"), None);
        assert_eq!(CubeId::parse(""), None);
    }

    #[test]
    fn test_cube_index() {
        assert_eq!(CubeId::Cube1.index(), 0);
        assert_eq!(CubeId::Cube3.index(), 2);
    }
}
