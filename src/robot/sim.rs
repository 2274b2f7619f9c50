//! Simulated robot: logs every command and tracks device state.
//!
//! Stands in for the real device in the sim and replay backends, and
//! gives tests a command log to assert against.

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{Animation, CubeId, Rgb, Robot, MAX_HEAD_ANGLE, MIN_HEAD_ANGLE};

/// One recorded device command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetHeadAngle(f32),
    MoveHead(f32),
    SetCubeLight(CubeId, Rgb),
    SetCubeCorners(CubeId, [Rgb; 4]),
    Say(String),
    PlayAnimation(Animation),
}

#[derive(Debug)]
struct SimState {
    head_angle: f32,
    head_velocity: f32,
    cube_lights: [Rgb; 3],
    commands: Vec<Command>,
}

/// In-process robot.  All commands succeed immediately.
pub struct SimRobot {
    state: Mutex<SimState>,
}

impl SimRobot {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                head_angle: 0.0,
                head_velocity: 0.0,
                cube_lights: [Rgb::OFF; 3],
                commands: Vec::new(),
            }),
        }
    }

    /// Current head pitch in degrees.
    pub fn head_angle(&self) -> f32 {
        self.state.lock().head_angle
    }

    /// Current cube color.
    pub fn cube_light(&self, cube: CubeId) -> Rgb {
        self.state.lock().cube_lights[cube.index()]
    }

    /// Copy of the full command log, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().commands.clone()
    }

    /// Spoken lines only, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.state
            .lock()
            .commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::Say(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Robot for SimRobot {
    fn set_head_angle(&self, degrees: f32) -> anyhow::Result<()> {
        let clamped = degrees.clamp(MIN_HEAD_ANGLE, MAX_HEAD_ANGLE);
        debug!(degrees = clamped, "sim: head angle");
        let mut state = self.state.lock();
        state.head_angle = clamped;
        state.commands.push(Command::SetHeadAngle(clamped));
        Ok(())
    }

    fn move_head(&self, velocity: f32) -> anyhow::Result<()> {
        debug!(velocity, "sim: head motion");
        let mut state = self.state.lock();
        state.head_velocity = velocity;
        state.commands.push(Command::MoveHead(velocity));
        Ok(())
    }

    fn set_cube_light(&self, cube: CubeId, color: Rgb) -> anyhow::Result<()> {
        debug!(cube = cube.as_str(), color = %color.as_hex(), "sim: cube light");
        let mut state = self.state.lock();
        state.cube_lights[cube.index()] = color;
        state.commands.push(Command::SetCubeLight(cube, color));
        Ok(())
    }

    fn set_cube_corners(&self, cube: CubeId, corners: [Rgb; 4]) -> anyhow::Result<()> {
        debug!(cube = cube.as_str(), "sim: cube corners");
        self.state
            .lock()
            .commands
            .push(Command::SetCubeCorners(cube, corners));
        Ok(())
    }

    fn say(&self, text: &str) -> anyhow::Result<()> {
        info!(text, "sim: robot says");
        self.state
            .lock()
            .commands
            .push(Command::Say(text.to_string()));
        Ok(())
    }

    fn play_animation(&self, animation: Animation) -> anyhow::Result<()> {
        debug!(animation = animation.as_str(), "sim: animation");
        self.state
            .lock()
            .commands
            .push(Command::PlayAnimation(animation));
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────
