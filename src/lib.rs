//! Pinfall - launch a ball into a rack of pins and watch them fall
//!
//! Core modules:
//! - `sim`: Frame-driven simulation (physics adapter, entity lifecycle, reset sequence, aiming)
//! - `scene`: Visual collaborator contract and an in-memory scene graph
//! - `audio`: Impact cue mixer
//! - `input`: Abstract gesture events
//! - `settings`: Data-driven tunables

pub mod audio;
pub mod error;
pub mod input;
pub mod scene;
pub mod settings;
pub mod sim;

pub use error::SimError;
pub use settings::Settings;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Simulation configuration constants
pub mod consts {
    /// Fixed physics timestep (60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;
    /// Maximum substeps per frame; excess time is dropped
    pub const MAX_SUBSTEPS: u32 = 10;
    /// Downward acceleration (units/s²)
    pub const GRAVITY: f32 = 9.8;
    /// Friction applied to every collider
    pub const FRICTION: f32 = 0.5;

    /// Launch power range
    pub const MIN_POWER: f32 = 5.0;
    pub const MAX_POWER: f32 = 50.0;
    pub const DEFAULT_POWER: f32 = 20.0;

    /// Obstacle is knocked down below this |up·Y| ...
    pub const TIP_UP_Y: f32 = 0.2;
    /// ... while moving slower than this
    pub const TIP_SPEED: f32 = 0.9;
    /// Projectile at rest below this speed
    pub const REST_SPEED: f32 = 0.5;
    /// Hard projectile lifetime
    pub const PROJECTILE_TIMEOUT_MS: f64 = 10_000.0;
}

/// Position + orientation of a body or visual
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn at(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    /// Same orientation, raised by `dy`
    #[inline]
    pub fn lifted(&self, dy: f32) -> Self {
        Self::new(self.position + Vec3::Y * dy, self.rotation)
    }

    /// Vertical component of the body's rotated up axis
    #[inline]
    pub fn up_y(&self) -> f32 {
        (self.rotation * Vec3::Y).y
    }
}

/// Clamp a power value into `[lo, hi]`, mapping NaN to `lo`
#[inline]
pub fn clamp_power(power: f32, lo: f32, hi: f32) -> f32 {
    if power.is_nan() { lo } else { power.clamp(lo, hi) }
}
