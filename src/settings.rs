//! Simulation tunables
//!
//! Loaded from an optional JSON file. Every field has a default, so a file
//! only needs to name the values it overrides.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::SimError;

/// Physics world parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    pub gravity: f32,
    pub fixed_dt: f32,
    pub max_substeps: u32,
    pub friction: f32,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            fixed_dt: SIM_DT,
            max_substeps: MAX_SUBSTEPS,
            friction: FRICTION,
        }
    }
}

/// Removal policy thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    /// Obstacle retired when |up·Y| falls below this...
    pub tip_up_y: f32,
    /// ...and its speed is below this
    pub tip_speed: f32,
    /// Projectile retired below this speed
    pub rest_speed: f32,
    pub projectile_timeout_ms: f64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            tip_up_y: TIP_UP_Y,
            tip_speed: TIP_SPEED,
            rest_speed: REST_SPEED,
            projectile_timeout_ms: PROJECTILE_TIMEOUT_MS,
        }
    }
}

/// Aim and launch parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AimSettings {
    pub min_power: f32,
    pub max_power: f32,
    pub initial_power: f32,
    /// Power change per wheel delta unit (applied negated)
    pub wheel_scale: f32,
    /// Power change per pixel of upward touch drag
    pub drag_scale: f32,
    /// Launch height replaces the viewpoint's y
    pub launch_height: f32,
    pub viewpoint: Vec3,
    pub projectile_radius: f32,
    pub projectile_mass: f32,
}

impl Default for AimSettings {
    fn default() -> Self {
        Self {
            min_power: MIN_POWER,
            max_power: MAX_POWER,
            initial_power: DEFAULT_POWER,
            wheel_scale: 0.01,
            drag_scale: 0.05,
            launch_height: 0.5,
            viewpoint: Vec3::new(0.0, 3.0, 2.0),
            projectile_radius: 0.4,
            projectile_mass: 35.0,
        }
    }
}

/// Collect-and-respawn sequence timings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetSettings {
    pub collect_ms: f64,
    pub collect_stagger_ms: f64,
    /// Height collected pins sink to before disappearing
    pub sink_y: f32,
    pub clear_base_ms: f64,
    pub clear_per_entity_ms: f64,
    /// Respawned pins start this far above their origin
    pub respawn_lift: f32,
    pub respawn_ms: f64,
}

impl Default for ResetSettings {
    fn default() -> Self {
        Self {
            collect_ms: 600.0,
            collect_stagger_ms: 60.0,
            sink_y: -2.0,
            clear_base_ms: 800.0,
            clear_per_entity_ms: 50.0,
            respawn_lift: 5.0,
            respawn_ms: 700.0,
        }
    }
}

impl ResetSettings {
    /// Wait between collecting and respawning `count` pins
    pub fn clear_delay_ms(&self, count: usize) -> f64 {
        self.clear_base_ms + count as f64 * self.clear_per_entity_ms
    }
}

/// Room and pin rack geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneSettings {
    pub room_width: f32,
    pub room_length: f32,
    pub room_height: f32,
    pub wall_thickness: f32,
    /// Pins per row, front row first
    pub rows: Vec<u32>,
    pub rack_z: f32,
    pub row_gap: f32,
    pub pin_spacing: f32,
    pub pin_radius: f32,
    pub pin_height: f32,
    pub pin_mass: f32,
}

impl Default for LaneSettings {
    fn default() -> Self {
        Self {
            room_width: 10.0,
            room_length: 40.0,
            room_height: 6.0,
            wall_thickness: 1.0,
            rows: vec![4, 3, 2, 1],
            rack_z: -17.0,
            row_gap: 1.1,
            pin_spacing: 0.7,
            pin_radius: 0.15,
            pin_height: 1.1,
            pin_mass: 1.5,
        }
    }
}

impl LaneSettings {
    pub fn pin_count(&self) -> usize {
        self.rows.iter().map(|&n| n as usize).sum()
    }
}

/// Impact cue levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Master volume (0.0 - 1.0)
    pub master_volume: f32,
    /// Sound effects volume (0.0 - 1.0)
    pub sfx_volume: f32,
    pub muted: bool,
    /// Launch power mapped to full intensity
    pub full_intensity_power: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            master_volume: 0.8,
            sfx_volume: 1.0,
            muted: false,
            full_intensity_power: 8.0,
        }
    }
}

/// All simulation settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub physics: PhysicsSettings,
    pub lifecycle: LifecycleSettings,
    pub aim: AimSettings,
    pub reset: ResetSettings,
    pub lane: LaneSettings,
    pub audio: AudioSettings,
}

impl Settings {
    /// Parse settings from JSON (missing fields take defaults)
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let mut settings: Settings = serde_json::from_str(json)?;
        settings.sanitize();
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read settings from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let settings = Self::from_json(&json)?;
        log::info!("Loaded settings from {}", path.as_ref().display());
        Ok(settings)
    }

    /// Read settings from a file, falling back to defaults when it is absent
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, SimError> {
        match Self::load(path.as_ref()) {
            Ok(settings) => Ok(settings),
            Err(SimError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No settings at {}, using defaults", path.as_ref().display());
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Keep the power range ordered and the initial power inside it
    pub(crate) fn sanitize(&mut self) {
        let aim = &mut self.aim;
        if !aim.min_power.is_finite() || !aim.max_power.is_finite() {
            log::warn!("Power range not finite, using defaults");
            aim.min_power = MIN_POWER;
            aim.max_power = MAX_POWER;
        }
        if aim.min_power > aim.max_power {
            log::warn!(
                "min_power {} > max_power {}, swapping",
                aim.min_power,
                aim.max_power
            );
            std::mem::swap(&mut aim.min_power, &mut aim.max_power);
        }
        aim.initial_power = crate::clamp_power(aim.initial_power, aim.min_power, aim.max_power);
        self.physics.max_substeps = self.physics.max_substeps.max(1);
        self.audio.master_volume = self.audio.master_volume.clamp(0.0, 1.0);
        self.audio.sfx_volume = self.audio.sfx_volume.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_consts() {
        let settings = Settings::default();
        assert_eq!(settings.physics.max_substeps, 10);
        assert_eq!(settings.lane.pin_count(), 10);
        assert_eq!(settings.reset.clear_delay_ms(10), 1300.0);
        assert_eq!(settings.aim.initial_power, 20.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "reset": { "respawn_lift": 3.0 }, "lane": { "rows": [3, 2, 1] } }"#;
        let settings = Settings::from_json(json).unwrap();
        assert_eq!(settings.reset.respawn_lift, 3.0);
        assert_eq!(settings.reset.respawn_ms, 700.0);
        assert_eq!(settings.lane.pin_count(), 6);
        assert_eq!(settings.physics, PhysicsSettings::default());
    }

    #[test]
    fn test_sanitize_power_range() {
        let settings = Settings::from_json(
            r#"{ "aim": { "min_power": 40.0, "max_power": 10.0, "initial_power": 99.0 } }"#,
        )
        .unwrap();
        assert_eq!(settings.aim.min_power, 10.0);
        assert_eq!(settings.aim.max_power, 40.0);
        assert_eq!(settings.aim.initial_power, 40.0);
    }

    #[test]
    fn test_json_roundtrip() {
        let settings = Settings::default();
        let json = settings.to_json().unwrap();
        assert_eq!(Settings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_bad_json_is_error() {
        assert!(matches!(
            Settings::from_json("{ nope"),
            Err(SimError::Settings(_))
        ));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let settings = Settings::load_or_default("/definitely/not/here/pinfall.json").unwrap();
        assert_eq!(settings, Settings::default());
    }
}
