//! Aim and launch controller
//!
//! Pointer and touch gestures both funnel into begin/update/end. Power is
//! always kept inside the configured range; direction is always unit length.

use glam::{Vec2, Vec3};

use crate::clamp_power;
use crate::consts::{MAX_POWER, MIN_POWER};
use crate::input::{Gesture, GestureEvent, Viewport};
use crate::settings::AimSettings;

/// Pending launch parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaunchState {
    pub direction: Vec3,
    pub power: f32,
    pub aiming: bool,
}

/// Which device started the current aim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Pointer,
    Touch,
}

/// A launch the caller should turn into a projectile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaunchRequest {
    pub direction: Vec3,
    pub power: f32,
}

impl LaunchRequest {
    pub fn velocity(&self) -> Vec3 {
        self.direction * self.power
    }
}

#[derive(Debug, Clone)]
pub struct AimController {
    state: LaunchState,
    modality: Modality,
    origin_y: f32,
    power_at_start: f32,
    min_power: f32,
    max_power: f32,
    wheel_scale: f32,
    drag_scale: f32,
    viewport: Viewport,
}

/// Ordered, finite power bounds from settings that may not be
fn power_range(settings: &AimSettings) -> (f32, f32) {
    let (lo, hi) = (settings.min_power, settings.max_power);
    if !lo.is_finite() || !hi.is_finite() {
        log::warn!("Power range {}..{} not finite, using defaults", lo, hi);
        return (MIN_POWER, MAX_POWER);
    }
    (lo.min(hi), lo.max(hi))
}

impl AimController {
    pub fn new(settings: &AimSettings, viewport: Viewport) -> Self {
        let (min_power, max_power) = power_range(settings);
        let power = clamp_power(settings.initial_power, min_power, max_power);
        Self {
            state: LaunchState {
                direction: Vec3::NEG_Z,
                power,
                aiming: false,
            },
            modality: Modality::Pointer,
            origin_y: 0.0,
            power_at_start: power,
            min_power,
            max_power,
            wheel_scale: settings.wheel_scale,
            drag_scale: settings.drag_scale,
            viewport,
        }
    }

    pub fn state(&self) -> LaunchState {
        self.state
    }

    pub fn power(&self) -> f32 {
        self.state.power
    }

    pub fn direction(&self) -> Vec3 {
        self.state.direction
    }

    pub fn is_aiming(&self) -> bool {
        self.state.aiming
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn begin_aim(&mut self, origin_y: f32, modality: Modality) {
        self.state.aiming = true;
        self.modality = modality;
        self.origin_y = origin_y;
        self.power_at_start = self.state.power;
    }

    /// Re-aim from a screen position. Touch drags also change power.
    pub fn update_aim(&mut self, pos: Vec2) -> (Vec3, f32) {
        let offset = self.viewport.normalized_offset(pos);
        let raw = match self.modality {
            Modality::Touch => {
                let drag = self.origin_y - pos.y;
                self.set_power(self.power_at_start + drag * self.drag_scale);
                Vec3::new(offset.x, 0.0, -1.0)
            }
            Modality::Pointer => Vec3::new(offset.x, 0.0, -1.0 + offset.y),
        };
        // Zero-length or non-finite: keep pointing where we were
        if let Some(direction) = raw.try_normalize() {
            self.state.direction = direction;
        }
        (self.state.direction, self.state.power)
    }

    /// Finish aiming; yields a launch if an aim was in progress
    pub fn end_aim(&mut self) -> Option<LaunchRequest> {
        if !self.state.aiming {
            return None;
        }
        self.state.aiming = false;
        Some(LaunchRequest {
            direction: self.state.direction,
            power: self.state.power,
        })
    }

    /// Drop an aim in progress without launching
    pub fn cancel(&mut self) {
        self.state.aiming = false;
    }

    /// Wheel scroll: scrolling up raises power
    pub fn scroll(&mut self, delta_y: f32) -> f32 {
        self.set_power(self.state.power - delta_y * self.wheel_scale);
        self.state.power
    }

    fn set_power(&mut self, power: f32) {
        self.state.power = clamp_power(power, self.min_power, self.max_power);
    }

    /// Feed one gesture. Everything is ignored while `blocked`.
    pub fn handle(&mut self, event: &GestureEvent, blocked: bool) -> Option<LaunchRequest> {
        if blocked {
            return None;
        }
        match event.gesture {
            Gesture::PointerDown { pos, over_ui } if !over_ui => {
                self.begin_aim(pos.y, Modality::Pointer);
                None
            }
            Gesture::PointerMove { pos }
                if self.state.aiming && self.modality == Modality::Pointer =>
            {
                self.update_aim(pos);
                None
            }
            Gesture::PointerUp { over_ui, .. } if !over_ui => self.end_aim(),
            Gesture::TouchStart { pos } => {
                self.begin_aim(pos.y, Modality::Touch);
                None
            }
            Gesture::TouchMove { pos } if self.state.aiming && self.modality == Modality::Touch => {
                self.update_aim(pos);
                None
            }
            Gesture::TouchEnd => self.end_aim(),
            Gesture::Wheel { delta_y } => {
                self.scroll(delta_y);
                None
            }
            _ => None,
        }
    }
}
