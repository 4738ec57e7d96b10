//! Abstract gesture events
//!
//! Hosts translate their platform events into these before handing them to
//! the simulation. Coordinates are screen space (pixels, y down).

use glam::Vec2;

/// A single gesture event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    /// `over_ui` marks presses that landed on a UI element (buttons etc.)
    PointerDown { pos: Vec2, over_ui: bool },
    PointerMove { pos: Vec2 },
    PointerUp { pos: Vec2, over_ui: bool },
    TouchStart { pos: Vec2 },
    TouchMove { pos: Vec2 },
    TouchEnd,
    /// Wheel delta, positive = scrolled down
    Wheel { delta_y: f32 },
}

/// Gesture plus the time it happened
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureEvent {
    pub gesture: Gesture,
    pub timestamp_ms: f64,
}

impl GestureEvent {
    pub fn new(gesture: Gesture, timestamp_ms: f64) -> Self {
        Self {
            gesture,
            timestamp_ms,
        }
    }
}

/// Viewport the screen coordinates refer to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width: width.max(1.0),
            height: height.max(1.0),
        }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }

    /// Offset from screen center, each axis normalized to [-1, 1]
    pub fn normalized_offset(&self, pos: Vec2) -> Vec2 {
        let half = self.center();
        (pos - half) / half
    }
}
