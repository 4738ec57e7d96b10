//! Time-based interpolation scheduler
//!
//! Tweens interpolate a `Vec3` channel of a visual (position, or rotation as
//! XYZ Euler angles) from one value to another. `advance` produces the
//! samples to write this frame plus the completion cues of tweens that
//! reached their end value. A tween's delay starts counting at the first
//! `advance` after it was scheduled.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::scene::VisualId;

/// Easing curves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Easing {
    #[default]
    Linear,
    CubicIn,
    CubicOut,
}

impl Easing {
    /// Map linear progress `t` in [0, 1] onto the curve
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::CubicIn => t * t * t,
            Easing::CubicOut => {
                let u = t - 1.0;
                u * u * u + 1.0
            }
        }
    }
}

/// Which transform field a tween drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Position,
    /// XYZ Euler angles in radians
    Rotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TweenTarget {
    pub visual: VisualId,
    pub channel: Channel,
}

impl TweenTarget {
    pub fn position(visual: VisualId) -> Self {
        Self {
            visual,
            channel: Channel::Position,
        }
    }

    pub fn rotation(visual: VisualId) -> Self {
        Self {
            visual,
            channel: Channel::Rotation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TweenId(u64);

#[derive(Debug, Clone)]
struct Tween<C> {
    id: TweenId,
    target: TweenTarget,
    from: Vec3,
    to: Vec3,
    duration_ms: f64,
    delay_ms: f64,
    /// Resolved on the first advance
    start_ms: Option<f64>,
    easing: Easing,
    on_complete: Option<C>,
}

/// Interpolated value for one target this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub target: TweenTarget,
    pub value: Vec3,
}

/// Output of one `advance`
#[derive(Debug, Clone)]
pub struct AnimationFrame<C> {
    pub samples: Vec<Sample>,
    /// Cues of tweens that finished this frame, in scheduling order
    pub completed: Vec<C>,
}

impl<C> Default for AnimationFrame<C> {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            completed: Vec::new(),
        }
    }
}

/// Scheduler of in-flight tweens
#[derive(Debug, Clone)]
pub struct AnimationScheduler<C> {
    tweens: Vec<Tween<C>>,
    next_id: u64,
}

impl<C> Default for AnimationScheduler<C> {
    fn default() -> Self {
        Self {
            tweens: Vec::new(),
            next_id: 1,
        }
    }
}

impl<C> AnimationScheduler<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a tween. `on_complete` is handed back exactly once, in the
    /// frame whose sample equals `to`.
    #[allow(clippy::too_many_arguments)]
    pub fn schedule(
        &mut self,
        target: TweenTarget,
        from: Vec3,
        to: Vec3,
        duration_ms: f64,
        delay_ms: f64,
        easing: Easing,
        on_complete: Option<C>,
    ) -> TweenId {
        let id = TweenId(self.next_id);
        self.next_id += 1;
        self.tweens.push(Tween {
            id,
            target,
            from,
            to,
            duration_ms: duration_ms.max(0.0),
            delay_ms: delay_ms.max(0.0),
            start_ms: None,
            easing,
            on_complete,
        });
        id
    }

    /// Advance every tween to `now_ms`
    pub fn advance(&mut self, now_ms: f64) -> AnimationFrame<C> {
        let mut frame = AnimationFrame::default();
        let mut finished = Vec::new();

        for tween in &mut self.tweens {
            let start = *tween.start_ms.get_or_insert(now_ms + tween.delay_ms);
            if now_ms < start {
                continue;
            }
            let t = if tween.duration_ms <= 0.0 {
                1.0
            } else {
                ((now_ms - start) / tween.duration_ms).min(1.0) as f32
            };
            let value = if t >= 1.0 {
                tween.to
            } else {
                tween.from.lerp(tween.to, tween.easing.apply(t))
            };
            frame.samples.push(Sample {
                target: tween.target,
                value,
            });
            if t >= 1.0 {
                finished.push(tween.id);
            }
        }

        if !finished.is_empty() {
            let mut kept = Vec::with_capacity(self.tweens.len());
            for mut tween in self.tweens.drain(..) {
                if finished.contains(&tween.id) {
                    if let Some(cue) = tween.on_complete.take() {
                        frame.completed.push(cue);
                    }
                } else {
                    kept.push(tween);
                }
            }
            self.tweens = kept;
        }

        frame
    }

    /// Drop every tween on a visual. Their completion cues never fire.
    pub fn cancel_visual(&mut self, visual: VisualId) -> usize {
        let before = self.tweens.len();
        self.tweens.retain(|t| t.target.visual != visual);
        before - self.tweens.len()
    }

    pub fn cancel(&mut self, id: TweenId) -> bool {
        let before = self.tweens.len();
        self.tweens.retain(|t| t.id != id);
        before != self.tweens.len()
    }

    pub fn is_animating(&self, visual: VisualId) -> bool {
        self.tweens.iter().any(|t| t.target.visual == visual)
    }

    /// Tweens still in flight (including delayed ones)
    pub fn active(&self) -> usize {
        self.tweens.len()
    }
}
