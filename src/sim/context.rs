//! Simulation context
//!
//! Owns every piece of mutable simulation state and runs one frame in a
//! fixed order:
//! 1. input: queued gestures, possibly spawning a projectile
//! 2. physics step (fixed substeps)
//! 3. pose readback and removal, then projectile timeouts
//! 4. reset state machine
//! 5. animation samples and completion cues
//! 6. present

use glam::Vec3;

use super::aim::{AimController, LaunchRequest};
use super::anim::AnimationScheduler;
use super::lane::{self, LaneLayout};
use super::lifecycle::{EntityId, EntityKind, Lifecycle, RemovalPolicy};
use super::physics::{PhysicsWorld, ShapeDesc};
use super::reset::{ResetCue, ResetOrchestrator, ResetPhase};
use crate::Pose;
use crate::audio::{AudioSink, launch_intensity};
use crate::error::SimError;
use crate::input::{GestureEvent, Viewport};
use crate::scene::Scene;
use crate::settings::Settings;

/// Counters for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub substeps: u32,
    pub synced: usize,
    pub retired: usize,
    pub expired: usize,
    pub launched: usize,
    pub animations_active: usize,
}

pub struct Simulation<S: Scene, A: AudioSink> {
    settings: Settings,
    lifecycle: Lifecycle<S>,
    reset: ResetOrchestrator,
    anim: AnimationScheduler<ResetCue>,
    aim: AimController,
    audio: A,
    layout: LaneLayout,
    pending_input: Vec<GestureEvent>,
    now_ms: f64,
    frame: u64,
    last_stats: FrameStats,
}

impl<S: Scene, A: AudioSink> Simulation<S, A> {
    /// Build the world and the lane. Fails on malformed lane geometry.
    pub fn new(
        mut settings: Settings,
        scene: S,
        audio: A,
        viewport: Viewport,
    ) -> Result<Self, SimError> {
        settings.sanitize();
        let physics = PhysicsWorld::new(&settings.physics);
        let policy = RemovalPolicy::from(&settings.lifecycle);
        let mut lifecycle = Lifecycle::new(physics, scene, policy);
        let layout = lane::build(&mut lifecycle, &settings.lane)?;
        let aim = AimController::new(&settings.aim, viewport);
        let reset = ResetOrchestrator::new(settings.reset.clone());

        Ok(Self {
            settings,
            lifecycle,
            reset,
            anim: AnimationScheduler::new(),
            aim,
            audio,
            layout,
            pending_input: Vec::new(),
            now_ms: 0.0,
            frame: 0,
            last_stats: FrameStats::default(),
        })
    }

    /// Queue a gesture for the next frame
    pub fn push_input(&mut self, event: GestureEvent) {
        self.pending_input.push(event);
    }

    /// Start the collect-and-respawn sequence. Rejected while one is running.
    pub fn trigger_reset(&mut self) -> Result<(), SimError> {
        self.reset.trigger(self.now_ms, self.lifecycle.obstacles())?;
        self.aim.cancel();
        Ok(())
    }

    /// Spawn a projectile for `request`. `None` while input is blocked.
    pub fn launch(&mut self, request: LaunchRequest) -> Result<Option<EntityId>, SimError> {
        if self.reset.is_input_blocked() {
            log::debug!("Launch rejected: reset in progress");
            return Ok(None);
        }
        let aim = &self.settings.aim;
        let mut position = aim.viewpoint;
        position.y = aim.launch_height;
        let shape = ShapeDesc::Sphere {
            radius: aim.projectile_radius,
        };

        let id = self.lifecycle.spawn(
            EntityKind::Projectile,
            shape,
            aim.projectile_mass,
            Pose::at(position),
            Some(request.velocity()),
        )?;
        let intensity = launch_intensity(request.power, self.settings.audio.full_intensity_power);
        self.audio.play_impact(intensity);
        log::debug!(
            "Launched {:?} dir={} power={:.1}",
            id,
            request.direction,
            request.power
        );
        Ok(Some(id))
    }

    /// Run one frame at wall-clock `now_ms`, `dt` seconds after the last
    pub fn frame(&mut self, now_ms: f64, dt: f32) -> FrameStats {
        self.now_ms = now_ms;
        self.frame += 1;
        self.lifecycle.begin_frame(now_ms);
        let mut stats = FrameStats {
            frame: self.frame,
            ..FrameStats::default()
        };

        for event in std::mem::take(&mut self.pending_input) {
            let blocked = self.reset.is_input_blocked();
            if let Some(request) = self.aim.handle(&event, blocked) {
                match self.launch(request) {
                    Ok(Some(_)) => stats.launched += 1,
                    Ok(None) => {}
                    Err(e) => log::warn!("Launch failed: {}", e),
                }
            }
        }

        stats.substeps = self.lifecycle.physics_mut().step(dt);

        let report = self.lifecycle.sync_frame();
        stats.synced = report.synced;
        stats.retired = report.retired.len();
        stats.expired = self.lifecycle.expire_due().len();

        self.reset.advance(now_ms, &mut self.lifecycle, &mut self.anim);

        let animated = self.anim.advance(now_ms);
        for sample in animated.samples {
            self.lifecycle
                .apply_animated(sample.target.visual, sample.target.channel, sample.value);
        }
        for cue in animated.completed {
            self.reset.on_cue(cue, &mut self.lifecycle);
        }
        stats.animations_active = self.anim.active();

        self.lifecycle.scene_mut().present();
        self.last_stats = stats;
        stats
    }

    pub fn is_input_blocked(&self) -> bool {
        self.reset.is_input_blocked()
    }

    pub fn reset_phase(&self) -> ResetPhase {
        self.reset.phase()
    }

    pub fn reset(&self) -> &ResetOrchestrator {
        &self.reset
    }

    pub fn aim(&self) -> &AimController {
        &self.aim
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.aim.set_viewport(viewport);
    }

    pub fn lifecycle(&self) -> &Lifecycle<S> {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut Lifecycle<S> {
        &mut self.lifecycle
    }

    pub fn layout(&self) -> &LaneLayout {
        &self.layout
    }

    pub fn pins(&self) -> &[EntityId] {
        &self.layout.pins
    }

    /// Pins currently standing in the rack
    pub fn pins_standing(&self) -> usize {
        self.lifecycle.count_live(EntityKind::Obstacle)
    }

    /// Launch position for the current settings
    pub fn launch_origin(&self) -> Vec3 {
        let aim = &self.settings.aim;
        Vec3::new(aim.viewpoint.x, aim.launch_height, aim.viewpoint.z)
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut A {
        &mut self.audio
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ImpactMixer, SampleId};
    use crate::consts::SIM_DT;
    use crate::input::Gesture;
    use crate::scene::SceneGraph;
    use glam::Vec2;

    fn sim() -> Simulation<SceneGraph, ImpactMixer> {
        let mut mixer = ImpactMixer::default();
        mixer.set_sample(SampleId(1));
        let viewport = Viewport::new(800.0, 600.0);
        Simulation::new(Settings::default(), SceneGraph::new(), mixer, viewport).unwrap()
    }

    fn click(sim: &mut Simulation<SceneGraph, ImpactMixer>, at: Vec2) {
        sim.push_input(GestureEvent::new(Gesture::PointerDown { pos: at, over_ui: false }, 0.0));
        sim.push_input(GestureEvent::new(Gesture::PointerMove { pos: at }, 0.0));
        sim.push_input(GestureEvent::new(Gesture::PointerUp { pos: at, over_ui: false }, 0.0));
    }

    #[test]
    fn test_startup_layout() {
        let sim = sim();
        assert_eq!(sim.pins().len(), 10);
        assert_eq!(sim.pins_standing(), 10);
        assert_eq!(sim.lifecycle().scene().len(), 16);
        assert!(!sim.is_input_blocked());
        assert_eq!(sim.launch_origin(), Vec3::new(0.0, 0.5, 2.0));
    }

    #[test]
    fn test_gesture_launches_projectile() {
        let mut sim = sim();
        click(&mut sim, Vec2::new(400.0, 300.0));
        let stats = sim.frame(16.0, SIM_DT);

        assert_eq!(stats.launched, 1);
        assert_eq!(stats.substeps, 1);
        assert_eq!(sim.lifecycle().count_live(EntityKind::Projectile), 1);
        // 20 / 8 saturates
        let cues = sim.audio_mut().drain();
        assert_eq!(cues.len(), 1);
        assert!((cues[0].gain - 0.8).abs() < 1e-6);
        assert_eq!(sim.lifecycle().scene().frames_presented(), 1);
    }

    #[test]
    fn test_unsanitized_settings_accepted() {
        let mut settings = Settings::default();
        settings.aim.min_power = 50.0;
        settings.aim.max_power = 5.0;
        let mut sim = Simulation::new(
            settings,
            SceneGraph::new(),
            ImpactMixer::default(),
            Viewport::new(800.0, 600.0),
        )
        .unwrap();
        assert_eq!(sim.settings().aim.min_power, 5.0);

        sim.push_input(GestureEvent::new(Gesture::Wheel { delta_y: -500.0 }, 0.0));
        sim.frame(16.0, SIM_DT);
        assert!((sim.aim().power() - 25.0).abs() < 1e-4);
    }

    #[test]
    fn test_launch_rejected_during_reset() {
        let mut sim = sim();
        sim.trigger_reset().unwrap();
        assert!(sim.is_input_blocked());
        assert!(matches!(sim.trigger_reset(), Err(SimError::ResetReentrancy)));

        click(&mut sim, Vec2::new(400.0, 300.0));
        let stats = sim.frame(16.0, SIM_DT);
        assert_eq!(stats.launched, 0);
        let request = LaunchRequest {
            direction: Vec3::NEG_Z,
            power: 20.0,
        };
        assert_eq!(sim.launch(request).unwrap(), None);
        assert_eq!(sim.lifecycle().count_live(EntityKind::Projectile), 0);
    }

    #[test]
    fn test_reset_round_trip_through_frames() {
        let mut sim = sim();
        sim.trigger_reset().unwrap();

        let mut now = 0.0;
        let mut unblocked_at = None;
        while now < 4000.0 {
            now += 1000.0 / 60.0;
            sim.frame(now, SIM_DT);
            if unblocked_at.is_none() && !sim.is_input_blocked() {
                unblocked_at = Some(now);
            }
        }

        let unblocked_at = unblocked_at.unwrap();
        // clear wait 1300ms + descent 700ms
        assert!(unblocked_at >= 2000.0);
        assert_eq!(sim.reset().respawns_scheduled(), 10);
        assert_eq!(sim.reset_phase(), ResetPhase::Idle);
        assert_eq!(sim.pins_standing(), 10);
        assert_eq!(sim.lifecycle().scene().len(), 16);
    }
}
