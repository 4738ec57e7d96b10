//! Collect-and-respawn reset sequence
//!
//! `Idle -> Collecting -> WaitingForClear -> Respawning -> Idle`
//!
//! Collecting hands every present pin to the animation scheduler (sink and
//! spin, staggered), waits long enough for those to finish, then drops every
//! pin back in from above. Input stays blocked from the trigger until the
//! last pin has landed.

use std::f32::consts::{PI, TAU};

use glam::Vec3;

use super::anim::{AnimationScheduler, Easing, TweenTarget};
use super::lifecycle::{EntityId, Lifecycle};
use crate::error::SimError;
use crate::scene::{Scene, VisualId};
use crate::settings::ResetSettings;

/// Completion cues the reset sequence attaches to its tweens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCue {
    /// Sink animation done, visual can go
    Collected { entity: EntityId, visual: VisualId },
    /// Descent done, pin goes back to physics
    Landed { entity: EntityId, visual: VisualId },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResetPhase {
    Idle,
    Collecting,
    WaitingForClear { until_ms: f64 },
    Respawning { remaining: usize },
}

/// Where one snapshotted pin is in the sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPhase {
    Pending,
    /// Was already knocked down when collecting ran
    Absent,
    Sinking,
    Descending,
    Landed,
}

#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub entity: EntityId,
    pub stagger_ms: f64,
    pub phase: EntryPhase,
}

/// State of one reset in progress
#[derive(Debug, Clone)]
pub struct ResetSession {
    pub entries: Vec<SessionEntry>,
    pub started_ms: f64,
}

/// Drives the reset state machine
#[derive(Debug)]
pub struct ResetOrchestrator {
    settings: ResetSettings,
    phase: ResetPhase,
    session: Option<ResetSession>,
    input_blocked: bool,
    respawns_scheduled: usize,
    completed: u32,
}

impl ResetOrchestrator {
    pub fn new(settings: ResetSettings) -> Self {
        Self {
            settings,
            phase: ResetPhase::Idle,
            session: None,
            input_blocked: false,
            respawns_scheduled: 0,
            completed: 0,
        }
    }

    pub fn phase(&self) -> ResetPhase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == ResetPhase::Idle
    }

    pub fn is_input_blocked(&self) -> bool {
        self.input_blocked
    }

    pub fn session(&self) -> Option<&ResetSession> {
        self.session.as_ref()
    }

    /// Descent animations scheduled over the orchestrator's lifetime
    pub fn respawns_scheduled(&self) -> usize {
        self.respawns_scheduled
    }

    /// Resets that ran to completion
    pub fn completed(&self) -> u32 {
        self.completed
    }

    /// Start a reset over `obstacles`. Rejected unless idle.
    pub fn trigger(&mut self, now_ms: f64, obstacles: Vec<EntityId>) -> Result<(), SimError> {
        if self.phase != ResetPhase::Idle {
            log::warn!("Reset requested while {:?}, ignoring", self.phase);
            return Err(SimError::ResetReentrancy);
        }
        let stagger = self.settings.collect_stagger_ms;
        let entries = obstacles
            .into_iter()
            .enumerate()
            .map(|(i, entity)| SessionEntry {
                entity,
                stagger_ms: i as f64 * stagger,
                phase: EntryPhase::Pending,
            })
            .collect::<Vec<_>>();

        log::info!("Reset started with {} pins", entries.len());
        self.session = Some(ResetSession {
            entries,
            started_ms: now_ms,
        });
        self.input_blocked = true;
        self.phase = ResetPhase::Collecting;
        Ok(())
    }

    /// Run whatever the current phase does at `now_ms`
    pub fn advance<S: Scene>(
        &mut self,
        now_ms: f64,
        lifecycle: &mut Lifecycle<S>,
        anim: &mut AnimationScheduler<ResetCue>,
    ) {
        match self.phase {
            ResetPhase::Collecting => self.collect(now_ms, lifecycle, anim),
            ResetPhase::WaitingForClear { until_ms } if now_ms >= until_ms => {
                self.respawn(lifecycle, anim)
            }
            _ => {}
        }
    }

    fn collect<S: Scene>(
        &mut self,
        now_ms: f64,
        lifecycle: &mut Lifecycle<S>,
        anim: &mut AnimationScheduler<ResetCue>,
    ) {
        let Some(session) = self.session.as_mut() else {
            self.phase = ResetPhase::Idle;
            return;
        };

        for entry in &mut session.entries {
            let present = lifecycle
                .entity(entry.entity)
                .is_some_and(|e| e.is_present());
            let detached = if present {
                lifecycle.detach_physics(entry.entity)
            } else {
                None
            };
            let Some((visual, pose)) = detached else {
                entry.phase = EntryPhase::Absent;
                continue;
            };

            let sunk = Vec3::new(pose.position.x, self.settings.sink_y, pose.position.z);
            let (rx, ry, rz) = pose.rotation.to_euler(glam::EulerRot::XYZ);
            anim.schedule(
                TweenTarget::position(visual),
                pose.position,
                sunk,
                self.settings.collect_ms,
                entry.stagger_ms,
                Easing::CubicIn,
                Some(ResetCue::Collected {
                    entity: entry.entity,
                    visual,
                }),
            );
            anim.schedule(
                TweenTarget::rotation(visual),
                Vec3::new(rx, ry, rz),
                Vec3::new(TAU, ry, PI),
                self.settings.collect_ms,
                entry.stagger_ms,
                Easing::CubicIn,
                None,
            );
            entry.phase = EntryPhase::Sinking;
        }

        let until_ms = now_ms + self.settings.clear_delay_ms(session.entries.len());
        log::info!("Collecting done, respawn at {:.0}ms", until_ms);
        self.phase = ResetPhase::WaitingForClear { until_ms };
    }

    fn respawn<S: Scene>(
        &mut self,
        lifecycle: &mut Lifecycle<S>,
        anim: &mut AnimationScheduler<ResetCue>,
    ) {
        let Some(session) = self.session.as_mut() else {
            self.phase = ResetPhase::Idle;
            return;
        };

        let mut remaining = 0;
        for entry in &mut session.entries {
            // A sink that outlived the wait is cut short
            if let Some(visual) = lifecycle.entity(entry.entity).and_then(|e| e.visual()) {
                anim.cancel_visual(visual);
            }
            lifecycle.retire(entry.entity);

            let lift = self.settings.respawn_lift;
            let (visual, start) = match lifecycle.respawn_animated(entry.entity, lift) {
                Ok(spawned) => spawned,
                Err(e) => {
                    log::warn!("Respawn of {:?} skipped: {}", entry.entity, e);
                    entry.phase = EntryPhase::Landed;
                    continue;
                }
            };
            let Some(origin) = lifecycle.entity(entry.entity).map(|e| e.origin) else {
                entry.phase = EntryPhase::Landed;
                continue;
            };

            anim.schedule(
                TweenTarget::position(visual),
                start.position,
                origin.position,
                self.settings.respawn_ms,
                0.0,
                Easing::CubicOut,
                Some(ResetCue::Landed {
                    entity: entry.entity,
                    visual,
                }),
            );
            entry.phase = EntryPhase::Descending;
            self.respawns_scheduled += 1;
            remaining += 1;
        }

        log::info!("Respawning {} pins", remaining);
        self.phase = ResetPhase::Respawning { remaining };
        if remaining == 0 {
            self.finish();
        }
    }

    /// Route a completion cue from the animation scheduler
    pub fn on_cue<S: Scene>(&mut self, cue: ResetCue, lifecycle: &mut Lifecycle<S>) {
        match cue {
            ResetCue::Collected { entity, visual } => {
                lifecycle.finish_detached(entity, visual);
            }
            ResetCue::Landed { entity, visual } => {
                let ResetPhase::Respawning { remaining } = self.phase else {
                    log::warn!("Landing of {:?} outside a respawn", entity);
                    return;
                };
                if let Err(e) = lifecycle.settle(entity, visual) {
                    log::warn!("Settling {:?} failed: {}", entity, e);
                }
                if let Some(entry) = self
                    .session
                    .as_mut()
                    .and_then(|s| s.entries.iter_mut().find(|e| e.entity == entity))
                {
                    entry.phase = EntryPhase::Landed;
                }

                let remaining = remaining.saturating_sub(1);
                self.phase = ResetPhase::Respawning { remaining };
                if remaining == 0 {
                    self.finish();
                }
            }
        }
    }

    fn finish(&mut self) {
        self.session = None;
        self.input_blocked = false;
        self.phase = ResetPhase::Idle;
        self.completed += 1;
        log::info!("Reset complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pose;
    use crate::scene::SceneGraph;
    use crate::sim::lifecycle::{EntityKind, RemovalPolicy};
    use crate::sim::physics::{PhysicsWorld, ShapeDesc};

    const PIN: ShapeDesc = ShapeDesc::Cylinder {
        half_height: 0.55,
        radius: 0.15,
    };

    fn rack(count: usize) -> (Lifecycle<SceneGraph>, Vec<EntityId>) {
        let mut lc =
            Lifecycle::new(PhysicsWorld::default(), SceneGraph::new(), RemovalPolicy::default());
        let ids = (0..count)
            .map(|i| {
                let pose = Pose::at(Vec3::new(i as f32 * 0.7, 0.55, -17.0));
                lc.spawn(EntityKind::Obstacle, PIN, 1.5, pose, None).unwrap()
            })
            .collect();
        (lc, ids)
    }

    /// Advance orchestrator + animations in lockstep, returning the times
    /// at which input was observed unblocked
    fn run(
        reset: &mut ResetOrchestrator,
        lc: &mut Lifecycle<SceneGraph>,
        anim: &mut AnimationScheduler<ResetCue>,
        from_ms: f64,
        to_ms: f64,
    ) -> Vec<f64> {
        let mut unblocked = Vec::new();
        let mut now = from_ms;
        while now <= to_ms {
            let was_blocked = reset.is_input_blocked();
            reset.advance(now, lc, anim);
            let frame = anim.advance(now);
            for sample in frame.samples {
                lc.apply_animated(sample.target.visual, sample.target.channel, sample.value);
            }
            for cue in frame.completed {
                reset.on_cue(cue, lc);
            }
            if was_blocked && !reset.is_input_blocked() {
                unblocked.push(now);
            }
            now += 16.0;
        }
        unblocked
    }

    #[test]
    fn test_trigger_blocks_and_rejects_reentry() {
        let mut reset = ResetOrchestrator::new(ResetSettings::default());
        assert!(!reset.is_input_blocked());
        reset.trigger(0.0, vec![EntityId(1)]).unwrap();
        assert!(reset.is_input_blocked());
        assert_eq!(reset.phase(), ResetPhase::Collecting);

        assert!(matches!(reset.trigger(1.0, vec![]), Err(SimError::ResetReentrancy)));
        assert_eq!(reset.session().unwrap().entries.len(), 1);
    }

    #[test]
    fn test_collect_detaches_present_and_skips_absent() {
        let (mut lc, ids) = rack(4);
        lc.retire(ids[1]);
        let mut anim = AnimationScheduler::new();
        let mut reset = ResetOrchestrator::new(ResetSettings::default());

        reset.trigger(0.0, lc.obstacles()).unwrap();
        reset.advance(0.0, &mut lc, &mut anim);

        let session = reset.session().unwrap();
        let phases: Vec<_> = session.entries.iter().map(|e| e.phase).collect();
        assert_eq!(
            phases,
            vec![EntryPhase::Sinking, EntryPhase::Absent, EntryPhase::Sinking, EntryPhase::Sinking]
        );
        assert_eq!(session.entries[3].stagger_ms, 180.0);
        // Position + rotation per present pin
        assert_eq!(anim.active(), 6);
        assert_eq!(lc.physics().body_count(), 0);
        assert!(lc.tracked().is_empty());
        assert_eq!(reset.phase(), ResetPhase::WaitingForClear { until_ms: 1000.0 });
    }

    #[test]
    fn test_full_reset_restores_every_pin() {
        let (mut lc, ids) = rack(10);
        for &id in &ids[..3] {
            lc.retire(id);
        }
        let mut anim = AnimationScheduler::new();
        let mut reset = ResetOrchestrator::new(ResetSettings::default());

        reset.trigger(0.0, lc.obstacles()).unwrap();
        let unblocked = run(&mut reset, &mut lc, &mut anim, 0.0, 3000.0);

        assert_eq!(reset.respawns_scheduled(), 10);
        assert_eq!(reset.completed(), 1);
        assert!(reset.is_idle());
        assert!(reset.session().is_none());
        // Clear wait 1300ms, descent 700ms
        assert_eq!(unblocked.len(), 1);
        assert!(unblocked[0] >= 2000.0);

        for id in ids {
            let entity = lc.entity(id).unwrap();
            assert!(lc.is_tracked(id));
            assert_eq!(lc.body_pose(id).unwrap().position, entity.origin.position);
            assert_eq!(lc.body_velocity(id).unwrap(), Vec3::ZERO);
            let visual = entity.visual().unwrap();
            assert_eq!(lc.scene().transform(visual).unwrap(), entity.origin);
        }
        assert_eq!(lc.scene().len(), 10);
        assert_eq!(anim.active(), 0);
    }

    #[test]
    fn test_empty_reset_finishes_after_wait() {
        let (mut lc, _) = rack(0);
        let mut anim = AnimationScheduler::new();
        let mut reset = ResetOrchestrator::new(ResetSettings::default());

        reset.trigger(0.0, Vec::new()).unwrap();
        let unblocked = run(&mut reset, &mut lc, &mut anim, 0.0, 1000.0);
        assert_eq!(unblocked.len(), 1);
        assert!(unblocked[0] >= 800.0);
        assert_eq!(reset.respawns_scheduled(), 0);
    }

    #[test]
    fn test_stale_landing_ignored_when_idle() {
        let (mut lc, ids) = rack(1);
        let mut reset = ResetOrchestrator::new(ResetSettings::default());
        reset.on_cue(
            ResetCue::Landed {
                entity: ids[0],
                visual: VisualId(99),
            },
            &mut lc,
        );
        assert!(reset.is_idle());
        assert_eq!(reset.completed(), 0);
        assert!(lc.is_tracked(ids[0]));
    }
}
