//! Entity registry and lifecycle
//!
//! Single owner of the pairing between bodies and visuals. Every entity is
//! in exactly one drive mode:
//! - `PhysicsDriven`: body and visual both live (or both gone); the visual
//!   follows the body each frame and the removal policy applies while tracked.
//! - `AnimationDriven`: the scheduler owns the transform. Sync never touches
//!   it; a body, if present, is kinematic and follows the animated pose.

use std::collections::BTreeMap;

use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::anim::Channel;
use super::physics::{BodyDesc, BodyHandle, PhysicsWorld, ShapeDesc};
use super::timers::{TimerQueue, TimerToken};
use crate::Pose;
use crate::error::SimError;
use crate::scene::{Scene, VisualId, VisualProxy};
use crate::settings::LifecycleSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// What an entity is; decides which removal rule applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Obstacle,
    Projectile,
    /// Permanent scenery, created once and never removed
    StaticGeometry,
}

/// Who writes the visual transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DriveMode {
    #[default]
    PhysicsDriven,
    AnimationDriven,
}

/// A registered entity
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub shape: ShapeDesc,
    pub mass: f32,
    /// Pose the entity was first spawned at; respawns return here
    pub origin: Pose,
    pub mode: DriveMode,
    body: Option<BodyHandle>,
    visual: Option<VisualId>,
    /// Last pose written to the visual
    pose: Pose,
    spawned_at_ms: f64,
    /// Pending forced-retirement timer
    expiry: Option<TimerToken>,
}

impl Entity {
    pub fn body(&self) -> Option<BodyHandle> {
        self.body
    }

    pub fn visual(&self) -> Option<VisualId> {
        self.visual
    }

    /// Visual still in the scene
    pub fn is_present(&self) -> bool {
        self.visual.is_some()
    }

    /// Neither body nor visual left
    pub fn is_retired(&self) -> bool {
        self.body.is_none() && self.visual.is_none()
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Subject to sync and removal once physics drives it.
    /// Massless entities are scenery and never tracked.
    pub fn is_trackable(&self) -> bool {
        self.mass > 0.0 && self.kind != EntityKind::StaticGeometry
    }

    /// Simulated right now: has a body and physics owns its transform
    pub fn is_simulated(&self) -> bool {
        self.body.is_some() && self.mode == DriveMode::PhysicsDriven
    }

    pub fn spawned_at_ms(&self) -> f64 {
        self.spawned_at_ms
    }
}

/// Thresholds deciding when a tracked entity is removed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemovalPolicy {
    pub tip_up_y: f32,
    pub tip_speed: f32,
    pub rest_speed: f32,
    pub projectile_timeout_ms: f64,
}

impl From<&LifecycleSettings> for RemovalPolicy {
    fn from(s: &LifecycleSettings) -> Self {
        Self {
            tip_up_y: s.tip_up_y,
            tip_speed: s.tip_speed,
            rest_speed: s.rest_speed,
            projectile_timeout_ms: s.projectile_timeout_ms,
        }
    }
}

impl Default for RemovalPolicy {
    fn default() -> Self {
        Self::from(&LifecycleSettings::default())
    }
}

impl RemovalPolicy {
    /// Strict comparisons: sitting exactly on a threshold keeps the entity
    pub fn should_retire(&self, kind: EntityKind, up_y: f32, speed: f32) -> bool {
        match kind {
            EntityKind::Obstacle => up_y.abs() < self.tip_up_y && speed < self.tip_speed,
            EntityKind::Projectile => speed < self.rest_speed,
            EntityKind::StaticGeometry => false,
        }
    }
}

/// Result of one sync pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Entities whose visual received a fresh pose
    pub synced: usize,
    /// Entities without a pose yet
    pub skipped: usize,
    pub retired: Vec<EntityId>,
}

/// Registry of all entities plus the world and scene they live in
pub struct Lifecycle<S: Scene> {
    physics: PhysicsWorld,
    scene: S,
    entities: BTreeMap<EntityId, Entity>,
    visual_owner: BTreeMap<VisualId, EntityId>,
    /// Entities subject to sync and removal, in spawn order
    tracked: Vec<EntityId>,
    timers: TimerQueue<EntityId>,
    policy: RemovalPolicy,
    now_ms: f64,
    next_entity: u32,
    next_visual: u32,
}

impl<S: Scene> Lifecycle<S> {
    pub fn new(physics: PhysicsWorld, scene: S, policy: RemovalPolicy) -> Self {
        Self {
            physics,
            scene,
            entities: BTreeMap::new(),
            visual_owner: BTreeMap::new(),
            tracked: Vec::new(),
            timers: TimerQueue::new(),
            policy,
            now_ms: 0.0,
            next_entity: 1,
            next_visual: 1,
        }
    }

    /// Set the clock used for spawn times and timeouts
    pub fn begin_frame(&mut self, now_ms: f64) {
        self.now_ms = now_ms;
    }

    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    /// Create a body + visual pair and register it.
    /// Only entities with positive mass are tracked.
    pub fn spawn(
        &mut self,
        kind: EntityKind,
        shape: ShapeDesc,
        mass: f32,
        pose: Pose,
        initial_velocity: Option<Vec3>,
    ) -> Result<EntityId, SimError> {
        let mut desc = BodyDesc::new(shape, mass, pose);
        if let Some(velocity) = initial_velocity {
            desc = desc.with_velocity(velocity);
        }
        if kind == EntityKind::Projectile {
            desc = desc.with_ccd();
        }
        let body = self.physics.add_body(&desc)?;

        let id = EntityId(self.next_entity);
        self.next_entity += 1;
        let visual = self.add_visual(id, kind, shape, pose);

        let mut entity = Entity {
            id,
            kind,
            shape,
            mass,
            origin: pose,
            mode: DriveMode::PhysicsDriven,
            body: Some(body),
            visual: Some(visual),
            pose,
            spawned_at_ms: self.now_ms,
            expiry: None,
        };

        if entity.is_trackable() {
            self.tracked.push(id);
        }
        if kind == EntityKind::Projectile {
            let due = self.now_ms + self.policy.projectile_timeout_ms;
            entity.expiry = Some(self.timers.schedule(due, id));
        }

        log::debug!("Spawned {:?} {:?} at {}", kind, id, pose.position);
        self.entities.insert(id, entity);
        Ok(id)
    }

    fn add_visual(
        &mut self,
        entity: EntityId,
        kind: EntityKind,
        shape: ShapeDesc,
        pose: Pose,
    ) -> VisualId {
        let id = VisualId(self.next_visual);
        self.next_visual += 1;
        self.scene.add_visual(VisualProxy {
            id,
            entity,
            kind,
            shape,
            pose,
        });
        self.visual_owner.insert(id, entity);
        id
    }

    fn drop_visual(&mut self, visual: VisualId) {
        self.scene.remove_visual(visual);
        self.visual_owner.remove(&visual);
    }

    /// Copy body poses onto visuals and apply the removal policy.
    pub fn sync_frame(&mut self) -> SyncReport {
        let mut report = SyncReport::default();
        let mut to_retire = Vec::new();

        for &id in self.tracked.iter().rev() {
            let Some(entity) = self.entities.get_mut(&id) else {
                continue;
            };
            if entity.mode != DriveMode::PhysicsDriven {
                continue;
            }
            let Some(body) = entity.body else {
                continue;
            };
            let Some(pose) = self.physics.query_pose(body) else {
                report.skipped += 1;
                continue;
            };

            entity.pose = pose;
            if let Some(visual) = entity.visual {
                self.scene.set_transform(visual, pose);
            }
            report.synced += 1;

            let Some(velocity) = self.physics.query_velocity(body) else {
                continue;
            };
            if self
                .policy
                .should_retire(entity.kind, pose.up_y(), velocity.length())
            {
                to_retire.push(id);
            }
        }

        // Deferred so removal never disturbs the pass above
        for id in to_retire {
            if self.retire(id) {
                report.retired.push(id);
            }
        }
        report
    }

    /// Remove body and visual, stop tracking, cancel pending timeouts.
    /// Returns false when there was nothing left to retire.
    pub fn retire(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.entities.get_mut(&id) else {
            log::debug!("retire: {:?} unknown, skipping", id);
            return false;
        };
        if entity.kind == EntityKind::StaticGeometry {
            return false;
        }

        let body = entity.body.take();
        let visual = entity.visual.take();
        let expiry = entity.expiry.take();
        entity.mode = DriveMode::PhysicsDriven;
        let kind = entity.kind;

        if let Some(token) = expiry {
            self.timers.cancel(token);
        }
        if let Some(body) = body {
            self.physics.remove_body(body);
        }
        if let Some(visual) = visual {
            self.drop_visual(visual);
        }
        self.tracked.retain(|&t| t != id);

        // Projectiles never come back, forget them entirely
        if kind == EntityKind::Projectile {
            self.entities.remove(&id);
        }

        let retired = body.is_some() || visual.is_some();
        if retired {
            log::debug!("Retired {:?} {:?}", kind, id);
        }
        retired
    }

    /// Recreate a retired obstacle at its origin, raised by `lift`, and
    /// hand it straight back to physics. Returns false if it was still live.
    pub fn respawn_at_origin(&mut self, id: EntityId, lift: f32) -> Result<bool, SimError> {
        let entity = self
            .entities
            .get(&id)
            .ok_or_else(|| SimError::StaleHandle(format!("{:?}", id)))?;
        if entity.kind != EntityKind::Obstacle || !entity.is_retired() {
            return Ok(false);
        }
        let (shape, mass, pose) = (entity.shape, entity.mass, entity.origin.lifted(lift));

        let body = self.physics.add_body(&BodyDesc::new(shape, mass, pose))?;
        let visual = self.add_visual(id, EntityKind::Obstacle, shape, pose);
        let mut trackable = false;
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.body = Some(body);
            entity.visual = Some(visual);
            entity.pose = pose;
            entity.mode = DriveMode::PhysicsDriven;
            trackable = entity.is_trackable();
        }
        if trackable {
            self.tracked.push(id);
        }
        log::debug!("Respawned {:?} at origin (+{})", id, lift);
        Ok(true)
    }

    /// Stop simulating an entity but keep its visual for animation.
    /// Returns the visual and the pose it was left at.
    pub fn detach_physics(&mut self, id: EntityId) -> Option<(VisualId, Pose)> {
        let entity = self.entities.get_mut(&id)?;
        if entity.kind == EntityKind::StaticGeometry {
            return None;
        }
        let visual = entity.visual?;
        let body = entity.body.take();
        let expiry = entity.expiry.take();
        entity.mode = DriveMode::AnimationDriven;
        let pose = entity.pose;

        if let Some(body) = body {
            self.physics.remove_body(body);
        }
        if let Some(token) = expiry {
            self.timers.cancel(token);
        }
        self.tracked.retain(|&t| t != id);
        Some((visual, pose))
    }

    /// Remove a detached visual once its exit animation finished.
    /// Ignored if the entity has since been given a different visual.
    pub fn finish_detached(&mut self, id: EntityId, visual: VisualId) -> bool {
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };
        if entity.visual != Some(visual) || entity.body.is_some() {
            return false;
        }
        entity.visual = None;
        entity.mode = DriveMode::PhysicsDriven;
        self.drop_visual(visual);
        true
    }

    /// Recreate a retired obstacle raised by `lift` as an animation-driven
    /// entity with a kinematic body. It is not tracked until `settle`.
    pub fn respawn_animated(
        &mut self,
        id: EntityId,
        lift: f32,
    ) -> Result<(VisualId, Pose), SimError> {
        let entity = self
            .entities
            .get(&id)
            .ok_or_else(|| SimError::StaleHandle(format!("{:?}", id)))?;
        if !entity.is_retired() {
            return Err(SimError::StaleHandle(format!("{:?} is still live", id)));
        }
        let (kind, shape, mass) = (entity.kind, entity.shape, entity.mass);
        let pose = entity.origin.lifted(lift);

        let body = self
            .physics
            .add_body(&BodyDesc::new(shape, mass, pose).kinematic())?;
        let visual = self.add_visual(id, kind, shape, pose);
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.body = Some(body);
            entity.visual = Some(visual);
            entity.pose = pose;
            entity.mode = DriveMode::AnimationDriven;
        }
        Ok((visual, pose))
    }

    /// Hand an animation-driven entity back to physics exactly at its
    /// origin, at rest, and start tracking it again.
    pub fn settle(&mut self, id: EntityId, visual: VisualId) -> Result<(), SimError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or_else(|| SimError::StaleHandle(format!("{:?}", id)))?;
        if entity.visual != Some(visual) || entity.mode != DriveMode::AnimationDriven {
            return Err(SimError::StaleHandle(format!("{:?} / {:?}", id, visual)));
        }
        let body = entity
            .body
            .ok_or_else(|| SimError::StaleHandle(format!("{:?} has no body", id)))?;
        let origin = entity.origin;
        let trackable = entity.is_trackable();
        entity.pose = origin;
        entity.mode = DriveMode::PhysicsDriven;

        self.physics.set_kinematic(body, false)?;
        self.physics.set_pose(body, origin)?;
        self.physics.set_velocity(body, Vec3::ZERO, Vec3::ZERO)?;
        self.scene.set_transform(visual, origin);
        if trackable && !self.tracked.contains(&id) {
            self.tracked.push(id);
        }
        Ok(())
    }

    /// Write an animated value. Ignored unless the owner is animation-driven.
    pub fn apply_animated(&mut self, visual: VisualId, channel: Channel, value: Vec3) -> bool {
        let Some(&id) = self.visual_owner.get(&visual) else {
            return false;
        };
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };
        if entity.mode != DriveMode::AnimationDriven || entity.visual != Some(visual) {
            return false;
        }

        match channel {
            Channel::Position => entity.pose.position = value,
            Channel::Rotation => {
                entity.pose.rotation = Quat::from_euler(EulerRot::XYZ, value.x, value.y, value.z)
            }
        }
        let pose = entity.pose;
        self.scene.set_transform(visual, pose);
        if let Some(body) = entity.body {
            if let Err(e) = self.physics.set_pose(body, pose) {
                log::warn!("Animated pose for {:?} dropped: {}", id, e);
            }
        }
        true
    }

    /// Retire projectiles whose hard timeout passed. Returns those retired.
    pub fn expire_due(&mut self) -> Vec<EntityId> {
        let mut expired = Vec::new();
        for (token, id) in self.timers.drain_due(self.now_ms) {
            // Only act if this timer is still the one the entity holds
            let current = self
                .entities
                .get(&id)
                .is_some_and(|e| e.expiry == Some(token) && !e.is_retired());
            if !current {
                continue;
            }
            if let Some(entity) = self.entities.get_mut(&id) {
                entity.expiry = None;
            }
            if self.retire(id) {
                log::debug!("{:?} timed out", id);
                expired.push(id);
            }
        }
        expired
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// All obstacle ids in spawn order, live or retired
    pub fn obstacles(&self) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.kind == EntityKind::Obstacle)
            .map(|e| e.id)
            .collect()
    }

    /// Entities of `kind` currently simulated. Pins mid-animation do not count.
    pub fn count_live(&self, kind: EntityKind) -> usize {
        self.entities
            .values()
            .filter(|e| e.kind == kind && e.is_simulated())
            .count()
    }

    pub fn tracked(&self) -> &[EntityId] {
        &self.tracked
    }

    pub fn is_tracked(&self, id: EntityId) -> bool {
        self.tracked.contains(&id)
    }

    /// Pose of the entity's body, if it has one
    pub fn body_pose(&self, id: EntityId) -> Option<Pose> {
        let body = self.entities.get(&id)?.body?;
        self.physics.query_pose(body)
    }

    pub fn body_velocity(&self, id: EntityId) -> Option<Vec3> {
        let body = self.entities.get(&id)?.body?;
        self.physics.query_velocity(body)
    }

    pub fn pending_timeouts(&self) -> usize {
        self.timers.len()
    }

    pub fn policy(&self) -> &RemovalPolicy {
        &self.policy
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.physics
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }
}
