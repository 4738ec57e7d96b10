//! Rigid-body world adapter
//!
//! Wraps a rapier world behind glam-typed handles and poses. Time advances
//! in fixed substeps with a hard cap per call; any time beyond the cap is
//! dropped rather than simulated.

use glam::{Quat, Vec3};
use rapier3d::na::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use rapier3d::prelude::{
    CCDSolver, ColliderBuilder, ColliderSet, DefaultBroadPhase, ImpulseJointSet,
    IntegrationParameters, IslandManager, MultibodyJointSet, NarrowPhase, PhysicsPipeline,
    RigidBodyBuilder, RigidBodyHandle, RigidBodySet, RigidBodyType,
};
use serde::{Deserialize, Serialize};

use crate::Pose;
use crate::error::SimError;
use crate::settings::PhysicsSettings;

/// Opaque handle to a body in the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(RigidBodyHandle);

/// Collision shape descriptor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ShapeDesc {
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
    /// Upright (Y axis) cylinder
    Cylinder { half_height: f32, radius: f32 },
}

impl ShapeDesc {
    /// Full-size box from its dimensions
    pub fn cuboid(sx: f32, sy: f32, sz: f32) -> Self {
        ShapeDesc::Box {
            half_extents: Vec3::new(sx, sy, sz) * 0.5,
        }
    }

    /// Reject non-finite or non-positive dimensions
    pub fn validate(&self) -> Result<(), SimError> {
        let ok = |v: f32| v.is_finite() && v > 0.0;
        let valid = match *self {
            ShapeDesc::Box { half_extents: h } => ok(h.x) && ok(h.y) && ok(h.z),
            ShapeDesc::Sphere { radius } => ok(radius),
            ShapeDesc::Cylinder {
                half_height,
                radius,
            } => ok(half_height) && ok(radius),
        };
        if valid {
            Ok(())
        } else {
            Err(SimError::InvalidShapeDescriptor(format!("{:?}", self)))
        }
    }

    fn collider(&self) -> ColliderBuilder {
        match *self {
            ShapeDesc::Box { half_extents: h } => ColliderBuilder::cuboid(h.x, h.y, h.z),
            ShapeDesc::Sphere { radius } => ColliderBuilder::ball(radius),
            ShapeDesc::Cylinder {
                half_height,
                radius,
            } => ColliderBuilder::cylinder(half_height, radius),
        }
    }
}

/// Everything needed to create a body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyDesc {
    pub shape: ShapeDesc,
    /// 0 or less = fixed scenery
    pub mass: f32,
    pub pose: Pose,
    pub linear_velocity: Vec3,
    /// Start as a kinematic body driven by explicit poses
    pub kinematic: bool,
    /// Continuous collision detection for fast movers
    pub ccd: bool,
}

impl BodyDesc {
    pub fn new(shape: ShapeDesc, mass: f32, pose: Pose) -> Self {
        Self {
            shape,
            mass,
            pose,
            linear_velocity: Vec3::ZERO,
            kinematic: false,
            ccd: false,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn kinematic(mut self) -> Self {
        self.kinematic = true;
        self
    }

    pub fn with_ccd(mut self) -> Self {
        self.ccd = true;
        self
    }
}

/// The rigid-body simulation
pub struct PhysicsWorld {
    gravity: Vector3<f32>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    friction: f32,
    fixed_dt: f32,
    max_substeps: u32,
    accumulator: f32,
    steps_taken: u64,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(&PhysicsSettings::default())
    }
}

impl PhysicsWorld {
    pub fn new(settings: &PhysicsSettings) -> Self {
        let fixed_dt = if settings.fixed_dt > 0.0 {
            settings.fixed_dt
        } else {
            crate::consts::SIM_DT
        };
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = fixed_dt;

        Self {
            gravity: Vector3::new(0.0, -settings.gravity, 0.0),
            integration_parameters,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            friction: settings.friction,
            fixed_dt,
            max_substeps: settings.max_substeps.max(1),
            accumulator: 0.0,
            steps_taken: 0,
        }
    }

    /// Advance by `dt` seconds of wall time. Returns the substeps run.
    pub fn step(&mut self, dt: f32) -> u32 {
        if !dt.is_finite() || dt <= 0.0 {
            return 0;
        }
        self.accumulator += dt;

        let mut substeps = 0;
        while self.accumulator >= self.fixed_dt && substeps < self.max_substeps {
            self.step_fixed();
            self.accumulator -= self.fixed_dt;
            substeps += 1;
        }

        // Spiral-of-death guard: drop the time we couldn't afford
        if self.accumulator >= self.fixed_dt {
            log::debug!(
                "Dropping {:.3}s of simulation time after {} substeps",
                self.accumulator,
                substeps
            );
            self.accumulator = 0.0;
        }
        substeps
    }

    fn step_fixed(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
        self.steps_taken += 1;
    }

    /// Create a body with a single collider
    pub fn add_body(&mut self, desc: &BodyDesc) -> Result<BodyHandle, SimError> {
        desc.shape.validate()?;
        if !desc.mass.is_finite() {
            return Err(SimError::InvalidShapeDescriptor(format!(
                "mass {}",
                desc.mass
            )));
        }

        let movable = desc.mass > 0.0;
        let builder = if !movable {
            RigidBodyBuilder::fixed()
        } else if desc.kinematic {
            RigidBodyBuilder::kinematic_position_based()
        } else {
            RigidBodyBuilder::dynamic()
        };
        let body = builder
            .position(to_isometry(desc.pose))
            .linvel(to_vector(desc.linear_velocity))
            .can_sleep(false)
            .ccd_enabled(movable && desc.ccd)
            .build();
        let handle = self.bodies.insert(body);

        let mut collider = desc.shape.collider().friction(self.friction);
        if movable {
            collider = collider.mass(desc.mass);
        }
        self.colliders
            .insert_with_parent(collider.build(), handle, &mut self.bodies);

        Ok(BodyHandle(handle))
    }

    /// Remove a body and its collider. Unknown handles are a no-op.
    pub fn remove_body(&mut self, handle: BodyHandle) -> bool {
        self.bodies
            .remove(
                handle.0,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some()
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.bodies.contains(handle.0)
    }

    /// Current pose, `None` if the body is gone
    pub fn query_pose(&self, handle: BodyHandle) -> Option<Pose> {
        self.bodies
            .get(handle.0)
            .map(|body| from_isometry(body.position()))
    }

    /// Linear velocity of a dynamic body. Fixed and kinematic bodies report nothing.
    pub fn query_velocity(&self, handle: BodyHandle) -> Option<Vec3> {
        self.bodies
            .get(handle.0)
            .filter(|body| body.is_dynamic())
            .map(|body| from_vector(body.linvel()))
    }

    pub fn query_angular_velocity(&self, handle: BodyHandle) -> Option<Vec3> {
        self.bodies
            .get(handle.0)
            .filter(|body| body.is_dynamic())
            .map(|body| from_vector(body.angvel()))
    }

    /// Teleport a body. Kinematic bodies move there during the next step.
    pub fn set_pose(&mut self, handle: BodyHandle, pose: Pose) -> Result<(), SimError> {
        let body = self
            .bodies
            .get_mut(handle.0)
            .ok_or_else(|| SimError::StaleHandle(format!("{:?}", handle)))?;
        let iso = to_isometry(pose);
        if body.is_kinematic() {
            body.set_next_kinematic_position(iso);
        } else {
            body.set_position(iso, true);
        }
        Ok(())
    }

    pub fn set_velocity(
        &mut self,
        handle: BodyHandle,
        linear: Vec3,
        angular: Vec3,
    ) -> Result<(), SimError> {
        let body = self
            .bodies
            .get_mut(handle.0)
            .ok_or_else(|| SimError::StaleHandle(format!("{:?}", handle)))?;
        body.set_linvel(to_vector(linear), true);
        body.set_angvel(to_vector(angular), true);
        Ok(())
    }

    /// Switch between animation-driven (kinematic) and simulated (dynamic)
    pub fn set_kinematic(&mut self, handle: BodyHandle, kinematic: bool) -> Result<(), SimError> {
        let body = self
            .bodies
            .get_mut(handle.0)
            .ok_or_else(|| SimError::StaleHandle(format!("{:?}", handle)))?;
        if body.is_fixed() {
            return Ok(());
        }
        let body_type = if kinematic {
            RigidBodyType::KinematicPositionBased
        } else {
            RigidBodyType::Dynamic
        };
        body.set_body_type(body_type, true);
        Ok(())
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Total fixed steps simulated since creation
    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }
}

#[inline]
fn to_vector(v: Vec3) -> Vector3<f32> {
    Vector3::new(v.x, v.y, v.z)
}

#[inline]
fn from_vector(v: &Vector3<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn to_isometry(pose: Pose) -> Isometry3<f32> {
    let q = pose.rotation.normalize();
    let rotation = UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z));
    let p = pose.position;
    Isometry3::from_parts(Translation3::new(p.x, p.y, p.z), rotation)
}

fn from_isometry(iso: &Isometry3<f32>) -> Pose {
    let t = &iso.translation.vector;
    // coords are stored (i, j, k, w)
    let c = &iso.rotation.coords;
    Pose::new(Vec3::new(t.x, t.y, t.z), Quat::from_xyzw(c.x, c.y, c.z, c.w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;

    fn floor() -> BodyDesc {
        BodyDesc::new(ShapeDesc::cuboid(10.0, 1.0, 40.0), 0.0, Pose::at(Vec3::new(0.0, -0.5, 0.0)))
    }

    #[test]
    fn test_step_is_bounded() {
        let mut world = PhysicsWorld::default();
        assert_eq!(world.step(5.0), 10);
        assert_eq!(world.steps_taken(), 10);
        // Excess time was dropped, not carried over
        assert_eq!(world.step(SIM_DT * 0.5), 0);
        assert_eq!(world.step(0.0), 0);
        assert_eq!(world.step(f32::NAN), 0);
    }

    #[test]
    fn test_step_accumulates_partial_frames() {
        let mut world = PhysicsWorld::default();
        let mut total = 0;
        for _ in 0..60 {
            total += world.step(SIM_DT * 0.5);
        }
        assert!((29..=30).contains(&total), "ran {} steps", total);
    }

    #[test]
    fn test_body_falls_under_gravity() {
        let mut world = PhysicsWorld::default();
        let ball = world
            .add_body(&BodyDesc::new(
                ShapeDesc::Sphere { radius: 0.4 },
                35.0,
                Pose::at(Vec3::new(0.0, 5.0, 0.0)),
            ))
            .unwrap();

        for _ in 0..20 {
            world.step(SIM_DT);
        }
        let pose = world.query_pose(ball).unwrap();
        assert!(pose.position.y < 5.0);
        assert!(world.query_velocity(ball).unwrap().y < 0.0);
    }

    #[test]
    fn test_fixed_body_reports_no_velocity() {
        let mut world = PhysicsWorld::default();
        let handle = world.add_body(&floor()).unwrap();
        assert!(world.query_pose(handle).is_some());
        assert!(world.query_velocity(handle).is_none());
        world.step(SIM_DT);
        assert_eq!(world.query_pose(handle).unwrap().position, Vec3::new(0.0, -0.5, 0.0));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut world = PhysicsWorld::default();
        let handle = world
            .add_body(&BodyDesc::new(ShapeDesc::Sphere { radius: 1.0 }, 1.0, Pose::IDENTITY))
            .unwrap();
        assert_eq!(world.body_count(), 1);
        assert!(world.remove_body(handle));
        assert!(!world.remove_body(handle));
        assert_eq!(world.body_count(), 0);
        assert!(world.query_pose(handle).is_none());
        assert!(world.query_velocity(handle).is_none());
        assert!(matches!(
            world.set_pose(handle, Pose::IDENTITY),
            Err(SimError::StaleHandle(_))
        ));
    }

    #[test]
    fn test_invalid_shapes_rejected() {
        let mut world = PhysicsWorld::default();
        for shape in [
            ShapeDesc::Sphere { radius: 0.0 },
            ShapeDesc::Sphere { radius: f32::NAN },
            ShapeDesc::Cylinder {
                half_height: -1.0,
                radius: 0.2,
            },
            ShapeDesc::cuboid(1.0, 0.0, 1.0),
        ] {
            let result = world.add_body(&BodyDesc::new(shape, 1.0, Pose::IDENTITY));
            assert!(matches!(result, Err(SimError::InvalidShapeDescriptor(_))));
        }
        assert_eq!(world.body_count(), 0);
    }

    #[test]
    fn test_pose_roundtrip() {
        let mut world = PhysicsWorld::default();
        let rotation = Quat::from_rotation_z(0.7);
        let pose = Pose::new(Vec3::new(1.0, 2.0, 3.0), rotation);
        let handle = world
            .add_body(&BodyDesc::new(ShapeDesc::Sphere { radius: 0.5 }, 1.0, pose))
            .unwrap();
        let read = world.query_pose(handle).unwrap();
        assert!(read.position.abs_diff_eq(pose.position, 1e-6));
        assert!(read.rotation.abs_diff_eq(rotation, 1e-6));
    }

    #[test]
    fn test_teleport_and_velocity_reset() {
        let mut world = PhysicsWorld::default();
        let handle = world
            .add_body(
                &BodyDesc::new(ShapeDesc::Sphere { radius: 0.5 }, 1.0, Pose::IDENTITY)
                    .with_velocity(Vec3::new(3.0, 0.0, 0.0)),
            )
            .unwrap();
        assert_eq!(world.query_velocity(handle).unwrap(), Vec3::new(3.0, 0.0, 0.0));

        let target = Pose::at(Vec3::new(0.0, 7.0, 0.0));
        world.set_pose(handle, target).unwrap();
        world.set_velocity(handle, Vec3::ZERO, Vec3::ZERO).unwrap();
        assert_eq!(world.query_pose(handle).unwrap().position, target.position);
        assert_eq!(world.query_velocity(handle).unwrap(), Vec3::ZERO);
    }

    #[test]
    fn test_kinematic_bodies_ignore_gravity() {
        let mut world = PhysicsWorld::default();
        let start = Pose::at(Vec3::new(0.0, 5.0, 0.0));
        let handle = world
            .add_body(&BodyDesc::new(ShapeDesc::Sphere { radius: 0.5 }, 1.0, start).kinematic())
            .unwrap();
        assert!(world.query_velocity(handle).is_none());
        for _ in 0..10 {
            world.step(SIM_DT);
        }
        assert_eq!(world.query_pose(handle).unwrap().position, start.position);

        world.set_kinematic(handle, false).unwrap();
        assert!(world.query_velocity(handle).is_some());
        for _ in 0..10 {
            world.step(SIM_DT);
        }
        assert!(world.query_pose(handle).unwrap().position.y < 5.0);
    }
}
