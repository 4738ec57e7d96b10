//! Startup arrangement: the room and the pin rack

use std::f32::consts::FRAC_PI_2;

use glam::{Quat, Vec3};

use super::lifecycle::{EntityId, EntityKind, Lifecycle};
use super::physics::ShapeDesc;
use crate::Pose;
use crate::error::SimError;
use crate::scene::Scene;
use crate::settings::LaneSettings;

/// Ids of everything the lane spawned
#[derive(Debug, Clone, Default)]
pub struct LaneLayout {
    pub walls: Vec<EntityId>,
    /// Front row first, left to right
    pub pins: Vec<EntityId>,
}

/// Pin origin poses, front row first
pub fn pin_poses(lane: &LaneSettings) -> Vec<Pose> {
    let mut poses = Vec::with_capacity(lane.pin_count());
    for (row, &count) in lane.rows.iter().enumerate() {
        let z = lane.rack_z + row as f32 * lane.row_gap;
        let offset = -((count as f32 - 1.0) * lane.pin_spacing) / 2.0;
        for i in 0..count {
            let x = offset + i as f32 * lane.pin_spacing;
            poses.push(Pose::at(Vec3::new(x, lane.pin_height / 2.0, z)));
        }
    }
    poses
}

/// Room walls as (full size, pose)
fn wall_layout(lane: &LaneSettings) -> [(Vec3, Pose); 6] {
    let (w, l, h, t) = (
        lane.room_width,
        lane.room_length,
        lane.room_height,
        lane.wall_thickness,
    );
    let end_wall = Vec3::new(w, h, t);
    let side_wall = Vec3::new(l, h, t);
    let slab = Vec3::new(w, t, l);
    [
        (end_wall, Pose::at(Vec3::new(0.0, h / 2.0, -l / 2.0))),
        (end_wall, Pose::at(Vec3::new(0.0, h / 2.0, l / 2.0))),
        (
            side_wall,
            Pose::new(Vec3::new(-w / 2.0, h / 2.0, 0.0), Quat::from_rotation_y(FRAC_PI_2)),
        ),
        (
            side_wall,
            Pose::new(Vec3::new(w / 2.0, h / 2.0, 0.0), Quat::from_rotation_y(-FRAC_PI_2)),
        ),
        (slab, Pose::at(Vec3::new(0.0, h, 0.0))),
        // Floor top sits at y = 0
        (slab, Pose::at(Vec3::new(0.0, -t / 2.0, 0.0))),
    ]
}

/// Spawn the room and the rack. Any bad dimension aborts setup.
pub fn build<S: Scene>(
    lifecycle: &mut Lifecycle<S>,
    lane: &LaneSettings,
) -> Result<LaneLayout, SimError> {
    let mut layout = LaneLayout::default();

    for (size, pose) in wall_layout(lane) {
        let shape = ShapeDesc::cuboid(size.x, size.y, size.z);
        layout
            .walls
            .push(lifecycle.spawn(EntityKind::StaticGeometry, shape, 0.0, pose, None)?);
    }

    let pin = ShapeDesc::Cylinder {
        half_height: lane.pin_height / 2.0,
        radius: lane.pin_radius,
    };
    for pose in pin_poses(lane) {
        layout
            .pins
            .push(lifecycle.spawn(EntityKind::Obstacle, pin, lane.pin_mass, pose, None)?);
    }

    log::info!(
        "Lane ready: {} walls, {} pins",
        layout.walls.len(),
        layout.pins.len()
    );
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneGraph;
    use crate::sim::lifecycle::RemovalPolicy;
    use crate::sim::physics::PhysicsWorld;

    #[test]
    fn test_rack_positions() {
        let poses = pin_poses(&LaneSettings::default());
        assert_eq!(poses.len(), 10);
        assert!(poses[0].position.abs_diff_eq(Vec3::new(-1.05, 0.55, -17.0), 1e-5));
        assert!(poses[3].position.abs_diff_eq(Vec3::new(1.05, 0.55, -17.0), 1e-5));
        assert!(poses[4].position.abs_diff_eq(Vec3::new(-0.7, 0.55, -15.9), 1e-5));
        assert!(poses[9].position.abs_diff_eq(Vec3::new(0.0, 0.55, -13.7), 1e-5));
    }

    fn lifecycle() -> Lifecycle<SceneGraph> {
        Lifecycle::new(PhysicsWorld::default(), SceneGraph::new(), RemovalPolicy::default())
    }

    #[test]
    fn test_build_spawns_static_room_and_tracked_pins() {
        let mut lc = lifecycle();
        let layout = build(&mut lc, &LaneSettings::default()).unwrap();

        assert_eq!(layout.walls.len(), 6);
        assert_eq!(layout.pins.len(), 10);
        assert_eq!(lc.tracked(), layout.pins.as_slice());
        assert_eq!(lc.scene().count_kind(EntityKind::StaticGeometry), 6);
        assert_eq!(lc.scene().count_kind(EntityKind::Obstacle), 10);
        assert_eq!(lc.obstacles(), layout.pins);
    }

    #[test]
    fn test_bad_dimension_aborts() {
        let mut lc = lifecycle();
        let lane = LaneSettings {
            pin_radius: 0.0,
            ..LaneSettings::default()
        };
        assert!(matches!(build(&mut lc, &lane), Err(SimError::InvalidShapeDescriptor(_))));
    }

    #[test]
    fn test_rack_stands_still() {
        let mut lc = lifecycle();
        let layout = build(&mut lc, &LaneSettings::default()).unwrap();
        for _ in 0..60 {
            lc.physics_mut().step(crate::consts::SIM_DT);
            assert!(lc.sync_frame().retired.is_empty());
        }
        for id in layout.pins {
            assert!(lc.body_pose(id).unwrap().up_y() > 0.95);
        }
    }
}
