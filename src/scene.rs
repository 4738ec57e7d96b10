//! Visual collaborator
//!
//! The simulation never owns render state. It hands proxies to a `Scene`,
//! writes their transforms, and removes them; whatever draws them lives
//! behind this trait. `SceneGraph` is the in-memory implementation used by
//! the headless driver and the tests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Pose;
use crate::sim::lifecycle::{EntityId, EntityKind};
use crate::sim::physics::ShapeDesc;

/// Identifier of a visual proxy (unique per creation, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VisualId(pub u32);

/// Renderable stand-in for a simulated entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualProxy {
    pub id: VisualId,
    /// Back-reference to the owning entity
    pub entity: EntityId,
    pub kind: EntityKind,
    pub shape: ShapeDesc,
    pub pose: Pose,
}

/// Render/scene collaborator contract
pub trait Scene {
    fn add_visual(&mut self, proxy: VisualProxy);
    fn remove_visual(&mut self, id: VisualId);
    fn set_transform(&mut self, id: VisualId, pose: Pose);
    /// Called once per tick after all writes
    fn present(&mut self);
}

/// In-memory scene: a map of live proxies plus a frame counter
#[derive(Debug, Default)]
pub struct SceneGraph {
    visuals: BTreeMap<VisualId, VisualProxy>,
    frames_presented: u64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: VisualId) -> bool {
        self.visuals.contains_key(&id)
    }

    pub fn get(&self, id: VisualId) -> Option<&VisualProxy> {
        self.visuals.get(&id)
    }

    pub fn transform(&self, id: VisualId) -> Option<Pose> {
        self.visuals.get(&id).map(|v| v.pose)
    }

    pub fn len(&self) -> usize {
        self.visuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }

    /// Number of live proxies of a given kind
    pub fn count_kind(&self, kind: EntityKind) -> usize {
        self.visuals.values().filter(|v| v.kind == kind).count()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn iter(&self) -> impl Iterator<Item = &VisualProxy> {
        self.visuals.values()
    }
}

impl Scene for SceneGraph {
    fn add_visual(&mut self, proxy: VisualProxy) {
        self.visuals.insert(proxy.id, proxy);
    }

    fn remove_visual(&mut self, id: VisualId) {
        self.visuals.remove(&id);
    }

    fn set_transform(&mut self, id: VisualId, pose: Pose) {
        if let Some(visual) = self.visuals.get_mut(&id) {
            visual.pose = pose;
        }
    }

    fn present(&mut self) {
        self.frames_presented += 1;
    }
}
