//! Frame-driven simulation module
//!
//! Everything that decides what exists and where it is lives here:
//! - Fixed timestep physics, capped substeps per frame
//! - One owner for the body/visual pairing of every entity
//! - Stable iteration order (by entity ID, then spawn order)
//! - No rendering or platform dependencies; those sit behind `Scene` and `AudioSink`

pub mod aim;
pub mod anim;
pub mod context;
pub mod lane;
pub mod lifecycle;
pub mod physics;
pub mod reset;
pub mod timers;

pub use aim::{AimController, LaunchRequest, LaunchState, Modality};
pub use anim::{AnimationFrame, AnimationScheduler, Channel, Easing, Sample, TweenId, TweenTarget};
pub use context::{FrameStats, Simulation};
pub use lane::{LaneLayout, pin_poses};
pub use lifecycle::{DriveMode, Entity, EntityId, EntityKind, Lifecycle, RemovalPolicy, SyncReport};
pub use physics::{BodyDesc, BodyHandle, PhysicsWorld, ShapeDesc};
pub use reset::{EntryPhase, ResetCue, ResetOrchestrator, ResetPhase, ResetSession};
pub use timers::{TimerQueue, TimerToken};
