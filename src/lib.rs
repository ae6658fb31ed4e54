//! Handle-based physics world bridge over rapier3d
//!
//! Callers build shapes, create bodies and vehicles, and step simulated time
//! through a [`PhysicsWorld`]. Every object is addressed by an opaque,
//! generation-checked handle; kernel handles never leave the crate.
//!
//! ```no_run
//! use glam::DVec3;
//! use sfsim_physics::{EngineRuntime, PhysicsWorld, RuntimeSettings, WorldSettings};
//!
//! # fn main() -> Result<(), sfsim_physics::PhysicsError> {
//! let runtime = EngineRuntime::init(RuntimeSettings::default())?;
//! let mut world = PhysicsWorld::new(&runtime, WorldSettings::default());
//!
//! let ball = world.create_sphere(1.0, DVec3::new(0.0, 10.0, 0.0))?;
//! world.step(1.0 / 60.0, 4);
//! println!("height: {}", world.translation(ball)?.y);
//!
//! world.destroy_body(ball)?;
//! drop(world);
//! runtime.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod engine;

pub use crate::core::handle::Handle;
pub use crate::engine::physics::{
    build_wheel, classify, may_collide_broadphase, may_collide_objects, BodyHandle, BodySettings,
    BroadPhaseLayer, MotionType, ObjectLayer, PhysicsError, PhysicsWorld, ShapeHandle, ShapeKind,
    ShapeSettings, ShapeValidationError, StaticCompoundSettings, VehicleHandle, WheelSettings,
    WorldSettings, DEFAULT_CONVEX_RADIUS, FIXED_TIMESTEP, SPEED_OF_LIGHT,
};
pub use crate::engine::runtime::{EngineRuntime, RuntimeSettings};
