// Physics bridge over rapier3d
//
// Callers only ever see opaque handles; rapier handles, sets and pipelines stay
// inside `PhysicsWorld`.

/// Abort on a broken caller invariant
///
/// Contract violations are not recoverable: the message is logged, then the
/// process panics rather than risk corrupting the handle tables.
macro_rules! contract_violation {
    ($($arg:tt)*) => {{
        log::error!("contract violation: {}", format_args!($($arg)*));
        panic!("contract violation: {}", format_args!($($arg)*))
    }};
}
pub(crate) use contract_violation;

pub mod body;
mod collision;
pub mod shape;
pub mod vehicle;
mod world;

pub use body::{BodyHandle, BodySettings, MotionType};
pub use collision::{
    classify, may_collide_broadphase, may_collide_objects, BroadPhaseLayer, ObjectLayer,
};
pub use shape::{
    ShapeHandle, ShapeKind, ShapeSettings, ShapeValidationError, StaticCompoundSettings,
    DEFAULT_CONVEX_RADIUS,
};
pub use vehicle::{build_wheel, VehicleHandle, WheelSettings};
pub use world::{PhysicsWorld, WorldSettings, FIXED_TIMESTEP, SPEED_OF_LIGHT};

/// Errors returned by bridge operations
#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    /// Stale, destroyed or foreign handle; only the failing call is affected
    #[error("invalid {kind} handle: {handle}")]
    InvalidHandle { kind: &'static str, handle: u64 },

    #[error("shape validation failed: {0}")]
    ShapeValidation(#[from] ShapeValidationError),

    #[error("engine runtime error: {0}")]
    Runtime(String),
}

impl PhysicsError {
    pub(crate) fn invalid_handle(kind: &'static str, handle: u64) -> Self {
        log::warn!("rejected invalid {} handle {:#x}", kind, handle);
        PhysicsError::InvalidHandle { kind, handle }
    }

    pub fn is_invalid_handle(&self) -> bool {
        matches!(self, PhysicsError::InvalidHandle { .. })
    }
}
