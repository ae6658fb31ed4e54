use std::sync::Arc;

use glam::Vec3;
use rapier3d::prelude::*;
use rayon::ThreadPool;

use super::body::{BodyRecord, BodyTag};
use super::vehicle::{Vehicle, VehicleTag};
use crate::core::handle::HandleTable;
use crate::core::math;
use crate::engine::runtime::EngineRuntime;

/// Conventional step size (60 steps per second)
pub const FIXED_TIMESTEP: f32 = 1.0 / 60.0;

/// Ceiling for body linear speed, in m/s
pub const SPEED_OF_LIGHT: f32 = 299_792_458.0;

/// Per-world configuration
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSettings {
    /// Global gravity (default: -9.81 m/s² in y-axis)
    pub gravity: Vec3,

    /// Expected number of bodies, used to presize the handle table
    pub body_capacity: usize,

    /// Friction for bodies created without an explicit value
    pub default_friction: f32,

    /// Restitution for bodies created without an explicit value
    pub default_restitution: f32,

    /// Linear speeds above this are clamped after every step
    pub max_linear_velocity: f32,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            body_capacity: 1024,
            default_friction: 0.2,
            default_restitution: 0.0,
            max_linear_velocity: SPEED_OF_LIGHT,
        }
    }
}

impl WorldSettings {
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_body_capacity(mut self, capacity: usize) -> Self {
        self.body_capacity = capacity;
        self
    }

    pub fn with_default_friction(mut self, friction: f32) -> Self {
        self.default_friction = friction;
        self
    }

    pub fn with_default_restitution(mut self, restitution: f32) -> Self {
        self.default_restitution = restitution;
        self
    }

    pub fn with_max_linear_velocity(mut self, max: f32) -> Self {
        self.max_linear_velocity = max;
        self
    }
}

/// Physics world: owns every body and vehicle and drives the rapier pipeline
///
/// All mutation goes through `&mut self`, so a `step` can never overlap another
/// call on the same world.
pub struct PhysicsWorld {
    pub(super) settings: WorldSettings,

    /// Gravity in kernel representation
    gravity: Vector<Real>,

    /// Integration parameters; `dt` is rewritten per substep
    integration_parameters: IntegrationParameters,

    /// Physics pipeline handles collision detection and solving
    physics_pipeline: PhysicsPipeline,

    /// Island manager for sleeping bodies
    pub(super) island_manager: IslandManager,

    /// Broad phase collision detection
    broad_phase: DefaultBroadPhase,

    /// Narrow phase collision detection
    narrow_phase: NarrowPhase,

    pub(super) impulse_joint_set: ImpulseJointSet,
    pub(super) multibody_joint_set: MultibodyJointSet,

    /// CCD solver for fast-moving objects
    ccd_solver: CCDSolver,

    /// Query structure used by wheel ray casts
    pub(super) query_pipeline: QueryPipeline,

    pub(super) rigid_body_set: RigidBodySet,
    pub(super) collider_set: ColliderSet,

    /// Bridge-side body registry
    pub(super) bodies: HandleTable<BodyTag, BodyRecord>,

    /// Attached vehicles, updated before every substep
    pub(super) vehicles: HandleTable<VehicleTag, Vehicle>,

    /// Set when bodies were added, removed or teleported since the query
    /// structure was last rebuilt
    pub(super) query_dirty: bool,

    step_count: u64,

    /// Worker pool captured from the runtime
    pool: Arc<ThreadPool>,
}

impl PhysicsWorld {
    /// Create an empty world running on `runtime`'s worker pool
    pub fn new(runtime: &EngineRuntime, settings: WorldSettings) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = FIXED_TIMESTEP;

        log::info!(
            "creating physics world (gravity {:?}, {} worker threads)",
            settings.gravity,
            runtime.worker_threads()
        );

        Self {
            gravity: math::to_na_vector(settings.gravity),
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            bodies: HandleTable::with_capacity(settings.body_capacity),
            vehicles: HandleTable::new(),
            query_dirty: false,
            step_count: 0,
            pool: runtime.pool(),
            settings,
        }
    }

    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        if !math::is_finite_vec3(gravity) {
            contract_violation!("non-finite gravity {:?}", gravity);
        }
        self.settings.gravity = gravity;
        self.gravity = math::to_na_vector(gravity);
    }

    pub fn gravity(&self) -> Vec3 {
        self.settings.gravity
    }

    /// Number of completed `step` calls
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Rebuild the spatial query structure after bulk body creation
    ///
    /// Purely a performance hint: `step` refreshes a stale structure on its own.
    pub fn optimize_broad_phase(&mut self) {
        self.refresh_query_pipeline();
        log::debug!("optimized broad phase for {} bodies", self.bodies.len());
    }

    /// Advance every active body by `delta_time` seconds
    ///
    /// The interval is split into `collision_substeps` equal passes; attached
    /// vehicles are updated before each one. Blocks until all substeps finish.
    ///
    /// # Panics
    /// A zero substep count or a non-positive / non-finite `delta_time` is a
    /// contract violation.
    pub fn step(&mut self, delta_time: f32, collision_substeps: u32) {
        if collision_substeps == 0 {
            contract_violation!("step needs at least one collision substep");
        }
        if !(delta_time.is_finite() && delta_time > 0.0) {
            contract_violation!("invalid step delta time {}", delta_time);
        }

        let pool = Arc::clone(&self.pool);
        pool.install(|| self.run_substeps(delta_time, collision_substeps));

        self.step_count += 1;
        log::trace!(
            "step {} done (dt {:.4}, {} substeps, {} bodies)",
            self.step_count,
            delta_time,
            collision_substeps,
            self.bodies.len()
        );
    }

    fn run_substeps(&mut self, delta_time: f32, collision_substeps: u32) {
        if self.query_dirty {
            self.refresh_query_pipeline();
        }

        let substep_dt = delta_time / collision_substeps as f32;
        self.integration_parameters.dt = substep_dt;

        for _ in 0..collision_substeps {
            for (_, vehicle) in self.vehicles.iter_mut() {
                vehicle.pre_substep(
                    substep_dt,
                    &mut self.rigid_body_set,
                    &self.collider_set,
                    &self.query_pipeline,
                );
            }

            self.physics_pipeline.step(
                &self.gravity,
                &self.integration_parameters,
                &mut self.island_manager,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.rigid_body_set,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                &mut self.ccd_solver,
                Some(&mut self.query_pipeline),
                &(),
                &(),
            );
        }

        self.finish_step();
    }

    /// Clear accumulated forces, clamp runaway speeds, drop per-step overrides
    fn finish_step(&mut self) {
        let max_speed = self.settings.max_linear_velocity;

        for (_, body) in self.rigid_body_set.iter_mut() {
            body.reset_forces(false);
            body.reset_torques(false);

            let linvel = *body.linvel();
            let speed = linvel.norm();
            if speed > max_speed {
                body.set_linvel(linvel * (max_speed / speed), false);
            }
        }

        for (_, vehicle) in self.vehicles.iter_mut() {
            vehicle.end_step();
        }
    }

    fn refresh_query_pipeline(&mut self) {
        self.query_pipeline.update(&self.rigid_body_set, &self.collider_set);
        self.query_dirty = false;
    }
}

impl Drop for PhysicsWorld {
    fn drop(&mut self) {
        log::debug!(
            "dropping physics world with {} bodies and {} vehicles",
            self.bodies.len(),
            self.vehicles.len()
        );
    }
}

#[cfg(test)]
impl PhysicsWorld {
    /// Single-threaded world with default settings
    pub(crate) fn for_tests(settings: WorldSettings) -> Self {
        let runtime = EngineRuntime::init(crate::engine::runtime::RuntimeSettings::default().worker_threads(1))
            .expect("test runtime");
        PhysicsWorld::new(&runtime, settings)
    }
}
