use glam::{DMat3, DQuat, DVec3, Vec3};
use rapier3d::prelude::*;

use super::collision::ObjectLayer;
use super::shape::{ShapeHandle, ShapeSettings};
use super::world::PhysicsWorld;
use super::PhysicsError;
use crate::core::handle::Handle;
use crate::core::math;

/// Marker for body handles
pub enum BodyTag {}

/// Opaque, generation-checked reference to a body in a [`PhysicsWorld`]
pub type BodyHandle = Handle<BodyTag>;

/// Whether a body is immovable scenery or simulated under forces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionType {
    Static,
    Dynamic,
}

impl MotionType {
    /// The only object layer a body of this motion type may live on
    pub fn layer(self) -> ObjectLayer {
        match self {
            MotionType::Static => ObjectLayer::Static,
            MotionType::Dynamic => ObjectLayer::Dynamic,
        }
    }

    fn rigid_body_type(self) -> RigidBodyType {
        match self {
            MotionType::Static => RigidBodyType::Fixed,
            MotionType::Dynamic => RigidBodyType::Dynamic,
        }
    }
}

/// Everything needed to create a body
///
/// Takes the shape by value; clone the [`ShapeHandle`] first to share it
/// between several bodies.
#[derive(Debug, Clone)]
pub struct BodySettings {
    shape: ShapeHandle,
    position: DVec3,
    orientation: DQuat,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    motion_type: MotionType,
    layer: ObjectLayer,
    friction: Option<f32>,
    restitution: Option<f32>,
}

impl BodySettings {
    /// Body at the origin, at rest, on the layer matching `motion_type`
    pub fn new(shape: ShapeHandle, motion_type: MotionType) -> Self {
        Self {
            shape,
            position: DVec3::ZERO,
            orientation: DQuat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            motion_type,
            layer: motion_type.layer(),
            friction: None,
            restitution: None,
        }
    }

    /// Create a dynamic body (affected by forces and collisions)
    pub fn new_dynamic(shape: ShapeHandle) -> Self {
        Self::new(shape, MotionType::Dynamic)
    }

    /// Create a static body (completely immovable)
    pub fn new_static(shape: ShapeHandle) -> Self {
        Self::new(shape, MotionType::Static)
    }

    pub fn position(mut self, position: DVec3) -> Self {
        self.position = position;
        self
    }

    pub fn orientation(mut self, orientation: DQuat) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn linear_velocity(mut self, velocity: Vec3) -> Self {
        self.linear_velocity = velocity;
        self
    }

    /// Set the initial angular velocity (radians per second)
    pub fn angular_velocity(mut self, velocity: Vec3) -> Self {
        self.angular_velocity = velocity;
        self
    }

    /// Override the layer; it must still match the motion type
    pub fn layer(mut self, layer: ObjectLayer) -> Self {
        self.layer = layer;
        self
    }

    /// Set friction coefficient (0.0 = no friction)
    pub fn friction(mut self, friction: f32) -> Self {
        self.friction = Some(friction);
        self
    }

    /// Set restitution/bounciness (0.0 = no bounce, 1.0 = perfect bounce)
    pub fn restitution(mut self, restitution: f32) -> Self {
        self.restitution = Some(restitution);
        self
    }

    fn validate(&self) {
        if self.layer != self.motion_type.layer() {
            contract_violation!(
                "{:?} body cannot live on the {:?} layer",
                self.motion_type,
                self.layer
            );
        }
        if self.motion_type == MotionType::Dynamic && self.shape.mass() <= 0.0 {
            contract_violation!("dynamic body needs a shape with mass, got {:?}", self.shape.kind());
        }
        if !self.position.is_finite() {
            contract_violation!("non-finite initial position {:?}", self.position);
        }
        check_orientation(self.orientation);
        if !math::is_finite_vec3(self.linear_velocity) || !math::is_finite_vec3(self.angular_velocity) {
            contract_violation!("non-finite initial velocity");
        }
        if self.friction.is_some_and(|f| !(f >= 0.0)) {
            contract_violation!("friction must be non-negative");
        }
        if self.restitution.is_some_and(|r| !(r >= 0.0)) {
            contract_violation!("restitution must be non-negative");
        }
    }

    /// Build the rigid body with the default body policy
    fn build_rigid_body(&self) -> RigidBody {
        let builder = RigidBodyBuilder::new(self.motion_type.rigid_body_type())
            .position(math::to_na_isometry(self.position, self.orientation));

        match self.motion_type {
            MotionType::Static => builder.build(),
            // Undamped, swept collision so fast bodies do not tunnel
            MotionType::Dynamic => builder
                .linvel(math::to_na_vector(self.linear_velocity))
                .angvel(math::to_na_vector(self.angular_velocity))
                .linear_damping(0.0)
                .angular_damping(0.0)
                .ccd_enabled(true)
                .build(),
        }
    }

    fn build_collider(&self, default_friction: f32, default_restitution: f32) -> Collider {
        ColliderBuilder::new(self.shape.shared_shape().clone())
            .mass_properties(self.shape.mass_properties())
            .friction(self.friction.unwrap_or(default_friction))
            .restitution(self.restitution.unwrap_or(default_restitution))
            .restitution_combine_rule(CoefficientCombineRule::Max)
            .collision_groups(self.layer.interaction_groups())
            .build()
    }
}

fn check_orientation(orientation: DQuat) {
    if !orientation.is_finite() || !math::approx_equal(orientation.length(), 1.0, 1.0e-3) {
        contract_violation!("orientation {:?} is not a unit quaternion", orientation);
    }
}

/// Registry entry tying a bridge handle to its kernel objects
pub(crate) struct BodyRecord {
    pub(super) rigid_body: RigidBodyHandle,
    collider: ColliderHandle,
    shape: ShapeHandle,
    pub(super) motion_type: MotionType,
    pub(super) layer: ObjectLayer,
    /// Vehicles driving this body; it cannot be destroyed while non-zero
    pub(super) attached_vehicles: usize,
}

impl PhysicsWorld {
    /// Create a body and hand back its handle
    ///
    /// Dynamic bodies integrate without a gyroscopic term: the kernel's rigid
    /// bodies have no switch for it, so that part of the default body policy
    /// is not applied.
    ///
    /// # Panics
    /// A motion type / layer mismatch, a dynamic body on a massless shape, or a
    /// non-finite initial state is a contract violation.
    pub fn create_body(&mut self, settings: BodySettings) -> BodyHandle {
        settings.validate();

        let rigid_body = self.rigid_body_set.insert(settings.build_rigid_body());
        let collider = self.collider_set.insert_with_parent(
            settings.build_collider(self.settings.default_friction, self.settings.default_restitution),
            rigid_body,
            &mut self.rigid_body_set,
        );
        self.query_dirty = true;

        let handle = self.bodies.insert(BodyRecord {
            rigid_body,
            collider,
            shape: settings.shape,
            motion_type: settings.motion_type,
            layer: settings.layer,
            attached_vehicles: 0,
        });

        log::debug!(
            "created {:?} body {} at {:?}",
            settings.motion_type,
            handle,
            settings.position
        );
        handle
    }

    /// Dynamic unit-density sphere centered at `center`
    pub fn create_sphere(&mut self, radius: f32, center: DVec3) -> Result<BodyHandle, PhysicsError> {
        let shape = ShapeSettings::sphere(radius, 1.0).freeze()?;
        Ok(self.create_body(BodySettings::new_dynamic(shape).position(center)))
    }

    /// Remove a body from the kernel and invalidate its handle
    ///
    /// # Panics
    /// Destroying a body that still has a vehicle attached is a contract violation.
    pub fn destroy_body(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        let attached = self.body(handle)?.attached_vehicles;
        if attached > 0 {
            contract_violation!("body {} still drives {} vehicle(s)", handle, attached);
        }

        let record = self
            .bodies
            .remove(handle)
            .ok_or_else(|| PhysicsError::invalid_handle("body", handle.to_bits()))?;

        // Attached collider goes with it, releasing the body's shape reference
        self.rigid_body_set.remove(
            record.rigid_body,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        self.query_dirty = true;

        log::debug!("destroyed body {}", handle);
        Ok(())
    }

    /// Whether `handle` refers to a live body
    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.bodies.contains(handle)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn motion_type(&self, handle: BodyHandle) -> Result<MotionType, PhysicsError> {
        Ok(self.body(handle)?.motion_type)
    }

    pub fn layer(&self, handle: BodyHandle) -> Result<ObjectLayer, PhysicsError> {
        Ok(self.body(handle)?.layer)
    }

    /// Another reference to the body's shape
    pub fn shape(&self, handle: BodyHandle) -> Result<ShapeHandle, PhysicsError> {
        Ok(self.body(handle)?.shape.clone())
    }

    pub fn translation(&self, handle: BodyHandle) -> Result<DVec3, PhysicsError> {
        Ok(math::from_na_position(self.rigid_body(handle)?.translation()))
    }

    pub fn set_translation(&mut self, handle: BodyHandle, position: DVec3) -> Result<(), PhysicsError> {
        if !position.is_finite() {
            contract_violation!("non-finite position {:?}", position);
        }
        self.rigid_body_mut(handle)?
            .set_translation(math::to_na_translation(position), true);
        self.query_dirty = true;
        Ok(())
    }

    pub fn orientation(&self, handle: BodyHandle) -> Result<DQuat, PhysicsError> {
        Ok(math::from_na_rotation(self.rigid_body(handle)?.rotation()))
    }

    pub fn set_orientation(&mut self, handle: BodyHandle, orientation: DQuat) -> Result<(), PhysicsError> {
        check_orientation(orientation);
        self.rigid_body_mut(handle)?
            .set_rotation(math::to_na_rotation(orientation), true);
        self.query_dirty = true;
        Ok(())
    }

    /// Position and orientation together
    pub fn pose(&self, handle: BodyHandle) -> Result<(DVec3, DQuat), PhysicsError> {
        let body = self.rigid_body(handle)?;
        Ok((
            math::from_na_position(body.translation()),
            math::from_na_rotation(body.rotation()),
        ))
    }

    pub fn set_pose(&mut self, handle: BodyHandle, position: DVec3, orientation: DQuat) -> Result<(), PhysicsError> {
        if !position.is_finite() {
            contract_violation!("non-finite position {:?}", position);
        }
        check_orientation(orientation);
        self.rigid_body_mut(handle)?
            .set_position(math::to_na_isometry(position, orientation), true);
        self.query_dirty = true;
        Ok(())
    }

    /// Orientation as a rotation matrix
    pub fn orientation_matrix(&self, handle: BodyHandle) -> Result<DMat3, PhysicsError> {
        Ok(DMat3::from_quat(self.orientation(handle)?))
    }

    pub fn linear_velocity(&self, handle: BodyHandle) -> Result<Vec3, PhysicsError> {
        Ok(math::from_na_vector(self.rigid_body(handle)?.linvel()))
    }

    /// Ignored for static bodies, which never integrate velocity
    pub fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec3) -> Result<(), PhysicsError> {
        if !math::is_finite_vec3(velocity) {
            contract_violation!("non-finite linear velocity {:?}", velocity);
        }
        if let Some(body) = self.dynamic_body_mut(handle)? {
            body.set_linvel(math::to_na_vector(velocity), true);
        }
        Ok(())
    }

    pub fn angular_velocity(&self, handle: BodyHandle) -> Result<Vec3, PhysicsError> {
        Ok(math::from_na_vector(self.rigid_body(handle)?.angvel()))
    }

    /// Ignored for static bodies
    pub fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vec3) -> Result<(), PhysicsError> {
        if !math::is_finite_vec3(velocity) {
            contract_violation!("non-finite angular velocity {:?}", velocity);
        }
        if let Some(body) = self.dynamic_body_mut(handle)? {
            body.set_angvel(math::to_na_vector(velocity), true);
        }
        Ok(())
    }

    pub fn friction(&self, handle: BodyHandle) -> Result<f32, PhysicsError> {
        Ok(self.collider(handle)?.friction())
    }

    pub fn set_friction(&mut self, handle: BodyHandle, friction: f32) -> Result<(), PhysicsError> {
        if !(friction >= 0.0) {
            contract_violation!("friction must be non-negative, got {}", friction);
        }
        self.collider_mut(handle)?.set_friction(friction);
        Ok(())
    }

    pub fn restitution(&self, handle: BodyHandle) -> Result<f32, PhysicsError> {
        Ok(self.collider(handle)?.restitution())
    }

    pub fn set_restitution(&mut self, handle: BodyHandle, restitution: f32) -> Result<(), PhysicsError> {
        if !(restitution >= 0.0) {
            contract_violation!("restitution must be non-negative, got {}", restitution);
        }
        self.collider_mut(handle)?.set_restitution(restitution);
        Ok(())
    }

    /// Accumulate a force at the center of mass until the next `step`
    pub fn add_force(&mut self, handle: BodyHandle, force: Vec3) -> Result<(), PhysicsError> {
        if let Some(body) = self.dynamic_body_mut(handle)? {
            body.add_force(math::to_na_vector(force), true);
        }
        Ok(())
    }

    /// Accumulate a torque until the next `step`
    pub fn add_torque(&mut self, handle: BodyHandle, torque: Vec3) -> Result<(), PhysicsError> {
        if let Some(body) = self.dynamic_body_mut(handle)? {
            body.add_torque(math::to_na_vector(torque), true);
        }
        Ok(())
    }

    /// Change linear velocity immediately by `impulse / mass`
    pub fn add_impulse(&mut self, handle: BodyHandle, impulse: Vec3) -> Result<(), PhysicsError> {
        if let Some(body) = self.dynamic_body_mut(handle)? {
            body.apply_impulse(math::to_na_vector(impulse), true);
        }
        Ok(())
    }

    /// Change angular velocity immediately
    pub fn add_angular_impulse(&mut self, handle: BodyHandle, impulse: Vec3) -> Result<(), PhysicsError> {
        if let Some(body) = self.dynamic_body_mut(handle)? {
            body.apply_torque_impulse(math::to_na_vector(impulse), true);
        }
        Ok(())
    }

    /// Wake the body so the next `step` simulates it
    pub fn activate(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        self.rigid_body_mut(handle)?.wake_up(true);
        Ok(())
    }

    /// Put the body to sleep until something wakes it
    pub fn deactivate(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        self.rigid_body_mut(handle)?.sleep();
        Ok(())
    }

    pub fn is_active(&self, handle: BodyHandle) -> Result<bool, PhysicsError> {
        Ok(!self.rigid_body(handle)?.is_sleeping())
    }

    /// Mass from the body's shape, zero for massless scenery
    pub fn mass(&self, handle: BodyHandle) -> Result<f32, PhysicsError> {
        Ok(self.body(handle)?.shape.mass())
    }

    /// Body-space inertia tensor about the center of mass
    pub fn inertia_tensor(&self, handle: BodyHandle) -> Result<DMat3, PhysicsError> {
        Ok(self.body(handle)?.shape.inertia_tensor())
    }

    /// World-space center of mass
    pub fn center_of_mass(&self, handle: BodyHandle) -> Result<DVec3, PhysicsError> {
        let local_com = self.body(handle)?.shape.mass_properties().local_com;
        let body = self.rigid_body(handle)?;
        Ok(math::from_na_point(&(body.position() * local_com)))
    }

    pub(super) fn body(&self, handle: BodyHandle) -> Result<&BodyRecord, PhysicsError> {
        self.bodies
            .get(handle)
            .ok_or_else(|| PhysicsError::invalid_handle("body", handle.to_bits()))
    }

    pub(super) fn rigid_body(&self, handle: BodyHandle) -> Result<&RigidBody, PhysicsError> {
        let rigid_body = self.body(handle)?.rigid_body;
        self.rigid_body_set
            .get(rigid_body)
            .ok_or_else(|| PhysicsError::invalid_handle("body", handle.to_bits()))
    }

    fn rigid_body_mut(&mut self, handle: BodyHandle) -> Result<&mut RigidBody, PhysicsError> {
        let rigid_body = self.body(handle)?.rigid_body;
        self.rigid_body_set
            .get_mut(rigid_body)
            .ok_or_else(|| PhysicsError::invalid_handle("body", handle.to_bits()))
    }

    /// `None` for static bodies, which ignore velocity and force changes
    fn dynamic_body_mut(&mut self, handle: BodyHandle) -> Result<Option<&mut RigidBody>, PhysicsError> {
        if self.body(handle)?.motion_type == MotionType::Static {
            return Ok(None);
        }
        self.rigid_body_mut(handle).map(Some)
    }

    fn collider(&self, handle: BodyHandle) -> Result<&Collider, PhysicsError> {
        let collider = self.body(handle)?.collider;
        self.collider_set
            .get(collider)
            .ok_or_else(|| PhysicsError::invalid_handle("body", handle.to_bits()))
    }

    fn collider_mut(&mut self, handle: BodyHandle) -> Result<&mut Collider, PhysicsError> {
        let collider = self.body(handle)?.collider;
        self.collider_set
            .get_mut(collider)
            .ok_or_else(|| PhysicsError::invalid_handle("body", handle.to_bits()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::physics::world::{WorldSettings, FIXED_TIMESTEP};
    use crate::engine::physics::StaticCompoundSettings;
    use approx::assert_relative_eq;
    use glam::Quat;

    fn world() -> PhysicsWorld {
        PhysicsWorld::for_tests(WorldSettings::default())
    }

    fn unit_box() -> ShapeHandle {
        ShapeSettings::box_shape(Vec3::splat(0.5), 1.0).freeze().unwrap()
    }

    #[test]
    fn test_create_and_destroy() {
        let mut world = world();
        let h = world.create_body(BodySettings::new_dynamic(unit_box()));

        assert!(world.contains(h));
        assert_eq!(world.body_count(), 1);
        assert_eq!(world.motion_type(h).unwrap(), MotionType::Dynamic);
        assert_eq!(world.layer(h).unwrap(), ObjectLayer::Dynamic);

        world.destroy_body(h).unwrap();
        assert!(!world.contains(h));
        assert_eq!(world.body_count(), 0);
    }

    #[test]
    fn test_double_destroy_is_invalid_handle() {
        let mut world = world();
        let h = world.create_body(BodySettings::new_dynamic(unit_box()));
        world.destroy_body(h).unwrap();

        let err = world.destroy_body(h).unwrap_err();
        assert!(err.is_invalid_handle());
    }

    #[test]
    fn test_stale_handle_after_slot_reuse() {
        let mut world = world();
        let a = world.create_body(BodySettings::new_dynamic(unit_box()));
        world.destroy_body(a).unwrap();
        let b = world.create_body(BodySettings::new_dynamic(unit_box()));

        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(world.translation(a).unwrap_err().is_invalid_handle());
        assert!(world.set_friction(a, 0.5).unwrap_err().is_invalid_handle());
        assert!(world.translation(b).is_ok());
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let world = world();
        let forged = BodyHandle::from_bits(0xdead_beef);
        assert!(world.linear_velocity(forged).unwrap_err().is_invalid_handle());
    }

    #[test]
    fn test_translation_roundtrip() {
        let mut world = world();
        let h = world.create_body(BodySettings::new_dynamic(unit_box()));
        let p = DVec3::new(3.5, -12.25, 0.125);

        world.set_translation(h, p).unwrap();
        let back = world.translation(h).unwrap();
        assert_relative_eq!(back.x, p.x, epsilon = 1e-5);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-5);
        assert_relative_eq!(back.z, p.z, epsilon = 1e-5);
    }

    #[test]
    fn test_orientation_roundtrip() {
        let mut world = world();
        let h = world.create_body(BodySettings::new_dynamic(unit_box()));
        let q = DQuat::from_rotation_z(0.4);

        world.set_orientation(h, q).unwrap();
        let back = world.orientation(h).unwrap();
        assert!(back.dot(q).abs() > 1.0 - 1e-6);
    }

    #[test]
    fn test_getters_are_idempotent() {
        let mut world = world();
        let h = world.create_body(
            BodySettings::new_dynamic(unit_box())
                .position(DVec3::new(1.0, 2.0, 3.0))
                .linear_velocity(Vec3::new(0.5, 0.0, 0.0)),
        );
        world.step(FIXED_TIMESTEP, 1);

        assert_eq!(world.pose(h).unwrap(), world.pose(h).unwrap());
        assert_eq!(world.linear_velocity(h).unwrap(), world.linear_velocity(h).unwrap());
        assert_eq!(world.angular_velocity(h).unwrap(), world.angular_velocity(h).unwrap());
        assert_eq!(world.center_of_mass(h).unwrap(), world.center_of_mass(h).unwrap());
    }

    #[test]
    fn test_default_and_explicit_material() {
        let mut world = world();
        let plain = world.create_body(BodySettings::new_dynamic(unit_box()));
        let bouncy = world.create_body(
            BodySettings::new_dynamic(unit_box())
                .friction(0.9)
                .restitution(0.7),
        );

        assert_relative_eq!(world.friction(plain).unwrap(), 0.2);
        assert_relative_eq!(world.restitution(plain).unwrap(), 0.0);
        assert_relative_eq!(world.friction(bouncy).unwrap(), 0.9);

        world.set_restitution(plain, 0.3).unwrap();
        assert_relative_eq!(world.restitution(plain).unwrap(), 0.3);
    }

    #[test]
    fn test_impulse_is_immediate() {
        let mut world = PhysicsWorld::for_tests(WorldSettings::default().with_gravity(Vec3::ZERO));
        let h = world.create_body(BodySettings::new_dynamic(unit_box()));
        world.step(FIXED_TIMESTEP, 1);

        let mass = world.mass(h).unwrap();
        world.add_impulse(h, Vec3::new(0.0, 0.0, 2.0 * mass)).unwrap();

        assert_relative_eq!(world.linear_velocity(h).unwrap().z, 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_torque_clears_after_step() {
        let mut world = PhysicsWorld::for_tests(WorldSettings::default().with_gravity(Vec3::ZERO));
        let h = world.create_body(BodySettings::new_dynamic(unit_box()));
        world.step(FIXED_TIMESTEP, 1);

        // I = 1/6 for the unit box, so 10 Nm spins it up by 1 rad/s in one step
        world.add_torque(h, Vec3::new(0.0, 10.0, 0.0)).unwrap();
        assert_eq!(world.angular_velocity(h).unwrap(), Vec3::ZERO);
        world.step(FIXED_TIMESTEP, 1);
        let after_torque = world.angular_velocity(h).unwrap().y;
        assert_relative_eq!(after_torque, 1.0, epsilon = 1e-3);

        world.step(FIXED_TIMESTEP, 1);
        assert_relative_eq!(world.angular_velocity(h).unwrap().y, after_torque, epsilon = 1e-5);
    }

    #[test]
    fn test_angular_impulse_is_immediate() {
        let mut world = PhysicsWorld::for_tests(WorldSettings::default().with_gravity(Vec3::ZERO));
        let h = world.create_body(BodySettings::new_dynamic(unit_box()));
        world.step(FIXED_TIMESTEP, 1);

        world.add_angular_impulse(h, Vec3::new(0.0, 2.0 / 6.0, 0.0)).unwrap();

        assert_relative_eq!(world.angular_velocity(h).unwrap().y, 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_set_pose() {
        let mut world = world();
        let h = world.create_body(BodySettings::new_dynamic(unit_box()));
        let orientation = DQuat::from_rotation_y(0.5);
        world.set_pose(h, DVec3::new(1.0, 2.0, 3.0), orientation).unwrap();

        let (position, rotation) = world.pose(h).unwrap();
        assert!(position.abs_diff_eq(DVec3::new(1.0, 2.0, 3.0), 1e-6));
        assert!(rotation.abs_diff_eq(orientation, 1e-6));
        assert!(world.translation(h).unwrap().abs_diff_eq(position, 1e-12));
    }

    #[test]
    fn test_set_angular_velocity() {
        let mut world = world();
        let dynamic = world.create_body(BodySettings::new_dynamic(unit_box()));
        let fixed = world.create_body(BodySettings::new_static(unit_box()));

        world.set_angular_velocity(dynamic, Vec3::new(0.0, 0.0, 3.0)).unwrap();
        world.set_angular_velocity(fixed, Vec3::new(0.0, 0.0, 3.0)).unwrap();

        assert_eq!(world.angular_velocity(dynamic).unwrap(), Vec3::new(0.0, 0.0, 3.0));
        assert_eq!(world.angular_velocity(fixed).unwrap(), Vec3::ZERO);
    }

    #[test]
    fn test_static_body_ignores_velocity() {
        let mut world = world();
        let h = world.create_body(BodySettings::new_static(unit_box()));
        world.set_linear_velocity(h, Vec3::X).unwrap();
        world.add_force(h, Vec3::Y * 100.0).unwrap();
        world.step(FIXED_TIMESTEP, 1);

        assert_eq!(world.linear_velocity(h).unwrap(), Vec3::ZERO);
        assert_eq!(world.translation(h).unwrap(), DVec3::ZERO);
    }

    #[test]
    fn test_mass_properties_follow_shape() {
        let mut world = world();
        let h = world.create_body(
            BodySettings::new_dynamic(unit_box()).position(DVec3::new(1.0, 2.0, 3.0)),
        );

        assert_relative_eq!(world.mass(h).unwrap(), 1.0, epsilon = 1e-5);
        let com = world.center_of_mass(h).unwrap();
        assert_relative_eq!(com.y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(world.inertia_tensor(h).unwrap().x_axis.x, 1.0 / 6.0, epsilon = 1e-4);
    }

    #[test]
    fn test_shape_shared_between_bodies() {
        let mut world = world();
        let shape = unit_box();
        let a = world.create_body(BodySettings::new_dynamic(shape.clone()));
        let b = world.create_body(BodySettings::new_dynamic(shape.clone()));
        assert_eq!(shape.ref_count(), 3);

        world.destroy_body(a).unwrap();
        assert_eq!(shape.ref_count(), 2);
        world.destroy_body(b).unwrap();
        assert_eq!(shape.ref_count(), 1);
    }

    #[test]
    fn test_destroying_compound_body_releases_sub_shapes() {
        let mut world = world();
        let shape = StaticCompoundSettings::new()
            .with(ShapeSettings::box_shape(Vec3::splat(0.5), 1.0), Vec3::new(-2.0, 0.0, 0.0), Quat::IDENTITY)
            .with(ShapeSettings::box_shape(Vec3::splat(0.5), 1.0), Vec3::new(2.0, 0.0, 0.0), Quat::IDENTITY)
            .freeze()
            .unwrap();
        let refs = shape.kernel_refs();
        let h = world.create_body(BodySettings::new_static(shape));
        world.step(FIXED_TIMESTEP, 1);

        world.destroy_body(h).unwrap();
        assert!(refs.iter().all(|r| r.upgrade().is_none()));
    }

    #[test]
    fn test_activation() {
        let mut world = world();
        let h = world.create_body(BodySettings::new_dynamic(unit_box()));
        world.deactivate(h).unwrap();
        assert!(!world.is_active(h).unwrap());

        world.activate(h).unwrap();
        assert!(world.is_active(h).unwrap());
    }

    #[test]
    #[should_panic(expected = "not a unit quaternion")]
    fn test_unnormalized_orientation_is_fatal() {
        let mut world = world();
        let h = world.create_body(BodySettings::new_dynamic(unit_box()));
        let _ = world.set_orientation(h, DQuat::from_xyzw(0.0, 0.0, 0.0, 2.0));
    }

    #[test]
    #[should_panic(expected = "cannot live on")]
    fn test_static_on_dynamic_layer_is_fatal() {
        let mut world = world();
        world.create_body(BodySettings::new_static(unit_box()).layer(ObjectLayer::Dynamic));
    }

    #[test]
    #[should_panic(expected = "needs a shape with mass")]
    fn test_dynamic_mesh_is_fatal() {
        let mut world = world();
        let mesh = ShapeSettings::mesh(
            vec![Vec3::ZERO, Vec3::X, Vec3::Z],
            vec![[0, 1, 2]],
            1.0,
        )
        .freeze()
        .unwrap();
        world.create_body(BodySettings::new_dynamic(mesh));
    }
}
