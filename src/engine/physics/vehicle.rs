// Ray-cast vehicles driving a dynamic body
//
// A vehicle is assembled from wheel settings, attached to one dynamic body and
// from then on updated before every collision substep. Wheel count is fixed at
// attach time; an out-of-range wheel index is a contract violation.

use glam::{DMat4, DQuat, DVec4, Vec3};
use rapier3d::control::{DynamicRayCastVehicleController, WheelTuning};
use rapier3d::prelude::*;

use super::body::{BodyHandle, MotionType};
use super::world::PhysicsWorld;
use super::PhysicsError;
use crate::core::handle::Handle;
use crate::core::math;

/// Marker for vehicle handles
pub enum VehicleTag {}

/// Opaque, generation-checked reference to an attached vehicle
pub type VehicleHandle = Handle<VehicleTag>;

/// Suspension length may sit this close to the minimum and still count as bottomed out
const HARD_POINT_TOLERANCE: f32 = 1.0e-3;

/// Description of one wheel, in the driven body's local space
///
/// Immutable once attached. Inertia, angular damping and width describe the
/// wheel for callers but are not consumed by the ray-cast tire model.
#[derive(Debug, Clone, PartialEq)]
pub struct WheelSettings {
    /// Suspension mount point
    pub position: Vec3,

    /// Wheel up direction; the suspension extends along `-up`
    pub up: Vec3,

    /// Rolling direction with zero steering
    pub forward: Vec3,

    /// Axis the wheel steers around
    pub steering_axis: Vec3,

    pub width: f32,
    pub radius: f32,
    pub inertia: f32,
    pub angular_damping: f32,

    /// Shortest suspension length, reached when the wheel hits the hard point
    pub suspension_min: f32,

    /// Longest suspension length, also the spring rest length
    pub suspension_max: f32,

    pub spring_stiffness: f32,
    pub spring_damping: f32,

    /// Brake torque applied at full brake input
    pub max_brake_torque: f32,

    /// Steering angle at full steering input (radians)
    pub max_steer_angle: f32,
}

impl Default for WheelSettings {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            up: Vec3::Y,
            forward: Vec3::Z,
            steering_axis: Vec3::Y,
            width: 0.1,
            radius: 0.3,
            inertia: 0.9,
            angular_damping: 0.2,
            suspension_min: 0.3,
            suspension_max: 0.5,
            spring_stiffness: 5.88,
            spring_damping: 0.88,
            max_brake_torque: 1500.0,
            max_steer_angle: 70.0_f32.to_radians(),
        }
    }
}

impl WheelSettings {
    /// Default wheel mounted at `position`
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn width(mut self, width: f32) -> Self {
        self.width = width;
        self
    }

    /// Set wheel up and forward axes; steering follows the up axis
    pub fn axes(mut self, up: Vec3, forward: Vec3) -> Self {
        self.up = up;
        self.forward = forward;
        self.steering_axis = up;
        self
    }

    pub fn suspension(mut self, min: f32, max: f32) -> Self {
        self.suspension_min = min;
        self.suspension_max = max;
        self
    }

    pub fn spring(mut self, stiffness: f32, damping: f32) -> Self {
        self.spring_stiffness = stiffness;
        self.spring_damping = damping;
        self
    }

    pub fn max_brake_torque(mut self, torque: f32) -> Self {
        self.max_brake_torque = torque;
        self
    }

    pub fn max_steer_angle(mut self, angle: f32) -> Self {
        self.max_steer_angle = angle;
        self
    }

    fn validate(&self, index: usize) {
        let vectors = [self.position, self.up, self.forward, self.steering_axis];
        if !vectors.iter().all(|v| math::is_finite_vec3(*v)) {
            contract_violation!("wheel {}: non-finite mount or axis", index);
        }
        if self.up.length_squared() < 1.0e-6 || self.forward.length_squared() < 1.0e-6 {
            contract_violation!("wheel {}: zero-length axis", index);
        }
        if self.up.normalize().dot(self.forward.normalize()).abs() > 1.0e-3 {
            contract_violation!("wheel {}: up and forward axes must be perpendicular", index);
        }
        if !(self.radius > 0.0) {
            contract_violation!("wheel {}: radius must be positive, got {}", index, self.radius);
        }
        if !(self.suspension_min >= 0.0 && self.suspension_min <= self.suspension_max) {
            contract_violation!(
                "wheel {}: invalid suspension range [{}, {}]",
                index,
                self.suspension_min,
                self.suspension_max
            );
        }
        if !(self.spring_stiffness >= 0.0 && self.spring_damping >= 0.0 && self.max_brake_torque >= 0.0) {
            contract_violation!("wheel {}: negative spring or brake parameter", index);
        }
    }

    fn tuning(&self) -> WheelTuning {
        WheelTuning {
            suspension_stiffness: self.spring_stiffness,
            suspension_compression: self.spring_damping,
            suspension_damping: self.spring_damping,
            max_suspension_travel: self.suspension_max - self.suspension_min,
            max_suspension_force: f32::MAX,
            ..WheelTuning::default()
        }
    }
}

/// Flat-argument wheel constructor for callers coming across a plain call interface
#[allow(clippy::too_many_arguments)]
pub fn build_wheel(
    mount_point: Vec3,
    width: f32,
    radius: f32,
    inertia: f32,
    angular_damping: f32,
    up_axis: Vec3,
    forward_axis: Vec3,
    suspension_min: f32,
    suspension_max: f32,
    spring_stiffness: f32,
    spring_damping: f32,
    max_brake_torque: f32,
) -> WheelSettings {
    WheelSettings {
        position: mount_point,
        up: up_axis,
        forward: forward_axis,
        steering_axis: up_axis,
        width,
        radius,
        inertia,
        angular_damping,
        suspension_min,
        suspension_max,
        spring_stiffness,
        spring_damping,
        max_brake_torque,
        ..WheelSettings::default()
    }
}

/// Attached vehicle: wheel descriptions, driver inputs and the kernel controller
pub(crate) struct Vehicle {
    body: BodyHandle,
    wheels: Vec<WheelSettings>,
    controller: DynamicRayCastVehicleController,

    /// Wheel rays only hit what the chassis layer may collide with
    groups: InteractionGroups,

    /// Per-wheel suspension length override, cleared after every step
    suspension_overrides: Vec<Option<f32>>,

    brake: f32,
    steering: f32,
    engine_force: f32,
}

/// Chassis velocity along a body-space forward axis, in m/s
fn forward_speed(chassis: &RigidBody, local_forward: Vec3) -> f32 {
    let forward = chassis.rotation() * math::to_na_vector(local_forward.normalize());
    chassis.linvel().dot(&forward)
}

impl Vehicle {
    /// Push driver inputs into the wheels and run the tire model for one substep
    pub(super) fn pre_substep(
        &mut self,
        dt: f32,
        bodies: &mut RigidBodySet,
        colliders: &ColliderSet,
        queries: &QueryPipeline,
    ) {
        // Each wheel's friction solve could stop the whole chassis on its own, so
        // the wheels share the momentum left along the forward axis. Without the
        // cap the summed brake impulse overshoots and reverses the vehicle.
        let brake_limit = bodies
            .get(self.controller.chassis)
            .map(|chassis| {
                chassis.mass() * forward_speed(chassis, self.wheels[0].forward).abs()
                    / self.wheels.len() as f32
            })
            .unwrap_or(0.0);

        for (wheel, settings) in self.controller.wheels_mut().iter_mut().zip(&self.wheels) {
            // The kernel takes the brake as a per-substep friction impulse
            let impulse = self.brake * settings.max_brake_torque / settings.radius * dt;
            wheel.brake = impulse.min(brake_limit);
            wheel.steering = self.steering * settings.max_steer_angle;
            wheel.engine_force = self.engine_force;
        }

        let filter = QueryFilter::default()
            .exclude_rigid_body(self.controller.chassis)
            .groups(self.groups);
        self.controller.update_vehicle(dt, bodies, colliders, queries, filter);
    }

    pub(super) fn end_step(&mut self) {
        self.suspension_overrides.fill(None);
    }

    fn check_wheel(&self, wheel: usize) {
        if wheel >= self.wheels.len() {
            contract_violation!(
                "wheel index {} out of range for a {}-wheel vehicle",
                wheel,
                self.wheels.len()
            );
        }
    }

    fn suspension_length(&self, wheel: usize) -> f32 {
        self.suspension_overrides[wheel]
            .unwrap_or_else(|| self.controller.wheels()[wheel].raycast_info().suspension_length)
    }
}

impl PhysicsWorld {
    /// Attach a vehicle driving the dynamic body `body`
    ///
    /// `world_up` picks the chassis up axis. Fails with an invalid-handle error
    /// when the body does not exist or is not dynamic.
    ///
    /// # Panics
    /// An empty wheel list or an invalid wheel description is a contract violation.
    pub fn attach_vehicle(
        &mut self,
        body: BodyHandle,
        world_up: Vec3,
        wheels: Vec<WheelSettings>,
    ) -> Result<VehicleHandle, PhysicsError> {
        let record = self.body(body)?;
        if record.motion_type != MotionType::Dynamic {
            log::warn!("vehicle attach refused: body {} is not dynamic", body);
            return Err(PhysicsError::invalid_handle("dynamic body", body.to_bits()));
        }
        let chassis = record.rigid_body;
        let groups = record.layer.interaction_groups();

        if wheels.is_empty() {
            contract_violation!("vehicle needs at least one wheel");
        }
        if !math::is_finite_vec3(world_up) || world_up.length_squared() < 1.0e-6 {
            contract_violation!("invalid world up axis {:?}", world_up);
        }
        for (index, wheel) in wheels.iter().enumerate() {
            wheel.validate(index);
        }

        let mut controller = DynamicRayCastVehicleController::new(chassis);
        for wheel in &wheels {
            let up = wheel.up.normalize();
            let forward = wheel.forward.normalize();
            controller.add_wheel(
                math::to_na_point(wheel.position),
                math::to_na_vector(-up),
                math::to_na_vector(forward.cross(up)),
                wheel.suspension_max,
                wheel.radius,
                &wheel.tuning(),
            );
        }

        let chassis_rotation = self.orientation(body)?;
        let local_up = (chassis_rotation.inverse() * world_up.as_dvec3()).as_vec3();
        controller.index_up_axis = math::dominant_axis(local_up);
        controller.index_forward_axis = math::dominant_axis(wheels[0].forward);

        let wheel_count = wheels.len();
        let suspension_overrides = wheels.iter().map(|w| Some(w.suspension_max)).collect();
        let handle = self.vehicles.insert(Vehicle {
            body,
            wheels,
            controller,
            groups,
            suspension_overrides,
            brake: 0.0,
            steering: 0.0,
            engine_force: 0.0,
        });

        if let Some(record) = self.bodies.get_mut(body) {
            record.attached_vehicles += 1;
        }

        log::debug!("attached {}-wheel vehicle {} to body {}", wheel_count, handle, body);
        Ok(handle)
    }

    /// Remove the vehicle; its handle is invalid afterwards
    pub fn detach_vehicle(&mut self, handle: VehicleHandle) -> Result<(), PhysicsError> {
        let vehicle = self
            .vehicles
            .remove(handle)
            .ok_or_else(|| PhysicsError::invalid_handle("vehicle", handle.to_bits()))?;

        if let Some(record) = self.bodies.get_mut(vehicle.body) {
            record.attached_vehicles -= 1;
        }

        log::debug!("detached vehicle {} from body {}", handle, vehicle.body);
        Ok(())
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Body the vehicle drives
    pub fn vehicle_body(&self, handle: VehicleHandle) -> Result<BodyHandle, PhysicsError> {
        Ok(self.vehicle(handle)?.body)
    }

    pub fn wheel_count(&self, handle: VehicleHandle) -> Result<usize, PhysicsError> {
        Ok(self.vehicle(handle)?.wheels.len())
    }

    /// Description of one wheel, as attached
    pub fn wheel_settings(&self, handle: VehicleHandle, wheel: usize) -> Result<&WheelSettings, PhysicsError> {
        let vehicle = self.vehicle(handle)?;
        vehicle.check_wheel(wheel);
        Ok(&vehicle.wheels[wheel])
    }

    /// Brake input, clamped to `[0, 1]`
    ///
    /// # Panics
    /// NaN input is a contract violation.
    pub fn set_brake(&mut self, handle: VehicleHandle, value: f32) -> Result<(), PhysicsError> {
        if value.is_nan() {
            contract_violation!("brake input is NaN");
        }
        self.vehicle_mut(handle)?.brake = value.clamp(0.0, 1.0);
        Ok(())
    }

    pub fn brake(&self, handle: VehicleHandle) -> Result<f32, PhysicsError> {
        Ok(self.vehicle(handle)?.brake)
    }

    /// Steering input, clamped to `[-1, 1]` and scaled by each wheel's max steer angle
    pub fn set_steering(&mut self, handle: VehicleHandle, value: f32) -> Result<(), PhysicsError> {
        if value.is_nan() {
            contract_violation!("steering input is NaN");
        }
        self.vehicle_mut(handle)?.steering = value.clamp(-1.0, 1.0);
        Ok(())
    }

    pub fn steering(&self, handle: VehicleHandle) -> Result<f32, PhysicsError> {
        Ok(self.vehicle(handle)?.steering)
    }

    /// Driving force applied at every wheel in contact (newtons)
    pub fn set_engine_force(&mut self, handle: VehicleHandle, force: f32) -> Result<(), PhysicsError> {
        if !force.is_finite() {
            contract_violation!("non-finite engine force {}", force);
        }
        self.vehicle_mut(handle)?.engine_force = force;
        Ok(())
    }

    pub fn engine_force(&self, handle: VehicleHandle) -> Result<f32, PhysicsError> {
        Ok(self.vehicle(handle)?.engine_force)
    }

    /// Chassis speed along the first wheel's forward axis, negative when reversing
    pub fn forward_speed(&self, handle: VehicleHandle) -> Result<f32, PhysicsError> {
        let vehicle = self.vehicle(handle)?;
        let chassis = self.rigid_body(vehicle.body)?;
        Ok(forward_speed(chassis, vehicle.wheels[0].forward))
    }

    /// Wheel pose relative to the body
    ///
    /// `right` and `up` give the axes of the wheel model; the result accounts for
    /// steering, current suspension length and rotation angle.
    pub fn wheel_local_transform(
        &self,
        handle: VehicleHandle,
        wheel: usize,
        right: Vec3,
        up: Vec3,
    ) -> Result<DMat4, PhysicsError> {
        let vehicle = self.vehicle(handle)?;
        vehicle.check_wheel(wheel);
        let settings = &vehicle.wheels[wheel];
        let kernel_wheel = &vehicle.controller.wheels()[wheel];

        let right = right.as_dvec3();
        let up = up.as_dvec3();
        let to_rotation = DMat4::from_cols(
            right.extend(0.0),
            up.extend(0.0),
            up.cross(right).extend(0.0),
            DVec4::W,
        )
        .transpose();

        let steer = DQuat::from_axis_angle(
            settings.steering_axis.normalize().as_dvec3(),
            kernel_wheel.steering as f64,
        );
        let wheel_up = steer * settings.up.normalize().as_dvec3();
        let wheel_forward = steer * settings.forward.normalize().as_dvec3();
        let wheel_right = wheel_forward.cross(wheel_up);
        let hub = settings.position.as_dvec3()
            - settings.up.normalize().as_dvec3() * vehicle.suspension_length(wheel) as f64;

        let from_rotation = DMat4::from_cols(
            wheel_right.extend(0.0),
            wheel_up.extend(0.0),
            wheel_forward.extend(0.0),
            hub.extend(1.0),
        );

        Ok(from_rotation * DMat4::from_rotation_x(kernel_wheel.rotation as f64) * to_rotation)
    }

    /// Current suspension length, or the override if one is active this step
    pub fn suspension_length(&self, handle: VehicleHandle, wheel: usize) -> Result<f32, PhysicsError> {
        let vehicle = self.vehicle(handle)?;
        vehicle.check_wheel(wheel);
        Ok(vehicle.suspension_length(wheel))
    }

    /// Debug override of the reported suspension length
    ///
    /// Bypasses the spring simulation: the value is reported until the end of
    /// the next `step`, after which the simulated length takes over again.
    pub fn override_suspension_length(
        &mut self,
        handle: VehicleHandle,
        wheel: usize,
        length: f32,
    ) -> Result<(), PhysicsError> {
        let vehicle = self.vehicle_mut(handle)?;
        vehicle.check_wheel(wheel);
        let settings = &vehicle.wheels[wheel];
        if !(length >= settings.suspension_min && length <= settings.suspension_max) {
            contract_violation!(
                "suspension length {} outside [{}, {}]",
                length,
                settings.suspension_min,
                settings.suspension_max
            );
        }
        vehicle.suspension_overrides[wheel] = Some(length);
        Ok(())
    }

    /// Accumulated wheel rotation around its axle, in radians
    pub fn rotation_angle(&self, handle: VehicleHandle, wheel: usize) -> Result<f32, PhysicsError> {
        let vehicle = self.vehicle(handle)?;
        vehicle.check_wheel(wheel);
        Ok(vehicle.controller.wheels()[wheel].rotation)
    }

    pub fn set_rotation_angle(&mut self, handle: VehicleHandle, wheel: usize, angle: f32) -> Result<(), PhysicsError> {
        if !angle.is_finite() {
            contract_violation!("non-finite wheel rotation {}", angle);
        }
        let vehicle = self.vehicle_mut(handle)?;
        vehicle.check_wheel(wheel);
        vehicle.controller.wheels_mut()[wheel].rotation = angle;
        Ok(())
    }

    /// Whether the wheel touches the ground with its suspension fully compressed
    pub fn has_hit_hard_point(&self, handle: VehicleHandle, wheel: usize) -> Result<bool, PhysicsError> {
        let vehicle = self.vehicle(handle)?;
        vehicle.check_wheel(wheel);
        let in_contact = vehicle.controller.wheels()[wheel].raycast_info().is_in_contact;
        let min = vehicle.wheels[wheel].suspension_min;
        Ok(in_contact && vehicle.suspension_length(wheel) <= min + HARD_POINT_TOLERANCE)
    }

    pub fn wheel_in_contact(&self, handle: VehicleHandle, wheel: usize) -> Result<bool, PhysicsError> {
        let vehicle = self.vehicle(handle)?;
        vehicle.check_wheel(wheel);
        Ok(vehicle.controller.wheels()[wheel].raycast_info().is_in_contact)
    }

    fn vehicle(&self, handle: VehicleHandle) -> Result<&Vehicle, PhysicsError> {
        self.vehicles
            .get(handle)
            .ok_or_else(|| PhysicsError::invalid_handle("vehicle", handle.to_bits()))
    }

    fn vehicle_mut(&mut self, handle: VehicleHandle) -> Result<&mut Vehicle, PhysicsError> {
        self.vehicles
            .get_mut(handle)
            .ok_or_else(|| PhysicsError::invalid_handle("vehicle", handle.to_bits()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::physics::world::{WorldSettings, FIXED_TIMESTEP};
    use crate::engine::physics::{BodySettings, ShapeSettings};
    use approx::assert_relative_eq;
    use glam::DVec3;

    const MOUNTS: [Vec3; 4] = [
        Vec3::new(0.9, -0.25, 1.5),
        Vec3::new(-0.9, -0.25, 1.5),
        Vec3::new(0.9, -0.25, -1.5),
        Vec3::new(-0.9, -0.25, -1.5),
    ];

    fn wheel(mount: Vec3) -> WheelSettings {
        WheelSettings::new(mount)
            .radius(0.3)
            .suspension(0.3, 0.5)
            .spring(40.0, 4.0)
    }

    /// Ground slab plus a dynamic chassis resting just above it
    fn scene() -> (PhysicsWorld, BodyHandle) {
        let mut world = PhysicsWorld::for_tests(WorldSettings::default());
        let ground = ShapeSettings::box_shape(Vec3::new(50.0, 0.5, 50.0), 1.0)
            .freeze()
            .unwrap();
        world.create_body(BodySettings::new_static(ground).position(DVec3::new(0.0, -0.5, 0.0)));

        let chassis = ShapeSettings::box_shape(Vec3::new(1.0, 0.25, 2.0), 250.0)
            .freeze()
            .unwrap();
        let body = world.create_body(BodySettings::new_dynamic(chassis).position(DVec3::new(0.0, 1.0, 0.0)));
        (world, body)
    }

    fn car(world: &mut PhysicsWorld, body: BodyHandle) -> VehicleHandle {
        world
            .attach_vehicle(body, Vec3::Y, MOUNTS.iter().copied().map(wheel).collect())
            .unwrap()
    }

    #[test]
    fn test_build_wheel_matches_builder() {
        let flat = build_wheel(
            MOUNTS[0], 0.1, 0.3, 0.9, 0.2, Vec3::Y, Vec3::Z, 0.3, 0.5, 40.0, 4.0, 1500.0,
        );
        assert_eq!(flat, wheel(MOUNTS[0]));
    }

    #[test]
    fn test_attach_and_detach() {
        let (mut world, body) = scene();
        let vehicle = car(&mut world, body);

        assert_eq!(world.vehicle_count(), 1);
        assert_eq!(world.wheel_count(vehicle).unwrap(), 4);
        assert_eq!(world.vehicle_body(vehicle).unwrap(), body);

        world.detach_vehicle(vehicle).unwrap();
        assert_eq!(world.vehicle_count(), 0);
        assert!(world.wheel_count(vehicle).unwrap_err().is_invalid_handle());
        assert!(world.detach_vehicle(vehicle).unwrap_err().is_invalid_handle());

        // Detached, so the body can go now
        world.destroy_body(body).unwrap();
    }

    #[test]
    fn test_attach_to_static_body_fails() {
        let mut world = PhysicsWorld::for_tests(WorldSettings::default());
        let shape = ShapeSettings::box_shape(Vec3::ONE, 1.0).freeze().unwrap();
        let body = world.create_body(BodySettings::new_static(shape));

        let err = world
            .attach_vehicle(body, Vec3::Y, vec![wheel(MOUNTS[0])])
            .unwrap_err();
        assert!(err.is_invalid_handle());
        assert_eq!(world.vehicle_count(), 0);
    }

    #[test]
    fn test_attach_to_destroyed_body_fails() {
        let (mut world, body) = scene();
        world.destroy_body(body).unwrap();

        let err = world.attach_vehicle(body, Vec3::Y, vec![wheel(MOUNTS[0])]).unwrap_err();
        assert!(err.is_invalid_handle());
    }

    #[test]
    #[should_panic(expected = "at least one wheel")]
    fn test_attach_without_wheels_is_fatal() {
        let (mut world, body) = scene();
        let _ = world.attach_vehicle(body, Vec3::Y, Vec::new());
    }

    #[test]
    #[should_panic(expected = "still drives")]
    fn test_destroy_body_under_vehicle_is_fatal() {
        let (mut world, body) = scene();
        car(&mut world, body);
        let _ = world.destroy_body(body);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_wheel_index_out_of_range_is_fatal() {
        let (mut world, body) = scene();
        let vehicle = car(&mut world, body);
        let _ = world.suspension_length(vehicle, 4);
    }

    #[test]
    fn test_brake_input_is_clamped() {
        let (mut world, body) = scene();
        let vehicle = car(&mut world, body);

        world.set_brake(vehicle, 3.0).unwrap();
        assert_eq!(world.brake(vehicle).unwrap(), 1.0);
        world.set_brake(vehicle, -1.0).unwrap();
        assert_eq!(world.brake(vehicle).unwrap(), 0.0);
    }

    #[test]
    fn test_suspension_starts_extended() {
        let (mut world, body) = scene();
        let vehicle = car(&mut world, body);

        for i in 0..4 {
            assert_eq!(world.suspension_length(vehicle, i).unwrap(), 0.5);
            assert!(!world.has_hit_hard_point(vehicle, i).unwrap());
        }
    }

    #[test]
    fn test_suspension_override_lasts_one_step() {
        let (mut world, body) = scene();
        let vehicle = car(&mut world, body);
        for _ in 0..30 {
            world.step(FIXED_TIMESTEP, 1);
        }

        world.override_suspension_length(vehicle, 2, 0.3).unwrap();
        assert_eq!(world.suspension_length(vehicle, 2).unwrap(), 0.3);
        assert!(world.has_hit_hard_point(vehicle, 2).unwrap());

        world.step(FIXED_TIMESTEP, 1);
        let simulated = world.suspension_length(vehicle, 2).unwrap();
        assert!(simulated > 0.3 + HARD_POINT_TOLERANCE && simulated <= 0.5);
        assert!(!world.has_hit_hard_point(vehicle, 2).unwrap());
    }

    #[test]
    fn test_settled_vehicle_rests_on_wheels() {
        let (mut world, body) = scene();
        let vehicle = car(&mut world, body);
        world.set_brake(vehicle, 1.0).unwrap();

        for _ in 0..120 {
            world.step(FIXED_TIMESTEP, 4);
        }

        for i in 0..4 {
            assert!(world.wheel_in_contact(vehicle, i).unwrap());
            let length = world.suspension_length(vehicle, i).unwrap();
            assert!((0.3..=0.5).contains(&length), "wheel {} at {}", i, length);
        }
        assert!(world.linear_velocity(body).unwrap().length() < 0.1);
    }

    #[test]
    fn test_rotation_angle_roundtrip() {
        let (mut world, body) = scene();
        let vehicle = car(&mut world, body);

        world.set_rotation_angle(vehicle, 1, 1.25).unwrap();
        assert_eq!(world.rotation_angle(vehicle, 1).unwrap(), 1.25);
        assert_eq!(world.rotation_angle(vehicle, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_wheel_local_transform_at_rest() {
        let (mut world, body) = scene();
        let vehicle = car(&mut world, body);

        // Model axes match the wheel's own right and up, so only translation remains
        let m = world
            .wheel_local_transform(vehicle, 0, Vec3::NEG_X, Vec3::Y)
            .unwrap();
        let expected = MOUNTS[0].as_dvec3() - DVec3::Y * 0.5;

        assert_relative_eq!(m.w_axis.x, expected.x, epsilon = 1e-6);
        assert_relative_eq!(m.w_axis.y, expected.y, epsilon = 1e-6);
        assert_relative_eq!(m.w_axis.z, expected.z, epsilon = 1e-6);
        assert_relative_eq!(m.x_axis.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(m.y_axis.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(m.z_axis.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_wheel_local_transform_follows_rotation() {
        let (mut world, body) = scene();
        let vehicle = car(&mut world, body);
        world.set_rotation_angle(vehicle, 0, std::f32::consts::FRAC_PI_2).unwrap();

        let m = world
            .wheel_local_transform(vehicle, 0, Vec3::NEG_X, Vec3::Y)
            .unwrap();
        let spun_up = m.transform_vector3(DVec3::Y);

        // A quarter turn around the axle takes the model's up off the Y axis
        assert!(spun_up.y.abs() < 1e-6);
        assert_relative_eq!(spun_up.length(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_steering_turns_the_wheel() {
        let (mut world, body) = scene();
        let vehicle = car(&mut world, body);

        world.set_steering(vehicle, 2.0).unwrap();
        assert_eq!(world.steering(vehicle).unwrap(), 1.0);
        world.set_steering(vehicle, 0.5).unwrap();
        world.step(FIXED_TIMESTEP, 1);
        world.set_rotation_angle(vehicle, 0, 0.0).unwrap();

        let m = world
            .wheel_local_transform(vehicle, 0, Vec3::NEG_X, Vec3::Y)
            .unwrap();
        let forward = m.transform_vector3(DVec3::Z);
        let angle = (0.5 * 70.0_f64).to_radians();

        assert_relative_eq!(forward.x, angle.sin(), epsilon = 1e-5);
        assert_relative_eq!(forward.z, angle.cos(), epsilon = 1e-5);
        assert_relative_eq!(forward.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_engine_force_drives_forward() {
        let (mut world, body) = scene();
        let vehicle = car(&mut world, body);
        for _ in 0..60 {
            world.step(FIXED_TIMESTEP, 4);
        }
        assert!(world.forward_speed(vehicle).unwrap().abs() < 0.05);

        world.set_engine_force(vehicle, 500.0).unwrap();
        assert_eq!(world.engine_force(vehicle).unwrap(), 500.0);
        for _ in 0..60 {
            world.step(FIXED_TIMESTEP, 4);
        }

        let speed = world.forward_speed(vehicle).unwrap();
        assert!(speed > 0.5, "forward speed {}", speed);
        assert_relative_eq!(speed, world.linear_velocity(body).unwrap().z, epsilon = 0.05);
    }

    #[test]
    fn test_full_brake_never_reverses() {
        let (mut world, body) = scene();
        let vehicle = car(&mut world, body);
        world.set_brake(vehicle, 1.0).unwrap();
        for _ in 0..120 {
            world.step(FIXED_TIMESTEP, 4);
        }

        world.set_linear_velocity(body, Vec3::new(0.0, 0.0, 5.0)).unwrap();
        for _ in 0..90 {
            world.step(FIXED_TIMESTEP, 4);
            let speed = world.forward_speed(vehicle).unwrap();
            assert!(speed > -1e-3, "vehicle rolled back at {}", speed);
        }
        assert!(world.forward_speed(vehicle).unwrap() < 0.05);
    }
}
