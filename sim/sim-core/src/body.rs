//! Rigid bodies.
//!
//! A [`Body`] is owned by a [`Scene`](crate::Scene) and addressed through a
//! [`BodyHandle`]. It keeps its pose twice: as a unit quaternion, which is
//! what the integrator advances, and as a [`Transform`] with a rotation
//! matrix, which is what collision and rendering read. The two are kept in
//! sync after every position update.
//!
//! Forces follow the acceleration convention: [`Body::apply_linear_force`]
//! scales its argument by the body's mass, so passing `g` accelerates the
//! body by `g` regardless of its mass.

use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};
use sim_types::{BodyDef, BodyKind, SimError, Transform, axis_angle_quaternion};
use smallvec::SmallVec;
use tracing::warn;

use crate::alloc::HeapBlock;
use crate::handle::{BodyHandle, BoxHandle, ContactHandle};
use crate::shape::BoxShape;

/// Link from a body to one of its contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEdge {
    /// The body on the other side of the contact.
    pub other: BodyHandle,
    /// The contact constraint.
    pub contact: ContactHandle,
}

/// A rigid body made of one or more boxes.
#[derive(Debug, Clone)]
pub struct Body {
    pub(crate) kind: BodyKind,
    pub(crate) tx: Transform,
    pub(crate) q: UnitQuaternion<f64>,
    pub(crate) local_center: Point3<f64>,
    pub(crate) world_center: Point3<f64>,
    pub(crate) linear_velocity: Vector3<f64>,
    pub(crate) angular_velocity: Vector3<f64>,
    pub(crate) force: Vector3<f64>,
    pub(crate) torque: Vector3<f64>,
    pub(crate) mass: f64,
    pub(crate) inv_mass: f64,
    pub(crate) inv_inertia_model: Matrix3<f64>,
    pub(crate) inv_inertia_world: Matrix3<f64>,
    pub(crate) gravity_scale: f64,
    pub(crate) linear_damping: f64,
    pub(crate) angular_damping: f64,
    pub(crate) layers: u32,
    pub(crate) user_data: u64,
    pub(crate) sleep_time: f64,
    pub(crate) awake: bool,
    pub(crate) allow_sleep: bool,
    pub(crate) active: bool,
    pub(crate) locked_axes: [bool; 3],
    pub(crate) island: bool,
    pub(crate) boxes: SmallVec<[BoxHandle; 4]>,
    pub(crate) edges: Vec<ContactEdge>,
    pub(crate) heap_block: Option<HeapBlock>,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        let q = axis_angle_quaternion(def.axis, def.angle);
        let tx = Transform::from_quaternion(def.position, &q);
        let is_static = def.kind == BodyKind::Static;

        let mut body = Self {
            kind: def.kind,
            tx,
            q,
            local_center: Point3::origin(),
            world_center: def.position,
            linear_velocity: if is_static { Vector3::zeros() } else { def.linear_velocity },
            angular_velocity: if is_static { Vector3::zeros() } else { def.angular_velocity },
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
            mass: 0.0,
            inv_mass: 0.0,
            inv_inertia_model: Matrix3::zeros(),
            inv_inertia_world: Matrix3::zeros(),
            gravity_scale: def.gravity_scale,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            layers: def.layers,
            user_data: def.user_data,
            sleep_time: 0.0,
            awake: def.awake,
            allow_sleep: def.allow_sleep,
            active: def.active,
            locked_axes: [def.lock_axis_x, def.lock_axis_y, def.lock_axis_z],
            island: false,
            boxes: SmallVec::new(),
            edges: Vec::new(),
            heap_block: None,
        };
        if !body.awake {
            body.set_to_sleep();
        }
        body
    }

    // =========================================================================
    // Kind and pose
    // =========================================================================

    /// How the body moves.
    #[must_use]
    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    /// Whether the body never moves.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.kind == BodyKind::Static
    }

    /// Whether the body responds to forces and contacts.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.kind == BodyKind::Dynamic
    }

    /// Whether the body moves only by its assigned velocity.
    #[must_use]
    pub fn is_kinematic(&self) -> bool {
        self.kind == BodyKind::Kinematic
    }

    /// World transform of the body origin.
    #[must_use]
    pub fn transform(&self) -> &Transform {
        &self.tx
    }

    /// World position of the body origin.
    #[must_use]
    pub fn position(&self) -> Point3<f64> {
        self.tx.position
    }

    /// Orientation.
    #[must_use]
    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        self.q
    }

    /// Center of mass in world space.
    #[must_use]
    pub fn world_center(&self) -> Point3<f64> {
        self.world_center
    }

    /// Center of mass in body space.
    #[must_use]
    pub fn local_center(&self) -> Point3<f64> {
        self.local_center
    }

    /// Map a world point into body space.
    #[must_use]
    pub fn local_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.tx.inverse_transform_point(p)
    }

    /// Map a body-space point into world space.
    #[must_use]
    pub fn world_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.tx.transform_point(p)
    }

    /// Rotate a world direction into body space.
    #[must_use]
    pub fn local_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.tx.inverse_transform_vector(v)
    }

    /// Rotate a body-space direction into world space.
    #[must_use]
    pub fn world_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.tx.transform_vector(v)
    }

    // =========================================================================
    // Velocity
    // =========================================================================

    /// Linear velocity of the center of mass.
    #[must_use]
    pub fn linear_velocity(&self) -> Vector3<f64> {
        self.linear_velocity
    }

    /// Angular velocity.
    #[must_use]
    pub fn angular_velocity(&self) -> Vector3<f64> {
        self.angular_velocity
    }

    /// Velocity of the material point at world position `p`.
    #[must_use]
    pub fn velocity_at_world_point(&self, p: &Point3<f64>) -> Vector3<f64> {
        self.linear_velocity + self.angular_velocity.cross(&(p - self.world_center))
    }

    /// Set the linear velocity. A non-zero velocity wakes the body.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBodyKind`] for static bodies.
    pub fn set_linear_velocity(&mut self, v: Vector3<f64>) -> sim_types::Result<()> {
        self.reject_static("set_linear_velocity")?;
        if v.norm_squared() > 0.0 {
            self.set_to_awake();
        }
        self.linear_velocity = v;
        Ok(())
    }

    /// Set the angular velocity. A non-zero velocity wakes the body.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBodyKind`] for static bodies.
    pub fn set_angular_velocity(&mut self, w: Vector3<f64>) -> sim_types::Result<()> {
        self.reject_static("set_angular_velocity")?;
        if w.norm_squared() > 0.0 {
            self.set_to_awake();
        }
        self.angular_velocity = w;
        Ok(())
    }

    fn reject_static(&self, operation: &'static str) -> sim_types::Result<()> {
        if self.is_static() {
            return Err(SimError::InvalidBodyKind {
                kind: self.kind.name(),
                operation,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Forces and impulses
    // =========================================================================

    /// Apply an acceleration-like force at the center of mass. The argument
    /// is scaled by the body's mass. Wakes the body.
    pub fn apply_linear_force(&mut self, force: Vector3<f64>) {
        self.force += force * self.mass;
        self.set_to_awake();
    }

    /// Apply a force at a world point. The linear part is scaled by mass as
    /// in [`Body::apply_linear_force`]; the torque uses the raw force.
    pub fn apply_force_at_world_point(&mut self, force: Vector3<f64>, point: &Point3<f64>) {
        self.force += force * self.mass;
        self.torque += (point - self.world_center).cross(&force);
        self.set_to_awake();
    }

    /// Apply a torque. Wakes the body.
    pub fn apply_torque(&mut self, torque: Vector3<f64>) {
        self.torque += torque;
        self.set_to_awake();
    }

    /// Change the linear velocity by `impulse / mass`. Wakes the body.
    pub fn apply_linear_impulse(&mut self, impulse: Vector3<f64>) {
        self.linear_velocity += impulse * self.inv_mass;
        self.set_to_awake();
    }

    /// Apply an impulse at a world point, changing both velocities. Wakes
    /// the body.
    pub fn apply_linear_impulse_at_world_point(&mut self, impulse: Vector3<f64>, point: &Point3<f64>) {
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia_world * (point - self.world_center).cross(&impulse);
        self.set_to_awake();
    }

    /// Force accumulated since the last step, mass-scaled.
    #[must_use]
    pub fn force(&self) -> Vector3<f64> {
        self.force
    }

    /// Torque accumulated since the last step.
    #[must_use]
    pub fn torque(&self) -> Vector3<f64> {
        self.torque
    }

    pub(crate) fn clear_forces(&mut self) {
        self.force = Vector3::zeros();
        self.torque = Vector3::zeros();
    }

    // =========================================================================
    // Mass
    // =========================================================================

    /// Mass in kg; zero for static and kinematic bodies.
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Inverse mass; zero for static and kinematic bodies.
    #[must_use]
    pub fn inv_mass(&self) -> f64 {
        self.inv_mass
    }

    /// Inverse inertia tensor in body space.
    #[must_use]
    pub fn inv_inertia_model(&self) -> &Matrix3<f64> {
        &self.inv_inertia_model
    }

    /// Inverse inertia tensor in world space for the current rotation.
    #[must_use]
    pub fn inv_inertia_world(&self) -> &Matrix3<f64> {
        &self.inv_inertia_world
    }

    /// Recompute mass, center of mass and inertia from the body's boxes.
    ///
    /// Boxes with zero density contribute nothing. A dynamic body with no
    /// mass at all is given unit inverse mass and no rotational inertia.
    pub(crate) fn set_mass_data<'a>(&mut self, shapes: impl IntoIterator<Item = &'a BoxShape>) {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inv_inertia_model = Matrix3::zeros();
        self.inv_inertia_world = Matrix3::zeros();

        if !self.is_dynamic() {
            self.local_center = Point3::origin();
            self.world_center = self.tx.position;
            return;
        }

        let mut mass = 0.0;
        let mut inertia = Matrix3::zeros();
        let mut lc = Vector3::zeros();

        for shape in shapes {
            if shape.density == 0.0 {
                continue;
            }
            let md = shape.compute_mass();
            mass += md.mass;
            inertia += md.inertia;
            lc += md.center.coords * md.mass;
        }

        if mass > 0.0 {
            self.mass = mass;
            self.inv_mass = 1.0 / mass;
            lc *= self.inv_mass;
            // Shift the origin inertia to the center of mass
            inertia -= sim_types::parallel_axis(&lc, mass);
            self.inv_inertia_model = inertia.try_inverse().unwrap_or_else(Matrix3::zeros);

            for (axis, locked) in self.locked_axes.iter().enumerate() {
                if *locked {
                    self.inv_inertia_model.row_mut(axis).fill(0.0);
                    self.inv_inertia_model.column_mut(axis).fill(0.0);
                }
            }
        } else {
            warn!("dynamic body has no mass; using unit inverse mass");
            self.inv_mass = 1.0;
        }

        self.local_center = Point3::from(lc);
        self.world_center = self.tx.transform_point(&self.local_center);
        self.update_world_inertia();
    }

    /// Rotate the model inverse inertia into world space.
    pub(crate) fn update_world_inertia(&mut self) {
        let r = self.tx.rotation;
        self.inv_inertia_world = r * self.inv_inertia_model * r.transpose();
    }

    /// Rebuild the origin transform from the center of mass and rotation.
    pub(crate) fn sync_transform(&mut self) {
        self.tx.rotation = self.q.to_rotation_matrix().into_inner();
        self.tx.position = self.world_center - self.tx.rotation * self.local_center.coords;
    }

    // =========================================================================
    // Sleep
    // =========================================================================

    /// Whether the body is simulated this step.
    #[must_use]
    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Whether the body may fall asleep.
    #[must_use]
    pub fn allows_sleep(&self) -> bool {
        self.allow_sleep
    }

    /// Seconds the body has been below the sleep thresholds.
    #[must_use]
    pub fn sleep_time(&self) -> f64 {
        self.sleep_time
    }

    /// Wake the body, resetting its sleep timer.
    pub fn set_to_awake(&mut self) {
        if !self.awake {
            self.awake = true;
            self.sleep_time = 0.0;
        }
    }

    /// Put the body to sleep, zeroing its velocity and accumulated forces.
    pub fn set_to_sleep(&mut self) {
        self.awake = false;
        self.sleep_time = 0.0;
        self.linear_velocity = Vector3::zeros();
        self.angular_velocity = Vector3::zeros();
        self.clear_forces();
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Application flag copied from the body definition. The engine does
    /// not read it.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Multiplier on scene gravity.
    #[must_use]
    pub fn gravity_scale(&self) -> f64 {
        self.gravity_scale
    }

    /// Set the multiplier on scene gravity.
    pub fn set_gravity_scale(&mut self, scale: f64) {
        self.gravity_scale = scale;
    }

    /// Linear damping coefficient (1/s).
    #[must_use]
    pub fn linear_damping(&self) -> f64 {
        self.linear_damping
    }

    /// Set the linear damping coefficient.
    pub fn set_linear_damping(&mut self, damping: f64) {
        self.linear_damping = damping;
    }

    /// Angular damping coefficient (1/s).
    #[must_use]
    pub fn angular_damping(&self) -> f64 {
        self.angular_damping
    }

    /// Set the angular damping coefficient.
    pub fn set_angular_damping(&mut self, damping: f64) {
        self.angular_damping = damping;
    }

    /// Collision layer mask.
    #[must_use]
    pub fn layers(&self) -> u32 {
        self.layers
    }

    /// Set the collision layer mask. Existing contacts between bodies that
    /// no longer share a layer are destroyed on the next step.
    pub fn set_layers(&mut self, layers: u32) {
        self.layers = layers;
    }

    /// Application value.
    #[must_use]
    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    /// Replace the application value.
    pub fn set_user_data(&mut self, user_data: u64) {
        self.user_data = user_data;
    }

    /// Which rotation axes are locked (x, y, z).
    #[must_use]
    pub fn locked_axes(&self) -> [bool; 3] {
        self.locked_axes
    }

    /// Boxes attached to the body.
    #[must_use]
    pub fn boxes(&self) -> &[BoxHandle] {
        &self.boxes
    }

    /// Contacts touching the body.
    #[must_use]
    pub fn contact_edges(&self) -> &[ContactEdge] {
        &self.edges
    }

    /// Whether contacts may form between this body and `other`: at least
    /// one must be dynamic and their layer masks must intersect. Two boxes
    /// of the same body never collide; that check is made by handle.
    #[must_use]
    pub fn can_collide(&self, other: &Self) -> bool {
        if !self.is_dynamic() && !other.is_dynamic() {
            return false;
        }
        self.layers & other.layers != 0
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Linear momentum `m v`.
    #[must_use]
    pub fn linear_momentum(&self) -> Vector3<f64> {
        self.linear_velocity * self.mass
    }

    /// Translational plus rotational kinetic energy.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        let linear = 0.5 * self.mass * self.linear_velocity.norm_squared();
        let angular = self
            .inv_inertia_world
            .try_inverse()
            .map_or(0.0, |inertia| {
                0.5 * self.angular_velocity.dot(&(inertia * self.angular_velocity))
            });
        linear + angular
    }

    /// Whether position and velocity are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.tx.is_finite()
            && self.world_center.iter().all(|v| v.is_finite())
            && self.linear_velocity.iter().all(|v| v.is_finite())
            && self.angular_velocity.iter().all(|v| v.is_finite())
    }
}
