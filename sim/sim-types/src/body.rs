//! Body and shape definitions.
//!
//! These are the plain value structs scene-construction code fills in and
//! hands to the engine. They carry no runtime state; the scene copies what
//! it needs when a body or box is created.

use nalgebra::{Matrix3, Point3, Vector3};

use crate::transform::{Transform, axis_angle_quaternion};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a body participates in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BodyKind {
    /// Never moves; infinite mass. Terminates island traversal.
    #[default]
    Static,
    /// Fully simulated: gravity, forces and contact impulses.
    Dynamic,
    /// Moves with its assigned velocity; infinite mass.
    Kinematic,
}

impl BodyKind {
    /// Lower-case name, used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
            Self::Kinematic => "kinematic",
        }
    }
}

/// Parameters for creating a rigid body.
///
/// # Example
///
/// ```
/// use sim_types::{BodyDef, BodyKind};
/// use nalgebra::{Point3, Vector3};
///
/// let def = BodyDef::dynamic()
///     .with_position(Point3::new(0.0, 0.0, 5.0))
///     .with_rotation(Vector3::z(), 0.25)
///     .with_linear_velocity(Vector3::new(1.0, 0.0, 0.0));
///
/// assert_eq!(def.kind, BodyKind::Dynamic);
/// assert_eq!(def.layers, 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyDef {
    /// Static, dynamic or kinematic.
    pub kind: BodyKind,
    /// Initial world position of the body origin.
    pub position: Point3<f64>,
    /// Initial rotation axis (need not be normalized).
    pub axis: Vector3<f64>,
    /// Initial rotation angle about `axis`, in radians.
    pub angle: f64,
    /// Initial linear velocity.
    pub linear_velocity: Vector3<f64>,
    /// Initial angular velocity.
    pub angular_velocity: Vector3<f64>,
    /// Multiplier applied to scene gravity.
    pub gravity_scale: f64,
    /// Collision layer bitmask; two bodies collide only if their masks intersect.
    pub layers: u32,
    /// Opaque value for the application.
    pub user_data: u64,
    /// Whether the body may fall asleep.
    pub allow_sleep: bool,
    /// Whether the body starts awake.
    pub awake: bool,
    /// Whether the body starts active.
    pub active: bool,
    /// Lock rotation about the body X axis.
    pub lock_axis_x: bool,
    /// Lock rotation about the body Y axis.
    pub lock_axis_y: bool,
    /// Lock rotation about the body Z axis.
    pub lock_axis_z: bool,
    /// Linear velocity damping coefficient (1/s).
    pub linear_damping: f64,
    /// Angular velocity damping coefficient (1/s).
    pub angular_damping: f64,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            kind: BodyKind::Static,
            position: Point3::origin(),
            axis: Vector3::zeros(),
            angle: 0.0,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            gravity_scale: 1.0,
            layers: 1,
            user_data: 0,
            allow_sleep: true,
            awake: true,
            active: true,
            lock_axis_x: false,
            lock_axis_y: false,
            lock_axis_z: false,
            linear_damping: 0.0,
            angular_damping: 0.1,
        }
    }
}

impl BodyDef {
    /// Definition of a static body.
    #[must_use]
    pub fn fixed() -> Self {
        Self::default()
    }

    /// Definition of a dynamic body.
    #[must_use]
    pub fn dynamic() -> Self {
        Self {
            kind: BodyKind::Dynamic,
            ..Default::default()
        }
    }

    /// Definition of a kinematic body.
    #[must_use]
    pub fn kinematic() -> Self {
        Self {
            kind: BodyKind::Kinematic,
            ..Default::default()
        }
    }

    /// Set the initial position.
    #[must_use]
    pub fn with_position(mut self, position: Point3<f64>) -> Self {
        self.position = position;
        self
    }

    /// Set the initial rotation as an axis and angle.
    #[must_use]
    pub fn with_rotation(mut self, axis: Vector3<f64>, angle: f64) -> Self {
        self.axis = axis;
        self.angle = angle;
        self
    }

    /// Set the initial linear velocity.
    #[must_use]
    pub fn with_linear_velocity(mut self, v: Vector3<f64>) -> Self {
        self.linear_velocity = v;
        self
    }

    /// Set the initial angular velocity.
    #[must_use]
    pub fn with_angular_velocity(mut self, w: Vector3<f64>) -> Self {
        self.angular_velocity = w;
        self
    }

    /// Set the gravity scale.
    #[must_use]
    pub fn with_gravity_scale(mut self, scale: f64) -> Self {
        self.gravity_scale = scale;
        self
    }

    /// Set the collision layer mask.
    #[must_use]
    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    /// Set the damping coefficients.
    #[must_use]
    pub fn with_damping(mut self, linear: f64, angular: f64) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    /// Set the user data value.
    #[must_use]
    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }

    /// Prevent the body from ever sleeping.
    #[must_use]
    pub fn never_sleep(mut self) -> Self {
        self.allow_sleep = false;
        self
    }

    /// Start the body asleep.
    #[must_use]
    pub fn asleep(mut self) -> Self {
        self.awake = false;
        self
    }

    /// Lock rotation about the given body axes.
    #[must_use]
    pub fn with_locked_axes(mut self, x: bool, y: bool, z: bool) -> Self {
        self.lock_axis_x = x;
        self.lock_axis_y = y;
        self.lock_axis_z = z;
        self
    }

    /// The initial world transform described by this definition.
    #[must_use]
    pub fn transform(&self) -> Transform {
        Transform::from_quaternion(
            self.position,
            &axis_angle_quaternion(self.axis, self.angle),
        )
    }
}

/// Parameters for attaching an oriented box to a body.
///
/// # Example
///
/// ```
/// use sim_types::{BoxDef, Transform};
/// use nalgebra::Vector3;
///
/// // A 2 x 1 x 1 box centered on its body
/// let def = BoxDef::from_extents(Transform::identity(), Vector3::new(2.0, 1.0, 1.0))
///     .with_friction(0.6);
///
/// assert_eq!(def.half_extents, Vector3::new(1.0, 0.5, 0.5));
/// assert!(def.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoxDef {
    /// Placement of the box relative to its body.
    pub local: Transform,
    /// Half-extents along the box's local axes.
    pub half_extents: Vector3<f64>,
    /// Coulomb friction coefficient.
    pub friction: f64,
    /// Coefficient of restitution.
    pub restitution: f64,
    /// Mass density; zero means the box contributes no mass.
    pub density: f64,
    /// Sensors report overlaps but never generate contact impulses.
    pub sensor: bool,
    /// Opaque value for the application.
    pub user_data: u64,
}

impl Default for BoxDef {
    fn default() -> Self {
        Self {
            local: Transform::identity(),
            half_extents: Vector3::new(0.5, 0.5, 0.5),
            friction: 0.4,
            restitution: 0.2,
            density: 1.0,
            sensor: false,
            user_data: 0,
        }
    }
}

impl BoxDef {
    /// A box with the given local placement and half-extents.
    #[must_use]
    pub fn new(local: Transform, half_extents: Vector3<f64>) -> Self {
        Self {
            local,
            half_extents,
            ..Default::default()
        }
    }

    /// A box with the given local placement and full edge lengths.
    #[must_use]
    pub fn from_extents(local: Transform, extents: Vector3<f64>) -> Self {
        Self::new(local, extents * 0.5)
    }

    /// Set the friction coefficient.
    #[must_use]
    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }

    /// Set the restitution coefficient.
    #[must_use]
    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution;
        self
    }

    /// Set the density.
    #[must_use]
    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    /// Mark the box as a sensor.
    #[must_use]
    pub fn as_sensor(mut self) -> Self {
        self.sensor = true;
        self
    }

    /// Set the user data value.
    #[must_use]
    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }

    /// Validate the definition.
    pub fn validate(&self) -> crate::Result<()> {
        if self
            .half_extents
            .iter()
            .any(|e| !e.is_finite() || *e <= 0.0)
        {
            return Err(crate::SimError::invalid_shape(
                "half-extents must be positive and finite",
            ));
        }
        if !self.local.is_finite() {
            return Err(crate::SimError::invalid_shape(
                "local transform is not finite",
            ));
        }
        if !self.density.is_finite() || self.density < 0.0 {
            return Err(crate::SimError::invalid_shape("density must be >= 0"));
        }
        if !self.friction.is_finite() || self.friction < 0.0 {
            return Err(crate::SimError::invalid_shape("friction must be >= 0"));
        }
        if !self.restitution.is_finite() || self.restitution < 0.0 {
            return Err(crate::SimError::invalid_shape("restitution must be >= 0"));
        }
        Ok(())
    }
}

/// Mass contribution of one shape, expressed in its body's frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassData {
    /// Mass in kg.
    pub mass: f64,
    /// Inertia tensor about the body origin.
    pub inertia: Matrix3<f64>,
    /// Center of mass in body coordinates.
    pub center: Point3<f64>,
}

impl MassData {
    /// Zero mass at the origin.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            mass: 0.0,
            inertia: Matrix3::zeros(),
            center: Point3::origin(),
        }
    }

    /// Mass data of a solid box with uniform density placed at `local`.
    ///
    /// The inertia tensor is rotated into the body frame and shifted to the
    /// body origin with the parallel axis theorem.
    #[must_use]
    pub fn solid_box(local: &Transform, half_extents: &Vector3<f64>, density: f64) -> Self {
        let e = half_extents;
        let ex2 = 4.0 * e.x * e.x;
        let ey2 = 4.0 * e.y * e.y;
        let ez2 = 4.0 * e.z * e.z;
        let mass = 8.0 * e.x * e.y * e.z * density;

        let diagonal = Matrix3::from_diagonal(&Vector3::new(
            mass * (ey2 + ez2) / 12.0,
            mass * (ex2 + ez2) / 12.0,
            mass * (ex2 + ey2) / 12.0,
        ));

        let r = local.rotation;
        let p = local.position.coords;
        let inertia = r * diagonal * r.transpose() + parallel_axis(&p, mass);

        Self {
            mass,
            inertia,
            center: local.position,
        }
    }
}

/// Parallel axis term `m * (|d|^2 I - d d^T)` for an offset `d`.
#[must_use]
pub fn parallel_axis(d: &Vector3<f64>, mass: f64) -> Matrix3<f64> {
    (Matrix3::identity() * d.dot(d) - d * d.transpose()) * mass
}
