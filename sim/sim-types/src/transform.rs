//! Rigid transforms.
//!
//! A [`Transform`] stores orientation as a rotation matrix rather than a
//! quaternion: the collision code works directly on box axes (matrix
//! columns), so keeping the matrix avoids rebuilding it for every pair test.

use nalgebra::{Matrix3, Point3, Rotation3, Unit, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Position and orientation of a frame in 3D space.
///
/// # Example
///
/// ```
/// use sim_types::Transform;
/// use nalgebra::{Point3, Vector3};
///
/// let tx = Transform::from_axis_angle(
///     Point3::new(1.0, 0.0, 0.0),
///     Vector3::z(),
///     std::f64::consts::FRAC_PI_2,
/// );
///
/// let world = tx.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert!((world - Point3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
///
/// let local = tx.inverse_transform_point(&world);
/// assert!((local - Point3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transform {
    /// Origin of the frame.
    pub position: Point3<f64>,
    /// Orientation; columns are the frame's axes expressed in the parent frame.
    pub rotation: Matrix3<f64>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    /// The identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            rotation: Matrix3::identity(),
        }
    }

    /// Pure translation.
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: Matrix3::identity(),
        }
    }

    /// Build from a position and a rotation matrix.
    #[must_use]
    pub fn new(position: Point3<f64>, rotation: Matrix3<f64>) -> Self {
        Self { position, rotation }
    }

    /// Build from a position and a unit quaternion.
    #[must_use]
    pub fn from_quaternion(position: Point3<f64>, q: &UnitQuaternion<f64>) -> Self {
        Self {
            position,
            rotation: q.to_rotation_matrix().into_inner(),
        }
    }

    /// Build from a position and a rotation of `angle` radians about `axis`.
    ///
    /// A zero-length axis yields the identity rotation.
    #[must_use]
    pub fn from_axis_angle(position: Point3<f64>, axis: Vector3<f64>, angle: f64) -> Self {
        Self::from_quaternion(position, &axis_angle_quaternion(axis, angle))
    }

    /// Orientation as a unit quaternion.
    #[must_use]
    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(self.rotation))
    }

    /// Map a point from this frame into the parent frame.
    #[must_use]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * p.coords
    }

    /// Map a point from the parent frame into this frame.
    #[must_use]
    pub fn inverse_transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.tr_mul(&(p - self.position)))
    }

    /// Rotate a direction from this frame into the parent frame.
    #[must_use]
    pub fn transform_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * v
    }

    /// Rotate a direction from the parent frame into this frame.
    #[must_use]
    pub fn inverse_transform_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.tr_mul(v)
    }

    /// Compose two transforms: `self * local`.
    ///
    /// The result maps points of `local`'s frame straight into the parent
    /// frame of `self`.
    #[must_use]
    pub fn compose(&self, local: &Self) -> Self {
        Self {
            position: self.transform_point(&local.position),
            rotation: self.rotation * local.rotation,
        }
    }

    /// The `i`th axis of the frame (column of the rotation matrix).
    #[must_use]
    pub fn axis(&self, i: usize) -> Vector3<f64> {
        self.rotation.column(i).into_owned()
    }

    /// Whether every component is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|x| x.is_finite()) && self.rotation.iter().all(|x| x.is_finite())
    }
}

/// Quaternion for a rotation of `angle` radians about `axis`.
///
/// The axis is normalized first; a degenerate axis produces the identity.
#[must_use]
pub fn axis_angle_quaternion(axis: Vector3<f64>, angle: f64) -> UnitQuaternion<f64> {
    Unit::try_new(axis, 1.0e-12)
        .map_or_else(UnitQuaternion::identity, |axis| {
            UnitQuaternion::from_axis_angle(&axis, angle)
        })
}
