//! Oriented boxes, the only collision shape.
//!
//! [`OrientedBox`] is the geometric primitive: a world transform plus
//! half-extents. [`BoxShape`] is the record a body owns; it stores the
//! box's placement in body space, its material and its broad-phase proxy,
//! and produces an [`OrientedBox`] for any body transform.
//!
//! Vertices are numbered by the sign of each half-extent, x slowest:
//!
//! ```text
//! 0: (-x, -y, -z)   4: (+x, -y, -z)
//! 1: (-x, -y, +z)   5: (+x, -y, +z)
//! 2: (-x, +y, -z)   6: (+x, +y, -z)
//! 3: (-x, +y, +z)   7: (+x, +y, +z)
//! ```

use nalgebra::{Point3, Vector3};
use sim_types::{BoxDef, MassData, Transform};

use crate::aabb::Aabb;
use crate::alloc::HeapBlock;
use crate::dynamic_tree::ProxyId;
use crate::handle::BodyHandle;
use crate::query::{Ray, RaycastHit};

/// Triangle list covering the six faces, two triangles each, wound
/// counter-clockwise seen from outside.
pub const BOX_TRIANGLES: [[usize; 3]; 12] = [
    [0, 6, 4],
    [0, 2, 6],
    [0, 3, 2],
    [0, 1, 3],
    [2, 7, 6],
    [2, 3, 7],
    [4, 6, 7],
    [4, 7, 5],
    [0, 4, 5],
    [0, 5, 1],
    [1, 5, 7],
    [1, 7, 3],
];

/// A box placed in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    /// World transform of the box center.
    pub transform: Transform,
    /// Half-extents along the box axes.
    pub half_extents: Vector3<f64>,
}

impl OrientedBox {
    /// A box at `transform` with the given half-extents.
    #[must_use]
    pub fn new(transform: Transform, half_extents: Vector3<f64>) -> Self {
        Self {
            transform,
            half_extents,
        }
    }

    /// The eight corners in world space.
    #[must_use]
    pub fn vertices(&self) -> [Point3<f64>; 8] {
        let e = self.half_extents;
        let mut out = [Point3::origin(); 8];
        for (i, v) in out.iter_mut().enumerate() {
            let sx = if i & 4 == 0 { -e.x } else { e.x };
            let sy = if i & 2 == 0 { -e.y } else { e.y };
            let sz = if i & 1 == 0 { -e.z } else { e.z };
            *v = self.transform.transform_point(&Point3::new(sx, sy, sz));
        }
        out
    }

    /// Tight world-space AABB.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        // |R| e gives the world half-extents directly
        let r = self.transform.rotation.abs();
        let half = r * self.half_extents;
        Aabb::from_center(self.transform.position, half)
    }

    /// Whether `point` lies inside or on the box.
    #[must_use]
    pub fn contains_point(&self, point: &Point3<f64>) -> bool {
        let p = self.transform.inverse_transform_point(point);
        (0..3).all(|i| p[i].abs() <= self.half_extents[i])
    }

    /// Cast `ray` against the box.
    ///
    /// A ray starting inside the box hits at `toi = 0` with the normal
    /// facing back along the ray.
    #[must_use]
    pub fn raycast(&self, ray: &Ray) -> Option<RaycastHit> {
        const EPSILON: f64 = 1.0e-8;

        let d = self.transform.inverse_transform_vector(&ray.dir);
        let p = self.transform.inverse_transform_point(&ray.start);
        let e = self.half_extents;

        let mut t_min = 0.0;
        let mut t_max = ray.max_t;
        let mut normal: Option<Vector3<f64>> = None;

        for i in 0..3 {
            if d[i].abs() < EPSILON {
                // Parallel to the slab: outside means no hit
                if p[i] < -e[i] || p[i] > e[i] {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / d[i];
            let s = if d[i] < 0.0 { -1.0 } else { 1.0 };
            let ei = e[i] * s;
            let t0 = -(ei + p[i]) * inv;
            let t1 = (ei - p[i]) * inv;

            if t0 > t_min {
                let mut n = Vector3::zeros();
                n[i] = -s;
                normal = Some(n);
                t_min = t0;
            }
            t_max = f64::min(t_max, t1);

            if t_min > t_max {
                return None;
            }
        }

        let normal = match normal {
            Some(n) => self.transform.transform_vector(&n),
            None => -ray.dir,
        };
        Some(RaycastHit { toi: t_min, normal })
    }
}

/// A box attached to a body.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxShape {
    pub(crate) local: Transform,
    pub(crate) half_extents: Vector3<f64>,
    pub(crate) body: BodyHandle,
    pub(crate) friction: f64,
    pub(crate) restitution: f64,
    pub(crate) density: f64,
    pub(crate) sensor: bool,
    pub(crate) user_data: u64,
    pub(crate) proxy: Option<ProxyId>,
    pub(crate) heap_block: Option<HeapBlock>,
}

impl BoxShape {
    pub(crate) fn from_def(def: &BoxDef, body: BodyHandle) -> Self {
        Self {
            local: def.local,
            half_extents: def.half_extents,
            body,
            friction: def.friction,
            restitution: def.restitution,
            density: def.density,
            sensor: def.sensor,
            user_data: def.user_data,
            proxy: None,
            heap_block: None,
        }
    }

    /// Placement relative to the owning body.
    #[must_use]
    pub fn local_transform(&self) -> &Transform {
        &self.local
    }

    /// Half-extents.
    #[must_use]
    pub fn half_extents(&self) -> Vector3<f64> {
        self.half_extents
    }

    /// Owning body.
    #[must_use]
    pub fn body(&self) -> BodyHandle {
        self.body
    }

    /// Friction coefficient.
    #[must_use]
    pub fn friction(&self) -> f64 {
        self.friction
    }

    /// Set the friction coefficient used by contacts created from now on.
    pub fn set_friction(&mut self, friction: f64) {
        self.friction = friction;
    }

    /// Restitution coefficient.
    #[must_use]
    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    /// Set the restitution coefficient used by contacts created from now on.
    pub fn set_restitution(&mut self, restitution: f64) {
        self.restitution = restitution;
    }

    /// Density (kg/m³).
    #[must_use]
    pub fn density(&self) -> f64 {
        self.density
    }

    /// Whether the box only reports overlap.
    #[must_use]
    pub fn is_sensor(&self) -> bool {
        self.sensor
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

    /// Broad-phase proxy of the box.
    #[must_use]
    pub fn proxy(&self) -> Option<ProxyId> {
        self.proxy
    }

    /// The box in world space for a body at `body_tx`.
    #[must_use]
    pub fn oriented(&self, body_tx: &Transform) -> OrientedBox {
        OrientedBox::new(body_tx.compose(&self.local), self.half_extents)
    }

    /// Tight world AABB for a body at `body_tx`.
    #[must_use]
    pub fn compute_aabb(&self, body_tx: &Transform) -> Aabb {
        self.oriented(body_tx).aabb()
    }

    /// Mass contribution in body space.
    #[must_use]
    pub fn compute_mass(&self) -> MassData {
        MassData::solid_box(&self.local, &self.half_extents, self.density)
    }

    /// Whether a world point lies inside the box of a body at `body_tx`.
    #[must_use]
    pub fn test_point(&self, body_tx: &Transform, point: &Point3<f64>) -> bool {
        self.oriented(body_tx).contains_point(point)
    }

    /// Cast a world ray against the box of a body at `body_tx`.
    #[must_use]
    pub fn raycast(&self, body_tx: &Transform, ray: &Ray) -> Option<RaycastHit> {
        self.oriented(body_tx).raycast(ray)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_4;

    fn unit_box() -> OrientedBox {
        OrientedBox::new(Transform::identity(), Vector3::repeat(0.5))
    }

    #[test]
    fn test_vertices_follow_sign_pattern() {
        let v = unit_box().vertices();
        assert_eq!(v[0], Point3::new(-0.5, -0.5, -0.5));
        assert_eq!(v[1], Point3::new(-0.5, -0.5, 0.5));
        assert_eq!(v[6], Point3::new(0.5, 0.5, -0.5));
        assert_eq!(v[7], Point3::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn test_triangles_face_outward() {
        let b = unit_box();
        let v = b.vertices();
        for [i, j, k] in BOX_TRIANGLES {
            let n = (v[j] - v[i]).cross(&(v[k] - v[i]));
            let centroid = (v[i].coords + v[j].coords + v[k].coords) / 3.0;
            assert!(n.dot(&centroid) > 0.0, "triangle {i} {j} {k} faces inward");
        }
    }

    #[test]
    fn test_aabb_of_rotated_box() {
        let tx = Transform::from_axis_angle(Point3::new(1.0, 0.0, 0.0), Vector3::z(), FRAC_PI_4);
        let b = OrientedBox::new(tx, Vector3::repeat(0.5));
        let aabb = b.aabb();
        let half_diag = 0.5 * 2.0_f64.sqrt();
        assert_relative_eq!(aabb.max.x, 1.0 + half_diag, epsilon = 1e-12);
        assert_relative_eq!(aabb.min.y, -half_diag, epsilon = 1e-12);
        assert_relative_eq!(aabb.max.z, 0.5, epsilon = 1e-12);

        let from_vertices = Aabb::from_points(&b.vertices()).unwrap();
        assert_relative_eq!(aabb.min, from_vertices.min, epsilon = 1e-12);
        assert_relative_eq!(aabb.max, from_vertices.max, epsilon = 1e-12);
    }

    #[test]
    fn test_contains_point() {
        let tx = Transform::from_axis_angle(Point3::origin(), Vector3::z(), FRAC_PI_4);
        let b = OrientedBox::new(tx, Vector3::new(1.0, 0.1, 0.1));
        assert!(b.contains_point(&Point3::new(0.6, 0.6, 0.0)));
        assert!(!b.contains_point(&Point3::new(0.9, 0.0, 0.0)));
    }

    #[test]
    fn test_raycast_hits_face() {
        let ray = Ray::new(Point3::new(-5.0, 0.0, 0.0), Vector3::x(), 100.0);
        let hit = unit_box().raycast(&ray).unwrap();
        assert_relative_eq!(hit.toi, 4.5, epsilon = 1e-12);
        assert_relative_eq!(hit.normal, -Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(hit.point(&ray), Point3::new(-0.5, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_raycast_respects_length_and_misses() {
        let short = Ray::new(Point3::new(-5.0, 0.0, 0.0), Vector3::x(), 4.0);
        assert!(unit_box().raycast(&short).is_none());

        let beside = Ray::new(Point3::new(-5.0, 2.0, 0.0), Vector3::x(), 100.0);
        assert!(unit_box().raycast(&beside).is_none());
    }

    #[test]
    fn test_raycast_from_inside() {
        let ray = Ray::new(Point3::origin(), Vector3::z(), 10.0);
        let hit = unit_box().raycast(&ray).unwrap();
        assert_eq!(hit.toi, 0.0);
        assert_relative_eq!(hit.normal, -Vector3::z());
    }

    #[test]
    fn test_raycast_rotated_box_normal_in_world() {
        let tx = Transform::from_axis_angle(Point3::new(0.0, 0.0, 3.0), Vector3::y(), FRAC_PI_4);
        let b = OrientedBox::new(tx, Vector3::repeat(1.0));
        let ray = Ray::new(Point3::new(0.0, 0.0, 10.0), -Vector3::z(), 20.0);
        let hit = b.raycast(&ray).unwrap();

        // Hits the top edge ridge at 3 + sqrt(2)
        assert_relative_eq!(hit.toi, 7.0 - 2.0_f64.sqrt(), epsilon = 1e-9);
        assert!(hit.normal.z > 0.0);
        assert_relative_eq!(hit.normal.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_shape_mass_from_def() {
        let def = BoxDef::new(Transform::identity(), Vector3::new(1.0, 0.5, 0.25)).with_density(2.0);
        let shape = BoxShape::from_def(&def, BodyHandle(crate::alloc::PagedPool::new().insert(())));
        let md = shape.compute_mass();
        assert_relative_eq!(md.mass, 8.0 * 1.0 * 0.5 * 0.25 * 2.0);
        assert_eq!(shape.density(), 2.0);
    }
}
