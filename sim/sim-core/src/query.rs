//! Spatial queries against a scene.
//!
//! All three queries walk the broad-phase tree first and then run the exact
//! box test on each candidate. Callbacks return `true` to keep going and
//! `false` to stop the query early.
//!
//! # Example
//!
//! ```
//! use sim_core::{Ray, Scene};
//! use sim_types::{BodyDef, BoxDef, SceneConfig, Transform};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut scene = Scene::new(SceneConfig::default()).unwrap();
//! let ground = scene.create_body(&BodyDef::fixed()).unwrap();
//! scene
//!     .add_box(ground, &BoxDef::new(Transform::identity(), Vector3::new(5.0, 5.0, 0.5)))
//!     .unwrap();
//!
//! let ray = Ray::new(Point3::new(0.0, 0.0, 10.0), -Vector3::z(), 20.0);
//! let (_, hit) = scene.raycast_closest(&ray).unwrap();
//! assert!((hit.toi - 9.5).abs() < 1e-9);
//! assert!(scene.query_point_any(&Point3::new(1.0, 1.0, 0.0)));
//! ```

use nalgebra::{Point3, Vector3};

use crate::aabb::Aabb;
use crate::handle::BoxHandle;
use crate::scene::Scene;
use crate::shape::BoxShape;

/// Half-size of the box used to look up point query candidates.
const POINT_QUERY_EXTENT: f64 = 0.5;

/// A ray segment `start + t * dir` for `t` in `[0, max_t]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Origin.
    pub start: Point3<f64>,
    /// Direction. With a unit direction `t` is a distance.
    pub dir: Vector3<f64>,
    /// Largest parameter considered.
    pub max_t: f64,
}

impl Ray {
    /// A ray from `start` along `dir`, up to parameter `max_t`.
    #[must_use]
    pub fn new(start: Point3<f64>, dir: Vector3<f64>, max_t: f64) -> Self {
        Self { start, dir, max_t }
    }

    /// A ray from `start` to `end`, with a unit direction.
    ///
    /// Returns `None` if the two points coincide.
    #[must_use]
    pub fn between(start: Point3<f64>, end: Point3<f64>) -> Option<Self> {
        let delta = end - start;
        let length = delta.norm();
        if length == 0.0 {
            return None;
        }
        Some(Self::new(start, delta / length, length))
    }

    /// The point at parameter `t`.
    #[must_use]
    pub fn point_at(&self, t: f64) -> Point3<f64> {
        self.start + self.dir * t
    }

    /// The far end of the segment.
    #[must_use]
    pub fn end(&self) -> Point3<f64> {
        self.point_at(self.max_t)
    }
}

/// Where a ray struck a box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    /// Ray parameter of the hit.
    pub toi: f64,
    /// World-space surface normal at the hit.
    pub normal: Vector3<f64>,
}

impl RaycastHit {
    /// World position of the hit along `ray`.
    #[must_use]
    pub fn point(&self, ray: &Ray) -> Point3<f64> {
        ray.point_at(self.toi)
    }
}

impl Scene {
    /// Report every box whose world AABB overlaps `aabb`.
    pub fn query_aabb(&self, aabb: &Aabb, mut callback: impl FnMut(BoxHandle, &BoxShape) -> bool) {
        let tree = self.contacts.broad_phase.tree();
        tree.query_aabb(aabb, |proxy| {
            let Some(&handle) = tree.user_data(proxy) else {
                return true;
            };
            let Some((shape, tx)) = self.box_with_transform(handle) else {
                return true;
            };
            if shape.compute_aabb(tx).overlaps(aabb) {
                return callback(handle, shape);
            }
            true
        });
    }

    /// Report every box containing `point`.
    pub fn query_point(&self, point: &Point3<f64>, mut callback: impl FnMut(BoxHandle, &BoxShape) -> bool) {
        let bounds = Aabb::from_center(*point, Vector3::repeat(POINT_QUERY_EXTENT));
        let tree = self.contacts.broad_phase.tree();
        tree.query_aabb(&bounds, |proxy| {
            let Some(&handle) = tree.user_data(proxy) else {
                return true;
            };
            let Some((shape, tx)) = self.box_with_transform(handle) else {
                return true;
            };
            if shape.test_point(tx, point) {
                return callback(handle, shape);
            }
            true
        });
    }

    /// Whether any box contains `point`.
    #[must_use]
    pub fn query_point_any(&self, point: &Point3<f64>) -> bool {
        let mut found = false;
        self.query_point(point, |_, _| {
            found = true;
            false
        });
        found
    }

    /// Report every box struck by `ray`, in tree order.
    pub fn raycast(&self, ray: &Ray, mut callback: impl FnMut(BoxHandle, &RaycastHit) -> bool) {
        let end = ray.end();
        let tree = self.contacts.broad_phase.tree();
        tree.query_segment(&ray.start, &end, |proxy| {
            let Some(&handle) = tree.user_data(proxy) else {
                return true;
            };
            let Some((shape, tx)) = self.box_with_transform(handle) else {
                return true;
            };
            match shape.raycast(tx, ray) {
                Some(hit) => callback(handle, &hit),
                None => true,
            }
        });
    }

    /// The nearest box struck by `ray`.
    #[must_use]
    pub fn raycast_closest(&self, ray: &Ray) -> Option<(BoxHandle, RaycastHit)> {
        let mut best: Option<(BoxHandle, RaycastHit)> = None;
        self.raycast(ray, |handle, hit| {
            if best.is_none_or(|(_, b)| hit.toi < b.toi) {
                best = Some((handle, *hit));
            }
            true
        });
        best
    }
}
