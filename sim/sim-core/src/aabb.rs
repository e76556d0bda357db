//! Axis-aligned bounding boxes.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box (AABB).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point3<f64>,
    /// Maximum corner of the bounding box.
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create a new AABB from minimum and maximum corners.
    #[must_use]
    pub const fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with the given half-extents.
    #[must_use]
    pub fn from_center(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Smallest AABB enclosing all `points`, or `None` for no points.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = *points.next()?;
        Some(points.fold(Self::new(first, first), |acc, p| Self {
            min: acc.min.inf(p),
            max: acc.max.sup(p),
        }))
    }

    /// Check if this AABB overlaps with another AABB. Touching counts.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Whether `other` lies entirely inside this AABB.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    /// Whether `point` lies inside or on this AABB.
    #[must_use]
    pub fn contains_point(&self, point: &Point3<f64>) -> bool {
        self.min.x <= point.x
            && self.min.y <= point.y
            && self.min.z <= point.z
            && self.max.x >= point.x
            && self.max.y >= point.y
            && self.max.z >= point.z
    }

    /// Smallest AABB containing both boxes.
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Expand this AABB by a margin on all sides.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        let m = Vector3::repeat(margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Surface area, the cost metric of the dynamic tree.
    #[must_use]
    pub fn surface_area(&self) -> f64 {
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.x * d.z + d.y * d.z)
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Half-extents along each axis.
    #[must_use]
    pub fn half_extents(&self) -> Vector3<f64> {
        (self.max - self.min) * 0.5
    }

    /// Whether the segment `p0 -> p1` touches this AABB.
    ///
    /// Separating-axis test over the three box axes and the three cross
    /// products of the segment direction with them.
    #[must_use]
    pub fn intersects_segment(&self, p0: &Point3<f64>, p1: &Point3<f64>) -> bool {
        const EPSILON: f64 = 1.0e-6;

        // Doubled quantities throughout: e is the full extent, m twice the
        // offset of the segment midpoint from the box center.
        let e = self.max - self.min;
        let d = p1 - p0;
        let m = (p0.coords + p1.coords) - (self.min.coords + self.max.coords);

        let mut adx = d.x.abs();
        if m.x.abs() > e.x + adx {
            return false;
        }
        let mut ady = d.y.abs();
        if m.y.abs() > e.y + ady {
            return false;
        }
        let mut adz = d.z.abs();
        if m.z.abs() > e.z + adz {
            return false;
        }

        // Guard against a segment (nearly) parallel to an axis
        adx += EPSILON;
        ady += EPSILON;
        adz += EPSILON;

        if (m.y * d.z - m.z * d.y).abs() > e.y * adz + e.z * ady {
            return false;
        }
        if (m.z * d.x - m.x * d.z).abs() > e.x * adz + e.z * adx {
            return false;
        }
        if (m.x * d.y - m.y * d.x).abs() > e.x * ady + e.y * adx {
            return false;
        }

        true
    }

    /// The eight corners, in `(x, y, z)` binary order of min/max.
    #[must_use]
    pub fn corners(&self) -> [Point3<f64>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3::new(a.x, a.y, a.z),
            Point3::new(a.x, a.y, b.z),
            Point3::new(a.x, b.y, a.z),
            Point3::new(a.x, b.y, b.z),
            Point3::new(b.x, a.y, a.z),
            Point3::new(b.x, a.y, b.z),
            Point3::new(b.x, b.y, a.z),
            Point3::new(b.x, b.y, b.z),
        ]
    }

    /// Whether all coordinates are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.min.iter().chain(self.max.iter()).all(|v| v.is_finite())
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new(Point3::origin(), Point3::origin())
    }
}
