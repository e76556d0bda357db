//! Box-box narrow phase.
//!
//! [`box_to_box`] runs a separating-axis test over the 15 candidate axes of
//! two oriented boxes (three face normals of each box plus the nine edge
//! cross products) and, on overlap, builds a contact manifold:
//!
//! - **Face axis**: the box owning the axis provides the reference face; the
//!   most anti-parallel face of the other box is the incident face. The
//!   incident quad is clipped against the four side planes of the reference
//!   face, and every clipped vertex below the reference plane becomes a
//!   contact. This yields between one and eight points.
//! - **Edge axis**: the supporting edge of each box along the axis is found,
//!   and a single contact is placed midway between the closest points of
//!   the two edges.
//!
//! Each point carries a [`FeaturePair`] naming the edges that produced it,
//! so points can be matched across steps.
//!
//! Axis selection is biased: edge axes must beat face axes, and B's faces
//! must beat A's, by a relative and an absolute tolerance. This keeps the
//! chosen axis from flickering between nearly equal candidates from one
//! frame to the next.
//!
//! # Example
//!
//! ```
//! use sim_core::{OrientedBox, box_to_box};
//! use sim_contact::Manifold;
//! use sim_types::Transform;
//! use nalgebra::{Point3, Vector3};
//!
//! let half = Vector3::repeat(0.5);
//! let a = OrientedBox::new(Transform::identity(), half);
//! let b = OrientedBox::new(Transform::from_position(Point3::new(0.0, 0.0, 0.9)), half);
//!
//! let mut manifold = Manifold::new(false);
//! assert!(box_to_box(&a, &b, &mut manifold));
//! assert_eq!(manifold.len(), 4);
//! assert!((manifold.normal - Vector3::z()).norm() < 1e-12);
//! assert!((manifold.deepest() + 0.1).abs() < 1e-12);
//! ```

use nalgebra::{Matrix3, Point3, Vector3};
use sim_contact::{Contact, FeaturePair, MAX_CONTACTS, Manifold};
use smallvec::SmallVec;

use crate::shape::OrientedBox;

/// Axes closer to parallel than this skip the edge tests.
const COS_TOLERANCE: f64 = 1.0e-6;
/// Relative tolerance of the axis bias.
const RELATIVE_TOLERANCE: f64 = 0.95;
/// Absolute tolerance of the axis bias.
const ABSOLUTE_TOLERANCE: f64 = 0.01;
/// Clip distance treated as lying on a side plane.
const ON_PLANE: f64 = 0.005;
/// Reference-edge bytes of an incident vertex no side plane has touched.
const NO_EDGE: u8 = u8::MAX;

/// A polygon vertex during clipping, tagged with its feature pair.
#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    v: Point3<f64>,
    f: FeaturePair,
}

type Polygon = SmallVec<[ClipVertex; MAX_CONTACTS]>;

/// Best axis found so far in one axis family.
#[derive(Debug, Clone, Copy)]
struct AxisQuery {
    axis: Option<u8>,
    separation: f64,
    normal: Vector3<f64>,
}

impl AxisQuery {
    fn new() -> Self {
        Self {
            axis: None,
            separation: f64::MIN,
            normal: Vector3::zeros(),
        }
    }

    /// Track a face axis. Returns `true` if it separates the boxes.
    fn track_face(&mut self, axis: u8, s: f64, normal: Vector3<f64>) -> bool {
        if s > 0.0 {
            return true;
        }
        if s > self.separation {
            self.separation = s;
            self.axis = Some(axis);
            self.normal = normal;
        }
        false
    }

    /// Track an unnormalized edge axis. Returns `true` if it separates the
    /// boxes.
    fn track_edge(&mut self, axis: u8, s: f64, normal: Vector3<f64>) -> bool {
        if s > 0.0 {
            return true;
        }
        let inv_len = 1.0 / normal.norm();
        let s = s * inv_len;
        if s > self.separation {
            self.separation = s;
            self.axis = Some(axis);
            self.normal = normal * inv_len;
        }
        false
    }
}

/// Collide two oriented boxes.
///
/// Clears `manifold.contacts`, then on overlap fills in the normal
/// (pointing from `a` to `b`) and the contact points. Penetrations are
/// negative. Returns whether any contact was produced. Tangents and
/// accumulated impulses are left to the caller.
pub fn box_to_box(a: &OrientedBox, b: &OrientedBox, manifold: &mut Manifold) -> bool {
    manifold.contacts.clear();

    let atx = &a.transform;
    let btx = &b.transform;
    let ea = a.half_extents;
    let eb = b.half_extents;

    // Row i is B's axis i expressed in A's frame
    let c: Matrix3<f64> = btx.rotation.tr_mul(&atx.rotation);
    let abs_c = c.abs();
    let parallel = abs_c.iter().any(|v| v + COS_TOLERANCE >= 1.0);

    // B's center in A's frame
    let t = atx.inverse_transform_vector(&(btx.position - atx.position));

    let mut face_a = AxisQuery::new();
    let mut face_b = AxisQuery::new();
    let mut edge = AxisQuery::new();

    for i in 0..3 {
        let s = t[i].abs() - (ea[i] + abs_c.column(i).dot(&eb));
        if face_a.track_face(axis_index(i), s, atx.axis(i)) {
            return false;
        }
    }

    for i in 0..3 {
        let s = t.dot(&c.row(i).transpose()).abs() - (eb[i] + abs_c.row(i).transpose().dot(&ea));
        if face_b.track_face(axis_index(3 + i), s, btx.axis(i)) {
            return false;
        }
    }

    if !parallel {
        for i in 0..3 {
            for j in 0..3 {
                // Cross product of A's axis i and B's axis j, in A's frame
                let n = Vector3::ith(i, 1.0).cross(&c.row(j).transpose());
                let ra = ea.dot(&n.abs());
                let rb: f64 = (0..3).map(|k| eb[k] * c.row(k).transpose().dot(&n).abs()).sum();
                let s = t.dot(&n).abs() - (ra + rb);
                if edge.track_edge(axis_index(6 + 3 * i + j), s, n) {
                    return false;
                }
            }
        }
    }

    let face_max = face_a.separation.max(face_b.separation);
    let best = if RELATIVE_TOLERANCE * edge.separation > face_max + ABSOLUTE_TOLERANCE {
        edge
    } else if RELATIVE_TOLERANCE * face_b.separation > face_a.separation + ABSOLUTE_TOLERANCE {
        face_b
    } else {
        face_a
    };

    let Some(axis) = best.axis else {
        return false;
    };

    let d = btx.position - atx.position;
    let mut n = best.normal;

    if axis < 6 {
        if n.dot(&d) < 0.0 {
            n = -n;
        }
        face_contact(a, b, axis, n, manifold);
    } else {
        // Edge normals were tracked in A's frame
        n = atx.rotation * n;
        if n.dot(&d) < 0.0 {
            n = -n;
        }

        let (pa, qa) = support_edge(a, &n);
        let (pb, qb) = support_edge(b, &-n);
        let (ca, cb) = edges_contact(&pa, &qa, &pb, &qb);

        manifold.normal = n;
        manifold.contacts.push(Contact::new(
            nalgebra::center(&ca, &cb),
            best.separation,
            FeaturePair::edge(axis),
        ));
    }

    !manifold.contacts.is_empty()
}

#[allow(clippy::cast_possible_truncation)]
fn axis_index(i: usize) -> u8 {
    i as u8
}

/// Clip the incident face against the reference face selected by a face
/// axis and store the surviving points.
fn face_contact(a: &OrientedBox, b: &OrientedBox, axis: u8, n: Vector3<f64>, manifold: &mut Manifold) {
    // The reference normal always points from the reference box outward
    let (reference, incident, n, flip) = if axis < 3 { (a, b, n, false) } else { (b, a, -n, true) };

    let incident_face = compute_incident_face(incident, &n);
    let (clip_edges, basis, e) = reference_edges_and_basis(reference, &n, axis % 3);

    let r_pos = reference.transform.position;
    let clipped = clip(&r_pos, &e, clip_edges, &basis, &incident_face);
    if clipped.is_empty() {
        return;
    }

    manifold.normal = if flip { -n } else { n };
    for (vertex, depth) in clipped {
        let feature = if flip { vertex.f.swapped() } else { vertex.f };
        manifold.contacts.push(Contact::new(vertex.v, depth, feature));
    }
}

/// Edge numbers of the four side planes, the clip basis (columns: the two
/// in-face directions, then the face normal) and the matching extents.
fn reference_edges_and_basis(
    reference: &OrientedBox,
    n: &Vector3<f64>,
    axis: u8,
) -> ([u8; 4], Matrix3<f64>, Vector3<f64>) {
    let rtx = &reference.transform;
    let er = reference.half_extents;
    let n = rtx.inverse_transform_vector(n);
    let (r0, r1, r2) = (rtx.axis(0), rtx.axis(1), rtx.axis(2));

    let basis = |x: Vector3<f64>, y: Vector3<f64>, z: Vector3<f64>| Matrix3::from_columns(&[x, y, z]);

    match axis {
        0 if n.x > 0.0 => ([1, 8, 7, 9], basis(r1, r2, r0), Vector3::new(er.y, er.z, er.x)),
        0 => ([11, 3, 10, 5], basis(r2, r1, -r0), Vector3::new(er.z, er.y, er.x)),
        1 if n.y > 0.0 => ([0, 1, 2, 3], basis(r2, r0, r1), Vector3::new(er.z, er.x, er.y)),
        1 => ([4, 5, 6, 7], basis(r2, -r0, -r1), Vector3::new(er.z, er.x, er.y)),
        _ if n.z > 0.0 => ([11, 4, 8, 0], basis(-r1, r0, r2), Vector3::new(er.y, er.x, er.z)),
        _ => ([6, 10, 2, 9], basis(-r1, -r0, -r2), Vector3::new(er.y, er.x, er.z)),
    }
}

/// The face of `incident` most anti-parallel to `n`, in world space.
fn compute_incident_face(incident: &OrientedBox, n: &Vector3<f64>) -> [ClipVertex; 4] {
    let itx = &incident.transform;
    let e = incident.half_extents;
    let n = -itx.inverse_transform_vector(n);
    let abs_n = n.abs();

    let (corners, edges): ([[f64; 3]; 4], [(u8, u8); 4]) =
        if abs_n.x > abs_n.y && abs_n.x > abs_n.z {
            if n.x > 0.0 {
                (
                    [[e.x, e.y, -e.z], [e.x, e.y, e.z], [e.x, -e.y, e.z], [e.x, -e.y, -e.z]],
                    [(9, 1), (1, 8), (8, 7), (7, 9)],
                )
            } else {
                (
                    [[-e.x, -e.y, e.z], [-e.x, e.y, e.z], [-e.x, e.y, -e.z], [-e.x, -e.y, -e.z]],
                    [(5, 11), (11, 3), (3, 10), (10, 5)],
                )
            }
        } else if abs_n.y > abs_n.x && abs_n.y > abs_n.z {
            if n.y > 0.0 {
                (
                    [[-e.x, e.y, e.z], [e.x, e.y, e.z], [e.x, e.y, -e.z], [-e.x, e.y, -e.z]],
                    [(3, 0), (0, 1), (1, 2), (2, 3)],
                )
            } else {
                (
                    [[e.x, -e.y, e.z], [-e.x, -e.y, e.z], [-e.x, -e.y, -e.z], [e.x, -e.y, -e.z]],
                    [(7, 4), (4, 5), (5, 6), (6, 7)],
                )
            }
        } else if n.z > 0.0 {
            (
                [[-e.x, e.y, e.z], [-e.x, -e.y, e.z], [e.x, -e.y, e.z], [e.x, e.y, e.z]],
                [(0, 11), (11, 4), (4, 8), (8, 0)],
            )
        } else {
            (
                [[e.x, -e.y, -e.z], [-e.x, -e.y, -e.z], [-e.x, e.y, -e.z], [e.x, e.y, -e.z]],
                [(9, 6), (6, 10), (10, 2), (2, 9)],
            )
        };

    std::array::from_fn(|k| {
        let [x, y, z] = corners[k];
        let (in_i, out_i) = edges[k];
        ClipVertex {
            v: itx.transform_point(&Point3::new(x, y, z)),
            f: FeaturePair {
                in_r: NO_EDGE,
                out_r: NO_EDGE,
                in_i,
                out_i,
            },
        }
    })
}

/// One Sutherland-Hodgman pass against the plane `sign * v[axis] = e`.
fn orthographic(sign: f64, e: f64, axis: usize, clip_edge: u8, input: &Polygon) -> Polygon {
    let in_front = |d: f64| d < 0.0;
    let behind = |d: f64| d >= 0.0;
    let on = |d: f64| d.abs() < ON_PLANE;

    let mut out = Polygon::new();
    let Some(&last) = input.last() else {
        return out;
    };

    let mut a = last;
    for &b in input {
        let da = sign * a.v[axis] - e;
        let db = sign * b.v[axis] - e;

        if (in_front(da) && in_front(db)) || on(da) || on(db) {
            out.push(b);
        } else if in_front(da) && behind(db) {
            let mut f = b.f;
            f.out_r = clip_edge;
            f.out_i = 0;
            out.push(ClipVertex {
                v: a.v + (b.v - a.v) * (da / (da - db)),
                f,
            });
        } else if behind(da) && in_front(db) {
            let mut f = a.f;
            f.in_r = clip_edge;
            f.in_i = 0;
            out.push(ClipVertex {
                v: a.v + (b.v - a.v) * (da / (da - db)),
                f,
            });
            out.push(b);
        }

        a = b;
    }

    out
}

/// Clip the incident quad to the reference face and keep the vertices
/// below it, with their signed depths.
fn clip(
    r_pos: &Point3<f64>,
    e: &Vector3<f64>,
    clip_edges: [u8; 4],
    basis: &Matrix3<f64>,
    incident: &[ClipVertex; 4],
) -> SmallVec<[(ClipVertex, f64); MAX_CONTACTS]> {
    let mut poly: Polygon = incident
        .iter()
        .map(|cv| ClipVertex {
            v: Point3::from(basis.tr_mul(&(cv.v - r_pos))),
            f: cv.f,
        })
        .collect();

    let passes = [(1.0, e.x, 0), (1.0, e.y, 1), (-1.0, e.x, 0), (-1.0, e.y, 1)];
    for ((sign, extent, axis), edge) in passes.into_iter().zip(clip_edges) {
        poly = orthographic(sign, extent, axis, edge, &poly);
        if poly.is_empty() {
            return SmallVec::new();
        }
    }

    poly.into_iter()
        .filter_map(|cv| {
            let d = cv.v.z - e.z;
            (d <= 0.0).then(|| {
                let v = r_pos + basis * cv.v.coords;
                (ClipVertex { v, f: cv.f }, d)
            })
        })
        .collect()
}

/// The edge of `b` furthest along `n`, as its two world endpoints.
fn support_edge(b: &OrientedBox, n: &Vector3<f64>) -> (Point3<f64>, Point3<f64>) {
    let tx = &b.transform;
    let e = b.half_extents;
    let n = tx.inverse_transform_vector(n);
    let abs_n = n.abs();

    let a = e;
    // The edge runs along the axis where n is smallest
    let other = if abs_n.x > abs_n.y {
        if abs_n.y > abs_n.z {
            Vector3::new(e.x, e.y, -e.z)
        } else {
            Vector3::new(e.x, -e.y, e.z)
        }
    } else if abs_n.x > abs_n.z {
        Vector3::new(e.x, e.y, -e.z)
    } else {
        Vector3::new(-e.x, e.y, e.z)
    };

    let sign = n.map(|v| if v >= 0.0 { 1.0 } else { -1.0 });
    let a = a.component_mul(&sign);
    let other = other.component_mul(&sign);

    (
        tx.transform_point(&Point3::from(a)),
        tx.transform_point(&Point3::from(other)),
    )
}

/// Closest points between the lines through `pa -> qa` and `pb -> qb`.
fn edges_contact(
    pa: &Point3<f64>,
    qa: &Point3<f64>,
    pb: &Point3<f64>,
    qb: &Point3<f64>,
) -> (Point3<f64>, Point3<f64>) {
    let da = qa - pa;
    let db = qb - pb;
    let r = pa - pb;
    let a = da.dot(&da);
    let e = db.dot(&db);
    let f = db.dot(&r);
    let c = da.dot(&r);
    let b = da.dot(&db);
    let denom = a * e - b * b;

    // Parallel edges never reach here; guard anyway against a zero divide
    let ta = if denom == 0.0 { 0.0 } else { (b * f - c * e) / denom };
    let tb = if e == 0.0 { 0.0 } else { (b * ta + f) / e };

    (pa + da * ta, pb + db * tb)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sim_types::Transform;
    use std::f64::consts::FRAC_PI_4;

    fn cube_at(x: f64, y: f64, z: f64) -> OrientedBox {
        OrientedBox::new(Transform::from_position(Point3::new(x, y, z)), Vector3::repeat(0.5))
    }

    fn collide(a: &OrientedBox, b: &OrientedBox) -> Option<Manifold> {
        let mut m = Manifold::new(false);
        box_to_box(a, b, &mut m).then_some(m)
    }

    #[test]
    fn test_stacked_cubes_face_contact() {
        let m = collide(&cube_at(0.0, 0.0, 0.0), &cube_at(0.0, 0.0, 0.9)).unwrap();

        assert_relative_eq!(m.normal, Vector3::z(), epsilon = 1e-12);
        assert_eq!(m.len(), 4);
        for c in &m.contacts {
            assert_relative_eq!(c.penetration, -0.1, epsilon = 1e-12);
            // Points lie on B's bottom face
            assert_relative_eq!(c.position.z, 0.4, epsilon = 1e-12);
            assert_relative_eq!(c.position.x.abs(), 0.5, epsilon = 1e-12);
            assert_relative_eq!(c.position.y.abs(), 0.5, epsilon = 1e-12);
        }

        let mut keys: Vec<u32> = m.contacts.iter().map(|c| c.feature.key()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 4, "feature keys must be distinct");
    }

    #[test]
    fn test_normal_points_from_a_to_b() {
        let m = collide(&cube_at(0.0, 0.0, 0.9), &cube_at(0.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(m.normal, -Vector3::z(), epsilon = 1e-12);

        let m = collide(&cube_at(0.0, 0.0, 0.0), &cube_at(-0.8, 0.0, 0.0)).unwrap();
        assert_relative_eq!(m.normal, -Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(m.deepest(), -0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_separated_boxes() {
        for (x, y, z) in [(1.01, 0.0, 0.0), (0.0, -1.5, 0.0), (0.0, 0.0, 3.0), (0.8, 0.8, 1.2)] {
            assert!(collide(&cube_at(0.0, 0.0, 0.0), &cube_at(x, y, z)).is_none());
        }
    }

    #[test]
    fn test_separated_by_edge_axis() {
        // Crossed ridges: every face projection overlaps, only the cross
        // product of the two ridge edges separates
        let a = OrientedBox::new(
            Transform::from_axis_angle(Point3::origin(), Vector3::y(), FRAC_PI_4),
            Vector3::repeat(0.5),
        );
        let b = OrientedBox::new(
            Transform::from_axis_angle(
                Point3::new(0.0, 0.0, 2.0_f64.sqrt() + 0.05),
                Vector3::x(),
                FRAC_PI_4,
            ),
            Vector3::repeat(0.5),
        );
        assert!(collide(&a, &b).is_none());
    }

    #[test]
    fn test_reference_face_on_b() {
        // A tilted cube pokes one corner into the bottom of a wide slab, so
        // the slab's face is the reference
        let a = OrientedBox::new(
            Transform::from_axis_angle(Point3::origin(), Vector3::new(1.0, 1.0, 0.0), 0.6),
            Vector3::repeat(0.5),
        );
        let top = a
            .vertices()
            .into_iter()
            .max_by(|p, q| p.z.total_cmp(&q.z))
            .unwrap();
        let b = OrientedBox::new(
            Transform::from_position(Point3::new(0.0, 0.0, top.z + 0.45)),
            Vector3::new(2.0, 2.0, 0.5),
        );
        let m = collide(&a, &b).unwrap();

        assert_relative_eq!(m.normal, Vector3::z(), epsilon = 1e-9);
        assert_eq!(m.len(), 1);
        let c = &m.contacts[0];
        assert_relative_eq!(c.penetration, -0.05, epsilon = 1e-9);
        assert_relative_eq!(c.position, top, epsilon = 1e-9);
        // Swapped pair: the untouched reference bytes land on the B side
        assert_eq!(c.feature.in_i, NO_EDGE);
        assert_eq!(c.feature.out_i, NO_EDGE);
    }

    #[test]
    fn test_clipped_overlap_produces_more_than_four_points() {
        // A cube turned 45 degrees on another cube: an octagon of contacts
        let a = cube_at(0.0, 0.0, 0.0);
        let b = OrientedBox::new(
            Transform::from_axis_angle(Point3::new(0.0, 0.0, 0.95), Vector3::z(), FRAC_PI_4),
            Vector3::repeat(0.5),
        );
        let m = collide(&a, &b).unwrap();

        assert_relative_eq!(m.normal, Vector3::z(), epsilon = 1e-12);
        assert_eq!(m.len(), 8);
        for c in &m.contacts {
            assert_relative_eq!(c.penetration, -0.05, epsilon = 1e-12);
            assert!(c.position.x.abs() <= 0.5 + 1e-9);
            assert!(c.position.y.abs() <= 0.5 + 1e-9);
        }
    }

    #[test]
    fn test_edge_edge_contact() {
        // A cube rotated about x resting its bottom edge across the top edge
        // of a cube rotated about y
        let a = OrientedBox::new(
            Transform::from_axis_angle(Point3::origin(), Vector3::y(), FRAC_PI_4),
            Vector3::repeat(0.5),
        );
        let h = 2.0_f64.sqrt() - 0.05;
        let b = OrientedBox::new(
            Transform::from_axis_angle(Point3::new(0.0, 0.0, h), Vector3::x(), FRAC_PI_4),
            Vector3::repeat(0.5),
        );
        let m = collide(&a, &b).unwrap();

        assert_eq!(m.len(), 1);
        assert!(m.contacts[0].feature.in_r >= 6);
        assert_relative_eq!(m.normal, Vector3::z(), epsilon = 1e-9);
        assert_relative_eq!(m.contacts[0].penetration, -0.05, epsilon = 1e-9);
        assert_relative_eq!(m.contacts[0].position, Point3::new(0.0, 0.0, h * 0.5), epsilon = 1e-9);
    }

    #[test]
    fn test_orthographic_keeps_inside_and_cuts_crossing_edges() {
        let quad: Polygon = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
            .into_iter()
            .enumerate()
            .map(|(k, (x, y))| ClipVertex {
                v: Point3::new(x, y, 0.0),
                f: FeaturePair::incident(k as u8, k as u8 + 1),
            })
            .collect();

        let out = orthographic(1.0, 0.5, 0, 42, &quad);
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|cv| cv.v.x <= 0.5 + 1e-12));
        assert_eq!(out.iter().filter(|cv| cv.v.x == 0.5).count(), 2);
        assert!(out.iter().any(|cv| cv.f.out_r == 42));
        assert!(out.iter().any(|cv| cv.f.in_r == 42));
    }

    #[test]
    fn test_edges_contact_closest_points() {
        let (ca, cb) = edges_contact(
            &Point3::new(-1.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.3, -1.0, 1.0),
            &Point3::new(0.3, 1.0, 1.0),
        );
        assert_relative_eq!(ca, Point3::new(0.3, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(cb, Point3::new(0.3, 0.0, 1.0), epsilon = 1e-12);
    }
}
