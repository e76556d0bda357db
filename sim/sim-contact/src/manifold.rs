//! Contact manifolds and feature pairs.
//!
//! A [`Manifold`] is the narrow-phase result for one pair of boxes: a shared
//! normal pointing from box A to box B, two tangent directions, and up to
//! eight contact points. Each point carries a [`FeaturePair`] naming the
//! box features that produced it, which is how points are matched from one
//! step to the next for warm starting.

use nalgebra::{Point3, Vector3};
use smallvec::SmallVec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum number of points in one manifold.
pub const MAX_CONTACTS: usize = 8;

/// Identifies the features (edges or faces) that generated a contact point.
///
/// For face contacts the four bytes name the incoming and outgoing edges on
/// the reference (`r`) and incident (`i`) boxes. Edge-edge contacts store
/// the separating axis index in `in_r` and zero elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeaturePair {
    /// Edge entering the reference face.
    pub in_r: u8,
    /// Edge leaving the reference face.
    pub out_r: u8,
    /// Edge entering the incident face.
    pub in_i: u8,
    /// Edge leaving the incident face.
    pub out_i: u8,
}

impl FeaturePair {
    /// Feature pair for an incident-face vertex between two incident edges.
    #[must_use]
    pub const fn incident(in_i: u8, out_i: u8) -> Self {
        Self {
            in_r: 0,
            out_r: 0,
            in_i,
            out_i,
        }
    }

    /// Feature pair for an edge-edge contact found on SAT axis `axis`.
    #[must_use]
    pub const fn edge(axis: u8) -> Self {
        Self {
            in_r: axis,
            out_r: 0,
            in_i: 0,
            out_i: 0,
        }
    }

    /// Reference and incident roles exchanged.
    #[must_use]
    pub const fn swapped(self) -> Self {
        Self {
            in_r: self.in_i,
            out_r: self.out_i,
            in_i: self.in_r,
            out_i: self.out_r,
        }
    }

    /// Packed 32-bit key.
    #[must_use]
    pub const fn key(self) -> u32 {
        u32::from_le_bytes([self.in_r, self.out_r, self.in_i, self.out_i])
    }
}

/// One contact point of a manifold plus its persistent solver state.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Contact {
    /// World position of the contact.
    pub position: Point3<f64>,
    /// Signed depth; negative when the boxes overlap.
    pub penetration: f64,
    /// Accumulated normal impulse.
    pub normal_impulse: f64,
    /// Accumulated friction impulses along the two tangents.
    pub tangent_impulse: [f64; 2],
    /// Features on A and B that produced this point.
    pub feature: FeaturePair,
    /// Number of consecutive steps this point was matched, saturating.
    pub warm_started: u8,
}

impl Contact {
    /// A fresh contact with no accumulated impulse.
    #[must_use]
    pub fn new(position: Point3<f64>, penetration: f64, feature: FeaturePair) -> Self {
        Self {
            position,
            penetration,
            normal_impulse: 0.0,
            tangent_impulse: [0.0; 2],
            feature,
            warm_started: 0,
        }
    }
}

/// Contact set between two boxes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Manifold {
    /// Unit normal from A to B.
    pub normal: Vector3<f64>,
    /// Orthonormal tangents completing the normal into a basis.
    pub tangents: [Vector3<f64>; 2],
    /// Contact points, at most [`MAX_CONTACTS`].
    pub contacts: SmallVec<[Contact; MAX_CONTACTS]>,
    /// Whether either box is a sensor.
    pub sensor: bool,
}

impl Default for Manifold {
    fn default() -> Self {
        Self {
            normal: Vector3::z(),
            tangents: [Vector3::x(), Vector3::y()],
            contacts: SmallVec::new(),
            sensor: false,
        }
    }
}

impl Manifold {
    /// An empty manifold.
    #[must_use]
    pub fn new(sensor: bool) -> Self {
        Self {
            sensor,
            ..Self::default()
        }
    }

    /// Number of contact points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// Whether the manifold has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Deepest penetration among the points (most negative), or zero.
    #[must_use]
    pub fn deepest(&self) -> f64 {
        self.contacts
            .iter()
            .map(|c| c.penetration)
            .fold(0.0, f64::min)
    }

    /// Rebuild the tangent basis from the current normal.
    pub fn update_tangents(&mut self) {
        let (t0, t1) = compute_basis(&self.normal);
        self.tangents = [t0, t1];
    }

    /// Seed accumulated impulses from the previous manifold of the same pair.
    ///
    /// Points are matched by feature key. A matched point keeps the old
    /// normal impulse; the old friction impulse is re-projected onto the new
    /// tangent basis. Unmatched points start from zero.
    pub fn warm_start_from(&mut self, old: &Self) {
        let [ot0, ot1] = old.tangents;
        let [t0, t1] = self.tangents;

        for c in &mut self.contacts {
            c.normal_impulse = 0.0;
            c.tangent_impulse = [0.0; 2];
            let previous = c.warm_started;
            c.warm_started = 0;

            if let Some(oc) = old.contacts.iter().find(|oc| oc.feature.key() == c.feature.key()) {
                c.normal_impulse = oc.normal_impulse;
                let friction = ot0 * oc.tangent_impulse[0] + ot1 * oc.tangent_impulse[1];
                c.tangent_impulse = [friction.dot(&t0), friction.dot(&t1)];
                c.warm_started = previous.max(oc.warm_started).saturating_add(1);
            }
        }
    }
}

/// Two unit vectors that form a right-handed orthonormal basis with `a`.
///
/// `a` must be unit length. Returns `(b, c)` with `c = a × b`.
#[must_use]
pub fn compute_basis(a: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    // At least one component of a unit vector is >= sqrt(1/3)
    let b = if a.x.abs() >= 0.577_350_27 {
        Vector3::new(a.y, -a.x, 0.0)
    } else {
        Vector3::new(0.0, a.z, -a.y)
    };
    let b = b.normalize();
    let c = a.cross(&b);
    (b, c)
}
