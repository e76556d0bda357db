//! Contact constraints and their lifecycle.
//!
//! A [`ContactConstraint`] exists for every pair of boxes whose fat AABBs
//! overlap in the broad phase, whether or not the boxes actually touch. The
//! [`ContactManager`] creates constraints when the broad phase reports a new
//! pair, refreshes their manifolds each step, and destroys them once the fat
//! boxes separate or the bodies can no longer collide.
//!
//! Constraints live in a [`PagedPool`] and are linked into both bodies'
//! contact-edge lists, so the island builder can walk the contact graph
//! from any body.

use hashbrown::HashMap;
use sim_contact::Manifold;
use sim_types::MaterialMixing;
use tracing::{debug, trace};

use crate::alloc::PagedPool;
use crate::body::{Body, ContactEdge};
use crate::broad_phase::BroadPhase;
use crate::collide::box_to_box;
use crate::handle::{BodyHandle, BoxHandle, ContactHandle};
use crate::shape::BoxShape;

/// A potential or active contact between two boxes.
#[derive(Debug, Clone)]
pub struct ContactConstraint {
    pub(crate) box_a: BoxHandle,
    pub(crate) box_b: BoxHandle,
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    pub(crate) manifold: Manifold,
    pub(crate) friction: f64,
    pub(crate) restitution: f64,
    pub(crate) colliding: bool,
    pub(crate) was_colliding: bool,
    pub(crate) island: bool,
}

impl ContactConstraint {
    /// The two boxes, in pair order.
    #[must_use]
    pub fn boxes(&self) -> (BoxHandle, BoxHandle) {
        (self.box_a, self.box_b)
    }

    /// The bodies owning the two boxes.
    #[must_use]
    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        (self.body_a, self.body_b)
    }

    /// Current contact points and normal. The normal points from A to B.
    #[must_use]
    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// Mixed friction coefficient.
    #[must_use]
    pub fn friction(&self) -> f64 {
        self.friction
    }

    /// Mixed restitution coefficient.
    #[must_use]
    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    /// Whether the boxes touched at the last narrow-phase test.
    #[must_use]
    pub fn is_colliding(&self) -> bool {
        self.colliding
    }

    /// Whether the boxes touched at the test before that.
    #[must_use]
    pub fn was_colliding(&self) -> bool {
        self.was_colliding
    }

    /// Touching now but not before.
    #[must_use]
    pub fn began_touching(&self) -> bool {
        self.colliding && !self.was_colliding
    }

    /// Touched before but not now.
    #[must_use]
    pub fn stopped_touching(&self) -> bool {
        !self.colliding && self.was_colliding
    }

    /// Whether either box is a sensor. Sensor contacts are never solved.
    #[must_use]
    pub fn is_sensor(&self) -> bool {
        self.manifold.sensor
    }

    /// The body on the other side from `body`.
    #[must_use]
    pub fn other_body(&self, body: BodyHandle) -> BodyHandle {
        if self.body_a == body { self.body_b } else { self.body_a }
    }
}

fn pair_key(a: BoxHandle, b: BoxHandle) -> (BoxHandle, BoxHandle) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Owner of all contact constraints and of the broad phase that feeds them.
#[derive(Debug, Clone)]
pub(crate) struct ContactManager {
    pub(crate) pool: PagedPool<ContactConstraint>,
    pub(crate) broad_phase: BroadPhase<BoxHandle>,
    pairs: HashMap<(BoxHandle, BoxHandle), ContactHandle>,
    mixing: MaterialMixing,
    pair_scratch: Vec<(BoxHandle, BoxHandle)>,
    key_scratch: Vec<ContactHandle>,
}

impl ContactManager {
    pub(crate) fn new(margin: f64, page_size: usize, mixing: MaterialMixing) -> Self {
        Self {
            pool: PagedPool::with_page_size(page_size),
            broad_phase: BroadPhase::new(margin),
            pairs: HashMap::new(),
            mixing,
            pair_scratch: Vec::new(),
            key_scratch: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pool.len()
    }

    pub(crate) fn get(&self, handle: ContactHandle) -> Option<&ContactConstraint> {
        self.pool.get(handle.0)
    }

    pub(crate) fn get_mut(&mut self, handle: ContactHandle) -> Option<&mut ContactConstraint> {
        self.pool.get_mut(handle.0)
    }

    pub(crate) fn set_mixing(&mut self, mixing: MaterialMixing) {
        self.mixing = mixing;
    }

    /// Create a constraint for two boxes unless one already exists or their
    /// bodies cannot collide.
    pub(crate) fn add_contact(
        &mut self,
        a: BoxHandle,
        b: BoxHandle,
        bodies: &mut PagedPool<Body>,
        boxes: &PagedPool<BoxShape>,
    ) -> Option<ContactHandle> {
        let (Some(shape_a), Some(shape_b)) = (boxes.get(a.0), boxes.get(b.0)) else {
            return None;
        };
        let (body_a, body_b) = (shape_a.body, shape_b.body);
        if body_a == body_b {
            return None;
        }
        let (Some(ba), Some(bb)) = (bodies.get(body_a.0), bodies.get(body_b.0)) else {
            return None;
        };
        if !ba.can_collide(bb) {
            return None;
        }
        let key = pair_key(a, b);
        if self.pairs.contains_key(&key) {
            return None;
        }

        let constraint = ContactConstraint {
            box_a: a,
            box_b: b,
            body_a,
            body_b,
            manifold: Manifold::new(shape_a.sensor || shape_b.sensor),
            friction: self.mixing.friction(shape_a.friction, shape_b.friction),
            restitution: self.mixing.restitution(shape_a.restitution, shape_b.restitution),
            colliding: false,
            was_colliding: false,
            island: false,
        };
        let handle = ContactHandle(self.pool.insert(constraint));
        self.pairs.insert(key, handle);

        let (ba, bb) = bodies.get2_mut(body_a.0, body_b.0)?;
        ba.edges.push(ContactEdge {
            other: body_b,
            contact: handle,
        });
        bb.edges.push(ContactEdge {
            other: body_a,
            contact: handle,
        });

        debug!(contact = %handle, box_a = %a, box_b = %b, "contact created");
        Some(handle)
    }

    /// Unlink a constraint from both bodies and free it.
    pub(crate) fn remove_contact(&mut self, handle: ContactHandle, bodies: &mut PagedPool<Body>) {
        let Some(constraint) = self.pool.remove(handle.0) else {
            return;
        };
        self.pairs.remove(&pair_key(constraint.box_a, constraint.box_b));
        for body in [constraint.body_a, constraint.body_b] {
            if let Some(body) = bodies.get_mut(body.0) {
                body.edges.retain(|e| e.contact != handle);
            }
        }
        debug!(contact = %handle, "contact destroyed");
    }

    /// Remove every constraint touching `body`.
    pub(crate) fn remove_contacts_from_body(&mut self, body: BodyHandle, bodies: &mut PagedPool<Body>) {
        let Some(b) = bodies.get(body.0) else {
            return;
        };
        let handles: Vec<ContactHandle> = b.edges.iter().map(|e| e.contact).collect();
        for handle in handles {
            self.remove_contact(handle, bodies);
        }
    }

    /// Remove every constraint involving the box `shape` of `body`.
    pub(crate) fn remove_contacts_for_box(
        &mut self,
        body: BodyHandle,
        shape: BoxHandle,
        bodies: &mut PagedPool<Body>,
    ) {
        let Some(b) = bodies.get(body.0) else {
            return;
        };
        let handles: Vec<ContactHandle> = b
            .edges
            .iter()
            .filter(|e| {
                self.pool
                    .get(e.contact.0)
                    .is_some_and(|c| c.box_a == shape || c.box_b == shape)
            })
            .map(|e| e.contact)
            .collect();
        for handle in handles {
            self.remove_contact(handle, bodies);
        }
    }

    /// Ask the broad phase for new overlapping pairs and create constraints
    /// for them.
    pub(crate) fn find_new_contacts(&mut self, bodies: &mut PagedPool<Body>, boxes: &PagedPool<BoxShape>) {
        let mut pairs = std::mem::take(&mut self.pair_scratch);
        pairs.clear();
        self.broad_phase.update_pairs(|a, b| pairs.push((a, b)));
        for &(a, b) in &pairs {
            self.add_contact(a, b, bodies, boxes);
        }
        self.pair_scratch = pairs;
    }

    /// Refresh every manifold with the narrow phase.
    ///
    /// Constraints whose bodies can no longer collide, or whose fat boxes no
    /// longer overlap, are destroyed. Constraints between two sleeping
    /// bodies are left untouched. Returns the number of constraints tested.
    pub(crate) fn test_collisions(&mut self, bodies: &mut PagedPool<Body>, boxes: &PagedPool<BoxShape>) -> usize {
        let mut keys = std::mem::take(&mut self.key_scratch);
        keys.clear();
        keys.extend(self.pool.keys().map(ContactHandle));

        let mut tested = 0;
        for &handle in &keys {
            let Some(c) = self.pool.get_mut(handle.0) else {
                continue;
            };
            c.island = false;

            let (Some(ba), Some(bb)) = (bodies.get(c.body_a.0), bodies.get(c.body_b.0)) else {
                continue;
            };
            if !ba.awake && !bb.awake {
                continue;
            }
            let (Some(sa), Some(sb)) = (boxes.get(c.box_a.0), boxes.get(c.box_b.0)) else {
                continue;
            };

            let overlapping = match (sa.proxy, sb.proxy) {
                (Some(pa), Some(pb)) => self.broad_phase.test_overlap(pa, pb),
                _ => false,
            };
            if !ba.can_collide(bb) || !overlapping {
                self.remove_contact(handle, bodies);
                continue;
            }

            let oa = sa.oriented(&ba.tx);
            let ob = sb.oriented(&bb.tx);
            let old = c.manifold.clone();
            if box_to_box(&oa, &ob, &mut c.manifold) {
                c.manifold.update_tangents();
                c.manifold.warm_start_from(&old);
            }

            c.was_colliding = c.colliding;
            c.colliding = !c.manifold.is_empty();
            tested += 1;
        }

        self.key_scratch = keys;
        trace!(tested, live = self.pool.len(), "narrow phase");
        tested
    }

    /// Iterate over all constraints.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (ContactHandle, &ContactConstraint)> {
        self.pool.iter().map(|(k, c)| (ContactHandle(k), c))
    }
}
