//! Broad-phase collision detection over a dynamic AABB tree.
//!
//! This module reduces the number of narrow-phase box tests from O(n²) to
//! O(n log n + k), where k is the number of overlapping fat-AABB pairs.
//!
//! # Algorithm
//!
//! Every proxy lives in a [`DynamicTree`] with a fattened AABB. Whenever a
//! proxy is inserted or its fat box has to change, its id goes into a move
//! buffer. A pair refresh then:
//! 1. Queries the tree with the fat box of every moved proxy
//! 2. Records each hit as an ordered `(min, max)` id pair, skipping self hits
//! 3. Sorts the pair buffer so duplicates become adjacent
//! 4. Reports each distinct pair once
//!
//! Proxies that did not move are not re-queried. Their existing pairs are
//! kept alive by the contact manager until their fat boxes separate.
//!
//! # Example
//!
//! ```
//! use sim_core::{Aabb, BroadPhase};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut bp = BroadPhase::new(0.1);
//! let _a = bp.insert(Aabb::from_center(Point3::origin(), Vector3::repeat(1.0)), "a");
//! let _b = bp.insert(Aabb::from_center(Point3::new(1.5, 0.0, 0.0), Vector3::repeat(1.0)), "b");
//! let _c = bp.insert(Aabb::from_center(Point3::new(9.0, 0.0, 0.0), Vector3::repeat(1.0)), "c");
//!
//! let mut pairs = Vec::new();
//! bp.update_pairs(|x, y| pairs.push((x, y)));
//!
//! // Overlapping proxies are reported exactly once
//! assert_eq!(pairs.len(), 1);
//! assert!(bp.move_buffer().is_empty());
//! ```

use tracing::trace;

use crate::aabb::Aabb;
use crate::dynamic_tree::{DynamicTree, ProxyId};

/// Candidate pair of proxies, `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyPair {
    /// Lower proxy id.
    pub a: ProxyId,
    /// Higher proxy id.
    pub b: ProxyId,
}

impl ProxyPair {
    /// Order two ids into a pair.
    #[must_use]
    pub fn new(x: ProxyId, y: ProxyId) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }
}

/// Tree-backed broad phase with a move buffer.
#[derive(Debug, Clone)]
pub struct BroadPhase<T> {
    tree: DynamicTree<T>,
    move_buffer: Vec<ProxyId>,
    pair_buffer: Vec<ProxyPair>,
}

impl<T: Copy> BroadPhase<T> {
    /// An empty broad phase fattening proxies by `margin`.
    #[must_use]
    pub fn new(margin: f64) -> Self {
        Self {
            tree: DynamicTree::new(margin),
            move_buffer: Vec::with_capacity(64),
            pair_buffer: Vec::with_capacity(64),
        }
    }

    /// Insert a proxy for `aabb` and schedule it for pairing.
    pub fn insert(&mut self, aabb: Aabb, data: T) -> ProxyId {
        let id = self.tree.insert(aabb, data);
        self.buffer_move(id);
        id
    }

    /// Remove a proxy. It is also dropped from the move buffer.
    pub fn remove(&mut self, id: ProxyId) -> Option<T> {
        self.move_buffer.retain(|m| *m != id);
        self.tree.remove(id)
    }

    /// Move a proxy. Returns `true` if its fat box changed, in which case
    /// it is scheduled for pairing.
    pub fn update(&mut self, id: ProxyId, aabb: Aabb) -> bool {
        let moved = self.tree.update(id, aabb);
        if moved {
            self.buffer_move(id);
        }
        moved
    }

    fn buffer_move(&mut self, id: ProxyId) {
        self.move_buffer.push(id);
    }

    /// Query the tree around every moved proxy and report each new
    /// overlapping pair once, as `(lower id data, higher id data)`.
    pub fn update_pairs(&mut self, mut on_pair: impl FnMut(T, T)) {
        self.pair_buffer.clear();

        for &current in &self.move_buffer {
            let Some(&fat) = self.tree.fat_aabb(current) else {
                continue;
            };
            let pairs = &mut self.pair_buffer;
            self.tree.query_aabb(&fat, |hit| {
                if hit != current {
                    pairs.push(ProxyPair::new(hit, current));
                }
                true
            });
        }
        self.move_buffer.clear();

        self.pair_buffer.sort_unstable();
        self.pair_buffer.dedup();
        trace!(pairs = self.pair_buffer.len(), "broad phase pairs");

        for pair in &self.pair_buffer {
            if let (Some(&a), Some(&b)) = (self.tree.user_data(pair.a), self.tree.user_data(pair.b)) {
                on_pair(a, b);
            }
        }
    }

    /// Whether the fat boxes of two proxies overlap.
    #[must_use]
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        self.tree.test_overlap(a, b)
    }

    /// Proxies waiting for the next pair refresh.
    #[must_use]
    pub fn move_buffer(&self) -> &[ProxyId] {
        &self.move_buffer
    }

    /// The underlying tree.
    #[must_use]
    pub fn tree(&self) -> &DynamicTree<T> {
        &self.tree
    }

    /// Number of proxies.
    #[must_use]
    pub fn proxy_count(&self) -> usize {
        self.tree.leaf_count()
    }
}
