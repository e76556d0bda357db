//! Dynamic bounding-volume tree.
//!
//! A binary tree of axis-aligned boxes. Leaves store a "fat" AABB (the
//! tight box grown by a margin) together with a user value; branches store
//! the union of their two children. Insertion picks a sibling with a
//! greedy surface-area heuristic and the path back to the root is
//! rebalanced with AVL-style rotations.
//!
//! ```text
//!            A                      C
//!          /   \                  /   \
//!         B     C      ==>       A     G
//!              / \              / \
//!             F   G            B   F
//! ```
//!
//! Nodes live in one growable array. Freed nodes are chained into a free
//! list through their parent link, so node indices (and therefore
//! [`ProxyId`]s) stay stable while the tree changes shape.
//!
//! # Example
//!
//! ```
//! use sim_core::{Aabb, DynamicTree};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut tree = DynamicTree::new(0.5);
//! let a = tree.insert(Aabb::from_center(Point3::origin(), Vector3::repeat(1.0)), "a");
//! let _b = tree.insert(Aabb::from_center(Point3::new(10.0, 0.0, 0.0), Vector3::repeat(1.0)), "b");
//!
//! // A small move stays inside the fat box and is free
//! let nudged = Aabb::from_center(Point3::new(0.2, 0.0, 0.0), Vector3::repeat(1.0));
//! assert!(!tree.update(a, nudged));
//!
//! let mut hits = Vec::new();
//! tree.query_aabb(&Aabb::from_center(Point3::origin(), Vector3::repeat(0.5)), |id| {
//!     hits.push(*tree.user_data(id).unwrap());
//!     true
//! });
//! assert_eq!(hits, vec!["a"]);
//! assert!(tree.validate().is_ok());
//! ```

use nalgebra::Point3;
use thiserror::Error;

use crate::aabb::Aabb;

const NULL: usize = usize::MAX;

/// Nodes allocated by [`DynamicTree::new`].
pub const INITIAL_CAPACITY: usize = 1024;

/// Stable handle to a leaf of a [`DynamicTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(usize);

impl ProxyId {
    /// Node index inside the tree.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Structural problems reported by [`DynamicTree::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// Free nodes plus live nodes do not account for the capacity.
    #[error("free list holds {free} nodes, {live} live, capacity {capacity}")]
    FreeListMismatch {
        /// Nodes reachable from the free list.
        free: usize,
        /// Nodes in use.
        live: usize,
        /// Allocated node slots.
        capacity: usize,
    },
    /// The root node has a parent.
    #[error("root node {0} has a parent")]
    RootHasParent(usize),
    /// A child does not point back at its parent.
    #[error("node {child} does not point back to parent {parent}")]
    BrokenParentLink {
        /// The parent node.
        parent: usize,
        /// The child whose parent link is wrong.
        child: usize,
    },
    /// A branch has only one child.
    #[error("branch {0} is missing a child")]
    MissingChild(usize),
    /// A cached height disagrees with the children.
    #[error("node {0} has a stale height")]
    StaleHeight(usize),
    /// A branch box is not the union of its children.
    #[error("node {0} does not bound its children exactly")]
    StaleBounds(usize),
    /// Reachable nodes differ from the live count.
    #[error("{reachable} nodes reachable from the root, {live} live")]
    Unreachable {
        /// Nodes found by walking from the root.
        reachable: usize,
        /// Nodes in use.
        live: usize,
    },
}

#[derive(Debug, Clone)]
struct Node<T> {
    aabb: Aabb,
    // Next free node while on the free list
    parent: usize,
    left: usize,
    right: usize,
    // Leaf = 0, free = -1
    height: i32,
    data: Option<T>,
}

impl<T> Node<T> {
    fn free(next: usize) -> Self {
        Self {
            aabb: Aabb::default(),
            parent: next,
            left: NULL,
            right: NULL,
            height: -1,
            data: None,
        }
    }

    fn is_leaf(&self) -> bool {
        self.right == NULL
    }
}

/// Balanced AABB hierarchy keyed by [`ProxyId`].
#[derive(Debug, Clone)]
pub struct DynamicTree<T> {
    nodes: Vec<Node<T>>,
    root: usize,
    free_list: usize,
    count: usize,
    margin: f64,
}

impl<T> DynamicTree<T> {
    /// An empty tree whose leaves are fattened by `margin`.
    #[must_use]
    pub fn new(margin: f64) -> Self {
        Self::with_capacity(margin, INITIAL_CAPACITY)
    }

    /// An empty tree with room for `capacity` nodes before growing.
    #[must_use]
    pub fn with_capacity(margin: f64, capacity: usize) -> Self {
        let mut tree = Self {
            nodes: Vec::with_capacity(capacity.max(1)),
            root: NULL,
            free_list: NULL,
            count: 0,
            margin,
        };
        tree.add_to_free_list(capacity.max(1));
        tree
    }

    /// Margin added on every side of an inserted box.
    #[must_use]
    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// Grow node storage to `capacity`, chaining the new slots.
    fn add_to_free_list(&mut self, capacity: usize) {
        let start = self.nodes.len();
        for i in start..capacity {
            let next = if i + 1 < capacity {
                i + 1
            } else {
                self.free_list
            };
            self.nodes.push(Node::free(next));
        }
        if capacity > start {
            self.free_list = start;
        }
    }

    fn allocate_node(&mut self) -> usize {
        if self.free_list == NULL {
            let capacity = self.nodes.len() * 2;
            self.add_to_free_list(capacity.max(1));
        }

        let index = self.free_list;
        let node = &mut self.nodes[index];
        self.free_list = node.parent;
        node.height = 0;
        node.left = NULL;
        node.right = NULL;
        node.parent = NULL;
        node.data = None;
        self.count += 1;
        index
    }

    fn deallocate_node(&mut self, index: usize) -> Option<T> {
        let node = std::mem::replace(&mut self.nodes[index], Node::free(self.free_list));
        self.free_list = index;
        self.count -= 1;
        node.data
    }

    fn is_live_leaf(&self, id: ProxyId) -> bool {
        self.nodes
            .get(id.0)
            .is_some_and(|n| n.height >= 0 && n.is_leaf())
    }

    /// Insert a leaf for `aabb` (fattened by the margin) carrying `data`.
    pub fn insert(&mut self, aabb: Aabb, data: T) -> ProxyId {
        let id = self.allocate_node();
        let node = &mut self.nodes[id];
        node.aabb = aabb.expanded(self.margin);
        node.data = Some(data);
        node.height = 0;
        self.insert_leaf(id);
        ProxyId(id)
    }

    /// Remove a leaf and return its user value.
    ///
    /// Returns `None` if `id` is not a live leaf.
    pub fn remove(&mut self, id: ProxyId) -> Option<T> {
        if !self.is_live_leaf(id) {
            return None;
        }
        self.remove_leaf(id.0);
        self.deallocate_node(id.0)
    }

    /// Move a leaf to a new tight box.
    ///
    /// Returns `false` and leaves the tree untouched when the current fat
    /// box still contains `aabb`. Otherwise the leaf is re-inserted with a
    /// freshly fattened box and `true` is returned.
    pub fn update(&mut self, id: ProxyId, aabb: Aabb) -> bool {
        if !self.is_live_leaf(id) {
            return false;
        }
        if self.nodes[id.0].aabb.contains(&aabb) {
            return false;
        }

        self.remove_leaf(id.0);
        self.nodes[id.0].aabb = aabb.expanded(self.margin);
        self.insert_leaf(id.0);
        true
    }

    /// User value of a live leaf.
    #[must_use]
    pub fn user_data(&self, id: ProxyId) -> Option<&T> {
        self.nodes.get(id.0).and_then(|n| n.data.as_ref())
    }

    /// Fat box of a live leaf.
    #[must_use]
    pub fn fat_aabb(&self, id: ProxyId) -> Option<&Aabb> {
        self.nodes
            .get(id.0)
            .filter(|n| n.height >= 0)
            .map(|n| &n.aabb)
    }

    /// Whether the fat boxes of two leaves overlap.
    #[must_use]
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        match (self.fat_aabb(a), self.fat_aabb(b)) {
            (Some(a), Some(b)) => a.overlaps(b),
            _ => false,
        }
    }

    /// Number of leaves.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.count.div_ceil(2)
    }

    /// Number of nodes in use (leaves and branches).
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.count
    }

    /// Allocated node slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no leaves.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root == NULL
    }

    /// Height of the root; zero for a single leaf or an empty tree.
    #[must_use]
    pub fn height(&self) -> usize {
        self.nodes
            .get(self.root)
            .map_or(0, |n| usize::try_from(n.height).unwrap_or(0))
    }

    /// Bounding box of everything in the tree.
    #[must_use]
    pub fn root_aabb(&self) -> Option<&Aabb> {
        self.nodes.get(self.root).map(|n| &n.aabb)
    }

    /// Iterate over all leaves.
    pub fn leaves(&self) -> impl Iterator<Item = (ProxyId, &T)> {
        self.nodes.iter().enumerate().filter_map(|(i, n)| {
            if n.height >= 0 && n.is_leaf() {
                n.data.as_ref().map(|d| (ProxyId(i), d))
            } else {
                None
            }
        })
    }

    /// Visit every leaf whose fat box overlaps `aabb`.
    ///
    /// The callback returns `false` to stop the query.
    pub fn query_aabb(&self, aabb: &Aabb, mut callback: impl FnMut(ProxyId) -> bool) {
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(index) = stack.pop() {
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            if !aabb.overlaps(&node.aabb) {
                continue;
            }
            if node.is_leaf() {
                if !callback(ProxyId(index)) {
                    return;
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    /// Visit every leaf whose fat box touches the segment `p0 -> p1`.
    ///
    /// The callback returns `false` to stop the query.
    pub fn query_segment(
        &self,
        p0: &Point3<f64>,
        p1: &Point3<f64>,
        mut callback: impl FnMut(ProxyId) -> bool,
    ) {
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(index) = stack.pop() {
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            if !node.aabb.intersects_segment(p0, p1) {
                continue;
            }
            if node.is_leaf() {
                if !callback(ProxyId(index)) {
                    return;
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    /// Visit every node in depth-first order as `(aabb, depth, is_leaf)`.
    pub fn visit_nodes(&self, mut visitor: impl FnMut(&Aabb, usize, bool)) {
        let mut stack = vec![(self.root, 0)];
        while let Some((index, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            visitor(&node.aabb, depth, node.is_leaf());
            if !node.is_leaf() {
                stack.push((node.right, depth + 1));
                stack.push((node.left, depth + 1));
            }
        }
    }

    /// Check free-list accounting, parent links, heights and bounds.
    pub fn validate(&self) -> Result<(), TreeError> {
        let mut free = 0;
        let mut index = self.free_list;
        while index != NULL && free <= self.nodes.len() {
            free += 1;
            index = self.nodes[index].parent;
        }
        if free + self.count != self.nodes.len() {
            return Err(TreeError::FreeListMismatch {
                free,
                live: self.count,
                capacity: self.nodes.len(),
            });
        }

        if self.root == NULL {
            return if self.count == 0 {
                Ok(())
            } else {
                Err(TreeError::Unreachable {
                    reachable: 0,
                    live: self.count,
                })
            };
        }
        if self.nodes[self.root].parent != NULL {
            return Err(TreeError::RootHasParent(self.root));
        }

        let mut reachable = 0;
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            reachable += 1;
            let node = &self.nodes[index];
            if node.is_leaf() {
                if node.height != 0 {
                    return Err(TreeError::StaleHeight(index));
                }
                continue;
            }

            let (l, r) = (node.left, node.right);
            if l == NULL || l >= self.nodes.len() || r >= self.nodes.len() {
                return Err(TreeError::MissingChild(index));
            }
            for child in [l, r] {
                if self.nodes[child].parent != index {
                    return Err(TreeError::BrokenParentLink {
                        parent: index,
                        child,
                    });
                }
            }
            let (left, right) = (&self.nodes[l], &self.nodes[r]);
            if node.height != 1 + left.height.max(right.height) {
                return Err(TreeError::StaleHeight(index));
            }
            if node.aabb != left.aabb.combine(&right.aabb) {
                return Err(TreeError::StaleBounds(index));
            }
            stack.push(l);
            stack.push(r);
        }

        if reachable != self.count {
            return Err(TreeError::Unreachable {
                reachable,
                live: self.count,
            });
        }
        Ok(())
    }

    fn insert_leaf(&mut self, id: usize) {
        if self.root == NULL {
            self.root = id;
            self.nodes[id].parent = NULL;
            return;
        }

        // Search for the best sibling
        let leaf_aabb = self.nodes[id].aabb;
        let mut search = self.root;
        while !self.nodes[search].is_leaf() {
            let node = &self.nodes[search];
            let combined_area = leaf_aabb.combine(&node.aabb).surface_area();

            // Creating a new branch here
            let branch_cost = 2.0 * combined_area;
            // Growth of this node if the leaf goes further down
            let inherited_cost = 2.0 * (combined_area - node.aabb.surface_area());

            let descent_cost = |child: usize| {
                let child = &self.nodes[child];
                let inflated = leaf_aabb.combine(&child.aabb).surface_area();
                if child.is_leaf() {
                    inflated + inherited_cost
                } else {
                    inflated - child.aabb.surface_area() + inherited_cost
                }
            };
            let (left, right) = (node.left, node.right);
            let left_cost = descent_cost(left);
            let right_cost = descent_cost(right);

            if branch_cost < left_cost && branch_cost < right_cost {
                break;
            }
            search = if left_cost < right_cost { left } else { right };
        }
        let sibling = search;

        // New parent takes the sibling's place
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.allocate_node();
        {
            let sibling_node = &self.nodes[sibling];
            let aabb = leaf_aabb.combine(&sibling_node.aabb);
            let height = sibling_node.height + 1;
            let parent = &mut self.nodes[new_parent];
            parent.parent = old_parent;
            parent.aabb = aabb;
            parent.height = height;
            parent.left = sibling;
            parent.right = id;
        }
        self.nodes[sibling].parent = new_parent;
        self.nodes[id].parent = new_parent;

        if old_parent == NULL {
            self.root = new_parent;
        } else if self.nodes[old_parent].left == sibling {
            self.nodes[old_parent].left = new_parent;
        } else {
            self.nodes[old_parent].right = new_parent;
        }

        self.sync_hierarchy(new_parent);
    }

    fn remove_leaf(&mut self, id: usize) {
        if id == self.root {
            self.root = NULL;
            return;
        }

        let parent = self.nodes[id].parent;
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].left == id {
            self.nodes[parent].right
        } else {
            self.nodes[parent].left
        };

        // Collapse the parent onto the sibling
        if grand_parent == NULL {
            self.root = sibling;
        } else if self.nodes[grand_parent].left == parent {
            self.nodes[grand_parent].left = sibling;
        } else {
            self.nodes[grand_parent].right = sibling;
        }
        self.nodes[sibling].parent = grand_parent;

        self.deallocate_node(parent);
        self.sync_hierarchy(grand_parent);
    }

    /// Rebalance and refit from `index` up to the root.
    fn sync_hierarchy(&mut self, mut index: usize) {
        while index != NULL {
            index = self.balance(index);

            let (l, r) = (self.nodes[index].left, self.nodes[index].right);
            let height = 1 + self.nodes[l].height.max(self.nodes[r].height);
            let aabb = self.nodes[l].aabb.combine(&self.nodes[r].aabb);
            let node = &mut self.nodes[index];
            node.height = height;
            node.aabb = aabb;
            index = node.parent;
        }
    }

    /// Rotate the taller child of `a` above it if the heights differ by
    /// more than one. Returns the index now at `a`'s position.
    fn balance(&mut self, a: usize) -> usize {
        let node = &self.nodes[a];
        if node.is_leaf() || node.height < 2 {
            return a;
        }

        let (b, c) = (node.left, node.right);
        let balance = self.nodes[c].height - self.nodes[b].height;
        if balance > 1 {
            self.promote(a, c, b, true)
        } else if balance < -1 {
            self.promote(a, b, c, false)
        } else {
            a
        }
    }

    /// Promote child `p` of `a` into `a`'s place; `other` stays under `a`.
    ///
    /// The taller grandchild stays with `p` and the shorter moves under
    /// `a`. On a height tie the grandchild that keeps `a` smaller moves.
    fn promote(&mut self, a: usize, p: usize, other: usize, p_is_right: bool) -> usize {
        let (x, y) = (self.nodes[p].left, self.nodes[p].right);
        let (hx, hy) = (self.nodes[x].height, self.nodes[y].height);
        let (keep, moved) = if hx > hy {
            (x, y)
        } else if hy > hx {
            (y, x)
        } else {
            let other_aabb = self.nodes[other].aabb;
            let with_x = other_aabb.combine(&self.nodes[x].aabb).surface_area();
            let with_y = other_aabb.combine(&self.nodes[y].aabb).surface_area();
            if with_x < with_y { (y, x) } else { (x, y) }
        };

        // Grandparent now points at p
        let grand_parent = self.nodes[a].parent;
        if grand_parent == NULL {
            self.root = p;
        } else if self.nodes[grand_parent].left == a {
            self.nodes[grand_parent].left = p;
        } else {
            self.nodes[grand_parent].right = p;
        }
        self.nodes[p].parent = grand_parent;
        self.nodes[a].parent = p;
        self.nodes[moved].parent = a;

        if p_is_right {
            self.nodes[p].left = a;
            self.nodes[p].right = keep;
            self.nodes[a].right = moved;
        } else {
            self.nodes[p].right = a;
            self.nodes[p].left = keep;
            self.nodes[a].left = moved;
        }

        let a_aabb = self.nodes[other].aabb.combine(&self.nodes[moved].aabb);
        let a_height = 1 + self.nodes[other].height.max(self.nodes[moved].height);
        self.nodes[a].aabb = a_aabb;
        self.nodes[a].height = a_height;

        let p_aabb = a_aabb.combine(&self.nodes[keep].aabb);
        let p_height = 1 + a_height.max(self.nodes[keep].height);
        self.nodes[p].aabb = p_aabb;
        self.nodes[p].height = p_height;

        p
    }
}
