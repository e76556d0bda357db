//! Scoped scratch stack.
//!
//! A [`StackArena`] hands out LIFO scratch space through [`StackScope`]
//! guards. A scope borrows its parent mutably, so an outer scope cannot be
//! touched while an inner one is alive, and dropping a scope releases
//! exactly the entries it pushed. Out-of-order release cannot be expressed.
//!
//! ```
//! use sim_core::alloc::StackArena;
//!
//! let mut arena: StackArena<u32> = StackArena::with_capacity(16);
//! {
//!     let mut outer = arena.scope();
//!     outer.push(1);
//!     {
//!         let mut inner = outer.scope();
//!         inner.push(2);
//!         inner.push(3);
//!         assert_eq!(inner.len(), 2);
//!     }
//!     assert_eq!(outer.len(), 1);
//! }
//! assert!(arena.is_empty());
//! assert_eq!(arena.high_water_mark(), 3);
//! ```

/// Growable LIFO scratch storage, reused from step to step.
#[derive(Debug, Clone)]
pub struct StackArena<T> {
    items: Vec<T>,
    high_water: usize,
}

impl<T> Default for StackArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StackArena<T> {
    /// An empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            high_water: 0,
        }
    }

    /// An empty arena with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            high_water: 0,
        }
    }

    /// Ensure room for `additional` more entries without reallocating.
    pub fn reserve(&mut self, additional: usize) {
        self.items.reserve(additional);
    }

    /// Open a scope starting at the current top of the stack.
    pub fn scope(&mut self) -> StackScope<'_, T> {
        let base = self.items.len();
        StackScope { arena: self, base }
    }

    /// Entries currently held by live scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no scope holds entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Largest number of entries held at once since creation.
    #[must_use]
    pub fn high_water_mark(&self) -> usize {
        self.high_water
    }

    /// Reserved entry capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }
}

/// A LIFO region of a [`StackArena`], released on drop.
#[derive(Debug)]
pub struct StackScope<'a, T> {
    arena: &'a mut StackArena<T>,
    base: usize,
}

impl<T> StackScope<'_, T> {
    /// Push onto this scope.
    pub fn push(&mut self, value: T) {
        self.arena.items.push(value);
        let len = self.arena.items.len();
        if len > self.arena.high_water {
            self.arena.high_water = len;
        }
    }

    /// Pop the most recent entry of this scope. Never pops below the scope.
    pub fn pop(&mut self) -> Option<T> {
        if self.arena.items.len() > self.base {
            self.arena.items.pop()
        } else {
            None
        }
    }

    /// Entries pushed in this scope and not yet popped.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.items.len() - self.base
    }

    /// Whether this scope holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// This scope's entries, oldest first.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.arena.items[self.base..]
    }

    /// Remove every entry of this scope, keeping the scope open.
    pub fn clear(&mut self) {
        self.arena.items.truncate(self.base);
    }

    /// Open a nested scope. This scope is frozen until the child drops.
    pub fn scope(&mut self) -> StackScope<'_, T> {
        let base = self.arena.items.len();
        StackScope {
            arena: &mut *self.arena,
            base,
        }
    }
}

impl<T> Drop for StackScope<'_, T> {
    fn drop(&mut self) {
        self.arena.items.truncate(self.base);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_releases_on_drop() {
        let mut arena = StackArena::new();
        {
            let mut scope = arena.scope();
            scope.push(1);
            scope.push(2);
            assert_eq!(scope.as_slice(), &[1, 2]);
        }
        assert!(arena.is_empty());
        assert_eq!(arena.high_water_mark(), 2);
    }

    #[test]
    fn test_pop_stops_at_scope_base() {
        let mut arena = StackArena::new();
        let mut outer = arena.scope();
        outer.push('a');
        let mut inner = outer.scope();
        inner.push('b');
        assert_eq!(inner.pop(), Some('b'));
        assert_eq!(inner.pop(), None);
        drop(inner);
        assert_eq!(outer.pop(), Some('a'));
    }

    #[test]
    fn test_clear_keeps_outer_entries() {
        let mut arena = StackArena::with_capacity(8);
        let mut outer = arena.scope();
        outer.push(10);
        {
            let mut inner = outer.scope();
            inner.push(20);
            inner.push(30);
            inner.clear();
            assert!(inner.is_empty());
        }
        assert_eq!(outer.as_slice(), &[10]);
    }

    #[test]
    fn test_reuse_keeps_capacity() {
        let mut arena = StackArena::new();
        arena.reserve(64);
        let capacity = arena.capacity();
        for round in 0..4 {
            let mut scope = arena.scope();
            for i in 0..32 {
                scope.push(round * 100 + i);
            }
        }
        assert_eq!(arena.capacity(), capacity);
        assert_eq!(arena.high_water_mark(), 32);
    }
}
