//! Paged generational pool.
//!
//! A [`PagedPool`] stores records in fixed-size pages that are never moved
//! or released while the pool lives. Free slots are chained into a single
//! free list. Each slot carries a generation counter that is bumped on
//! removal, so a [`PoolKey`] to a removed record stays invalid even after
//! its slot is reused.
//!
//! ```
//! use sim_core::alloc::PagedPool;
//!
//! let mut pool = PagedPool::with_page_size(4);
//! let a = pool.insert("a");
//! let b = pool.insert("b");
//! assert_eq!(pool.remove(a), Some("a"));
//!
//! let c = pool.insert("c");
//! assert_eq!(pool.get(a), None);
//! assert_eq!(pool.get(c), Some(&"c"));
//! assert_eq!(pool.get(b), Some(&"b"));
//! assert_eq!(pool.page_count(), 1);
//! ```

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Records allocated per page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Generation-checked reference into a [`PagedPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolKey {
    index: u32,
    generation: u32,
}

impl PoolKey {
    /// Slot index.
    #[must_use]
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Generation the slot had when the key was issued.
    #[must_use]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// Page-grown storage with O(1) insert and remove and stable keys.
#[derive(Debug, Clone)]
pub struct PagedPool<T> {
    pages: Vec<Vec<Slot<T>>>,
    page_size: usize,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for PagedPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PagedPool<T> {
    /// An empty pool with [`DEFAULT_PAGE_SIZE`] records per page.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// An empty pool with `page_size` records per page (at least one).
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            pages: Vec::new(),
            page_size: page_size.max(1),
            free_head: None,
            len: 0,
        }
    }

    fn locate(&self, index: u32) -> (usize, usize) {
        let index = index as usize;
        (index / self.page_size, index % self.page_size)
    }

    fn slot(&self, index: u32) -> Option<&Slot<T>> {
        let (page, offset) = self.locate(index);
        self.pages.get(page).and_then(|p| p.get(offset))
    }

    fn slot_mut(&mut self, index: u32) -> Option<&mut Slot<T>> {
        let (page, offset) = self.locate(index);
        self.pages.get_mut(page).and_then(|p| p.get_mut(offset))
    }

    fn grow(&mut self) {
        let first = self.pages.len() * self.page_size;
        let last = first + self.page_size;
        let page = (first..last)
            .map(|i| Slot::Vacant {
                generation: 0,
                next_free: if i + 1 < last {
                    Some((i + 1) as u32)
                } else {
                    self.free_head
                },
            })
            .collect();
        self.pages.push(page);
        self.free_head = Some(first as u32);
    }

    /// Store a record and return its key.
    pub fn insert(&mut self, value: T) -> PoolKey {
        if self.free_head.is_none() {
            self.grow();
        }

        let index = self.free_head.unwrap_or_default();
        let mut key = PoolKey {
            index,
            generation: 0,
        };
        if let Some(slot) = self.slot_mut(index) {
            if let Slot::Vacant {
                generation,
                next_free,
            } = *slot
            {
                key.generation = generation;
                *slot = Slot::Occupied { generation, value };
                self.free_head = next_free;
            }
        }
        self.len += 1;
        key
    }

    /// Remove a record, invalidating every copy of its key.
    pub fn remove(&mut self, key: PoolKey) -> Option<T> {
        let free_head = self.free_head;
        let slot = self.slot_mut(key.index)?;
        let live = matches!(slot, Slot::Occupied { generation, .. } if *generation == key.generation);
        if !live {
            return None;
        }

        let vacant = Slot::Vacant {
            generation: key.generation.wrapping_add(1),
            next_free: free_head,
        };
        let old = std::mem::replace(slot, vacant);
        self.free_head = Some(key.index);
        self.len -= 1;
        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    /// Whether `key` refers to a live record.
    #[must_use]
    pub fn contains(&self, key: PoolKey) -> bool {
        self.get(key).is_some()
    }

    /// Borrow a live record.
    #[must_use]
    pub fn get(&self, key: PoolKey) -> Option<&T> {
        match self.slot(key.index)? {
            Slot::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    /// Mutably borrow a live record.
    pub fn get_mut(&mut self, key: PoolKey) -> Option<&mut T> {
        match self.slot_mut(key.index)? {
            Slot::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    /// Mutably borrow two distinct live records at once.
    ///
    /// Returns `None` if either key is stale or both name the same slot.
    pub fn get2_mut(&mut self, a: PoolKey, b: PoolKey) -> Option<(&mut T, &mut T)> {
        if a.index == b.index {
            return None;
        }
        let (pa, oa) = self.locate(a.index);
        let (pb, ob) = self.locate(b.index);

        let (slot_a, slot_b) = if pa == pb {
            let page = self.pages.get_mut(pa)?;
            if oa < ob {
                let (lo, hi) = page.split_at_mut(ob);
                (lo.get_mut(oa)?, hi.first_mut()?)
            } else {
                let (lo, hi) = page.split_at_mut(oa);
                let b = lo.get_mut(ob)?;
                (hi.first_mut()?, b)
            }
        } else if pa < pb {
            let (lo, hi) = self.pages.split_at_mut(pb);
            (lo.get_mut(pa)?.get_mut(oa)?, hi.first_mut()?.get_mut(ob)?)
        } else {
            let (lo, hi) = self.pages.split_at_mut(pa);
            let b = lo.get_mut(pb)?.get_mut(ob)?;
            (hi.first_mut()?.get_mut(oa)?, b)
        };

        match (slot_a, slot_b) {
            (
                Slot::Occupied {
                    generation: ga,
                    value: va,
                },
                Slot::Occupied {
                    generation: gb,
                    value: vb,
                },
            ) if *ga == a.generation && *gb == b.generation => Some((va, vb)),
            _ => None,
        }
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the pool holds no live records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pages allocated so far.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Records that fit without allocating another page.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pages.len() * self.page_size
    }

    /// Iterate live records in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (PoolKey, &T)> {
        self.pages.iter().flatten().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Occupied { generation, value } => Some((
                PoolKey {
                    index: i as u32,
                    generation: *generation,
                },
                value,
            )),
            Slot::Vacant { .. } => None,
        })
    }

    /// Iterate live records mutably in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PoolKey, &mut T)> {
        self.pages
            .iter_mut()
            .flatten()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Occupied { generation, value } => Some((
                    PoolKey {
                        index: i as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Slot::Vacant { .. } => None,
            })
    }

    /// Keys of all live records in slot order.
    pub fn keys(&self) -> impl Iterator<Item = PoolKey> + '_ {
        self.iter().map(|(key, _)| key)
    }

    /// Remove every record. Pages are kept for reuse and every outstanding
    /// key becomes stale.
    pub fn clear(&mut self) {
        let keys: Vec<PoolKey> = self.keys().collect();
        for key in keys {
            self.remove(key);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_stale_key_after_reuse() {
        let mut pool = PagedPool::with_page_size(2);
        let a = pool.insert(1);
        pool.remove(a);
        let b = pool.insert(2);
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert!(!pool.contains(a));
        assert_eq!(pool.remove(a), None);
        assert_eq!(pool.get(b), Some(&2));
    }

    #[test]
    fn test_grows_by_pages() {
        let mut pool = PagedPool::with_page_size(3);
        let keys: Vec<_> = (0..7).map(|i| pool.insert(i)).collect();
        assert_eq!(pool.page_count(), 3);
        assert_eq!(pool.capacity(), 9);
        assert_eq!(pool.len(), 7);
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(pool.get(*key), Some(&i));
        }
    }

    #[test]
    fn test_get2_mut_across_pages() {
        let mut pool = PagedPool::with_page_size(2);
        let a = pool.insert(10);
        let _ = pool.insert(20);
        let c = pool.insert(30);

        {
            let (x, y) = pool.get2_mut(c, a).unwrap();
            std::mem::swap(x, y);
        }
        assert_eq!(pool.get(a), Some(&30));
        assert_eq!(pool.get(c), Some(&10));
        assert!(pool.get2_mut(a, a).is_none());
    }

    #[test]
    fn test_get2_mut_same_page_both_orders() {
        let mut pool = PagedPool::with_page_size(8);
        let a = pool.insert('a');
        let b = pool.insert('b');
        assert_eq!(pool.get2_mut(a, b).map(|(x, y)| (*x, *y)), Some(('a', 'b')));
        assert_eq!(pool.get2_mut(b, a).map(|(x, y)| (*x, *y)), Some(('b', 'a')));
        pool.remove(b);
        assert!(pool.get2_mut(a, b).is_none());
    }

    #[test]
    fn test_clear_keeps_pages() {
        let mut pool = PagedPool::with_page_size(4);
        let keys: Vec<_> = (0..6).map(|i| pool.insert(i)).collect();
        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(pool.page_count(), 2);
        assert!(keys.iter().all(|k| !pool.contains(*k)));
        assert_eq!(pool.iter().count(), 0);
    }

    proptest! {
        #[test]
        fn prop_pool_matches_model(ops in prop::collection::vec((any::<bool>(), any::<prop::sample::Index>()), 1..200)) {
            let mut pool = PagedPool::with_page_size(5);
            let mut model: Vec<(PoolKey, usize)> = Vec::new();

            for (n, (insert, idx)) in ops.into_iter().enumerate() {
                if insert || model.is_empty() {
                    let key = pool.insert(n);
                    model.push((key, n));
                } else {
                    let (key, value) = model.swap_remove(idx.index(model.len()));
                    prop_assert_eq!(pool.remove(key), Some(value));
                    prop_assert!(!pool.contains(key));
                }
                prop_assert_eq!(pool.len(), model.len());
            }

            for (key, value) in &model {
                prop_assert_eq!(pool.get(*key), Some(value));
            }
            prop_assert_eq!(pool.iter().count(), model.len());
        }
    }
}
