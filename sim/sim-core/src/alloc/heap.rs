//! First-fit heap budget.
//!
//! The [`Heap`] models a fixed-size region carved into blocks. Allocation
//! walks the free list in address order and takes the first block large
//! enough, splitting off the remainder. Freeing merges the block with any
//! adjacent free neighbours so the region does not fragment permanently.
//!
//! The scene charges every body and box against a heap, so a scene built
//! with a small `heap_bytes` budget reports exhaustion instead of growing
//! without bound. Allocation never panics; it returns `None`.
//!
//! ```
//! use sim_core::alloc::Heap;
//!
//! let mut heap = Heap::new(1024);
//! let a = heap.allocate(100).unwrap();
//! let b = heap.allocate(100).unwrap();
//! assert!(heap.allocate(4096).is_none());
//!
//! heap.free(a);
//! heap.free(b);
//! assert_eq!(heap.bytes_free(), 1024);
//! assert_eq!(heap.free_block_count(), 1);
//! ```

/// Bookkeeping bytes charged per block.
pub const HEADER_SIZE: usize = 24;

/// Block granularity in bytes.
pub const ALIGNMENT: usize = 8;

/// A block handed out by [`Heap::allocate`].
///
/// Blocks are plain records; the caller keeps the block and gives it back to
/// the same heap exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapBlock {
    offset: usize,
    size: usize,
}

impl HeapBlock {
    /// Byte offset of the block inside the heap region.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes charged for the block, header included.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FreeBlock {
    offset: usize,
    size: usize,
}

impl FreeBlock {
    fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// First-fit allocator over a fixed byte budget.
#[derive(Debug, Clone)]
pub struct Heap {
    capacity: usize,
    // Sorted by offset, never adjacent to each other
    free: Vec<FreeBlock>,
    used: usize,
    live: usize,
}

impl Heap {
    /// A heap of `capacity` bytes with one free block spanning all of it.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let free = if capacity > 0 {
            vec![FreeBlock {
                offset: 0,
                size: capacity,
            }]
        } else {
            Vec::new()
        };
        Self {
            capacity,
            free,
            used: 0,
            live: 0,
        }
    }

    /// Bytes charged for a request of `size` payload bytes.
    #[must_use]
    pub fn charge_for(size: usize) -> usize {
        (size + HEADER_SIZE).div_ceil(ALIGNMENT) * ALIGNMENT
    }

    /// Take the first free block that fits `size` payload bytes.
    ///
    /// Returns `None` when no single free block is large enough, even if
    /// the total free space would be.
    pub fn allocate(&mut self, size: usize) -> Option<HeapBlock> {
        let needed = Self::charge_for(size);
        let index = self.free.iter().position(|b| b.size >= needed)?;

        let block = &mut self.free[index];
        let offset = block.offset;
        if block.size == needed {
            self.free.remove(index);
        } else {
            block.offset += needed;
            block.size -= needed;
        }

        self.used += needed;
        self.live += 1;
        Some(HeapBlock {
            offset,
            size: needed,
        })
    }

    /// Return a block, merging it with adjacent free space.
    pub fn free(&mut self, block: HeapBlock) {
        debug_assert!(block.offset + block.size <= self.capacity);
        let index = self.free.partition_point(|b| b.offset < block.offset);
        debug_assert!(
            self.free
                .get(index)
                .is_none_or(|next| next.offset >= block.offset + block.size),
            "double free or overlapping heap block"
        );

        let mut merged = FreeBlock {
            offset: block.offset,
            size: block.size,
        };

        // Merge with the following block
        if let Some(next) = self.free.get(index) {
            if merged.end() == next.offset {
                merged.size += next.size;
                self.free.remove(index);
            }
        }

        // Merge with the preceding block
        let absorbed = match index.checked_sub(1).and_then(|i| self.free.get_mut(i)) {
            Some(prev) if prev.end() == merged.offset => {
                prev.size += merged.size;
                true
            }
            _ => false,
        };
        if !absorbed {
            self.free.insert(index, merged);
        }

        self.used -= block.size;
        self.live -= 1;
    }

    /// Total budget in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently charged to live blocks.
    #[must_use]
    pub fn bytes_used(&self) -> usize {
        self.used
    }

    /// Bytes not charged to any block, possibly fragmented.
    #[must_use]
    pub fn bytes_free(&self) -> usize {
        self.capacity - self.used
    }

    /// Number of live blocks.
    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.live
    }

    /// Number of disjoint free regions.
    #[must_use]
    pub fn free_block_count(&self) -> usize {
        self.free.len()
    }

    /// Size of the largest free region.
    #[must_use]
    pub fn largest_free_block(&self) -> usize {
        self.free.iter().map(|b| b.size).max().unwrap_or(0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_charge_includes_header_and_alignment() {
        assert_eq!(Heap::charge_for(0), 24);
        assert_eq!(Heap::charge_for(1), 32);
        assert_eq!(Heap::charge_for(8), 32);
        assert_eq!(Heap::charge_for(9), 40);
    }

    #[test]
    fn test_first_fit_reuses_lowest_hole() {
        let mut heap = Heap::new(1000);
        let a = heap.allocate(40).unwrap();
        let b = heap.allocate(40).unwrap();
        let _c = heap.allocate(40).unwrap();

        heap.free(a);
        heap.free(b);
        assert_eq!(heap.free_block_count(), 2);

        // The merged hole at the front wins over the tail
        let d = heap.allocate(40).unwrap();
        assert_eq!(d.offset(), 0);
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let mut heap = Heap::new(64);
        assert!(heap.allocate(32).is_some());
        assert!(heap.allocate(32).is_none());
        assert_eq!(heap.live_blocks(), 1);
    }

    #[test]
    fn test_fragmentation_blocks_large_request() {
        let mut heap = Heap::new(4 * 32);
        let blocks: Vec<_> = (0..4).map(|_| heap.allocate(8).unwrap()).collect();
        heap.free(blocks[0]);
        heap.free(blocks[2]);
        assert_eq!(heap.bytes_free(), 64);
        assert_eq!(heap.largest_free_block(), 32);
        assert!(heap.allocate(40).is_none());

        heap.free(blocks[1]);
        assert_eq!(heap.largest_free_block(), 96);
        assert!(heap.allocate(40).is_some());
    }

    #[test]
    fn test_zero_capacity() {
        let mut heap = Heap::new(0);
        assert!(heap.allocate(0).is_none());
        assert_eq!(heap.largest_free_block(), 0);
    }

    proptest! {
        #[test]
        fn prop_free_everything_restores_one_block(
            sizes in prop::collection::vec(0usize..200, 1..40),
            order in prop::collection::vec(any::<prop::sample::Index>(), 40),
        ) {
            let mut heap = Heap::new(16 * 1024);
            let mut live: Vec<HeapBlock> = sizes.iter().filter_map(|&s| heap.allocate(s)).collect();
            let charged: usize = live.iter().map(HeapBlock::size).sum();
            prop_assert_eq!(heap.bytes_used(), charged);

            for idx in &order {
                if live.is_empty() {
                    break;
                }
                let block = live.swap_remove(idx.index(live.len()));
                heap.free(block);
            }
            for block in live.drain(..) {
                heap.free(block);
            }

            prop_assert_eq!(heap.bytes_used(), 0);
            prop_assert_eq!(heap.free_block_count(), 1);
            prop_assert_eq!(heap.largest_free_block(), 16 * 1024);
        }
    }
}
