//! First-fit placement over the free list, and block splitting.

use crate::allocators::RawAlloc;
use crate::error::AllocError;
use crate::heap::HeapGrower;
use crate::tags::adjusted_size;

impl<G: HeapGrower> RawAlloc<G> {
    /// Allocate a block with at least `size` bytes of payload, returning its
    /// (8-byte aligned) address.
    ///
    /// If no free block fits, the heap is grown by at least
    /// `config.chunk_size` bytes. Nothing changes if that growth fails.
    pub fn allocate(&mut self, size: usize) -> Result<usize, AllocError> {
        if size == 0 {
            return Err(AllocError::InvalidRequest);
        }
        let asize =
            adjusted_size(size, self.config.min_block_size).ok_or(AllocError::OutOfMemory)?;

        let bp = match self.find_fit(asize) {
            Some(bp) => bp,
            None => {
                let grow_by = core::cmp::max(asize, self.config.chunk_size);
                log::debug!("No fit for {} bytes, growing by {}", asize, grow_by);
                self.extend(grow_by)?
            }
        };
        debug_assert!(self.heap.size(bp) >= asize);

        self.place(bp, asize);
        log::trace!("Allocated {} bytes ({} requested) at {}", asize, size, bp);
        Ok(bp)
    }

    /// Find the first block on the free list, in list order, holding at least
    /// `asize` bytes.
    pub(crate) fn find_fit(&self, asize: usize) -> Option<usize> {
        self.free_blocks().find(|&bp| self.heap.size(bp) >= asize)
    }

    /// Take the free block `bp` off the list and mark its first `asize` bytes
    /// allocated. The rest goes back on the list as a block of its own, unless
    /// it would be smaller than the minimum block.
    pub(crate) fn place(&mut self, bp: usize, asize: usize) {
        let csize = self.heap.size(bp);
        self.free.remove(&mut self.heap, bp);

        if csize - asize >= self.config.min_block_size {
            self.heap.write_block(bp, asize, true);
            let rest = self.heap.next_block(bp);
            self.heap.write_block(rest, csize - asize, false);
            log::trace!("Split {} into {} + {} at {}", bp, asize, csize - asize, rest);
            self.free.insert(&mut self.heap, rest);
        } else {
            self.heap.write_block(bp, csize, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::allocators::RawAlloc;
    use crate::config::HeapConfig;
    use crate::error::AllocError;
    use crate::heap::{HeapGrower, ToyHeap};
    use crate::tags::OVERHEAD;

    use test_env_log::test;

    #[test]
    fn test_first_fit_follows_list_order() {
        let mut allocator = RawAlloc::new(ToyHeap::default()).unwrap();
        let a = allocator.allocate(200).unwrap();
        let _guard1 = allocator.allocate(8).unwrap();
        let b = allocator.allocate(100).unwrap();
        let _guard2 = allocator.allocate(8).unwrap();

        // b is freed last, so it is tried first, even though a is lower and
        // also large enough
        allocator.free(a);
        allocator.free(b);
        assert_eq!(allocator.free_blocks().take(2).collect::<Vec<_>>(), vec![b, a]);
        assert_eq!(allocator.allocate(50).unwrap(), b);

        // b's remainder is now the head, but too small for 150
        assert_eq!(allocator.allocate(150).unwrap(), a);
    }

    #[test]
    fn test_split_threshold() {
        let mut allocator = RawAlloc::new(ToyHeap::default()).unwrap();
        let a = allocator.allocate(56).unwrap(); // 64 byte block
        let _guard = allocator.allocate(8).unwrap();
        allocator.free(a);

        // Leaves exactly 16 bytes: split
        let p = allocator.allocate(40).unwrap();
        assert_eq!(p, a);
        assert_eq!(allocator.block_size(p), 48);
        assert_eq!(allocator.free_blocks().next(), Some(a + 48));
        assert_eq!(allocator.block_size(a + 48), 16);
        allocator.free(p);
        assert_eq!(allocator.block_size(a), 64);

        // Leaves 8 bytes: no split, the whole block is handed out
        let p = allocator.allocate(48).unwrap();
        assert_eq!(p, a);
        assert_eq!(allocator.block_size(p), 64);
        let (validity, _) = allocator.stats();
        assert!(validity.is_valid());
    }

    #[test]
    fn test_size_bounds() {
        let mut allocator = RawAlloc::new(ToyHeap::default()).unwrap();
        let min_block = allocator.config().min_block_size;
        for size in (1..600).step_by(7) {
            let p = allocator.allocate(size).unwrap();
            let block = allocator.block_size(p);
            assert_eq!(p % 8, 0);
            assert!(block >= size + OVERHEAD, "{} for {}", block, size);
            assert!(block <= size + OVERHEAD + 7 + min_block, "{} for {}", block, size);
        }
    }

    #[test]
    fn test_grows_on_miss() {
        let mut allocator = RawAlloc::new(ToyHeap::default()).unwrap();
        let before = allocator.heap_size();

        // Larger than a chunk: the heap grows by exactly the block size, and
        // the new space merges with the free block at the end of the heap
        let p = allocator.allocate(5000).unwrap();
        assert_eq!(p, 16);
        assert_eq!(allocator.heap_size(), before + 5008);
        assert_eq!(allocator.block_size(p), 5008);
        assert_eq!(allocator.free_blocks().count(), 1);
        assert_eq!(allocator.block_size(allocator.free_blocks().next().unwrap()), 4096);

        // Use up most of that, leaving an 88 byte block at the end
        let q = allocator.allocate(4000).unwrap();
        assert_eq!(q, p + 5008);
        assert_eq!(allocator.heap_size(), before + 5008);

        // Smaller than a chunk, with no room left: grow by a whole chunk,
        // which merges with the 88 byte leftover
        let r = allocator.allocate(1000).unwrap();
        assert_eq!(r, q + 4008);
        assert_eq!(allocator.heap_size(), before + 5008 + 4096);
        let rest = allocator.free_blocks().next().unwrap();
        assert_eq!(allocator.block_size(rest), 88 + 4096 - 1008);
        let (validity, _) = allocator.stats();
        assert!(validity.is_valid());
    }

    #[test]
    fn test_larger_min_block() {
        let config = HeapConfig::default().with_min_block_size(32);
        let mut allocator = RawAlloc::with_config(ToyHeap::default(), config).unwrap();
        let p = allocator.allocate(1).unwrap();
        assert_eq!(allocator.block_size(p), 32);

        let a = allocator.allocate(80).unwrap(); // 88 byte block
        let _guard = allocator.allocate(1).unwrap();
        allocator.free(a);
        // A 24 byte remainder is below this heap's split threshold
        assert_eq!(allocator.allocate(56).unwrap(), a);
        assert_eq!(allocator.block_size(a), 88);
    }

    #[test]
    fn test_out_of_memory() {
        let mut allocator = RawAlloc::new(ToyHeap::with_capacity(8 * 1024)).unwrap();
        let p = allocator.allocate(1000).unwrap();
        allocator.payload_mut(p)[..5].copy_from_slice(b"valid");
        allocator.grower_mut().exhaust();

        let before = allocator.grower().memory().to_vec();
        assert_eq!(allocator.allocate(8000), Err(AllocError::OutOfMemory));
        assert_eq!(allocator.grower().memory(), &before[..]);
        assert_eq!(&allocator.payload(p)[..5], b"valid");

        // What is already free can still be handed out
        assert!(allocator.allocate(1000).is_ok());
        let (validity, _) = allocator.stats();
        assert!(validity.is_valid());
    }
}
