//! Boundary-tag coalescing.
//!
//! A block that has just been freed, or just been added by growing the heap,
//! is merged with whichever of its physical neighbors are free. Neighbors are
//! found from the boundary tags alone; the free list is only updated.

use crate::allocators::RawAlloc;
use crate::heap::HeapGrower;

impl<G: HeapGrower> RawAlloc<G> {
    /// Merge the free (but unlisted) block `bp` with its free neighbors, and
    /// put the result on the free list. Returns the merged block.
    ///
    /// Neighbors are unlinked from the free list before any tag is
    /// rewritten: their links live in their payloads, which the merge turns
    /// into the middle of a larger block.
    pub(crate) fn coalesce(&mut self, bp: usize) -> usize {
        let prev = self.heap.prev_block(bp);
        let next = self.heap.next_block(bp);
        let prev_alloc = self.heap.is_allocated(prev);
        let next_alloc = self.heap.is_allocated(next);
        let mut size = self.heap.size(bp);

        let merged = match (prev_alloc, next_alloc) {
            (true, true) => {
                log::trace!("coalesce {}: no free neighbors", bp);
                bp
            }

            (true, false) => {
                log::trace!("coalesce {}: merging next {}", bp, next);
                self.free.remove(&mut self.heap, next);
                size += self.heap.size(next);
                self.heap.write_block(bp, size, false);
                bp
            }

            (false, true) => {
                log::trace!("coalesce {}: merging prev {}", bp, prev);
                self.free.remove(&mut self.heap, prev);
                size += self.heap.size(prev);
                self.heap.write_block(prev, size, false);
                prev
            }

            (false, false) => {
                log::trace!("coalesce {}: merging prev {} and next {}", bp, prev, next);
                self.free.remove(&mut self.heap, prev);
                self.free.remove(&mut self.heap, next);
                size += self.heap.size(prev) + self.heap.size(next);
                self.heap.write_block(prev, size, false);
                prev
            }
        };

        self.free.insert(&mut self.heap, merged);
        merged
    }
}
