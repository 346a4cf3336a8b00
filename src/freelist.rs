use core::fmt;

use crate::heap::{Heap, HeapGrower};

/// An explicit, doubly-linked list of free blocks, kept in LIFO order.
///
/// The list owns nothing but its head: the predecessor and successor links
/// live in the first two payload words of each free block (see
/// [`Heap::pred`] and [`Heap::succ`]). A block is on the list exactly when
/// its header's allocated flag is clear, so the list never needs to be
/// searched to find out whether a block is free.
///
/// ```text
///  head
///   |      +--------+ succ  +--------+ succ  +--------+
///   +----> |  free  | ----> |  free  | ----> |  free  | ----> nil
///   nil <- |  blk   | <---- |  blk   | <---- |  blk   |
///     pred +--------+  pred +--------+  pred +--------+
/// ```
///
/// Insertion and removal are O(1), given the block.
#[derive(Default)]
pub struct FreeList {
    head: Option<usize>,
    len: usize,
}

impl FreeList {
    pub const fn new() -> Self {
        FreeList { head: None, len: 0 }
    }

    pub fn head(&self) -> Option<usize> {
        self.head
    }

    /// Number of blocks on the list, counted as they are inserted and
    /// removed.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Push `bp` on the front of the list.
    pub fn insert<G: HeapGrower>(&mut self, heap: &mut Heap<G>, bp: usize) {
        log::trace!("free list: insert {} before {:?}", bp, self.head);
        heap.set_pred(bp, None);
        heap.set_succ(bp, self.head);
        if let Some(old_head) = self.head {
            heap.set_pred(old_head, Some(bp));
        }
        self.head = Some(bp);
        self.len += 1;
    }

    /// Unlink `bp`, wherever it is on the list, and clear its links.
    ///
    /// This must happen before `bp`'s tags or payload are rewritten, since
    /// its links are read from the payload.
    pub fn remove<G: HeapGrower>(&mut self, heap: &mut Heap<G>, bp: usize) {
        let pred = heap.pred(bp);
        let succ = heap.succ(bp);
        log::trace!("free list: remove {} ({:?} <-> {:?})", bp, pred, succ);

        match pred {
            // Head of the list (or its sole member)
            None => {
                debug_assert_eq!(self.head, Some(bp), "block {} is not on the free list", bp);
                self.head = succ;
            }
            Some(pred) => heap.set_succ(pred, succ),
        }
        if let Some(succ) = succ {
            heap.set_pred(succ, pred);
        }

        heap.set_pred(bp, None);
        heap.set_succ(bp, None);
        self.len -= 1;
    }

    /// Walk the list from its head, in LIFO order.
    pub fn iter<'heap, G: HeapGrower>(&self, heap: &'heap Heap<G>) -> FreeIter<'heap, G> {
        FreeIter {
            heap,
            next: self.head,
        }
    }
}

impl fmt::Debug for FreeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreeList")
            .field("head", &self.head)
            .field("len", &self.len)
            .finish()
    }
}

pub struct FreeIter<'heap, G> {
    heap: &'heap Heap<G>,
    next: Option<usize>,
}

impl<'heap, G: HeapGrower> Iterator for FreeIter<'heap, G> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let bp = self.next.take()?;
        self.next = self.heap.succ(bp);
        Some(bp)
    }
}
