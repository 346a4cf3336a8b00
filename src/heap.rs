//! The heap region, and the only code that turns block pointers into byte
//! offsets.
//!
//! ## [`HeapGrower`]
//!
//! `HeapGrower` is the raw-memory provider: it owns the bytes of the heap and
//! can extend them, `sbrk`-style, by an exact number of bytes contiguous with
//! the current high-water mark. Addresses are byte offsets into
//! [`HeapGrower::memory`].
//!
//! ## [`ToyHeap`]
//!
//! `ToyHeap` is a fixed-size buffer that can pretend to be a heap, and
//! implements `HeapGrower` for such a purpose. It is mainly useful for testing.
//!
//! ## [`Heap`]
//!
//! `Heap` wraps a grower with boundary-tag accessors. The heap it manages
//! looks like this:
//!
//! ```text
//!  begin                                                          end
//!  heap                                                           heap
//!   -----------------------------------------------------------------
//!  |  pad   | hdr(8:a) | ftr(8:a) | zero or more usr blks | hdr(0:a) |
//!   -----------------------------------------------------------------
//!           |       prologue      |                       | epilogue |
//!           |         block       |                       | block    |
//! ```
//!
//! A block pointer (`bp`) addresses the first payload byte. A free block
//! reuses the start of its payload for its free-list links:
//!
//! ```text
//!   bp-4      bp        bp+4                          bp+size-8
//!  +--------+---------+---------+------- ... -------+--------+
//!  | header |  pred   |  succ   |                   | footer |
//!  +--------+---------+---------+------- ... -------+--------+
//! ```

use core::fmt;

use crate::error::AllocError;
use crate::tags::{round_up, Tag, ALIGNMENT, OVERHEAD, WORD_SIZE};

/// A raw-memory provider, able to extend the heap on request.
pub trait HeapGrower {
    type Err: fmt::Debug;

    /// Grow the heap by exactly `size` bytes, contiguous with the previous
    /// high-water mark. Returns the offset of the start of the new region.
    fn grow_heap(&mut self, size: usize) -> Result<usize, Self::Err>;

    /// All bytes handed out so far; `memory().len()` is the high-water mark.
    fn memory(&self) -> &[u8];

    fn memory_mut(&mut self) -> &mut [u8];
}

pub struct ToyHeap {
    pub size: usize,
    limit: usize,
    heap: Box<[u8]>,
}

impl Default for ToyHeap {
    fn default() -> Self {
        ToyHeap::with_capacity(256 * 1024)
    }
}

#[derive(Debug)]
pub struct ToyHeapOverflowError();

impl ToyHeap {
    pub fn with_capacity(capacity: usize) -> Self {
        ToyHeap {
            size: 0,
            limit: capacity,
            heap: vec![0; capacity].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.heap.len()
    }

    /// Refuse to grow past `limit` bytes in total.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = core::cmp::min(limit, self.heap.len());
    }

    /// Make every further growth fail.
    pub fn exhaust(&mut self) {
        self.limit = self.size;
    }
}

impl HeapGrower for ToyHeap {
    type Err = ToyHeapOverflowError;

    fn grow_heap(&mut self, size: usize) -> Result<usize, Self::Err> {
        if size > self.limit.saturating_sub(self.size) {
            return Err(ToyHeapOverflowError());
        }

        let start = self.size;
        self.size += size;
        Ok(start)
    }

    fn memory(&self) -> &[u8] {
        &self.heap[..self.size]
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.heap[..self.size]
    }
}

#[cfg(feature = "use_libc")]
pub use self::mmap::{MmapHeap, ReservationExhausted};

#[cfg(feature = "use_libc")]
mod mmap {
    use core::ptr::{null_mut, NonNull};

    use errno::Errno;

    use super::HeapGrower;
    use crate::tags::round_up;

    /// MmapHeap reserves one private anonymous mapping up front, and grows
    /// the heap by moving a break pointer through it.
    pub struct MmapHeap {
        base: NonNull<u8>,
        reserved: usize,
        brk: usize,
    }

    #[derive(Debug)]
    pub struct ReservationExhausted {
        pub requested: usize,
        pub available: usize,
    }

    // The mapping is owned exclusively by this MmapHeap.
    unsafe impl Send for MmapHeap {}

    impl MmapHeap {
        /// Reserve room for a heap of up to `max_size` bytes (rounded up to a
        /// whole number of pages).
        pub fn reserve(max_size: usize) -> Result<Self, Errno> {
            let pagesize = sysconf::page::pagesize();
            let reserved = match round_up(core::cmp::max(max_size, 1), pagesize) {
                Some(r) => r,
                None => return Err(Errno(libc::ENOMEM)),
            };

            let ptr = unsafe {
                libc::mmap(
                    // Address we want the memory at. We don't care, so null it is.
                    null_mut(),
                    reserved,
                    libc::PROT_WRITE | libc::PROT_READ,
                    // Private anonymous memory; pages are only committed once
                    // touched.
                    libc::MAP_ANON | libc::MAP_PRIVATE,
                    -1,
                    0,
                )
            };

            if ptr == libc::MAP_FAILED {
                return Err(errno::errno());
            }

            let base = match NonNull::new(ptr as *mut u8) {
                Some(base) => base,
                None => return Err(Errno(libc::ENOMEM)),
            };

            log::debug!("Reserved {} bytes at {:p}", reserved, base);
            Ok(MmapHeap {
                base,
                reserved,
                brk: 0,
            })
        }

        pub fn reserved(&self) -> usize {
            self.reserved
        }
    }

    impl HeapGrower for MmapHeap {
        type Err = ReservationExhausted;

        fn grow_heap(&mut self, size: usize) -> Result<usize, Self::Err> {
            let available = self.reserved - self.brk;
            if size > available {
                return Err(ReservationExhausted {
                    requested: size,
                    available,
                });
            }

            let start = self.brk;
            self.brk += size;
            Ok(start)
        }

        fn memory(&self) -> &[u8] {
            // The first `brk` bytes of the mapping are readable and writable,
            // and only reachable through this MmapHeap.
            unsafe { core::slice::from_raw_parts(self.base.as_ptr(), self.brk) }
        }

        fn memory_mut(&mut self) -> &mut [u8] {
            unsafe { core::slice::from_raw_parts_mut(self.base.as_ptr(), self.brk) }
        }
    }

    impl Drop for MmapHeap {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.reserved);
            }
        }
    }
}

/// The largest heap whose offsets still fit in a tag or a link.
const MAX_HEAP: usize = u32::MAX as usize;

/// A grower plus the boundary-tag view of its memory.
///
/// Every offset computation in the allocator goes through these accessors.
/// Out-of-range offsets panic on the slice bounds check rather than touching
/// memory outside the heap.
pub struct Heap<G> {
    grower: G,
    /// Block pointer of the prologue.
    start: usize,
}

impl<G: HeapGrower> Heap<G> {
    /// Lay down the alignment padding, the prologue and the epilogue.
    pub fn init(mut grower: G) -> Result<Heap<G>, AllocError> {
        // The prologue's block pointer must be aligned, even if the grower
        // already handed out some bytes.
        let brk = grower.memory().len();
        let pad = (ALIGNMENT - (brk + WORD_SIZE) % ALIGNMENT) % ALIGNMENT;
        let base = match grower.grow_heap(pad + 3 * WORD_SIZE) {
            Ok(base) => base,
            Err(e) => {
                log::warn!("Could not create the initial heap: {:?}", e);
                return Err(AllocError::OutOfMemory);
            }
        };

        let mut heap = Heap {
            grower,
            start: base + pad + WORD_SIZE,
        };
        let start = heap.start;
        for byte in &mut heap.grower.memory_mut()[base..base + pad] {
            *byte = 0;
        }
        heap.write_block(start, OVERHEAD, true);
        heap.set_tag(heap.header(heap.next_block(start)), Tag::new(0, true));
        log::debug!("Initialized heap, prologue at {}", start);

        Ok(heap)
    }

    pub fn grower(&self) -> &G {
        &self.grower
    }

    pub fn grower_mut(&mut self) -> &mut G {
        &mut self.grower
    }

    /// Block pointer of the prologue.
    pub fn start(&self) -> usize {
        self.start
    }

    /// The high-water mark, which is also the epilogue's block pointer.
    pub fn high_water(&self) -> usize {
        self.grower.memory().len()
    }

    /// Grow the heap by at least `size` bytes and format the new space as one
    /// free block, taking over the old epilogue header as its own header.
    ///
    /// Returns the new block's pointer. It is *not* on any free list yet, and
    /// may be adjacent to a free block.
    pub fn extend(&mut self, size: usize) -> Result<usize, AllocError> {
        let size = round_up(size, ALIGNMENT).ok_or(AllocError::OutOfMemory)?;
        if size > MAX_HEAP - self.high_water() {
            log::warn!("Heap of {} bytes cannot grow by {}", self.high_water(), size);
            return Err(AllocError::OutOfMemory);
        }

        let bp = match self.grower.grow_heap(size) {
            Ok(bp) => bp,
            Err(e) => {
                log::warn!("Heap growth by {} bytes refused: {:?}", size, e);
                return Err(AllocError::OutOfMemory);
            }
        };
        debug_assert_eq!(bp + size, self.high_water());
        log::debug!("Grew heap by {} bytes at {}", size, bp);

        self.write_block(bp, size, false);
        self.set_tag(self.header(self.next_block(bp)), Tag::new(0, true));
        Ok(bp)
    }

    ////////////////////////////////////////////////////////////
    // Raw words

    fn get(&self, offset: usize) -> u32 {
        let mut word = [0u8; WORD_SIZE];
        word.copy_from_slice(&self.grower.memory()[offset..offset + WORD_SIZE]);
        u32::from_ne_bytes(word)
    }

    fn put(&mut self, offset: usize, value: u32) {
        self.grower.memory_mut()[offset..offset + WORD_SIZE].copy_from_slice(&value.to_ne_bytes());
    }

    pub fn tag(&self, offset: usize) -> Tag {
        Tag::from_bits(self.get(offset))
    }

    pub fn set_tag(&mut self, offset: usize, tag: Tag) {
        self.put(offset, tag.bits())
    }

    ////////////////////////////////////////////////////////////
    // Boundary tags

    pub fn header(&self, bp: usize) -> usize {
        bp - WORD_SIZE
    }

    /// Offset of the footer, using the size currently in the header.
    pub fn footer(&self, bp: usize) -> usize {
        bp + self.size(bp) - OVERHEAD
    }

    pub fn header_tag(&self, bp: usize) -> Tag {
        self.tag(self.header(bp))
    }

    pub fn footer_tag(&self, bp: usize) -> Tag {
        self.tag(self.footer(bp))
    }

    pub fn size(&self, bp: usize) -> usize {
        self.header_tag(bp).size()
    }

    pub fn is_allocated(&self, bp: usize) -> bool {
        self.header_tag(bp).is_allocated()
    }

    /// Write matching header and footer tags for a block of `size` bytes at
    /// `bp`. The footer lands at `bp + size - 8`, whatever the old header
    /// said.
    pub fn write_block(&mut self, bp: usize, size: usize, allocated: bool) {
        let tag = Tag::new(size, allocated);
        self.set_tag(self.header(bp), tag);
        self.set_tag(bp + size - OVERHEAD, tag);
    }

    /// The physically following block, found from this block's header.
    pub fn next_block(&self, bp: usize) -> usize {
        bp + self.size(bp)
    }

    /// The physically preceding block, found from its footer, which sits just
    /// below this block's header.
    pub fn prev_block(&self, bp: usize) -> usize {
        bp - self.tag(bp - OVERHEAD).size()
    }

    /// Walk every block from the prologue up to, but not including, the
    /// epilogue.
    pub fn blocks(&self) -> BlockIter<'_, G> {
        BlockIter {
            heap: self,
            next: self.start,
        }
    }

    ////////////////////////////////////////////////////////////
    // Free-list links

    fn link(&self, offset: usize) -> Option<usize> {
        match self.get(offset) {
            0 => None,
            bp => Some(bp as usize),
        }
    }

    fn set_link(&mut self, offset: usize, bp: Option<usize>) {
        let value = bp.map(|bp| bp as u32).unwrap_or(0);
        self.put(offset, value)
    }

    pub fn pred(&self, bp: usize) -> Option<usize> {
        self.link(bp)
    }

    pub fn succ(&self, bp: usize) -> Option<usize> {
        self.link(bp + WORD_SIZE)
    }

    pub fn set_pred(&mut self, bp: usize, pred: Option<usize>) {
        self.set_link(bp, pred)
    }

    pub fn set_succ(&mut self, bp: usize, succ: Option<usize>) {
        self.set_link(bp + WORD_SIZE, succ)
    }

    ////////////////////////////////////////////////////////////
    // Payloads

    pub fn payload(&self, bp: usize) -> &[u8] {
        let size = self.size(bp);
        &self.grower.memory()[bp..bp + size - OVERHEAD]
    }

    pub fn payload_mut(&mut self, bp: usize) -> &mut [u8] {
        let size = self.size(bp);
        &mut self.grower.memory_mut()[bp..bp + size - OVERHEAD]
    }

    /// Copy `len` bytes from one payload to another.
    pub fn copy_payload(&mut self, from: usize, to: usize, len: usize) {
        self.grower.memory_mut().copy_within(from..from + len, to)
    }
}

pub struct BlockIter<'heap, G> {
    heap: &'heap Heap<G>,
    next: usize,
}

impl<'heap, G: HeapGrower> Iterator for BlockIter<'heap, G> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let bp = self.next;
        let size = self.heap.size(bp);
        if size == 0 {
            // The epilogue
            return None;
        }
        self.next = bp + size;
        Some(bp)
    }
}
