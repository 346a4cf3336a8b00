//! The allocator itself, and a locked wrapper for sharing it.
//!
//! ## Basic Types
//!
//! ### [`RawAlloc`](struct.RawAlloc.html)
//!
//! A `RawAlloc` is a single-threaded, non-thread-safe heap manager over a
//! [`HeapGrower`]. Placement and coalescing live in their own modules; this
//! module holds construction, `free`, `reallocate` and the accessors.
//!
//! ### [`LockedAlloc`](struct.LockedAlloc.html)
//!
//! A `LockedAlloc` wraps `RawAlloc` with a spin lock, so that one heap can be
//! shared between threads. Every operation holds the lock until it returns.

use core::fmt;

use spin::{Mutex, MutexGuard};

use crate::check::{Stats, Validity};
use crate::config::HeapConfig;
use crate::error::AllocError;
use crate::freelist::{FreeIter, FreeList};
use crate::heap::{Heap, HeapGrower};
use crate::tags::OVERHEAD;

/// A raw allocator, capable of growing the heap, carving allocations out of
/// free blocks, and merging freed blocks back together.
///
/// Note: It never returns memory to the grower.
pub struct RawAlloc<G> {
    pub(crate) heap: Heap<G>,
    pub(crate) free: FreeList,
    pub(crate) config: HeapConfig,
}

impl<G: HeapGrower> RawAlloc<G> {
    /// Create a heap on `grower` with the default [`HeapConfig`].
    pub fn new(grower: G) -> Result<Self, AllocError> {
        RawAlloc::with_config(grower, HeapConfig::default())
    }

    /// Lay down the prologue and epilogue, then grow the heap by one
    /// `chunk_size` free block.
    pub fn with_config(grower: G, config: HeapConfig) -> Result<Self, AllocError> {
        config.validate()?;

        let mut alloc = RawAlloc {
            heap: Heap::init(grower)?,
            free: FreeList::new(),
            config,
        };
        alloc.extend(config.chunk_size)?;
        log::debug!(
            "Heap ready: {} bytes, chunk size {}",
            alloc.heap_size(),
            config.chunk_size
        );

        Ok(alloc)
    }

    /// Free a block returned by [`allocate`](#method.allocate) or
    /// [`reallocate`](#method.reallocate).
    ///
    /// Freeing anything else, or freeing twice, corrupts the heap; it is only
    /// caught by debug assertions.
    pub fn free(&mut self, addr: usize) {
        debug_assert!(
            addr > self.heap.start() && addr < self.heap.high_water(),
            "free of {} outside the heap",
            addr
        );
        debug_assert!(self.heap.is_allocated(addr), "double free of {}", addr);

        let size = self.heap.size(addr);
        log::trace!("Freeing {} bytes at {}", size, addr);
        self.heap.write_block(addr, size, false);
        self.coalesce(addr);
    }

    /// Move an allocation into a fresh block of `new_size` bytes.
    ///
    /// The first `min(new_size, old payload)` bytes are copied over, and the
    /// old block is freed. On failure the old block is left as it was.
    pub fn reallocate(&mut self, addr: usize, new_size: usize) -> Result<usize, AllocError> {
        debug_assert!(self.heap.is_allocated(addr), "reallocate of free block {}", addr);

        let new_addr = self.allocate(new_size)?;
        let old_payload = self.heap.size(addr) - OVERHEAD;
        let len = core::cmp::min(new_size, old_payload);
        log::trace!("Reallocating {} -> {}, copying {} bytes", addr, new_addr, len);
        self.heap.copy_payload(addr, new_addr, len);
        self.free(addr);

        Ok(new_addr)
    }

    /// Grow the heap by at least `size` bytes and merge the new space into
    /// the free list. Returns the resulting free block.
    pub(crate) fn extend(&mut self, size: usize) -> Result<usize, AllocError> {
        let bp = self.heap.extend(size)?;
        Ok(self.coalesce(bp))
    }

    ////////////////////////////////////////////////////////////
    // Accessors

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// The heap's high-water mark, in bytes.
    pub fn heap_size(&self) -> usize {
        self.heap.high_water()
    }

    /// The full size of the block at `addr`, including its tags.
    pub fn block_size(&self, addr: usize) -> usize {
        self.heap.size(addr)
    }

    /// The payload of the block at `addr`. It may be longer than requested,
    /// up to the block's size less its tags.
    pub fn payload(&self, addr: usize) -> &[u8] {
        self.heap.payload(addr)
    }

    pub fn payload_mut(&mut self, addr: usize) -> &mut [u8] {
        self.heap.payload_mut(addr)
    }

    /// Free blocks, in free-list (most recently freed first) order.
    pub fn free_blocks(&self) -> FreeIter<'_, G> {
        self.free.iter(&self.heap)
    }

    pub fn grower(&self) -> &G {
        self.heap.grower()
    }

    /// Direct access to the grower. Changing the bytes it hands out
    /// corrupts the heap.
    pub fn grower_mut(&mut self) -> &mut G {
        self.heap.grower_mut()
    }
}

impl<G: HeapGrower> fmt::Display for RawAlloc<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FreeList(")?;
        let mut start = true;
        for bp in self.free_blocks() {
            if !start {
                write!(f, ", ")?;
            } else {
                start = false;
            }
            write!(f, "FreeBlock({}, {})", bp, self.heap.size(bp))?;
        }

        write!(f, ")")
    }
}

/// A thread-safe allocator, using a spin lock around a RawAlloc.
pub struct LockedAlloc<G> {
    raw: Mutex<RawAlloc<G>>,
}

impl<G: HeapGrower> LockedAlloc<G> {
    pub fn new(raw: RawAlloc<G>) -> Self {
        LockedAlloc {
            raw: Mutex::new(raw),
        }
    }

    /// Get a reference to the underlying RawAlloc.
    ///
    /// Every other caller spins until the guard is dropped.
    pub fn lock(&self) -> MutexGuard<RawAlloc<G>> {
        self.raw.lock()
    }

    pub fn allocate(&self, size: usize) -> Result<usize, AllocError> {
        self.lock().allocate(size)
    }

    pub fn free(&self, addr: usize) {
        self.lock().free(addr)
    }

    pub fn reallocate(&self, addr: usize, new_size: usize) -> Result<usize, AllocError> {
        self.lock().reallocate(addr, new_size)
    }

    pub fn stats(&self) -> (Validity, Stats) {
        self.lock().stats()
    }

    pub fn into_inner(self) -> RawAlloc<G> {
        self.raw.into_inner()
    }
}
