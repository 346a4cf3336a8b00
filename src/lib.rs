//! A boundary-tag heap allocator with an explicit free list.
//!
//! The allocator manages one growable heap, handed to it by a [`HeapGrower`].
//! Every block in the heap carries a header and a footer holding its size and
//! an allocated bit, so neighbors can be found in either direction without
//! any outside index. Free blocks are additionally threaded onto a
//! doubly-linked LIFO list, whose links are stored in the free blocks'
//! own payloads.
//!
//! - Allocation is first-fit over the free list, splitting off whatever is
//!   left over if it is large enough to be a block of its own. When nothing
//!   fits, the heap grows by at least [`HeapConfig::chunk_size`] bytes.
//! - Freeing merges the block with any free neighbors immediately, so no two
//!   free blocks are ever adjacent.
//! - Reallocation always moves to a new block.
//!
//! Addresses are byte offsets into the grower's memory, and payloads are
//! read and written through [`RawAlloc::payload`] and
//! [`RawAlloc::payload_mut`].
//!
//! ```
//! use tagalloc::{RawAlloc, ToyHeap};
//!
//! let mut allocator = RawAlloc::new(ToyHeap::default()).unwrap();
//! let p = allocator.allocate(100).unwrap();
//! allocator.payload_mut(p)[..5].copy_from_slice(b"hello");
//!
//! let q = allocator.reallocate(p, 200).unwrap();
//! assert_eq!(&allocator.payload(q)[..5], b"hello");
//! allocator.free(q);
//!
//! let (validity, stats) = allocator.stats();
//! assert!(validity.is_valid());
//! assert_eq!(stats.free_blocks, 1);
//! ```
//!
//! `RawAlloc` is not thread-safe; [`LockedAlloc`] wraps it in a spin lock
//! for callers that need to share one heap.

pub mod allocators;
pub mod check;
mod coalesce;
pub mod config;
pub mod error;
pub mod freelist;
pub mod heap;
mod placement;
pub mod tags;

pub use allocators::{LockedAlloc, RawAlloc};
pub use check::{HeapReport, Stats, Validity};
pub use config::HeapConfig;
pub use error::AllocError;
pub use heap::{HeapGrower, ToyHeap, ToyHeapOverflowError};

#[cfg(feature = "use_libc")]
pub use heap::MmapHeap;
