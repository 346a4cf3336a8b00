//! Boundary tags: the header/footer word that brackets every block.
//!
//! ```text
//!      31                     3  2  1  0
//!      -----------------------------------
//!     | s  s  s  s  ... s  s  s  0  0  a/f
//!      -----------------------------------
//! ```
//!
//! The size bits hold the span of the whole block, header and footer
//! included. Because sizes are multiples of [`ALIGNMENT`], the low three
//! bits are always free, and the lowest one carries the allocated flag.

use core::fmt;

use static_assertions::const_assert;

/// Size of a boundary tag, and of a free-list link.
pub const WORD_SIZE: usize = 4;

/// Granularity of block sizes and of every block pointer.
pub const ALIGNMENT: usize = 8;

/// Header plus footer.
pub const OVERHEAD: usize = 2 * WORD_SIZE;

/// The smallest block that can hold its own predecessor and successor
/// links once it is freed.
pub const MIN_BLOCK_SIZE: usize = OVERHEAD + 2 * WORD_SIZE;

const ALLOCATED_FLAG: u32 = 0x1;
const SIZE_MASK: u32 = !0x7;

const_assert!(ALIGNMENT.is_power_of_two());
const_assert!(OVERHEAD % ALIGNMENT == 0);
const_assert!(MIN_BLOCK_SIZE % ALIGNMENT == 0);
const_assert!(WORD_SIZE == core::mem::size_of::<u32>());

/// A packed size + allocated-flag word.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Tag(u32);

impl Tag {
    /// Pack `size` and the allocated flag into one word.
    ///
    /// `size` must already be rounded to [`ALIGNMENT`] and fit in 32 bits.
    pub fn new(size: usize, allocated: bool) -> Tag {
        debug_assert!(size % ALIGNMENT == 0, "unaligned block size {}", size);
        debug_assert!(size <= u32::MAX as usize, "block size {} overflows a tag", size);
        let flag = if allocated { ALLOCATED_FLAG } else { 0 };
        Tag(size as u32 | flag)
    }

    pub fn from_bits(bits: u32) -> Tag {
        Tag(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn size(self) -> usize {
        (self.0 & SIZE_MASK) as usize
    }

    pub fn is_allocated(self) -> bool {
        self.0 & ALLOCATED_FLAG != 0
    }

    /// Both halves at once.
    pub fn decode(self) -> (usize, bool) {
        (self.size(), self.is_allocated())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{}]",
            self.size(),
            if self.is_allocated() { 'a' } else { 'f' }
        )
    }
}

// Round value up to the nearest multiple of increment, which must be a power
// of two. Returns None on overflow.
pub(crate) fn round_up(value: usize, increment: usize) -> Option<usize> {
    debug_assert!(increment.is_power_of_two());
    Some(value.checked_add(increment - 1)? & !(increment - 1))
}

/// Turn a requested payload size into the block size that will hold it:
/// payload plus header and footer, rounded to [`ALIGNMENT`], and never less
/// than `min_block`.
///
/// Returns `None` if the result would not fit in a tag.
pub fn adjusted_size(requested: usize, min_block: usize) -> Option<usize> {
    let padded = round_up(requested.checked_add(OVERHEAD)?, ALIGNMENT)?;
    let size = core::cmp::max(padded, min_block);
    if size > (SIZE_MASK as usize) {
        return None;
    }
    Some(size)
}
