use crate::error::AllocError;
use crate::tags::{ALIGNMENT, MIN_BLOCK_SIZE};

/// Tunables for a [`RawAlloc`](crate::RawAlloc).
///
/// The defaults are the classic values: the heap starts with, and grows by,
/// 4096 bytes at a time, and a free block is only split off when the
/// remainder would be at least 16 bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HeapConfig {
    /// Size of the initial free block, and the smallest amount the heap is
    /// ever grown by.
    pub chunk_size: usize,
    /// Floor for adjusted request sizes, and the split threshold in `place`.
    pub min_block_size: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            chunk_size: 4096,
            min_block_size: MIN_BLOCK_SIZE,
        }
    }
}

impl HeapConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_min_block_size(mut self, min_block_size: usize) -> Self {
        self.min_block_size = min_block_size;
        self
    }

    /// Check that block sizes derived from this config keep every block
    /// aligned and able to host its own free-list links.
    pub fn validate(&self) -> Result<(), AllocError> {
        if self.min_block_size < MIN_BLOCK_SIZE || self.min_block_size % ALIGNMENT != 0 {
            log::warn!("Rejecting min_block_size {}", self.min_block_size);
            return Err(AllocError::InvalidConfig);
        }
        if self.chunk_size < self.min_block_size
            || self.chunk_size % ALIGNMENT != 0
            || self.chunk_size > u32::MAX as usize
        {
            log::warn!("Rejecting chunk_size {}", self.chunk_size);
            return Err(AllocError::InvalidConfig);
        }
        Ok(())
    }
}
