use core::fmt;

/// Errors returned by [`RawAlloc`](crate::RawAlloc).
///
/// Heap corruption is never reported here; that is the job of
/// [`check_consistency`](crate::RawAlloc::check_consistency).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// A zero-byte request.
    InvalidRequest,
    /// The heap could not be grown far enough to satisfy the request.
    OutOfMemory,
    /// A [`HeapConfig`](crate::HeapConfig) whose sizes would break block
    /// alignment or leave no room for free-list links.
    InvalidConfig,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest => write!(f, "zero-size allocation request"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::InvalidConfig => write!(f, "invalid heap configuration"),
        }
    }
}

impl std::error::Error for AllocError {}
